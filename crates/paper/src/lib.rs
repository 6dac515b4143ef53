use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{Bar, Direction, Error, ExecutionClient, Offset, OrderIntent, Position, Result, Trade};

/// Simulated execution for bar replay.
///
/// Market intents fill immediately at their price with configurable
/// slippage. Stop intents rest until a later bar reaches their price from
/// the side the market was on when they were placed, then fill at the stop
/// price, or at the open of a bar that gaps through it. A fill that leaves
/// a symbol flat withdraws its resting closing stops. Net positions are kept
/// per symbol.
pub struct PaperClient {
    /// Net position per symbol.
    positions: Arc<RwLock<HashMap<String, i64>>>,
    /// Resting stop intents, oldest first.
    stops: Arc<RwLock<Vec<RestingStop>>>,
    /// Latest bar per symbol: its timestamp stamps fills, its close decides
    /// which side a new stop waits on.
    last_bar: Arc<RwLock<HashMap<String, (DateTime<Utc>, f64)>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps = slippage_bps, "PaperClient initialized");
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            stops: Arc::new(RwLock::new(Vec::new())),
            last_bar: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
        }
    }

    /// Snapshot of all non-flat positions.
    pub async fn positions(&self) -> HashMap<String, i64> {
        self.positions
            .read()
            .await
            .iter()
            .filter(|(_, net)| **net != 0)
            .map(|(symbol, net)| (symbol.clone(), *net))
            .collect()
    }

    pub async fn resting_stops(&self) -> usize {
        self.stops.read().await.len()
    }

    /// Buys and covers pay more, sells and shorts receive less.
    fn slipped(&self, direction: Direction, price: f64) -> f64 {
        let factor = self.slippage_bps / 10_000.0;
        match direction {
            Direction::Buy | Direction::Cover => price * (1.0 + factor),
            Direction::Sell | Direction::Short => price * (1.0 - factor),
        }
    }

    async fn fill(&self, intent: &OrderIntent, price: f64) -> Result<Trade> {
        let mut positions = self.positions.write().await;
        let net = positions.entry(intent.symbol.clone()).or_insert(0);
        let qty = i64::from(intent.quantity);

        // A close may not exceed the position it closes.
        let closable = match intent.direction {
            Direction::Sell => *net,
            Direction::Cover => -*net,
            Direction::Buy | Direction::Short => qty,
        };
        if qty == 0 || closable < qty {
            return Err(Error::Execution(format!(
                "{} {} x{} rejected: position is {}",
                intent.direction, intent.symbol, intent.quantity, net
            )));
        }

        let fill_price = self.slipped(intent.direction, price);
        let timestamp = self
            .last_bar
            .read()
            .await
            .get(&intent.symbol)
            .map(|(ts, _)| *ts)
            .unwrap_or_else(Utc::now);
        let trade = Trade {
            intent_id: intent.id.clone(),
            symbol: intent.symbol.clone(),
            direction: intent.direction,
            price: fill_price,
            quantity: intent.quantity,
            timestamp,
        };
        *net = Position(*net).apply(&trade).net();

        debug!(
            symbol = %trade.symbol,
            direction = %trade.direction,
            requested = price,
            fill = fill_price,
            qty = trade.quantity,
            position = *net,
            "Paper fill simulated"
        );
        let flat = *net == 0;
        drop(positions);
        if flat {
            self.withdraw_closing_stops(&trade.symbol).await;
        }
        Ok(trade)
    }

    /// Nothing is left for a closing stop to close.
    async fn withdraw_closing_stops(&self, symbol: &str) {
        let mut stops = self.stops.write().await;
        let before = stops.len();
        stops.retain(|s| !(s.intent.symbol == symbol && s.intent.direction.offset() == Offset::Close));
        if stops.len() < before {
            debug!(symbol = %symbol, withdrawn = before - stops.len(), "Closing stops withdrawn, position flat");
        }
    }
}

struct RestingStop {
    intent: OrderIntent,
    /// Waits for the market to rise to the price rather than fall to it.
    above: bool,
}

impl RestingStop {
    /// Without a reference close, buys wait above and sells below.
    fn new(intent: OrderIntent, reference: Option<f64>) -> Self {
        let above = match reference {
            Some(close) => intent.price > close,
            None => matches!(intent.direction, Direction::Buy | Direction::Cover),
        };
        Self { intent, above }
    }

    fn triggered(&self, bar: &Bar) -> bool {
        if self.above {
            bar.high >= self.intent.price
        } else {
            bar.low <= self.intent.price
        }
    }

    /// The stop price, or the bar open if the bar gapped through it.
    fn fill_price(&self, bar: &Bar) -> f64 {
        if self.above {
            self.intent.price.max(bar.open)
        } else {
            self.intent.price.min(bar.open)
        }
    }
}

#[async_trait]
impl ExecutionClient for PaperClient {
    async fn submit(&self, intent: &OrderIntent) -> Result<Option<Trade>> {
        if !(intent.price.is_finite() && intent.price > 0.0) {
            return Err(Error::Execution(format!(
                "{} {} has invalid price {}",
                intent.direction, intent.symbol, intent.price
            )));
        }
        if intent.is_stop {
            let reference = self.last_bar.read().await.get(&intent.symbol).map(|(_, close)| *close);
            let stop = RestingStop::new(intent.clone(), reference);
            debug!(
                symbol = %intent.symbol,
                direction = %intent.direction,
                price = intent.price,
                above = stop.above,
                "Stop resting"
            );
            self.stops.write().await.push(stop);
            return Ok(None);
        }
        self.fill(intent, intent.price).await.map(Some)
    }

    async fn cancel(&self, intent_id: &str) -> Result<bool> {
        let mut stops = self.stops.write().await;
        let before = stops.len();
        stops.retain(|s| s.intent.id != intent_id);
        Ok(stops.len() < before)
    }

    async fn on_bar(&self, bar: &Bar) -> Result<Vec<Trade>> {
        self.last_bar
            .write()
            .await
            .insert(bar.symbol.clone(), (bar.timestamp, bar.close));

        let due: Vec<RestingStop> = {
            let mut stops = self.stops.write().await;
            let (due, resting): (Vec<_>, Vec<_>) = stops
                .drain(..)
                .partition(|s| s.intent.symbol == bar.symbol && s.triggered(bar));
            *stops = resting;
            due
        };

        let mut trades = Vec::with_capacity(due.len());
        for stop in &due {
            match self.fill(&stop.intent, stop.fill_price(bar)).await {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(error = %e, "Triggered stop dropped"),
            }
        }
        Ok(trades)
    }

    async fn position(&self, symbol: &str) -> Result<Position> {
        Ok(Position(
            self.positions.read().await.get(symbol).copied().unwrap_or(0),
        ))
    }
}
