//! Turns a rule's evaluation and the current net position into order intents.

use serde::Deserialize;
use tracing::debug;

use common::{Direction, Offset, OrderIntent, Position, PositionSide, Trade, Trend};

use crate::rules::Evaluation;

/// How a trend is mapped onto the position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcilePolicy {
    /// Opposite position: close, then open the other side.
    Reverse,
    /// Like `Reverse`, but an UNKNOWN trend closes any open position.
    AlwaysInMarket,
    /// Opposite position: close only. New entries only from flat.
    ExitThenFlat,
    /// Same-side trends add `fixed_size` until `max_units` units are held,
    /// or the rule's own size up to the rule's cap when it sizes the order.
    /// Opposite trends close only.
    Pyramid { max_units: u32 },
    /// Long-only grid: every UP buys, every filled buy gets a take-profit
    /// stop sell `step` above its fill.
    Grid { step: f64 },
}

/// Policy name as written in the strategy file. Parameters for `pyramid`
/// and `grid` come from the rule.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Reverse,
    AlwaysInMarket,
    ExitThenFlat,
    Pyramid,
    Grid,
}

impl ReconcilePolicy {
    fn reverses(self) -> bool {
        matches!(self, ReconcilePolicy::Reverse | ReconcilePolicy::AlwaysInMarket)
    }
}

#[derive(Debug, Clone)]
pub struct PositionReconciler {
    symbol: String,
    policy: ReconcilePolicy,
    fixed_size: u32,
    max_entries_per_session: Option<u32>,
    entries_this_session: u32,
    /// Stop level to place against the next opening fill.
    protective_stop: Option<f64>,
}

impl PositionReconciler {
    pub fn new(
        symbol: impl Into<String>,
        policy: ReconcilePolicy,
        fixed_size: u32,
        max_entries_per_session: Option<u32>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            policy,
            fixed_size,
            max_entries_per_session,
            entries_this_session: 0,
            protective_stop: None,
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn entries_this_session(&self) -> u32 {
        self.entries_this_session
    }

    pub fn reset_session(&mut self) {
        self.entries_this_session = 0;
    }

    /// Set (or clear) the protective stop placed when the next open fills.
    pub fn arm_protective_stop(&mut self, level: Option<f64>) {
        self.protective_stop = level;
    }

    pub fn protective_stop(&self) -> Option<f64> {
        self.protective_stop
    }

    fn can_open(&self) -> bool {
        self.max_entries_per_session
            .map_or(true, |max| self.entries_this_session < max)
    }

    fn intent(&self, direction: Direction, price: f64, quantity: u32, stop: bool) -> OrderIntent {
        if stop {
            OrderIntent::stop(&self.symbol, direction, price, quantity)
        } else {
            OrderIntent::new(&self.symbol, direction, price, quantity)
        }
    }

    fn close(&self, eval: &Evaluation, position: Position, price: f64) -> Option<OrderIntent> {
        let direction = Direction::close(position.side())?;
        Some(self.intent(direction, price, position.abs(), eval.stop))
    }

    fn open(&self, eval: &Evaluation, side: PositionSide, price: f64, quantity: u32) -> Option<OrderIntent> {
        if !self.can_open() {
            debug!(symbol = %self.symbol, "session entry budget used, not opening");
            return None;
        }
        if quantity == 0 {
            return None;
        }
        let direction = Direction::open(side)?;
        Some(self.intent(direction, price, quantity, eval.stop))
    }

    /// Entry size: the rule's when it sizes the order, `fixed_size` otherwise.
    fn entry_size(&self, eval: &Evaluation) -> u32 {
        eval.sizing.map_or(self.fixed_size, |s| s.quantity)
    }

    /// Intents for one evaluated bar. Closes always precede opens, and at
    /// most one opening intent is produced.
    pub fn apply(&self, eval: &Evaluation, position: Position, bar_close: f64) -> Vec<OrderIntent> {
        let price = eval.price.unwrap_or(bar_close);
        let side = position.side();

        if eval.flatten {
            return self.close(eval, position, price).into_iter().collect();
        }

        if let ReconcilePolicy::Grid { .. } = self.policy {
            if eval.trend == Trend::Up {
                return self
                    .open(eval, PositionSide::Long, price, self.entry_size(eval))
                    .into_iter()
                    .collect();
            }
            return Vec::new();
        }

        let Some(want) = eval.trend.desired_side() else {
            if self.policy == ReconcilePolicy::AlwaysInMarket {
                return self.close(eval, position, price).into_iter().collect();
            }
            return Vec::new();
        };

        if side == want {
            return match self.policy {
                ReconcilePolicy::Pyramid { max_units } => {
                    let cap = eval.sizing.map_or_else(
                        || u64::from(max_units) * u64::from(self.fixed_size),
                        |s| u64::from(s.cap),
                    );
                    let room = cap.saturating_sub(u64::from(position.abs()));
                    let entry = self.entry_size(eval);
                    let quantity = u32::try_from(room).map_or(entry, |room| entry.min(room));
                    self.open(eval, want, price, quantity).into_iter().collect()
                }
                _ => Vec::new(),
            };
        }

        if side == PositionSide::Flat {
            return self
                .open(eval, want, price, self.entry_size(eval))
                .into_iter()
                .collect();
        }

        let mut intents: Vec<OrderIntent> = self.close(eval, position, price).into_iter().collect();
        if self.policy.reverses() {
            intents.extend(self.open(eval, want, price, self.entry_size(eval)));
        }
        intents
    }

    /// Bookkeeping on a fill. Returns follow-up intents: the protective
    /// stop armed for an opening fill, and grid take-profits.
    pub fn on_trade(&mut self, trade: &Trade) -> Vec<OrderIntent> {
        if trade.offset() == Offset::Open {
            self.entries_this_session += 1;
            if let Some(level) = self.protective_stop.take() {
                let held = match trade.direction {
                    Direction::Short => PositionSide::Short,
                    _ => PositionSide::Long,
                };
                if let Some(direction) = Direction::close(held) {
                    debug!(symbol = %self.symbol, level, "placing protective stop");
                    return vec![OrderIntent::stop(&self.symbol, direction, level, trade.quantity)];
                }
            }
        }
        match self.policy {
            ReconcilePolicy::Grid { step } if trade.direction == Direction::Buy => {
                vec![OrderIntent::stop(
                    &self.symbol,
                    Direction::Sell,
                    trade.price + step,
                    trade.quantity,
                )]
            }
            _ => Vec::new(),
        }
    }
}
