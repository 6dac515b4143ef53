use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use common::{Bar, Error, ExecutionClient, OrderIntent, Position, Result, Trade};

/// Submits intents to the execution client, each call bounded by a timeout.
///
/// This is the ONLY component that calls `ExecutionClient::submit`.
pub struct OrderExecutor {
    client: Arc<dyn ExecutionClient>,
    timeout: Duration,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExecutionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Submit one intent. `Ok(None)` means the intent rests as a stop.
    pub async fn submit(&self, intent: &OrderIntent) -> Result<Option<Trade>> {
        info!(
            symbol = %intent.symbol,
            direction = %intent.direction,
            price = intent.price,
            qty = intent.quantity,
            stop = intent.is_stop,
            "Executing intent"
        );
        match self.bounded(self.client.submit(intent)).await {
            Ok(Some(trade)) => {
                info!(
                    symbol = %trade.symbol,
                    direction = %trade.direction,
                    price = trade.price,
                    qty = trade.quantity,
                    "Intent filled"
                );
                Ok(Some(trade))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                error!(symbol = %intent.symbol, error = %e, "Intent submission failed");
                Err(e)
            }
        }
    }

    /// Withdraw a resting stop. `Ok(false)` means it already filled or was
    /// withdrawn.
    pub async fn cancel(&self, intent_id: &str) -> Result<bool> {
        let cancelled = self.bounded(self.client.cancel(intent_id)).await?;
        if cancelled {
            debug!(intent_id, "Stop cancelled");
        }
        Ok(cancelled)
    }

    /// Advance the client to a new bar, collecting triggered stop fills.
    pub async fn advance(&self, bar: &Bar) -> Result<Vec<Trade>> {
        let trades = self.bounded(self.client.on_bar(bar)).await?;
        for trade in &trades {
            info!(
                symbol = %trade.symbol,
                direction = %trade.direction,
                price = trade.price,
                qty = trade.quantity,
                "Stop filled"
            );
        }
        Ok(trades)
    }

    pub async fn position(&self, symbol: &str) -> Result<Position> {
        self.bounded(self.client.position(symbol)).await
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
