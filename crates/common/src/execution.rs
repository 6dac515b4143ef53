use async_trait::async_trait;

use crate::{Bar, OrderIntent, Position, Result, Trade};

/// Abstraction over the execution side that owns positions.
///
/// `PaperClient` implements this for simulation. Only the engine's
/// `OrderExecutor` submits intents; strategies never hold a client.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit an intent. Market intents fill and return their trade; stop
    /// intents rest and return `None` until a later bar triggers them.
    async fn submit(&self, intent: &OrderIntent) -> Result<Option<Trade>>;

    /// Withdraw a resting stop. Returns false if it is no longer resting.
    async fn cancel(&self, intent_id: &str) -> Result<bool>;

    /// Advance to a new bar, returning trades from resting stops it triggered.
    async fn on_bar(&self, bar: &Bar) -> Result<Vec<Trade>>;

    /// Current net position for a symbol.
    async fn position(&self, symbol: &str) -> Result<Position>;
}
