pub mod config;
pub mod evaluator;
pub mod indicators;
pub mod instance;
pub mod reconciler;
pub mod registry;
pub mod rules;
pub mod session;
pub mod state;
pub mod window;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use evaluator::SignalEvaluator;
pub use instance::SignalStrategy;
pub use reconciler::{PositionReconciler, ReconcilePolicy};
pub use registry::StrategyRegistry;
pub use rules::{Evaluation, Rule};
pub use session::{SessionClock, SessionEvent};
pub use window::RollingWindow;

use common::{Bar, OrderIntent, Position, Result, Trade};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The symbol this strategy trades.
    fn symbol(&self) -> &str;

    /// Consume one bar and decide what to trade given the current net
    /// position. Returns an empty list while warming up.
    fn on_bar(&mut self, bar: &Bar, position: Position) -> Result<Vec<OrderIntent>>;

    /// Fill notification. May return follow-up intents.
    fn on_trade(&mut self, trade: &Trade) -> Vec<OrderIntent>;
}
