pub mod executor;
pub mod feed;
pub mod lifecycle;

pub use executor::OrderExecutor;
pub use feed::BarFeed;
pub use lifecycle::{Engine, EngineHandle, RunSummary};
