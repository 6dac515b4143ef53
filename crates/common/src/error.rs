use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The rolling window has not reached its warm-up length yet.
    /// Callers skip the bar; this is never fatal.
    #[error("Insufficient data: need {needed} bars, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Requested suffix of {requested} bars but window holds {available}")]
    Range { requested: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Indicator computation failed: {0}")]
    IndicatorComputation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bar data error: {0}")]
    Data(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Execution timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
