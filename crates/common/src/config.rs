use tracing::debug;

use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// CSV file of bars to replay.
    pub bars_path: String,

    /// Strategy config file path.
    pub strategy_config_path: String,

    // Execution
    pub paper_slippage_bps: f64,
    pub execution_timeout_ms: u64,

    /// Capacity of the bar channel between feed and engine.
    pub feed_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let cfg = Config {
            bars_path: required_env("BARS_PATH")?,
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 0.0)?,
            execution_timeout_ms: parsed_env("EXECUTION_TIMEOUT_MS", 2_000)?,
            feed_buffer: parsed_env("FEED_BUFFER", 1_024)?,
        };

        if cfg.paper_slippage_bps < 0.0 {
            return Err(Error::Config(format!(
                "PAPER_SLIPPAGE_BPS must be >= 0, got {}",
                cfg.paper_slippage_bps
            )));
        }
        if cfg.feed_buffer == 0 {
            return Err(Error::Config("FEED_BUFFER must be > 0".into()));
        }

        debug!(?cfg, "Configuration loaded");
        Ok(cfg)
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{key} has invalid value '{raw}': {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_env_falls_back_to_default() {
        let v: u64 = parsed_env("SIGBOT_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parsed_env_rejects_garbage() {
        std::env::set_var("SIGBOT_TEST_GARBAGE_TIMEOUT", "soon");
        let err = parsed_env::<u64>("SIGBOT_TEST_GARBAGE_TIMEOUT", 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn required_env_reports_missing_key() {
        let err = required_env("SIGBOT_TEST_MISSING_REQUIRED").unwrap_err();
        assert!(err.to_string().contains("SIGBOT_TEST_MISSING_REQUIRED"));
    }
}
