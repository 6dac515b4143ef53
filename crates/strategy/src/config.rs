use serde::Deserialize;
use std::collections::HashMap;

use common::{Error, Result};

use crate::reconciler::PolicyKind;
use crate::session::SessionConfig;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "ma_cross"
/// name = "rb ma 5/10"
/// symbol = "rb2410"
/// fixed_size = 1
///
/// [strategy.params]
/// fast = 5
/// slow = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Rule identifier, e.g. "ma_cross", "adx", "dual_thrust", "ensemble".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Instance name shown in logs.
    pub name: String,
    /// Symbol whose bars this instance consumes.
    pub symbol: String,
    /// Contracts per entry.
    #[serde(default = "default_fixed_size")]
    pub fixed_size: u32,
    /// Overrides the rule's default reconcile policy.
    #[serde(default)]
    pub policy: Option<PolicyKind>,
    /// Overrides the rule's default per-session entry budget.
    #[serde(default)]
    pub max_entries_per_session: Option<u32>,
    /// Rule-specific parameters. `window` overrides the window capacity.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_fixed_size() -> u32 {
    1
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read strategy config at '{path}': {e}")))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse strategy config at '{path}': {e}")))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

pub(crate) fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(v)) => Ok(*v),
        Some(toml::Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(Error::InvalidParameter(format!(
            "'{key}' must be a number, got {other}"
        ))),
    }
}

pub(crate) fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(v)) => usize::try_from(*v)
            .map_err(|_| Error::InvalidParameter(format!("'{key}' must be non-negative, got {v}"))),
        Some(other) => Err(Error::InvalidParameter(format!(
            "'{key}' must be an integer, got {other}"
        ))),
    }
}

pub(crate) fn param_opt_usize(params: &HashMap<String, toml::Value>, key: &str) -> Result<Option<usize>> {
    if params.contains_key(key) {
        param_usize(params, key, 0).map(Some)
    } else {
        Ok(None)
    }
}

pub(crate) fn param_strings(params: &HashMap<String, toml::Value>, key: &str) -> Result<Vec<String>> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    Error::InvalidParameter(format!("'{key}' must be a list of strings"))
                })
            })
            .collect(),
        Some(other) => Err(Error::InvalidParameter(format!(
            "'{key}' must be a list of strings, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[strategy]]
        type = "dual_thrust"
        name = "rb dual thrust"
        symbol = "rb2410"
        fixed_size = 2
        policy = "reverse"
        max_entries_per_session = 3

        [strategy.params]
        window = 30
        k1 = 0.5

        [strategy.session]
        open_times = ["21:00:00"]

        [[strategy]]
        type = "ma_cross"
        name = "ag ma"
        symbol = "ag2412"
    "#;

    #[test]
    fn parses_full_and_minimal_entries() {
        let cfg = StrategyFileConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.strategies.len(), 2);

        let dt = &cfg.strategies[0];
        assert_eq!(dt.fixed_size, 2);
        assert_eq!(dt.policy, Some(PolicyKind::Reverse));
        assert_eq!(dt.max_entries_per_session, Some(3));
        assert_eq!(param_usize(&dt.params, "window", 0).unwrap(), 30);
        assert_eq!(dt.session.open_times, vec!["21:00:00".to_string()]);
        assert_eq!(dt.session.reset_window, SessionConfig::default().reset_window);

        let ma = &cfg.strategies[1];
        assert_eq!(ma.fixed_size, 1);
        assert!(ma.policy.is_none());
        assert!(ma.params.is_empty());
    }

    #[test]
    fn integer_params_read_as_floats() {
        let cfg = StrategyFileConfig::from_toml_str(SAMPLE).unwrap();
        let params = &cfg.strategies[0].params;
        assert_eq!(param_f64(params, "window", 0.0).unwrap(), 30.0);
        assert_eq!(param_f64(params, "k1", 0.0).unwrap(), 0.5);
        assert_eq!(param_f64(params, "k2", 0.6).unwrap(), 0.6);
    }

    #[test]
    fn wrong_param_types_are_rejected() {
        let mut params = HashMap::new();
        params.insert("period".to_string(), toml::Value::String("ten".into()));
        params.insert("neg".to_string(), toml::Value::Integer(-3));
        assert!(param_usize(&params, "period", 1).is_err());
        assert!(param_usize(&params, "neg", 1).is_err());
        assert!(param_f64(&params, "period", 1.0).is_err());
        assert!(param_strings(&params, "period").is_err());
    }

    #[test]
    fn unknown_policy_fails_to_parse() {
        let bad = r#"
            [[strategy]]
            type = "adx"
            name = "x"
            symbol = "y"
            policy = "martingale"
        "#;
        assert!(matches!(StrategyFileConfig::from_toml_str(bad), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(matches!(
            StrategyFileConfig::load("/nonexistent/strategies.toml"),
            Err(Error::Config(_))
        ));
    }
}
