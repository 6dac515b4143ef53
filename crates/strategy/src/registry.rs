use std::collections::HashMap;

use tracing::info;

use common::{Bar, Error, OrderIntent, Position, Result, Trade};

use crate::config::{param_f64, param_opt_usize, param_strings, param_usize, StrategyConfig, StrategyFileConfig};
use crate::evaluator::SignalEvaluator;
use crate::instance::SignalStrategy;
use crate::reconciler::{PolicyKind, PositionReconciler, ReconcilePolicy};
use crate::rules::*;
use crate::session::SessionClock;
use crate::Strategy;

/// Holds all active strategy instances and dispatches bars and fills to them.
///
/// Each symbol is traded by at most one instance, so the net position the
/// execution side reports for a symbol belongs to exactly one strategy.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build the registry from config, failing on unknown types, bad
    /// parameters or two strategies on one symbol.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut registry = Self::new();
        for cfg in &file_cfg.strategies {
            registry.register(build_strategy(cfg)?)?;
        }
        Ok(registry)
    }

    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) -> Result<()> {
        if let Some(existing) = self.strategies.iter().find(|s| s.symbol() == strategy.symbol()) {
            return Err(Error::Config(format!(
                "strategies '{}' and '{}' both trade {}",
                existing.name(),
                strategy.name(),
                strategy.symbol()
            )));
        }
        info!(name = %strategy.name(), symbol = %strategy.symbol(), "Registered strategy");
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.symbol().to_string()).collect()
    }

    /// Feed one bar to the strategy trading its symbol.
    pub fn process(&mut self, bar: &Bar, position: Position) -> Result<Vec<OrderIntent>> {
        match self.strategies.iter_mut().find(|s| s.symbol() == bar.symbol) {
            Some(strategy) => strategy.on_bar(bar, position),
            None => Ok(Vec::new()),
        }
    }

    /// Route a fill to the strategy trading its symbol.
    pub fn on_trade(&mut self, trade: &Trade) -> Vec<OrderIntent> {
        self.strategies
            .iter_mut()
            .find(|s| s.symbol() == trade.symbol)
            .map(|s| s.on_trade(trade))
            .unwrap_or_default()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    if cfg.fixed_size == 0 {
        return Err(Error::InvalidParameter(format!("{}: fixed_size must be > 0", cfg.name)));
    }
    check_param_keys(&cfg.strategy_type, &cfg.params)
        .map_err(|e| Error::Config(format!("strategy '{}': {e}", cfg.name)))?;
    let rule = build_rule(&cfg.strategy_type, &cfg.params)
        .map_err(|e| Error::Config(format!("strategy '{}': {e}", cfg.name)))?;

    // For dual thrust and turtle soup `window` is a rule parameter.
    let evaluator = match param_opt_usize(&cfg.params, "window")? {
        Some(capacity) if !matches!(rule, Rule::DualThrust(_) | Rule::TurtleSoup(_)) => {
            SignalEvaluator::with_capacity(rule.clone(), capacity)?
        }
        _ => SignalEvaluator::new(rule.clone())?,
    };

    let policy = match cfg.policy {
        None => rule.default_policy(),
        Some(kind) => policy_for(kind, &rule, &cfg.params)?,
    };
    let max_entries = cfg
        .max_entries_per_session
        .or_else(|| rule.default_entries_per_session());
    let reconciler = PositionReconciler::new(&cfg.symbol, policy, cfg.fixed_size, max_entries);
    let clock = SessionClock::from_config(&cfg.session)?;

    Ok(Box::new(SignalStrategy::new(
        &cfg.name,
        &cfg.symbol,
        evaluator,
        reconciler,
        clock,
    )))
}

fn policy_for(
    kind: PolicyKind,
    rule: &Rule,
    params: &HashMap<String, toml::Value>,
) -> Result<ReconcilePolicy> {
    Ok(match kind {
        PolicyKind::Reverse => ReconcilePolicy::Reverse,
        PolicyKind::AlwaysInMarket => ReconcilePolicy::AlwaysInMarket,
        PolicyKind::ExitThenFlat => ReconcilePolicy::ExitThenFlat,
        PolicyKind::Pyramid => {
            let default_units = match rule {
                Rule::Turtle(p) => p.max_units as usize,
                _ => 4,
            };
            let max_units = param_usize(params, "max_units", default_units)?;
            ReconcilePolicy::Pyramid {
                max_units: u32::try_from(max_units)
                    .map_err(|_| Error::InvalidParameter("max_units is too large".into()))?,
            }
        }
        PolicyKind::Grid => {
            let default_step = match rule {
                Rule::Grid(p) => p.interval,
                _ => GridParams::default().interval,
            };
            ReconcilePolicy::Grid {
                step: param_f64(params, "step", default_step)?,
            }
        }
    })
}

/// Parameters a rule type reads from `[strategy.params]`.
fn rule_param_keys(kind: &str) -> &'static [&'static str] {
    match kind {
        "ma_cross" => &["fast", "slow"],
        "adx" => &["adx_period", "di_period", "strong", "weak"],
        "macd" => &["short", "long", "signal"],
        "kdj" => &["fastk", "slowk", "slowd", "j_buy", "j_sell"],
        "bias" => &["term1", "term2", "term3", "limit1", "limit2", "limit3"],
        "cmo" => &["period", "exit"],
        "ma_seq" => &["ma_window"],
        "boll" => &["period", "nbdev_up", "nbdev_down"],
        "boll_bandit" => &["period", "nbdev_up", "nbdev_down", "init_ma", "min_ma"],
        "atr" => &["period", "buy_factor", "sell_factor"],
        "super_trend" => &["atr_period", "multiplier"],
        "turtle" => &["entry", "exit", "atr", "capital", "risk", "contract_size"],
        "turtle_soup" => &["tick", "entry_ticks", "min_gap"],
        "dual_thrust" => &["k1", "k2"],
        "hans123" => &["period", "upper_mult", "lower_mult"],
        "grid" => &["interval"],
        "ensemble" => &["members", "threshold"],
        _ => &[],
    }
}

/// Keys every strategy accepts: the window capacity and the policy knobs.
const COMMON_PARAM_KEYS: [&str; 3] = ["window", "max_units", "step"];

/// Reject parameter names no part of the strategy reads, so a typo does not
/// silently fall back to a default.
fn check_param_keys(kind: &str, params: &HashMap<String, toml::Value>) -> Result<()> {
    let known = rule_param_keys(kind);
    let mut unknown: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|key| !known.contains(key) && !COMMON_PARAM_KEYS.contains(key))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(Error::Config(format!(
        "unknown parameter(s) for '{kind}': {}",
        unknown.join(", ")
    )))
}

/// Build a rule from its type name and parameter table. Missing parameters
/// take their defaults.
pub fn build_rule(kind: &str, params: &HashMap<String, toml::Value>) -> Result<Rule> {
    let rule = match kind {
        "ma_cross" => {
            let d = MaCrossParams::default();
            Rule::MaCross(MaCrossParams {
                fast: param_usize(params, "fast", d.fast)?,
                slow: param_usize(params, "slow", d.slow)?,
            })
        }
        "adx" => {
            let d = AdxParams::default();
            Rule::Adx(AdxParams {
                adx_period: param_usize(params, "adx_period", d.adx_period)?,
                di_period: param_usize(params, "di_period", d.di_period)?,
                strong: param_f64(params, "strong", d.strong)?,
                weak: param_f64(params, "weak", d.weak)?,
            })
        }
        "macd" => {
            let d = MacdParams::default();
            Rule::Macd(MacdParams {
                short: param_usize(params, "short", d.short)?,
                long: param_usize(params, "long", d.long)?,
                signal: param_usize(params, "signal", d.signal)?,
            })
        }
        "kdj" => {
            let d = KdjParams::default();
            Rule::Kdj(KdjParams {
                fastk: param_usize(params, "fastk", d.fastk)?,
                slowk: param_usize(params, "slowk", d.slowk)?,
                slowd: param_usize(params, "slowd", d.slowd)?,
                j_buy: param_f64(params, "j_buy", d.j_buy)?,
                j_sell: param_f64(params, "j_sell", d.j_sell)?,
            })
        }
        "bias" => {
            let d = BiasParams::default();
            Rule::Bias(BiasParams {
                terms: [
                    param_usize(params, "term1", d.terms[0])?,
                    param_usize(params, "term2", d.terms[1])?,
                    param_usize(params, "term3", d.terms[2])?,
                ],
                limits: [
                    param_f64(params, "limit1", d.limits[0])?,
                    param_f64(params, "limit2", d.limits[1])?,
                    param_f64(params, "limit3", d.limits[2])?,
                ],
            })
        }
        "cmo" => {
            let d = CmoParams::default();
            Rule::Cmo(CmoParams {
                period: param_usize(params, "period", d.period)?,
                exit: param_f64(params, "exit", d.exit)?,
            })
        }
        "ma_seq" => Rule::MaSeq(MaSeqParams {
            window: param_usize(params, "ma_window", MaSeqParams::default().window)?,
        }),
        "boll" => {
            let d = BollParams::default();
            Rule::Boll(BollParams {
                period: param_usize(params, "period", d.period)?,
                nbdev_up: param_f64(params, "nbdev_up", d.nbdev_up)?,
                nbdev_down: param_f64(params, "nbdev_down", d.nbdev_down)?,
            })
        }
        "boll_bandit" => {
            let d = BollBanditParams::default();
            Rule::BollBandit(BollBanditParams {
                period: param_usize(params, "period", d.period)?,
                nbdev_up: param_f64(params, "nbdev_up", d.nbdev_up)?,
                nbdev_down: param_f64(params, "nbdev_down", d.nbdev_down)?,
                init_ma: param_usize(params, "init_ma", d.init_ma)?,
                min_ma: param_usize(params, "min_ma", d.min_ma)?,
            })
        }
        "atr" => {
            let d = AtrParams::default();
            Rule::Atr(AtrParams {
                period: param_usize(params, "period", d.period)?,
                buy_factor: param_f64(params, "buy_factor", d.buy_factor)?,
                sell_factor: param_f64(params, "sell_factor", d.sell_factor)?,
            })
        }
        "super_trend" => {
            let d = SuperTrendParams::default();
            Rule::SuperTrend(SuperTrendParams {
                atr_period: param_usize(params, "atr_period", d.atr_period)?,
                multiplier: param_f64(params, "multiplier", d.multiplier)?,
            })
        }
        "turtle" => {
            let d = TurtleParams::default();
            let max_units = param_usize(params, "max_units", d.max_units as usize)?;
            Rule::Turtle(TurtleParams {
                entry: param_usize(params, "entry", d.entry)?,
                exit: param_usize(params, "exit", d.exit)?,
                atr: param_usize(params, "atr", d.atr)?,
                max_units: u32::try_from(max_units)
                    .map_err(|_| Error::InvalidParameter("max_units is too large".into()))?,
                capital: param_f64(params, "capital", d.capital)?,
                risk: param_f64(params, "risk", d.risk)?,
                contract_size: param_f64(params, "contract_size", d.contract_size)?,
            })
        }
        "turtle_soup" => {
            let d = TurtleSoupParams::default();
            let entry_ticks = param_usize(params, "entry_ticks", d.entry_ticks as usize)?;
            Rule::TurtleSoup(TurtleSoupParams {
                window: param_usize(params, "window", d.window)?,
                tick: param_f64(params, "tick", d.tick)?,
                entry_ticks: u32::try_from(entry_ticks)
                    .map_err(|_| Error::InvalidParameter("entry_ticks is too large".into()))?,
                min_gap: param_usize(params, "min_gap", d.min_gap)?,
            })
        }
        "dual_thrust" => {
            let d = DualThrustParams::default();
            Rule::DualThrust(DualThrustParams {
                window: param_usize(params, "window", d.window)?,
                k1: param_f64(params, "k1", d.k1)?,
                k2: param_f64(params, "k2", d.k2)?,
            })
        }
        "r_breaker" => Rule::RBreaker,
        "hans123" => {
            let d = Hans123Params::default();
            Rule::Hans123(Hans123Params {
                period: param_usize(params, "period", d.period)?,
                upper_mult: param_f64(params, "upper_mult", d.upper_mult)?,
                lower_mult: param_f64(params, "lower_mult", d.lower_mult)?,
            })
        }
        "grid" => Rule::Grid(GridParams {
            interval: param_f64(params, "interval", GridParams::default().interval)?,
        }),
        "ensemble" => {
            let members = param_strings(params, "members")?
                .iter()
                .map(|member| build_rule(member, &HashMap::new()))
                .collect::<Result<Vec<_>>>()?;
            Rule::Ensemble(EnsembleParams {
                members,
                threshold: param_f64(params, "threshold", 0.01)?,
            })
        }
        other => {
            return Err(Error::InvalidParameter(format!("unknown strategy type '{other}'")));
        }
    };
    rule.validate()?;
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::tests::make_bars;
    use common::Direction;

    fn registry(toml: &str) -> Result<StrategyRegistry> {
        StrategyRegistry::from_config(&StrategyFileConfig::from_toml_str(toml)?)
    }

    #[test]
    fn builds_every_known_type() {
        for kind in [
            "ma_cross", "adx", "macd", "kdj", "bias", "cmo", "ma_seq", "boll", "boll_bandit", "atr",
            "super_trend", "turtle", "turtle_soup", "dual_thrust", "r_breaker", "hans123", "grid",
        ] {
            let rule = build_rule(kind, &HashMap::new()).unwrap();
            assert_eq!(rule.kind(), kind);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "emd"
            name = "x"
            symbol = "y"
            "#,
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn misspelled_param_is_a_config_error() {
        let err = registry(
            r#"
            [[strategy]]
            type = "ma_cross"
            name = "ma"
            symbol = "rb"
            [strategy.params]
            fats = 5
            slow = 10
            "#,
        );
        match err {
            Err(Error::Config(msg)) => assert!(msg.contains("fats"), "{msg}"),
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn window_and_policy_keys_are_accepted_for_any_rule() {
        let reg = registry(
            r#"
            [[strategy]]
            type = "macd"
            name = "m"
            symbol = "rb"
            policy = "pyramid"
            [strategy.params]
            window = 60
            max_units = 2
            "#,
        );
        assert!(reg.is_ok());
    }

    #[test]
    fn turtle_soup_window_sets_the_channel() {
        let mut params = HashMap::new();
        params.insert("window".to_string(), toml::Value::Integer(10));
        let rule = build_rule("turtle_soup", &params).unwrap();
        assert_eq!(rule.lookback(), 11);
        assert_eq!(rule.default_policy(), ReconcilePolicy::ExitThenFlat);
    }

    #[test]
    fn ensemble_members_come_from_names() {
        let mut params = HashMap::new();
        params.insert(
            "members".to_string(),
            toml::Value::Array(vec!["adx".into(), "bias".into()]),
        );
        let Rule::Ensemble(p) = build_rule("ensemble", &params).unwrap() else {
            panic!("expected ensemble");
        };
        assert_eq!(p.members.len(), 2);
        assert_eq!(p.threshold, 0.01);
        assert!(build_rule("ensemble", &HashMap::new()).is_err());
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "adx"
            name = "a"
            symbol = "rb"

            [[strategy]]
            type = "macd"
            name = "b"
            symbol = "rb"
            "#,
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn policy_override_and_defaults() {
        let turtle = build_rule("turtle", &HashMap::new()).unwrap();
        assert_eq!(
            policy_for(PolicyKind::Pyramid, &turtle, &HashMap::new()).unwrap(),
            ReconcilePolicy::Pyramid { max_units: 4 }
        );
        let grid = build_rule("grid", &HashMap::new()).unwrap();
        assert_eq!(
            policy_for(PolicyKind::Grid, &grid, &HashMap::new()).unwrap(),
            ReconcilePolicy::Grid { step: 50.0 }
        );
    }

    #[test]
    fn routes_bars_by_symbol() {
        let mut reg = registry(
            r#"
            [[strategy]]
            type = "ma_cross"
            name = "ma"
            symbol = "TEST"
            [strategy.params]
            fast = 2
            slow = 3
            window = 5
            "#,
        )
        .unwrap();
        assert_eq!(reg.symbols(), vec!["TEST".to_string()]);

        let mut intents = Vec::new();
        for bar in make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]) {
            intents.extend(reg.process(&bar, Position::FLAT).unwrap());
        }
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, Direction::Buy);

        let mut other = make_bars(&[1.0]).remove(0);
        other.symbol = "OTHER".into();
        assert!(reg.process(&other, Position::FLAT).unwrap().is_empty());
    }
}
