//! Declarative signal rules.
//!
//! A `Rule` is pure data: a variant tag plus its parameters. Evaluating a
//! rule reads the rolling window, the current position side and the session
//! event for the bar, and may update the rule's slot in `RuleMemory`.

pub mod band;
pub mod breakout;
pub mod cross;
pub mod threshold;

use common::{Bar, Error, PositionSide, Result, Trend};

use crate::reconciler::ReconcilePolicy;
use crate::session::SessionEvent;
use crate::state::RuleMemory;
use crate::window::RollingWindow;

pub use band::{AtrParams, BollBanditParams, BollParams, SuperTrendParams};
pub use breakout::{DualThrustParams, GridParams, Hans123Params, TurtleParams, TurtleSoupParams};
pub use cross::{AdxParams, KdjParams, MaCrossParams, MacdParams};
pub use threshold::{BiasParams, CmoParams, MaSeqParams};

/// Order size chosen by the rule instead of the strategy's fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizing {
    /// Contracts for this entry or add.
    pub quantity: u32,
    /// Largest absolute position adds may build up to.
    pub cap: u32,
}

/// What a rule decided for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Evaluation {
    pub trend: Trend,
    /// Close any open position and open nothing this bar.
    pub flatten: bool,
    /// Order price override; the bar close is used when `None`.
    pub price: Option<f64>,
    /// Place the resulting intents as stop orders at `price`.
    pub stop: bool,
    pub sizing: Option<Sizing>,
    /// Level of a stop that closes the position opened by this evaluation
    /// once its entry fills.
    pub protective_stop: Option<f64>,
}

impl Evaluation {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn trend(trend: Trend) -> Self {
        Self {
            trend,
            ..Self::default()
        }
    }

    pub fn flatten() -> Self {
        Self {
            flatten: true,
            ..Self::default()
        }
    }

    pub fn at_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Stop order at `price`.
    pub fn stop_at(mut self, price: f64) -> Self {
        self.price = Some(price);
        self.stop = true;
        self
    }

    pub fn sized(mut self, quantity: u32, cap: u32) -> Self {
        self.sizing = Some(Sizing { quantity, cap });
        self
    }

    pub fn with_protective_stop(mut self, level: f64) -> Self {
        self.protective_stop = Some(level);
        self
    }
}

/// Read-only inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub window: &'a RollingWindow,
    pub position: PositionSide,
    pub session: SessionEvent,
}

impl<'a> EvalContext<'a> {
    pub fn bar(&self) -> Result<&'a Bar> {
        self.window.latest().ok_or(Error::InsufficientData {
            needed: 1,
            available: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleParams {
    pub members: Vec<Rule>,
    /// Mean vote must exceed this magnitude to produce a trend.
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    MaCross(MaCrossParams),
    Adx(AdxParams),
    Macd(MacdParams),
    Kdj(KdjParams),
    Bias(BiasParams),
    Cmo(CmoParams),
    MaSeq(MaSeqParams),
    Boll(BollParams),
    BollBandit(BollBanditParams),
    Atr(AtrParams),
    SuperTrend(SuperTrendParams),
    Turtle(TurtleParams),
    TurtleSoup(TurtleSoupParams),
    DualThrust(DualThrustParams),
    RBreaker,
    Hans123(Hans123Params),
    Grid(GridParams),
    Ensemble(EnsembleParams),
}

impl Rule {
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::MaCross(_) => "ma_cross",
            Rule::Adx(_) => "adx",
            Rule::Macd(_) => "macd",
            Rule::Kdj(_) => "kdj",
            Rule::Bias(_) => "bias",
            Rule::Cmo(_) => "cmo",
            Rule::MaSeq(_) => "ma_seq",
            Rule::Boll(_) => "boll",
            Rule::BollBandit(_) => "boll_bandit",
            Rule::Atr(_) => "atr",
            Rule::SuperTrend(_) => "super_trend",
            Rule::Turtle(_) => "turtle",
            Rule::TurtleSoup(_) => "turtle_soup",
            Rule::DualThrust(_) => "dual_thrust",
            Rule::RBreaker => "r_breaker",
            Rule::Hans123(_) => "hans123",
            Rule::Grid(_) => "grid",
            Rule::Ensemble(_) => "ensemble",
        }
    }

    /// Default window capacity: enough history for every indicator the rule
    /// reads to have stabilised.
    pub fn lookback(&self) -> usize {
        match self {
            Rule::MaCross(p) => 2 * p.fast.max(p.slow),
            Rule::Adx(p) => 3 * p.adx_period.max(p.di_period),
            Rule::Macd(p) => 2 * p.short.max(p.long).max(p.signal),
            Rule::Kdj(p) => 2 * p.fastk.max(p.slowk).max(p.slowd),
            Rule::Bias(p) => 2 * p.terms.iter().copied().max().unwrap_or(1),
            Rule::Cmo(p) => 2 * p.period,
            Rule::MaSeq(p) => p.window,
            Rule::Boll(p) => 2 * p.period,
            Rule::BollBandit(p) => 2 * p.period.max(p.init_ma).max(p.min_ma),
            Rule::Atr(p) => 2 * p.period,
            Rule::SuperTrend(p) => 2 * p.atr_period,
            Rule::Turtle(p) => 2 * p.entry.max(p.exit).max(p.atr),
            Rule::TurtleSoup(p) => p.window + 1,
            Rule::DualThrust(p) => p.window,
            Rule::RBreaker => 1,
            Rule::Hans123(p) => p.period,
            Rule::Grid(_) => 2,
            Rule::Ensemble(_) => 1,
        }
    }

    /// Smallest window capacity the rule can evaluate with. A configured
    /// window override below this is rejected.
    pub fn min_history(&self) -> usize {
        match self {
            Rule::MaCross(p) => p.fast.max(p.slow) + 1,
            Rule::Adx(p) => (2 * p.adx_period).max(p.di_period + 1) + 1,
            Rule::Macd(p) => p.long + p.signal + 1,
            Rule::Kdj(p) => p.fastk + p.slowk + p.slowd,
            Rule::Bias(p) => p.terms.iter().copied().max().unwrap_or(1),
            Rule::Cmo(p) => p.period + 2,
            Rule::MaSeq(p) => p.window,
            Rule::Boll(p) => p.period + 2,
            Rule::BollBandit(p) => p.period.max(p.init_ma),
            Rule::Atr(p) => p.period + 1,
            Rule::SuperTrend(p) => p.atr_period + 1,
            Rule::Turtle(p) => (p.entry.max(p.exit) + 1).max(p.atr + 1),
            Rule::TurtleSoup(p) => p.window + 1,
            Rule::DualThrust(_) | Rule::RBreaker | Rule::Hans123(_) | Rule::Ensemble(_) => 1,
            Rule::Grid(_) => 2,
        }
    }

    /// Reject parameter sets that can never produce a meaningful signal.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: usize) -> Result<()> {
            if v == 0 {
                return Err(Error::InvalidParameter(format!("{name} must be > 0")));
            }
            Ok(())
        }
        fn positive_f(name: &str, v: f64) -> Result<()> {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::InvalidParameter(format!("{name} must be > 0, got {v}")));
            }
            Ok(())
        }

        match self {
            Rule::MaCross(p) => {
                positive("fast", p.fast)?;
                positive("slow", p.slow)?;
                if p.fast >= p.slow {
                    return Err(Error::InvalidParameter(format!(
                        "ma_cross fast ({}) must be less than slow ({})",
                        p.fast, p.slow
                    )));
                }
            }
            Rule::Adx(p) => {
                positive("adx_period", p.adx_period)?;
                positive("di_period", p.di_period)?;
                if p.weak >= p.strong {
                    return Err(Error::InvalidParameter(
                        "adx weak threshold must be below strong threshold".into(),
                    ));
                }
            }
            Rule::Macd(p) => {
                positive("short", p.short)?;
                positive("long", p.long)?;
                positive("signal", p.signal)?;
                if p.short >= p.long {
                    return Err(Error::InvalidParameter(
                        "MACD short period must be less than long period".into(),
                    ));
                }
            }
            Rule::Kdj(p) => {
                positive("fastk", p.fastk)?;
                positive("slowk", p.slowk)?;
                positive("slowd", p.slowd)?;
            }
            Rule::Bias(p) => {
                for (i, term) in p.terms.iter().enumerate() {
                    positive(&format!("bias term{}", i + 1), *term)?;
                }
                for (i, limit) in p.limits.iter().enumerate() {
                    positive_f(&format!("bias limit{}", i + 1), *limit)?;
                }
            }
            Rule::Cmo(p) => {
                positive("period", p.period)?;
                positive_f("exit", p.exit)?;
            }
            Rule::MaSeq(p) => {
                if p.window < 2 {
                    return Err(Error::InvalidParameter("ma_seq window must be >= 2".into()));
                }
            }
            Rule::Boll(p) => {
                positive("period", p.period)?;
                positive_f("nbdev_up", p.nbdev_up)?;
                positive_f("nbdev_down", p.nbdev_down)?;
            }
            Rule::BollBandit(p) => {
                positive("period", p.period)?;
                positive("min_ma", p.min_ma)?;
                positive_f("nbdev_up", p.nbdev_up)?;
                positive_f("nbdev_down", p.nbdev_down)?;
                if p.min_ma > p.init_ma {
                    return Err(Error::InvalidParameter(
                        "boll_bandit min_ma must not exceed init_ma".into(),
                    ));
                }
            }
            Rule::Atr(p) => {
                positive("period", p.period)?;
                positive_f("buy_factor", p.buy_factor)?;
                positive_f("sell_factor", p.sell_factor)?;
            }
            Rule::SuperTrend(p) => {
                positive("atr_period", p.atr_period)?;
                positive_f("multiplier", p.multiplier)?;
            }
            Rule::Turtle(p) => {
                positive("entry", p.entry)?;
                positive("exit", p.exit)?;
                positive("atr", p.atr)?;
                if p.max_units == 0 {
                    return Err(Error::InvalidParameter("turtle max_units must be > 0".into()));
                }
                positive_f("capital", p.capital)?;
                positive_f("risk", p.risk)?;
                positive_f("contract_size", p.contract_size)?;
            }
            Rule::TurtleSoup(p) => {
                positive("window", p.window)?;
                positive_f("tick", p.tick)?;
                if p.min_gap >= p.window {
                    return Err(Error::InvalidParameter(format!(
                        "turtle_soup min_gap ({}) must be less than window ({})",
                        p.min_gap, p.window
                    )));
                }
            }
            Rule::DualThrust(p) => {
                positive("window", p.window)?;
                positive_f("k1", p.k1)?;
                positive_f("k2", p.k2)?;
            }
            Rule::RBreaker => {}
            Rule::Hans123(p) => {
                positive("period", p.period)?;
                positive_f("upper_mult", p.upper_mult)?;
                positive_f("lower_mult", p.lower_mult)?;
            }
            Rule::Grid(p) => positive_f("interval", p.interval)?,
            Rule::Ensemble(p) => {
                if p.members.is_empty() {
                    return Err(Error::InvalidParameter("ensemble needs at least one member".into()));
                }
                if !(p.threshold.is_finite() && p.threshold >= 0.0) {
                    return Err(Error::InvalidParameter("ensemble threshold must be >= 0".into()));
                }
                for member in &p.members {
                    if matches!(member, Rule::Ensemble(_)) {
                        return Err(Error::InvalidParameter("ensembles cannot be nested".into()));
                    }
                    member.validate()?;
                }
            }
        }
        Ok(())
    }

    /// How this rule's trends are meant to be turned into orders.
    pub fn default_policy(&self) -> ReconcilePolicy {
        match self {
            Rule::MaCross(_)
            | Rule::Adx(_)
            | Rule::Macd(_)
            | Rule::Kdj(_)
            | Rule::Bias(_)
            | Rule::SuperTrend(_)
            | Rule::Ensemble(_) => ReconcilePolicy::Reverse,
            Rule::Boll(_)
            | Rule::BollBandit(_)
            | Rule::Cmo(_)
            | Rule::Atr(_)
            | Rule::MaSeq(_)
            | Rule::Hans123(_)
            | Rule::TurtleSoup(_) => ReconcilePolicy::ExitThenFlat,
            Rule::DualThrust(_) | Rule::RBreaker => ReconcilePolicy::AlwaysInMarket,
            Rule::Turtle(p) => ReconcilePolicy::Pyramid {
                max_units: p.max_units,
            },
            Rule::Grid(p) => ReconcilePolicy::Grid { step: p.interval },
        }
    }

    /// Entry budget per trading session, for rules that trade once a session.
    pub fn default_entries_per_session(&self) -> Option<u32> {
        match self {
            Rule::DualThrust(_) | Rule::Hans123(_) => Some(1),
            _ => None,
        }
    }

    /// Update session-scoped memory for a bar. Runs on every bar, before the
    /// window is inited, so session tracking never misses the first bars.
    pub fn observe(&self, ctx: &EvalContext<'_>, memory: &mut RuleMemory) -> Result<()> {
        match self {
            Rule::DualThrust(_) => breakout::observe_dual_thrust(ctx, &mut memory.session),
            Rule::RBreaker => breakout::observe_r_breaker(ctx, &mut memory.session),
            Rule::Hans123(p) => breakout::observe_hans123(p, ctx, &mut memory.session),
            _ => Ok(()),
        }
    }

    /// Evaluate the rule on an inited window.
    ///
    /// Ensembles are evaluated by `SignalEvaluator`, which owns the member
    /// windows; calling this on an ensemble is an error.
    pub fn evaluate(&self, ctx: &EvalContext<'_>, memory: &mut RuleMemory) -> Result<Evaluation> {
        if !ctx.window.is_inited() {
            return Err(Error::InsufficientData {
                needed: ctx.window.capacity(),
                available: ctx.window.len(),
            });
        }
        match self {
            Rule::MaCross(p) => cross::ma_cross(p, ctx, &mut memory.cross),
            Rule::Adx(p) => cross::adx(p, ctx),
            Rule::Macd(p) => cross::macd(p, ctx),
            Rule::Kdj(p) => cross::kdj(p, ctx),
            Rule::Bias(p) => threshold::bias(p, ctx),
            Rule::Cmo(p) => threshold::cmo(p, ctx),
            Rule::MaSeq(p) => threshold::ma_seq(p, ctx, &mut memory.ma_seq),
            Rule::Boll(p) => band::boll(p, ctx),
            Rule::BollBandit(p) => band::boll_bandit(p, ctx, &mut memory.bandit),
            Rule::Atr(p) => band::atr(p, ctx),
            Rule::SuperTrend(p) => band::super_trend(p, ctx, &mut memory.super_trend),
            Rule::Turtle(p) => breakout::turtle(p, ctx, &mut memory.turtle),
            Rule::TurtleSoup(p) => breakout::turtle_soup(p, ctx),
            Rule::DualThrust(p) => breakout::dual_thrust(p, ctx, &memory.session),
            Rule::RBreaker => breakout::r_breaker(ctx, &memory.session),
            Rule::Hans123(p) => breakout::hans123(p, ctx, &memory.session),
            Rule::Grid(p) => breakout::grid(p, ctx, &mut memory.grid),
            Rule::Ensemble(_) => Err(Error::InvalidParameter(
                "ensemble rules are evaluated through their members".into(),
            )),
        }
    }
}

/// The last `N` samples of an indicator series, oldest first.
///
/// Fails with `IndicatorComputation` if the series is too short or any of
/// those samples is not finite (still warming up, or numerically unstable).
pub(crate) fn tail<const N: usize>(values: &[f64], name: &str) -> Result<[f64; N]> {
    if values.len() < N {
        return Err(Error::IndicatorComputation(format!(
            "{name}: need {N} samples, have {}",
            values.len()
        )));
    }
    let mut out = [0.0; N];
    out.copy_from_slice(&values[values.len() - N..]);
    if out.iter().any(|v| !v.is_finite()) {
        return Err(Error::IndicatorComputation(format!(
            "{name}: non-finite sample in {out:?}"
        )));
    }
    Ok(out)
}

/// `a` moved from strictly below `b` to strictly above it.
pub fn crossed_above(a: [f64; 2], b: [f64; 2]) -> bool {
    a[0] < b[0] && a[1] > b[1]
}

/// `a` moved from strictly above `b` to strictly below it.
pub fn crossed_below(a: [f64; 2], b: [f64; 2]) -> bool {
    a[0] > b[0] && a[1] < b[1]
}

/// Strictly increasing over three samples.
pub fn rising(s: [f64; 3]) -> bool {
    s[2] > s[1] && s[1] > s[0]
}

/// Strictly decreasing over three samples.
pub fn falling(s: [f64; 3]) -> bool {
    s[2] < s[1] && s[1] < s[0]
}

#[cfg(test)]
pub(crate) fn window_of(closes: &[f64], capacity: usize) -> RollingWindow {
    let mut window = RollingWindow::new(capacity).unwrap();
    for bar in crate::window::tests::make_bars(closes) {
        window.append(bar);
    }
    window
}

#[cfg(test)]
pub(crate) fn ctx_at(window: &RollingWindow, position: PositionSide) -> EvalContext<'_> {
    EvalContext {
        window,
        position,
        session: SessionEvent::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_never_cross() {
        assert!(!crossed_above([1.0, 2.0], [1.0, 1.5]));
        assert!(!crossed_above([0.5, 2.0], [1.0, 2.0]));
        assert!(!crossed_below([2.0, 1.0], [2.0, 1.5]));
        assert!(crossed_above([0.5, 2.0], [1.0, 1.5]));
        assert!(crossed_below([2.0, 1.0], [1.5, 1.5]));
    }

    #[test]
    fn monotonic_helpers_are_strict() {
        assert!(rising([1.0, 2.0, 3.0]));
        assert!(!rising([1.0, 2.0, 2.0]));
        assert!(falling([3.0, 2.0, 1.0]));
        assert!(!falling([3.0, 3.0, 1.0]));
    }

    #[test]
    fn tail_rejects_warm_up_samples() {
        assert!(matches!(
            tail::<2>(&[f64::NAN, 1.0], "x"),
            Err(Error::IndicatorComputation(_))
        ));
        assert!(matches!(tail::<3>(&[1.0, 2.0], "x"), Err(Error::IndicatorComputation(_))));
        assert_eq!(tail::<2>(&[1.0, 2.0, 3.0], "x").unwrap(), [2.0, 3.0]);
    }

    #[test]
    fn validate_rejects_inverted_ma_periods() {
        let rule = Rule::MaCross(MaCrossParams { fast: 10, slow: 5 });
        assert!(matches!(rule.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn validate_rejects_nested_ensembles() {
        let inner = Rule::Ensemble(EnsembleParams {
            members: vec![Rule::RBreaker],
            threshold: 0.0,
        });
        let outer = Rule::Ensemble(EnsembleParams {
            members: vec![inner],
            threshold: 0.0,
        });
        assert!(outer.validate().is_err());
    }

    #[test]
    fn default_policies() {
        assert_eq!(
            Rule::MaCross(MaCrossParams::default()).default_policy(),
            ReconcilePolicy::Reverse
        );
        assert_eq!(Rule::RBreaker.default_policy(), ReconcilePolicy::AlwaysInMarket);
        assert_eq!(
            Rule::Turtle(TurtleParams::default()).default_policy(),
            ReconcilePolicy::Pyramid { max_units: 4 }
        );
        assert_eq!(
            Rule::Hans123(Hans123Params::default()).default_entries_per_session(),
            Some(1)
        );
    }

    #[test]
    fn turtle_soup_min_gap_must_fit_the_window() {
        let rule = Rule::TurtleSoup(TurtleSoupParams {
            window: 4,
            min_gap: 4,
            ..TurtleSoupParams::default()
        });
        assert!(matches!(rule.validate(), Err(Error::InvalidParameter(_))));
        assert!(Rule::TurtleSoup(TurtleSoupParams::default()).validate().is_ok());
        assert_eq!(Rule::TurtleSoup(TurtleSoupParams::default()).min_history(), 21);
    }

    #[test]
    fn lookback_is_twice_longest_period() {
        assert_eq!(Rule::MaCross(MaCrossParams { fast: 5, slow: 10 }).lookback(), 20);
        assert_eq!(Rule::Adx(AdxParams::default()).lookback(), 42);
        assert_eq!(Rule::Macd(MacdParams::default()).lookback(), 52);
    }
}
