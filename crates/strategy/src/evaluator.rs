use tracing::{debug, warn};

use common::{Bar, Error, PositionSide, Result, Trend};

use crate::rules::{EvalContext, Evaluation, Rule};
use crate::session::SessionEvent;
use crate::state::SignalState;
use crate::window::RollingWindow;

/// A rule bound to its own rolling window and carried state.
///
/// Ensembles hold one child evaluator per member, each with a window sized
/// for that member, and vote over their trends.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    rule: Rule,
    window: RollingWindow,
    state: SignalState,
    members: Vec<SignalEvaluator>,
}

impl SignalEvaluator {
    /// Evaluator with the rule's default window capacity.
    pub fn new(rule: Rule) -> Result<Self> {
        let capacity = rule.lookback();
        Self::with_capacity(rule, capacity)
    }

    /// Evaluator with an explicit window capacity, which must cover the
    /// rule's minimum history.
    pub fn with_capacity(rule: Rule, capacity: usize) -> Result<Self> {
        rule.validate()?;
        if capacity < rule.min_history() {
            return Err(Error::InvalidParameter(format!(
                "{} needs a window of at least {} bars, got {capacity}",
                rule.kind(),
                rule.min_history()
            )));
        }
        let members = match &rule {
            Rule::Ensemble(p) => p
                .members
                .iter()
                .cloned()
                .map(SignalEvaluator::new)
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Ok(Self {
            window: RollingWindow::new(capacity)?,
            rule,
            state: SignalState::default(),
            members,
        })
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    pub fn is_inited(&self) -> bool {
        self.window.is_inited() && self.members.iter().all(SignalEvaluator::is_inited)
    }

    /// Append a bar and update session-scoped rule memory.
    pub fn on_bar(&mut self, bar: &Bar, session: SessionEvent) -> Result<()> {
        self.window.append(bar.clone());
        let ctx = EvalContext {
            window: &self.window,
            position: PositionSide::Flat,
            session,
        };
        self.rule.observe(&ctx, &mut self.state.memory)?;
        for member in &mut self.members {
            member.on_bar(bar, session)?;
        }
        Ok(())
    }

    /// Evaluate the latest bar. Fails with `InsufficientData` until the
    /// window (and every ensemble member's window) is inited.
    pub fn evaluate(&mut self, position: PositionSide, session: SessionEvent) -> Result<Evaluation> {
        if !self.is_inited() {
            return Err(Error::InsufficientData {
                needed: self.window.capacity(),
                available: self.window.len(),
            });
        }

        let eval = match &self.rule {
            Rule::Ensemble(p) => {
                let threshold = p.threshold;
                self.vote(session, threshold)
            }
            rule => {
                let ctx = EvalContext {
                    window: &self.window,
                    position,
                    session,
                };
                rule.evaluate(&ctx, &mut self.state.memory)?
            }
        };

        self.state.evaluations += 1;
        self.state.last_trend = eval.trend;
        Ok(eval)
    }

    /// Soft vote: the mean of member trend values against `threshold`. A
    /// neutral vote asks to flatten.
    ///
    /// Members vote as if flat; the position belongs to the ensemble.
    fn vote(&mut self, session: SessionEvent, threshold: f64) -> Evaluation {
        let mut total = 0.0;
        for member in &mut self.members {
            let trend = match member.evaluate(PositionSide::Flat, session) {
                Ok(eval) => eval.trend,
                Err(e) => {
                    warn!(member = member.rule.kind(), error = %e, "ensemble member abstains");
                    Trend::Unknown
                }
            };
            total += f64::from(trend.value());
        }
        let mean = total / self.members.len().max(1) as f64;
        debug!(mean, threshold, "ensemble vote");

        if mean > threshold {
            Evaluation::trend(Trend::Up)
        } else if mean < -threshold {
            Evaluation::trend(Trend::Down)
        } else {
            Evaluation::flatten()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{EnsembleParams, GridParams, MaCrossParams, TurtleParams};
    use crate::window::tests::make_bars;

    fn feed(eval: &mut SignalEvaluator, closes: &[f64]) -> Vec<Result<Evaluation>> {
        make_bars(closes)
            .iter()
            .map(|bar| {
                eval.on_bar(bar, SessionEvent::default()).unwrap();
                eval.evaluate(PositionSide::Flat, SessionEvent::default())
            })
            .collect()
    }

    #[test]
    fn insufficient_data_until_inited() {
        let rule = Rule::MaCross(MaCrossParams { fast: 2, slow: 3 });
        let mut eval = SignalEvaluator::with_capacity(rule, 5).unwrap();
        let results = feed(&mut eval, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(results[..4]
            .iter()
            .all(|r| matches!(r, Err(Error::InsufficientData { .. }))));
        assert_eq!(results[4].as_ref().unwrap().trend, Trend::Up);
        assert_eq!(eval.state().evaluations, 1);
        assert_eq!(eval.state().last_trend, Trend::Up);
    }

    #[test]
    fn capacity_below_min_history_is_rejected() {
        let rule = Rule::MaCross(MaCrossParams { fast: 2, slow: 3 });
        assert!(matches!(
            SignalEvaluator::with_capacity(rule, 2),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn default_capacity_is_lookback() {
        let eval = SignalEvaluator::new(Rule::MaCross(MaCrossParams::default())).unwrap();
        assert_eq!(eval.window().capacity(), 20);
    }

    #[test]
    fn ensemble_votes_over_members() {
        let rule = Rule::Ensemble(EnsembleParams {
            members: vec![
                Rule::MaCross(MaCrossParams { fast: 2, slow: 3 }),
                Rule::Grid(GridParams { interval: 100.0 }),
            ],
            threshold: 0.4,
        });
        let mut eval = SignalEvaluator::new(rule).unwrap();
        let results = feed(&mut eval, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        // MA member inits at bar 6 and votes UP, grid stays neutral: mean 0.5.
        assert!(results[..5].iter().all(|r| r.is_err()));
        assert_eq!(results[5].as_ref().unwrap().trend, Trend::Up);
    }

    #[test]
    fn neutral_ensemble_vote_flattens() {
        let rule = Rule::Ensemble(EnsembleParams {
            members: vec![Rule::Grid(GridParams { interval: 100.0 })],
            threshold: 0.0,
        });
        let mut eval = SignalEvaluator::new(rule).unwrap();
        let results = feed(&mut eval, &[10.0, 10.0]);
        let last = results[1].as_ref().unwrap();
        assert!(last.flatten);
        assert_eq!(last.trend, Trend::Unknown);
    }

    #[test]
    fn ensemble_members_vote_as_if_flat() {
        let rule = Rule::Ensemble(EnsembleParams {
            members: vec![Rule::Turtle(TurtleParams {
                entry: 3,
                exit: 2,
                atr: 3,
                ..TurtleParams::default()
            })],
            threshold: 0.5,
        });
        let mut eval = SignalEvaluator::new(rule).unwrap();
        for bar in make_bars(&[100.0, 100.0, 100.0, 100.0, 100.0, 105.0]) {
            eval.on_bar(&bar, SessionEvent::default()).unwrap();
        }
        // Held long, the turtle member still votes its channel breakout
        // rather than judging an add or exit against an entry of its own.
        let result = eval.evaluate(PositionSide::Long, SessionEvent::default()).unwrap();
        assert_eq!(result.trend, Trend::Up);
        assert!(!result.flatten);
    }
}
