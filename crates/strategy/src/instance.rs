use tracing::{debug, info, warn};

use common::{Bar, Error, Offset, OrderIntent, Position, Result, Trade};

use crate::evaluator::SignalEvaluator;
use crate::reconciler::PositionReconciler;
use crate::session::SessionClock;
use crate::Strategy;

/// One configured strategy: evaluator, reconciler and session clock for a
/// single symbol.
pub struct SignalStrategy {
    name: String,
    symbol: String,
    evaluator: SignalEvaluator,
    reconciler: PositionReconciler,
    clock: SessionClock,
    announced_inited: bool,
}

impl SignalStrategy {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        evaluator: SignalEvaluator,
        reconciler: PositionReconciler,
        clock: SessionClock,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            evaluator,
            reconciler,
            clock,
            announced_inited: false,
        }
    }

    pub fn evaluator(&self) -> &SignalEvaluator {
        &self.evaluator
    }

    pub fn reconciler(&self) -> &PositionReconciler {
        &self.reconciler
    }
}

impl Strategy for SignalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn on_bar(&mut self, bar: &Bar, position: Position) -> Result<Vec<OrderIntent>> {
        // A protective stop only belongs to entries placed on this bar.
        self.reconciler.arm_protective_stop(None);
        if !bar.is_sane() {
            warn!(strategy = %self.name, ts = %bar.timestamp, "skipping malformed bar");
            return Ok(Vec::new());
        }

        let session = self.clock.classify(bar.timestamp);
        if session.new_session() {
            self.reconciler.reset_session();
        }
        self.evaluator.on_bar(bar, session)?;

        let eval = match self.evaluator.evaluate(position.side(), session) {
            Ok(eval) => eval,
            Err(Error::InsufficientData { .. }) => return Ok(Vec::new()),
            Err(Error::IndicatorComputation(msg)) => {
                warn!(strategy = %self.name, ts = %bar.timestamp, "indicator unavailable: {msg}");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        if !self.announced_inited {
            info!(strategy = %self.name, bars = self.evaluator.window().len(), "window inited");
            self.announced_inited = true;
        }

        debug!(
            strategy = %self.name,
            trend = %eval.trend,
            flatten = eval.flatten,
            position = %position,
            "evaluated"
        );
        let intents = self.reconciler.apply(&eval, position, bar.close);
        if intents.iter().any(|i| i.direction.offset() == Offset::Open) {
            self.reconciler.arm_protective_stop(eval.protective_stop);
        }
        for intent in &intents {
            info!(
                strategy = %self.name,
                direction = %intent.direction,
                price = intent.price,
                qty = intent.quantity,
                stop = intent.is_stop,
                "order intent"
            );
        }
        Ok(intents)
    }

    fn on_trade(&mut self, trade: &Trade) -> Vec<OrderIntent> {
        debug!(strategy = %self.name, direction = %trade.direction, price = trade.price, "trade");
        self.reconciler.on_trade(trade)
    }
}
