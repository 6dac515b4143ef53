use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use common::{Bar, EngineCommand, EngineState, Error, Offset, OrderIntent, Result};
use strategy::StrategyRegistry;

use crate::executor::OrderExecutor;

/// Cloneable handle for controlling a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// Totals reported when a run ends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub bars: usize,
    /// Intents handed to the executor.
    pub intents: usize,
    /// Intents discarded while paused, or because the close they depended
    /// on failed.
    pub dropped: usize,
    pub trades: usize,
    pub timeouts: usize,
    /// Final net position per registered symbol.
    pub positions: BTreeMap<String, i64>,
}

/// Drives bars through strategies one at a time and routes the resulting
/// intents and fills between the registry and the executor.
///
/// Stops a strategy places while evaluating a bar live for one bar: those
/// still resting after the next bar of their symbol are cancelled. Stops
/// placed in response to a fill (protective stops, grid take-profits) rest
/// until they trigger or the position goes flat.
pub struct Engine {
    registry: StrategyRegistry,
    executor: OrderExecutor,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
    /// Ids of stops placed on the last bar of each symbol.
    bar_stops: HashMap<String, Vec<String>>,
}

/// Where a queued intent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Evaluation,
    Fill,
}

impl Engine {
    pub fn new(registry: StrategyRegistry, executor: OrderExecutor) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
        };

        let engine = Engine {
            registry,
            executor,
            state,
            command_rx,
            bar_stops: HashMap::new(),
        };

        (engine, handle)
    }

    /// Consume bars until the feed closes or a Stop command arrives.
    /// Pending commands are handled before the next bar.
    pub async fn run(mut self, mut bar_rx: mpsc::Receiver<Bar>) -> Result<RunSummary> {
        info!(strategies = self.registry.len(), "Engine running");
        *self.state.write().await = EngineState::Running;
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                biased;

                Some(cmd) = self.command_rx.recv() => {
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }

                bar = bar_rx.recv() => match bar {
                    Some(bar) => self.step(bar, &mut summary).await,
                    None => {
                        info!("Bar feed closed");
                        break;
                    }
                },
            }
        }

        *self.state.write().await = EngineState::Stopped;
        for symbol in self.registry.symbols() {
            match self.executor.position(&symbol).await {
                Ok(position) => {
                    summary.positions.insert(symbol, position.net());
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Final position unavailable"),
            }
        }
        info!(
            bars = summary.bars,
            intents = summary.intents,
            trades = summary.trades,
            timeouts = summary.timeouts,
            "Engine stopped"
        );
        Ok(summary)
    }

    /// Returns false when the engine should stop.
    async fn handle_command(&self, cmd: EngineCommand) -> bool {
        let current = *self.state.read().await;
        match cmd {
            EngineCommand::Pause => {
                if current == EngineState::Running {
                    info!("Engine paused, bars still evaluated, intents dropped");
                    *self.state.write().await = EngineState::Paused;
                }
                true
            }
            EngineCommand::Resume => {
                if current == EngineState::Paused {
                    info!("Engine resumed");
                    *self.state.write().await = EngineState::Running;
                }
                true
            }
            EngineCommand::Stop => {
                info!("Engine stopping");
                false
            }
        }
    }

    async fn step(&mut self, bar: Bar, summary: &mut RunSummary) {
        summary.bars += 1;
        let mut queue: VecDeque<(OrderIntent, Origin)> = VecDeque::new();

        // Resting stops see the bar before strategies do.
        match self.executor.advance(&bar).await {
            Ok(trades) => {
                for trade in trades {
                    summary.trades += 1;
                    queue.extend(self.registry.on_trade(&trade).into_iter().map(|i| (i, Origin::Fill)));
                }
            }
            Err(e) => note_failure(&e, summary, "Stop check failed"),
        }
        self.expire_bar_stops(&bar.symbol, summary).await;

        let position = match self.executor.position(&bar.symbol).await {
            Ok(position) => position,
            Err(e) => {
                note_failure(&e, summary, "Position unavailable, bar skipped");
                return;
            }
        };
        match self.registry.process(&bar, position) {
            Ok(intents) => queue.extend(intents.into_iter().map(|i| (i, Origin::Evaluation))),
            Err(e) => warn!(symbol = %bar.symbol, ts = %bar.timestamp, error = %e, "Strategy error"),
        }

        if *self.state.read().await == EngineState::Paused {
            if !queue.is_empty() {
                debug!(symbol = %bar.symbol, dropped = queue.len(), "Paused, intents dropped");
                summary.dropped += queue.len();
            }
            return;
        }

        while let Some((intent, origin)) = queue.pop_front() {
            summary.intents += 1;
            match self.executor.submit(&intent).await {
                Ok(Some(trade)) => {
                    summary.trades += 1;
                    queue.extend(self.registry.on_trade(&trade).into_iter().map(|i| (i, Origin::Fill)));
                }
                Ok(None) => {
                    if intent.is_stop && origin == Origin::Evaluation {
                        self.bar_stops.entry(intent.symbol.clone()).or_default().push(intent.id);
                    }
                }
                Err(e) => {
                    note_failure(&e, summary, "Intent dropped");
                    if intent.direction.offset() == Offset::Close {
                        // No open for a symbol whose close failed.
                        let before = queue.len();
                        queue.retain(|(queued, _)| {
                            !(queued.symbol == intent.symbol && queued.direction.offset() == Offset::Open)
                        });
                        let skipped = before - queue.len();
                        if skipped > 0 {
                            warn!(symbol = %intent.symbol, skipped, "Close failed, opens for symbol dropped");
                            summary.dropped += skipped;
                        }
                    }
                }
            }
        }
    }

    /// Cancel the stops placed on the previous bar of `symbol`.
    async fn expire_bar_stops(&mut self, symbol: &str, summary: &mut RunSummary) {
        let Some(ids) = self.bar_stops.remove(symbol) else {
            return;
        };
        for id in ids {
            if let Err(e) = self.executor.cancel(&id).await {
                note_failure(&e, summary, "Stop cancel failed");
            }
        }
    }
}

fn note_failure(e: &Error, summary: &mut RunSummary, what: &str) {
    if matches!(e, Error::Timeout { .. }) {
        summary.timeouts += 1;
    }
    warn!(error = %e, "{what}");
}
