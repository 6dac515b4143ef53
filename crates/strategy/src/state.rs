use std::cmp::Ordering;

use common::Trend;

/// Per-instance evaluator state carried from one bar to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalState {
    pub last_trend: Trend,
    /// Evaluations performed since the window became inited.
    pub evaluations: u64,
    pub memory: RuleMemory,
}

/// Scratch memory for rules whose decision depends on earlier bars beyond
/// what the window holds. Each rule touches only its own slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleMemory {
    pub cross: CrossMemory,
    pub ma_seq: MaSeqMemory,
    pub bandit: BanditMemory,
    pub super_trend: SuperTrendMemory,
    pub turtle: TurtleMemory,
    pub session: SessionMemory,
    pub grid: GridMemory,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossMemory {
    /// How the fast line compared to the slow line at the previous evaluation.
    pub last_relation: Option<Ordering>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaSeqMemory {
    pub last_signal: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BanditMemory {
    /// Current exit moving-average period; `None` until first evaluation.
    pub ma_period: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperTrendMemory {
    pub upper_last: f64,
    pub lower_last: f64,
    pub direction: i8,
}

impl Default for SuperTrendMemory {
    fn default() -> Self {
        Self {
            upper_last: -1e100,
            lower_last: 1e100,
            direction: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurtleMemory {
    pub entry_up: f64,
    pub entry_down: f64,
    /// Close at which the current position was entered.
    pub entry_price: Option<f64>,
    /// Contracts per unit, fixed when the position was entered.
    pub unit: u32,
}

/// Prior-session high/low/close used to derive R-breaker levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayRange {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DayRange {
    pub fn start(high: f64, low: f64, close: f64) -> Self {
        Self { high, low, close }
    }

    pub fn extend(&mut self, high: f64, low: f64, close: f64) {
        self.high = self.high.max(high);
        self.low = self.low.min(low);
        self.close = close;
    }

    /// Break-out levels from the classic pivot: buy above
    /// `high + 2·(pivot − low)`, sell below `low − 2·(high − pivot)`.
    pub fn break_levels(&self) -> BreakLevels {
        let pivot = (self.high + self.low + self.close) / 3.0;
        BreakLevels {
            buy: self.high + 2.0 * (pivot - self.low),
            sell: self.low - 2.0 * (self.high - pivot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakLevels {
    pub buy: f64,
    pub sell: f64,
}

/// Session-scoped memory shared by the intraday breakout rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMemory {
    /// Open price of the first bar of the current trading session.
    pub session_open: Option<f64>,
    /// Running range of the current day.
    pub day: Option<DayRange>,
    /// Levels derived from the previous day.
    pub levels: Option<BreakLevels>,
    /// Bars counted since the session started, capped at the range period.
    pub bars_in_session: usize,
    pub range_high: f64,
    pub range_low: f64,
    /// The current bar is still part of the opening range.
    pub observing: bool,
    /// The open of the current trading day has been recorded.
    pub day_open_taken: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridMemory {
    pub base: Option<f64>,
}
