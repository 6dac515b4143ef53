use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for one symbol over one fixed interval.
///
/// Produced by the market-data side and never mutated once appended to a
/// strategy window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Start of the bar interval. Session logic reads the time of day from here.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high bounds open/close, low bounds open/close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}

/// Directional output of a signal evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Unknown,
}

impl Trend {
    /// Vote weight used when several trends are aggregated.
    pub fn value(self) -> i8 {
        match self {
            Trend::Up => 1,
            Trend::Down => -1,
            Trend::Unknown => 0,
        }
    }

    /// The position side this trend asks for, if any.
    pub fn desired_side(self) -> Option<PositionSide> {
        match self {
            Trend::Up => Some(PositionSide::Long),
            Trend::Down => Some(PositionSide::Short),
            Trend::Unknown => None,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
            Trend::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Order direction as understood by the execution side.
///
/// `Buy`/`Short` open a long/short position, `Sell`/`Cover` close one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Short,
    Cover,
}

impl Direction {
    pub fn offset(self) -> Offset {
        match self {
            Direction::Buy | Direction::Short => Offset::Open,
            Direction::Sell | Direction::Cover => Offset::Close,
        }
    }

    /// Signed effect of one unit of this direction on the net position.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Buy | Direction::Cover => 1,
            Direction::Sell | Direction::Short => -1,
        }
    }

    /// The direction that opens a position on `side`.
    pub fn open(side: PositionSide) -> Option<Direction> {
        match side {
            PositionSide::Long => Some(Direction::Buy),
            PositionSide::Short => Some(Direction::Short),
            PositionSide::Flat => None,
        }
    }

    /// The direction that closes a position on `side`.
    pub fn close(side: PositionSide) -> Option<Direction> {
        match side {
            PositionSide::Long => Some(Direction::Sell),
            PositionSide::Short => Some(Direction::Cover),
            PositionSide::Flat => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Cover => write!(f, "COVER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Offset {
    Open,
    Close,
}

/// An order a strategy wants placed. Consumed immediately by the execution
/// collaborator and not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub quantity: u32,
    /// Stop orders rest until the market trades through `price`.
    pub is_stop: bool,
}

impl OrderIntent {
    pub fn new(symbol: impl Into<String>, direction: Direction, price: f64, quantity: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            price,
            quantity,
            is_stop: false,
        }
    }

    pub fn stop(symbol: impl Into<String>, direction: Direction, price: f64, quantity: u32) -> Self {
        Self {
            is_stop: true,
            ..Self::new(symbol, direction, price, quantity)
        }
    }
}

/// Confirmation of an executed intent, reported back through `on_trade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub intent_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn offset(&self) -> Offset {
        self.direction.offset()
    }
}

/// Which way a strategy is currently positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "FLAT"),
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Signed net quantity held for one symbol. Owned by the execution side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position(pub i64);

impl Position {
    pub const FLAT: Position = Position(0);

    pub fn net(self) -> i64 {
        self.0
    }

    pub fn abs(self) -> u32 {
        u32::try_from(self.0.unsigned_abs()).unwrap_or(u32::MAX)
    }

    pub fn side(self) -> PositionSide {
        match self.0 {
            0 => PositionSide::Flat,
            n if n > 0 => PositionSide::Long,
            _ => PositionSide::Short,
        }
    }

    /// Net position after `trade` is applied.
    pub fn apply(self, trade: &Trade) -> Position {
        Position(self.0 + trade.direction.sign() * i64::from(trade.quantity))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of the replay engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    /// Bars still reach strategy windows but intents are dropped.
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Pause,
    Resume,
    Stop,
}
