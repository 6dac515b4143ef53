//! Breakout rules: Donchian turtle and turtle soup, intraday range
//! breakouts and the grid.
//!
//! Dual thrust, R-breaker and Hans123 keep session-scoped memory that is
//! updated by `observe_*` on every bar, inited or not.

use common::{Error, PositionSide, Result, Trend};
use tracing::debug;

use super::{tail, EvalContext, Evaluation};
use crate::indicators::{atr as atr_series, highest, lowest};
use crate::state::{DayRange, GridMemory, SessionMemory, TurtleMemory};

#[derive(Debug, Clone, PartialEq)]
pub struct TurtleParams {
    /// Donchian entry channel length.
    pub entry: usize,
    /// Donchian exit channel length.
    pub exit: usize,
    pub atr: usize,
    /// Maximum units held.
    pub max_units: u32,
    /// Account capital a unit is sized against.
    pub capital: f64,
    /// Fraction of capital one ATR move of a unit may cost.
    pub risk: f64,
    /// Contract multiplier.
    pub contract_size: f64,
}

impl Default for TurtleParams {
    fn default() -> Self {
        Self {
            entry: 20,
            exit: 10,
            atr: 20,
            max_units: 4,
            capital: 100_000.0,
            risk: 0.01,
            contract_size: 10.0,
        }
    }
}

impl TurtleParams {
    /// Contracts per unit: `risk·capital / (atr·contract_size)`, rounded down.
    pub fn unit(&self, atr: f64) -> u32 {
        let unit = (self.risk * self.capital / (atr * self.contract_size)).floor();
        if unit.is_finite() && unit >= 1.0 {
            unit.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurtleSoupParams {
    /// Bars in the channel whose low is faded.
    pub window: usize,
    /// Price tick of the instrument.
    pub tick: f64,
    /// Ticks above the broken low the entry stop is placed.
    pub entry_ticks: u32,
    /// The previous low must be more than this many bars old.
    pub min_gap: usize,
}

impl Default for TurtleSoupParams {
    fn default() -> Self {
        Self {
            window: 20,
            tick: 1.0,
            entry_ticks: 5,
            min_gap: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DualThrustParams {
    /// Bars in the lookback range.
    pub window: usize,
    pub k1: f64,
    pub k2: f64,
}

impl Default for DualThrustParams {
    fn default() -> Self {
        Self {
            window: 20,
            k1: 0.4,
            k2: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hans123Params {
    /// Opening-range length in bars.
    pub period: usize,
    pub upper_mult: f64,
    pub lower_mult: f64,
}

impl Default for Hans123Params {
    fn default() -> Self {
        Self {
            period: 30,
            upper_mult: 1.01,
            lower_mult: 0.99,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    /// Price distance between grid lines.
    pub interval: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self { interval: 50.0 }
    }
}

/// Highest high and lowest low over the `len` bars before the current one.
fn prior_channel(high: &[f64], low: &[f64], len: usize) -> Result<(f64, f64)> {
    let n = high.len();
    if n < len + 1 {
        return Err(Error::IndicatorComputation(format!(
            "donchian channel needs {} bars, have {n}",
            len + 1
        )));
    }
    Ok((highest(&high[n - 1 - len..n - 1]), lowest(&low[n - 1 - len..n - 1])))
}

/// Turtle: enter on a Donchian breakout, add a unit for every 0.5 ATR price
/// runs in favour (up to 2 ATR), stop out at 2 ATR against, take profit on
/// the exit channel. Units are sized from capital at risk per ATR.
pub fn turtle(p: &TurtleParams, ctx: &EvalContext<'_>, memory: &mut TurtleMemory) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let close = ctx.bar()?.close;
    let [atr] = tail::<1>(&atr_series(&s.high, &s.low, &s.close, p.atr), "turtle atr")?;

    if ctx.position == PositionSide::Flat {
        let (up, down) = prior_channel(&s.high, &s.low, p.entry)?;
        memory.entry_up = up;
        memory.entry_down = down;
        if atr <= 0.0 {
            return Ok(Evaluation::unknown());
        }
        let unit = p.unit(atr);
        if unit == 0 {
            debug!(atr, capital = p.capital, "turtle unit rounds to zero, not entering");
            return Ok(Evaluation::unknown());
        }
        let trend = if close > memory.entry_up {
            Trend::Up
        } else if close < memory.entry_down {
            Trend::Down
        } else {
            Trend::Unknown
        };
        if trend == Trend::Unknown {
            return Ok(Evaluation::unknown());
        }
        memory.entry_price = Some(close);
        memory.unit = unit;
        return Ok(Evaluation::trend(trend).sized(unit, unit.saturating_mul(p.max_units)));
    }

    let (exit_up, exit_down) = prior_channel(&s.high, &s.low, p.exit)?;
    let entry = *memory.entry_price.get_or_insert(close);
    if memory.unit == 0 && atr > 0.0 {
        memory.unit = p.unit(atr);
    }
    // Units owed for the distance run in favour of the entry.
    let units_for = |run: f64| (run / (0.5 * atr)).floor().max(0.0).min(f64::from(p.max_units)) as u32;
    let (trend, adds) = match ctx.position {
        PositionSide::Long => {
            if entry + 0.5 * atr < close && close < entry + 2.0 * atr {
                (Trend::Up, units_for(close - entry))
            } else if close < entry - 2.0 * atr || close < exit_down {
                (Trend::Down, 0)
            } else {
                (Trend::Unknown, 0)
            }
        }
        PositionSide::Short => {
            if entry - 2.0 * atr < close && close < entry - 0.5 * atr {
                (Trend::Down, units_for(entry - close))
            } else if close > entry + 2.0 * atr || close > exit_up {
                (Trend::Up, 0)
            } else {
                (Trend::Unknown, 0)
            }
        }
        PositionSide::Flat => (Trend::Unknown, 0),
    };
    if adds == 0 || memory.unit == 0 {
        return Ok(Evaluation::trend(trend));
    }
    let cap = memory.unit.saturating_mul(p.max_units);
    Ok(Evaluation::trend(trend).sized(adds.saturating_mul(memory.unit), cap))
}

/// Turtle soup: fade a fresh N-bar low when the previous low is old. The
/// entry is a buy stop a few ticks above the broken low, protected by a
/// stop one tick under the entry bar's low; the take-profit is a sell stop
/// at the prior window high.
pub fn turtle_soup(p: &TurtleSoupParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let n = s.low.len();
    if n < p.window + 1 {
        return Err(Error::IndicatorComputation(format!(
            "turtle soup needs {} bars, have {n}",
            p.window + 1
        )));
    }
    let bar = ctx.bar()?;
    let prior_low = &s.low[n - 1 - p.window..n - 1];
    let prior_high = &s.high[n - 1 - p.window..n - 1];

    match ctx.position {
        PositionSide::Flat => {
            let last_low = lowest(prior_low);
            // Index of the first bar at the prior low, oldest first.
            let at = prior_low.iter().position(|&l| l == last_low).unwrap_or(0);
            if bar.close < last_low && at + p.min_gap < p.window {
                let entry = last_low + f64::from(p.entry_ticks) * p.tick;
                return Ok(Evaluation::trend(Trend::Up)
                    .stop_at(entry)
                    .with_protective_stop(bar.low - p.tick));
            }
            Ok(Evaluation::unknown())
        }
        PositionSide::Long => Ok(Evaluation::trend(Trend::Down).stop_at(highest(prior_high))),
        PositionSide::Short => Ok(Evaluation::unknown()),
    }
}

/// Records the open of the first session of each trading day. The night
/// open sits on the reset boundary and always counts; later opens in the
/// same day (the morning session) are ignored once one has been taken.
pub(crate) fn observe_dual_thrust(ctx: &EvalContext<'_>, memory: &mut SessionMemory) -> Result<()> {
    if ctx.session.boundary {
        memory.day_open_taken = false;
    }
    if ctx.session.open && !memory.day_open_taken {
        memory.session_open = Some(ctx.bar()?.open);
        memory.day_open_taken = true;
    }
    Ok(())
}

/// Dual thrust: trade a break of the session open by a fraction of the recent
/// range. Orders are priced at the broken bound.
pub fn dual_thrust(p: &DualThrustParams, ctx: &EvalContext<'_>, memory: &SessionMemory) -> Result<Evaluation> {
    let Some(open) = memory.session_open else {
        return Ok(Evaluation::unknown());
    };
    let s = ctx.window.series(p.window.min(ctx.window.len()))?;
    let hh = highest(&s.high);
    let ll = lowest(&s.low);
    let hc = highest(&s.close);
    let lc = lowest(&s.close);
    let range = (hh - lc).max(hc - ll);
    if !range.is_finite() {
        return Err(Error::IndicatorComputation("dual thrust range is not finite".into()));
    }

    let upper = open + p.k1 * range;
    let lower = open - p.k2 * range;
    let close = ctx.bar()?.close;
    let eval = if close > upper {
        Evaluation::trend(Trend::Up).at_price(upper)
    } else if close < lower {
        Evaluation::trend(Trend::Down).at_price(lower)
    } else {
        Evaluation::unknown()
    };
    Ok(eval)
}

pub(crate) fn observe_r_breaker(ctx: &EvalContext<'_>, memory: &mut SessionMemory) -> Result<()> {
    let bar = ctx.bar()?;
    if ctx.session.flatten {
        return Ok(());
    }
    if let Some(day) = memory.day.as_mut() {
        if !ctx.session.boundary {
            day.extend(bar.high, bar.low, bar.close);
            return Ok(());
        }
    }
    if let Some(day) = memory.day {
        memory.levels = Some(day.break_levels());
    }
    memory.day = Some(DayRange::start(bar.high, bar.low, bar.close));
    Ok(())
}

/// R-breaker trend leg: buy above the previous day's break-buy level, sell
/// below its break-sell level. Nothing trades until a full day has been seen.
pub fn r_breaker(ctx: &EvalContext<'_>, memory: &SessionMemory) -> Result<Evaluation> {
    if ctx.session.flatten {
        return Ok(Evaluation::flatten());
    }
    let Some(levels) = memory.levels else {
        return Ok(Evaluation::unknown());
    };
    let close = ctx.bar()?.close;
    let eval = if close > levels.buy {
        Evaluation::trend(Trend::Up)
    } else if close < levels.sell {
        Evaluation::trend(Trend::Down)
    } else {
        Evaluation::unknown()
    };
    Ok(eval)
}

pub(crate) fn observe_hans123(p: &Hans123Params, ctx: &EvalContext<'_>, memory: &mut SessionMemory) -> Result<()> {
    if ctx.session.new_session() {
        memory.bars_in_session = 0;
    }
    memory.observing = memory.bars_in_session < p.period;
    if memory.observing {
        memory.bars_in_session += 1;
        let s = ctx.window.series(ctx.window.len())?;
        memory.range_high = highest(&s.high);
        memory.range_low = lowest(&s.low);
    }
    Ok(())
}

/// Hans123: watch the opening range for `period` bars, then break out of it
/// by a margin; exit when price falls back through the far side.
pub fn hans123(p: &Hans123Params, ctx: &EvalContext<'_>, memory: &SessionMemory) -> Result<Evaluation> {
    if memory.observing {
        return Ok(Evaluation::unknown());
    }
    if ctx.session.flatten {
        return Ok(Evaluation::flatten());
    }
    let close = ctx.bar()?.close;
    let (upper, lower) = (memory.range_high, memory.range_low);
    let trend = match ctx.position {
        PositionSide::Flat if close > upper * p.upper_mult => Trend::Up,
        PositionSide::Flat if close < lower * p.lower_mult => Trend::Down,
        PositionSide::Long if close < lower => Trend::Down,
        PositionSide::Short if close > upper => Trend::Up,
        _ => Trend::Unknown,
    };
    Ok(Evaluation::trend(trend))
}

/// Grid: anchor at the first close and buy each time price steps down
/// through another grid line. Take-profits are placed by the reconciler.
pub fn grid(p: &GridParams, ctx: &EvalContext<'_>, memory: &mut GridMemory) -> Result<Evaluation> {
    let [prev_close, close] = tail::<2>(&ctx.window.full_series()?.close, "close")?;
    let base = *memory.base.get_or_insert(close);
    let level = ((base - close) / p.interval).floor();
    let prev_level = ((base - prev_close) / p.interval).floor();
    if level > prev_level {
        Ok(Evaluation::trend(Trend::Up))
    } else {
        Ok(Evaluation::unknown())
    }
}
