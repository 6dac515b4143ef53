//! Channel rules built on Bollinger bands and ATR.

use common::{PositionSide, Result, Trend};

use super::{falling, rising, tail, EvalContext, Evaluation};
use crate::indicators::{atr as atr_series, bollinger, sma};
use crate::state::{BanditMemory, SuperTrendMemory};

#[derive(Debug, Clone, PartialEq)]
pub struct BollParams {
    pub period: usize,
    pub nbdev_up: f64,
    pub nbdev_down: f64,
}

impl Default for BollParams {
    fn default() -> Self {
        Self {
            period: 22,
            nbdev_up: 2.0,
            nbdev_down: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollBanditParams {
    pub period: usize,
    pub nbdev_up: f64,
    pub nbdev_down: f64,
    /// Exit average period right after entry.
    pub init_ma: usize,
    /// The exit average shortens by one per held bar down to this period.
    pub min_ma: usize,
}

impl Default for BollBanditParams {
    fn default() -> Self {
        Self {
            period: 50,
            nbdev_up: 1.0,
            nbdev_down: 1.0,
            init_ma: 50,
            min_ma: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtrParams {
    pub period: usize,
    pub buy_factor: f64,
    pub sell_factor: f64,
}

impl Default for AtrParams {
    fn default() -> Self {
        Self {
            period: 26,
            buy_factor: 2.0,
            sell_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperTrendParams {
    pub atr_period: usize,
    pub multiplier: f64,
}

impl Default for SuperTrendParams {
    fn default() -> Self {
        Self {
            atr_period: 20,
            multiplier: 2.0,
        }
    }
}

/// Flat: all three bands trending the same way with the close on that side of
/// the middle band opens. Long exits above the upper band or below the middle;
/// short mirrors.
pub fn boll(p: &BollParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let bands = bollinger(&s.close, p.period, p.nbdev_up, p.nbdev_down);
    let upper = tail::<3>(&bands.upper, "boll upper")?;
    let middle = tail::<3>(&bands.middle, "boll middle")?;
    let lower = tail::<3>(&bands.lower, "boll lower")?;
    let close = ctx.bar()?.close;

    let trend = match ctx.position {
        PositionSide::Flat => {
            if rising(upper) && rising(middle) && rising(lower) && close > middle[2] {
                Trend::Up
            } else if falling(upper) && falling(middle) && falling(lower) && close < middle[2] {
                Trend::Down
            } else {
                Trend::Unknown
            }
        }
        PositionSide::Long if close > upper[2] || close < middle[2] => Trend::Down,
        PositionSide::Short if close < lower[2] || close > middle[2] => Trend::Up,
        _ => Trend::Unknown,
    };
    Ok(Evaluation::trend(trend))
}

/// Bollinger bandit: fade a close outside the bands, then exit against a
/// moving average that tightens every bar the position is held.
pub fn boll_bandit(
    p: &BollBanditParams,
    ctx: &EvalContext<'_>,
    memory: &mut BanditMemory,
) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let bands = bollinger(&s.close, p.period, p.nbdev_up, p.nbdev_down);
    let [upper] = tail::<1>(&bands.upper, "bandit upper")?;
    let [lower] = tail::<1>(&bands.lower, "bandit lower")?;
    let ma_period = *memory.ma_period.get_or_insert(p.init_ma);
    let [ma] = tail::<1>(&sma(&s.close, ma_period), "bandit exit ma")?;
    let close = ctx.bar()?.close;

    let trend = match ctx.position {
        PositionSide::Flat => {
            memory.ma_period = Some(p.init_ma);
            if close < lower {
                Trend::Up
            } else if close > upper {
                Trend::Down
            } else {
                Trend::Unknown
            }
        }
        PositionSide::Long => {
            memory.ma_period = Some(ma_period.saturating_sub(1).max(p.min_ma));
            if close > lower || close > ma {
                Trend::Down
            } else {
                Trend::Unknown
            }
        }
        PositionSide::Short => {
            memory.ma_period = Some(ma_period.saturating_sub(1).max(p.min_ma));
            if close < upper || close < ma {
                Trend::Up
            } else {
                Trend::Unknown
            }
        }
    };
    Ok(Evaluation::trend(trend))
}

/// A close more than `factor · ATR` away from the previous close is treated
/// as an overreaction and faded.
pub fn atr(p: &AtrParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let [atr] = tail::<1>(&atr_series(&s.high, &s.low, &s.close, p.period), "atr")?;
    let [prev_close, close] = tail::<2>(&s.close, "close")?;

    let buy_line = prev_close - atr * p.buy_factor;
    let sell_line = prev_close + atr * p.sell_factor;
    let trend = if close < buy_line {
        Trend::Up
    } else if close > sell_line {
        Trend::Down
    } else {
        Trend::Unknown
    };
    Ok(Evaluation::trend(trend))
}

/// SuperTrend: ratcheting ATR bands around the bar midpoint. A flip of the
/// band direction reverses the position.
pub fn super_trend(
    p: &SuperTrendParams,
    ctx: &EvalContext<'_>,
    memory: &mut SuperTrendMemory,
) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let [atr] = tail::<1>(&atr_series(&s.high, &s.low, &s.close, p.atr_period), "atr")?;
    let bar = ctx.bar()?;

    let middle = (bar.high + bar.low) / 2.0;
    let mut upper = middle + p.multiplier * atr;
    let mut lower = middle - p.multiplier * atr;
    if bar.close > memory.upper_last {
        upper = upper.max(memory.upper_last);
    }
    if bar.close < memory.lower_last {
        lower = lower.min(memory.lower_last);
    }

    let direction: i8 = if bar.close > lower {
        1
    } else if bar.close < upper {
        -1
    } else {
        0
    };
    let trend = match (memory.direction, direction) {
        (-1, 1) => Trend::Up,
        (1, -1) => Trend::Down,
        _ => Trend::Unknown,
    };

    memory.upper_last = upper;
    memory.lower_last = lower;
    memory.direction = direction;
    Ok(Evaluation::trend(trend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ctx_at, window_of};

    #[test]
    fn boll_flat_opens_on_rising_bands() {
        let p = BollParams {
            period: 3,
            nbdev_up: 2.0,
            nbdev_down: 2.0,
        };
        let closes: Vec<f64> = (0..6).map(|i| 100.0 + 2.0 * i as f64).collect();
        let window = window_of(&closes, 6);
        assert_eq!(boll(&p, &ctx_at(&window, PositionSide::Flat)).unwrap().trend, Trend::Up);
    }

    #[test]
    fn boll_long_exits_below_middle() {
        let p = BollParams {
            period: 3,
            nbdev_up: 2.0,
            nbdev_down: 2.0,
        };
        let window = window_of(&[100.0, 101.0, 102.0, 103.0, 104.0, 100.0], 6);
        let eval = boll(&p, &ctx_at(&window, PositionSide::Long)).unwrap();
        assert_eq!(eval.trend, Trend::Down);
        // The same bar does not open a short from flat: bands are not all falling.
        let flat = boll(&p, &ctx_at(&window, PositionSide::Flat)).unwrap();
        assert_eq!(flat.trend, Trend::Unknown);
    }

    #[test]
    fn bandit_shrinks_exit_average_while_held() {
        let p = BollBanditParams {
            period: 3,
            nbdev_up: 1.0,
            nbdev_down: 1.0,
            init_ma: 4,
            min_ma: 3,
        };
        let mut memory = BanditMemory::default();
        let window = window_of(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0], 6);
        boll_bandit(&p, &ctx_at(&window, PositionSide::Long), &mut memory).unwrap();
        assert_eq!(memory.ma_period, Some(3));
        boll_bandit(&p, &ctx_at(&window, PositionSide::Long), &mut memory).unwrap();
        assert_eq!(memory.ma_period, Some(3));
        boll_bandit(&p, &ctx_at(&window, PositionSide::Flat), &mut memory).unwrap();
        assert_eq!(memory.ma_period, Some(4));
    }

    #[test]
    fn bandit_fades_close_below_lower_band() {
        let p = BollBanditParams {
            period: 4,
            nbdev_up: 1.0,
            nbdev_down: 1.0,
            init_ma: 4,
            min_ma: 2,
        };
        let mut memory = BanditMemory::default();
        let window = window_of(&[100.0, 100.0, 100.0, 100.0, 90.0], 5);
        let eval = boll_bandit(&p, &ctx_at(&window, PositionSide::Flat), &mut memory).unwrap();
        assert_eq!(eval.trend, Trend::Up);
    }

    #[test]
    fn atr_fades_large_drop() {
        let p = AtrParams {
            period: 5,
            buy_factor: 2.0,
            sell_factor: 2.0,
        };
        // True range is 2.5 per bar, then a 12.5-point drop.
        let window = window_of(&[100.0, 100.5, 100.0, 100.5, 100.0, 100.5, 88.0], 7);
        assert_eq!(atr(&p, &ctx_at(&window, PositionSide::Flat)).unwrap().trend, Trend::Up);
    }

    #[test]
    fn super_trend_reports_flip_once() {
        let p = SuperTrendParams {
            atr_period: 3,
            multiplier: 2.0,
        };
        let mut memory = SuperTrendMemory {
            direction: -1,
            ..SuperTrendMemory::default()
        };
        let window = window_of(&[100.0, 101.0, 102.0, 103.0, 104.0], 5);
        let ctx = ctx_at(&window, PositionSide::Short);
        assert_eq!(super_trend(&p, &ctx, &mut memory).unwrap().trend, Trend::Up);
        assert_eq!(memory.direction, 1);
        assert_eq!(super_trend(&p, &ctx, &mut memory).unwrap().trend, Trend::Unknown);
    }
}
