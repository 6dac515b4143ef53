//! Line-crossing rules: moving averages, DMI/ADX, MACD and KDJ.

use std::cmp::Ordering;

use common::{Result, Trend};

use super::{crossed_above, crossed_below, falling, rising, tail, EvalContext, Evaluation};
use crate::indicators::{dmi, macd as macd_series, sma, stoch};
use crate::state::CrossMemory;

#[derive(Debug, Clone, PartialEq)]
pub struct MaCrossParams {
    pub fast: usize,
    pub slow: usize,
}

impl Default for MaCrossParams {
    fn default() -> Self {
        Self { fast: 5, slow: 10 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdxParams {
    pub adx_period: usize,
    pub di_period: usize,
    /// ADX above this (and rising) marks a strong trend worth entering.
    pub strong: f64,
    /// ADX below this (and falling) marks a fading trend; positions are closed.
    pub weak: f64,
}

impl Default for AdxParams {
    fn default() -> Self {
        Self {
            adx_period: 6,
            di_period: 14,
            strong: 50.0,
            weak: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdParams {
    pub short: usize,
    pub long: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            short: 12,
            long: 26,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KdjParams {
    pub fastk: usize,
    pub slowk: usize,
    pub slowd: usize,
    /// J below this is oversold.
    pub j_buy: f64,
    /// J above this is overbought.
    pub j_sell: f64,
}

impl Default for KdjParams {
    fn default() -> Self {
        Self {
            fastk: 9,
            slowk: 3,
            slowd: 3,
            j_buy: 0.0,
            j_sell: 100.0,
        }
    }
}

/// Fast SMA crossing the slow SMA.
///
/// The relation between the two lines is remembered across evaluations. On
/// the first evaluation there is no previous relation, so a fast line that
/// is already above (below) the slow line counts as a fresh cross.
pub fn ma_cross(p: &MaCrossParams, ctx: &EvalContext<'_>, memory: &mut CrossMemory) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let [fast] = tail::<1>(&sma(&s.close, p.fast), "fast sma")?;
    let [slow] = tail::<1>(&sma(&s.close, p.slow), "slow sma")?;

    let relation = fast.partial_cmp(&slow).unwrap_or(Ordering::Equal);
    let previous = memory.last_relation.replace(relation);

    let trend = match (previous, relation) {
        (prev, Ordering::Greater) if prev != Some(Ordering::Greater) => Trend::Up,
        (prev, Ordering::Less) if prev != Some(Ordering::Less) => Trend::Down,
        _ => Trend::Unknown,
    };
    // Equal lines never cross; keep the last strict relation so that
    // touching and moving back is not reported as a new cross.
    if relation == Ordering::Equal {
        memory.last_relation = previous;
    }
    Ok(Evaluation::trend(trend))
}

/// ADX decision on its last two samples and the last two ±DI samples.
pub fn adx_signal(p: &AdxParams, adx: [f64; 2], plus_di: [f64; 2], minus_di: [f64; 2]) -> Evaluation {
    let [adx_prev, adx_now] = adx;
    if adx_prev < adx_now && adx_now > p.strong {
        if crossed_above(plus_di, minus_di) {
            return Evaluation::trend(Trend::Up);
        }
        if crossed_below(plus_di, minus_di) {
            return Evaluation::trend(Trend::Down);
        }
        return Evaluation::unknown();
    }
    if adx_prev > adx_now && adx_now < p.weak {
        return Evaluation::flatten();
    }
    Evaluation::unknown()
}

pub fn adx(p: &AdxParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let strength = dmi(&s.high, &s.low, &s.close, p.adx_period);
    let direction = dmi(&s.high, &s.low, &s.close, p.di_period);
    Ok(adx_signal(
        p,
        tail(&strength.adx, "adx")?,
        tail(&direction.plus_di, "+di")?,
        tail(&direction.minus_di, "-di")?,
    ))
}

/// MACD: DIF and DEA on the same side of zero, DIF accelerating, and DIF
/// crossing DEA in that direction.
pub fn macd(p: &MacdParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let m = macd_series(&s.close, p.short, p.long, p.signal);
    let dif = tail::<3>(&m.dif, "macd dif")?;
    let dea = tail::<2>(&m.dea, "macd dea")?;
    let pair = [dif[1], dif[2]];

    let trend = if dif[2] > 0.0 && dea[1] > 0.0 && rising(dif) && crossed_above(pair, dea) {
        Trend::Up
    } else if dif[2] < 0.0 && dea[1] < 0.0 && falling(dif) && crossed_below(pair, dea) {
        Trend::Down
    } else {
        Trend::Unknown
    };
    Ok(Evaluation::trend(trend))
}

/// KDJ: J outside its band, or K trending and crossing D.
pub fn kdj(p: &KdjParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let st = stoch(&s.high, &s.low, &s.close, p.fastk, p.slowk, p.slowd);
    let k = tail::<3>(&st.k, "kdj k")?;
    let d = tail::<2>(&st.d, "kdj d")?;
    let j = 3.0 * k[2] - 2.0 * d[1];
    let pair = [k[1], k[2]];

    let up = j < p.j_buy || (rising(k) && crossed_above(pair, d));
    let down = j > p.j_sell || (falling(k) && crossed_below(pair, d));
    let trend = if up {
        Trend::Up
    } else if down {
        Trend::Down
    } else {
        Trend::Unknown
    };
    Ok(Evaluation::trend(trend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ctx_at, window_of};
    use crate::window::tests::make_bars;
    use crate::window::RollingWindow;
    use common::PositionSide;

    fn ctx(window: &RollingWindow) -> EvalContext<'_> {
        ctx_at(window, PositionSide::Flat)
    }

    #[test]
    fn ma_cross_fires_once_on_rising_prices() {
        let p = MaCrossParams { fast: 2, slow: 3 };
        let mut memory = CrossMemory::default();
        let mut window = RollingWindow::new(5).unwrap();
        let mut ups = 0;
        for bar in make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]) {
            window.append(bar);
            if !window.is_inited() {
                continue;
            }
            let eval = ma_cross(&p, &ctx(&window), &mut memory).unwrap();
            assert_ne!(eval.trend, Trend::Down);
            if eval.trend == Trend::Up {
                ups += 1;
            }
        }
        assert_eq!(ups, 1);
    }

    #[test]
    fn ma_cross_reports_reversal() {
        let p = MaCrossParams { fast: 2, slow: 3 };
        let mut memory = CrossMemory {
            last_relation: Some(Ordering::Greater),
        };
        let window = window_of(&[5.0, 6.0, 7.0, 3.0, 1.0], 5);
        let eval = ma_cross(&p, &ctx(&window), &mut memory).unwrap();
        assert_eq!(eval.trend, Trend::Down);
        assert_eq!(memory.last_relation, Some(Ordering::Less));
    }

    #[test]
    fn adx_scenario_fires_only_on_strong_rising_cross() {
        let p = AdxParams::default();
        let adx = [10.0, 20.0, 30.0, 55.0, 52.0];
        // +DI crosses above -DI between index 2 and 3.
        let plus = [10.0, 12.0, 14.0, 30.0, 31.0];
        let minus = [20.0, 20.0, 20.0, 18.0, 17.0];
        let trends: Vec<Trend> = (1..adx.len())
            .map(|i| {
                adx_signal(
                    &p,
                    [adx[i - 1], adx[i]],
                    [plus[i - 1], plus[i]],
                    [minus[i - 1], minus[i]],
                )
                .trend
            })
            .collect();
        assert_eq!(trends, vec![Trend::Unknown, Trend::Unknown, Trend::Up, Trend::Unknown]);
    }

    #[test]
    fn adx_weak_and_falling_flattens() {
        let p = AdxParams::default();
        let eval = adx_signal(&p, [25.0, 15.0], [10.0, 12.0], [11.0, 11.0]);
        assert!(eval.flatten);
        assert_eq!(eval.trend, Trend::Unknown);
    }

    #[test]
    fn adx_strong_down_cross() {
        let p = AdxParams::default();
        let eval = adx_signal(&p, [51.0, 60.0], [25.0, 15.0], [20.0, 22.0]);
        assert_eq!(eval.trend, Trend::Down);
    }

    #[test]
    fn macd_on_short_window_is_indicator_error() {
        let p = MacdParams::default();
        let window = window_of(&(0..10).map(|i| i as f64).collect::<Vec<_>>(), 10);
        assert!(matches!(
            macd(&p, &ctx(&window)),
            Err(common::Error::IndicatorComputation(_))
        ));
    }

    #[test]
    fn macd_quiet_on_steady_trend() {
        let p = MacdParams { short: 3, long: 6, signal: 3 };
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let window = window_of(&closes, 30);
        // DIF settles above DEA; no fresh cross.
        assert_eq!(macd(&p, &ctx(&window)).unwrap().trend, Trend::Unknown);
    }

    #[test]
    fn kdj_overbought_is_down() {
        let p = KdjParams::default();
        // Close pinned at the top of a tightening range drives J above 100.
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..5).map(|i| 86.0 + 4.0 * i as f64));
        let window = window_of(&closes, closes.len());
        let eval = kdj(&p, &ctx(&window)).unwrap();
        assert_eq!(eval.trend, Trend::Down);
    }
}
