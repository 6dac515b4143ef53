//! Threshold rules: BIAS deviation, CMO momentum and the moving-average
//! sequence vote.

use common::{PositionSide, Result, Trend};

use super::{tail, EvalContext, Evaluation};
use crate::indicators::{bias as bias_series, cmo as cmo_series, sma};
use crate::state::MaSeqMemory;

#[derive(Debug, Clone, PartialEq)]
pub struct BiasParams {
    pub terms: [usize; 3],
    /// Absolute percentage each BIAS term must exceed.
    pub limits: [f64; 3],
}

impl Default for BiasParams {
    fn default() -> Self {
        Self {
            terms: [6, 12, 24],
            limits: [5.0, 7.0, 11.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmoParams {
    pub period: usize,
    /// Held positions are closed once |CMO| exceeds this in their favour.
    pub exit: f64,
}

impl Default for CmoParams {
    fn default() -> Self {
        Self {
            period: 30,
            exit: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaSeqParams {
    /// Longest moving average in the sequence; every period down to 1 votes.
    pub window: usize,
}

impl Default for MaSeqParams {
    fn default() -> Self {
        Self { window: 90 }
    }
}

/// All three BIAS terms stretched the same way: far below their averages is
/// oversold (UP), far above is overbought (DOWN).
pub fn bias(p: &BiasParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let mut values = [0.0; 3];
    for (value, term) in values.iter_mut().zip(p.terms) {
        let [v] = tail::<1>(&bias_series(&s.close, term), "bias")?;
        *value = v;
    }

    let below = values.iter().zip(&p.limits).all(|(v, limit)| *v < -limit);
    let above = values.iter().zip(&p.limits).all(|(v, limit)| *v > *limit);
    let trend = if below {
        Trend::Up
    } else if above {
        Trend::Down
    } else {
        Trend::Unknown
    };
    Ok(Evaluation::trend(trend))
}

/// Flat: CMO crossing zero opens. Held: CMO beyond ±exit in the position's
/// favour closes.
pub fn cmo(p: &CmoParams, ctx: &EvalContext<'_>) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let [prev, now] = tail::<2>(&cmo_series(&s.close, p.period), "cmo")?;

    let trend = match ctx.position {
        PositionSide::Flat if prev < 0.0 && now > 0.0 => Trend::Up,
        PositionSide::Flat if prev > 0.0 && now < 0.0 => Trend::Down,
        PositionSide::Long if now > p.exit => Trend::Down,
        PositionSide::Short if now < -p.exit => Trend::Up,
        _ => Trend::Unknown,
    };
    Ok(Evaluation::trend(trend))
}

/// Sum of signs of consecutive differences between SMA(window), SMA(window-1),
/// ..., SMA(1) at the latest bar. Positive when shorter averages sit above
/// longer ones.
pub fn ma_sequence_signal(closes: &[f64], window: usize) -> Result<f64> {
    let mut seq = Vec::with_capacity(window);
    for period in (1..=window).rev() {
        let [v] = tail::<1>(&sma(closes, period), "ma sequence")?;
        seq.push(v);
    }
    Ok(seq
        .windows(2)
        .map(|w| {
            let diff = w[1] - w[0];
            if diff > 0.0 {
                1.0
            } else if diff < 0.0 {
                -1.0
            } else {
                0.0
            }
        })
        .sum())
}

/// Flat: open in the direction of the vote. Held: close when the vote loses
/// its sign.
pub fn ma_seq(p: &MaSeqParams, ctx: &EvalContext<'_>, memory: &mut MaSeqMemory) -> Result<Evaluation> {
    let s = ctx.window.full_series()?;
    let signal = ma_sequence_signal(&s.close, p.window)?;
    let last = std::mem::replace(&mut memory.last_signal, signal);

    let trend = match ctx.position {
        PositionSide::Flat if signal > 0.0 => Trend::Up,
        PositionSide::Flat if signal < 0.0 => Trend::Down,
        PositionSide::Long if last > 0.0 && signal <= 0.0 => Trend::Down,
        PositionSide::Short if last < 0.0 && signal >= 0.0 => Trend::Up,
        _ => Trend::Unknown,
    };
    Ok(Evaluation::trend(trend))
}
