//! Directional movement: +DI, -DI and ADX (Wilder).
//!
//! 1. +DM / -DM from consecutive highs and lows
//! 2. Wilder-smooth +DM, -DM and TR over `period`
//! 3. ±DI = 100 · smoothed(±DM) / smoothed(TR)
//! 4. DX = 100 · |+DI − −DI| / (+DI + −DI)
//! 5. ADX = Wilder average of DX
//!
//! ±DI are valid from index `period`, ADX from `2 · period - 1`.

use super::volatility::true_range;

#[derive(Debug, Clone, PartialEq)]
pub struct Dmi {
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
    pub adx: Vec<f64>,
}

pub fn dmi(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Dmi {
    let n = high.len().min(low.len()).min(close.len());
    let mut out = Dmi {
        plus_di: vec![f64::NAN; n],
        minus_di: vec![f64::NAN; n],
        adx: vec![f64::NAN; n],
    };
    if period == 0 || n <= period {
        return out;
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }
    let tr = true_range(high, low, close);

    // Wilder running sums seeded with the first `period` moves.
    let p = period as f64;
    let mut s_tr: f64 = tr[1..=period].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; n];
    for i in period..n {
        if i > period {
            s_tr = s_tr - s_tr / p + tr[i];
            s_plus = s_plus - s_plus / p + plus_dm[i];
            s_minus = s_minus - s_minus / p + minus_dm[i];
        }
        if s_tr == 0.0 {
            out.plus_di[i] = 0.0;
            out.minus_di[i] = 0.0;
            dx[i] = 0.0;
            continue;
        }
        let plus = 100.0 * s_plus / s_tr;
        let minus = 100.0 * s_minus / s_tr;
        out.plus_di[i] = plus;
        out.minus_di[i] = minus;
        let sum = plus + minus;
        dx[i] = if sum == 0.0 { 0.0 } else { 100.0 * (plus - minus).abs() / sum };
    }

    let first_adx = 2 * period - 1;
    if first_adx < n {
        let mut adx = dx[period..=first_adx].iter().sum::<f64>() / p;
        out.adx[first_adx] = adx;
        for i in (first_adx + 1)..n {
            adx = (adx * (p - 1.0) + dx[i]) / p;
            out.adx[i] = adx;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend(n: usize, step: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * step).collect();
        let high = close.iter().map(|c| c + 1.0).collect();
        let low = close.iter().map(|c| c - 1.0).collect();
        (high, low, close)
    }

    #[test]
    fn warm_up_lengths() {
        let (h, l, c) = trend(20, 1.0);
        let out = dmi(&h, &l, &c, 4);
        assert!(out.plus_di[3].is_nan());
        assert!(!out.plus_di[4].is_nan());
        assert!(out.adx[6].is_nan());
        assert!(!out.adx[7].is_nan());
    }

    #[test]
    fn uptrend_favours_plus_di() {
        let (h, l, c) = trend(30, 2.0);
        let out = dmi(&h, &l, &c, 5);
        let last = c.len() - 1;
        assert!(out.plus_di[last] > out.minus_di[last]);
        assert!(out.adx[last] > 50.0, "adx = {}", out.adx[last]);
    }

    #[test]
    fn adx_stays_in_bounds() {
        let close = [10.0, 12.0, 11.0, 13.0, 12.5, 14.0, 13.0, 15.0, 14.0, 16.0, 15.5, 17.0];
        let high: Vec<f64> = close.iter().map(|c| c + 0.7).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.9).collect();
        let out = dmi(&high, &low, &close, 3);
        for v in out.adx.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn too_few_bars_is_all_nan() {
        let (h, l, c) = trend(3, 1.0);
        let out = dmi(&h, &l, &c, 5);
        assert!(out.adx.iter().all(|v| v.is_nan()));
    }
}
