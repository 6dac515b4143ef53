use super::average::sma;
use super::{highest, lowest};

/// Slow stochastic %K and %D (SMA smoothing).
#[derive(Debug, Clone, PartialEq)]
pub struct Stoch {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Raw %K over `fastk` bars, smoothed by `slowk` into slow %K, then by
/// `slowd` into %D. A flat range yields a raw %K of 0.
pub fn stoch(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    fastk: usize,
    slowk: usize,
    slowd: usize,
) -> Stoch {
    let n = high.len().min(low.len()).min(close.len());
    let mut raw = vec![f64::NAN; n];
    if fastk > 0 && n >= fastk {
        for i in (fastk - 1)..n {
            let hh = highest(&high[i + 1 - fastk..=i]);
            let ll = lowest(&low[i + 1 - fastk..=i]);
            let range = hh - ll;
            raw[i] = if range == 0.0 {
                0.0
            } else {
                100.0 * (close[i] - ll) / range
            };
        }
    }
    let k = sma(&raw, slowk);
    let d = sma(&k, slowd);
    Stoch { k, d }
}

/// Chande momentum oscillator: 100 · (Σup − Σdown) / (Σup + Σdown) over
/// `period` price changes. First valid value at index `period`.
pub fn cmo(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }
    for i in period..n {
        let (mut up, mut down) = (0.0, 0.0);
        for w in closes[i - period..=i].windows(2) {
            let change = w[1] - w[0];
            if change > 0.0 {
                up += change;
            } else {
                down -= change;
            }
        }
        let total = up + down;
        result[i] = if total == 0.0 {
            0.0
        } else {
            100.0 * (up - down) / total
        };
    }
    result
}

/// BIAS: percentage deviation of the close from its `period` SMA.
pub fn bias(closes: &[f64], period: usize) -> Vec<f64> {
    sma(closes, period)
        .iter()
        .zip(closes)
        .map(|(ma, close)| (close - ma) / ma * 100.0)
        .collect()
}
