use super::average::ema;

/// MACD (Moving Average Convergence/Divergence) output series.
///
/// `dif` = EMA(fast) − EMA(slow), `dea` = EMA(dif, signal), `hist` = dif − dea.
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub dif: Vec<f64>,
    pub dea: Vec<f64>,
    pub hist: Vec<f64>,
}

/// Compute MACD over close prices (oldest first).
/// `dif` is valid from index `slow - 1`, `dea` from `slow + signal - 2`.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let dif: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let dea = ema(&dif, signal);
    let hist = dif.iter().zip(&dea).map(|(d, e)| d - e).collect();
    Macd { dif, dea, hist }
}
