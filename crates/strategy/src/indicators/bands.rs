use super::average::{sma, stddev};

/// Upper/middle/lower envelope, each aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands: SMA middle line, `nbdev_up`/`nbdev_down` population
/// standard deviations above and below.
pub fn bollinger(closes: &[f64], period: usize, nbdev_up: f64, nbdev_down: f64) -> Bands {
    let middle = sma(closes, period);
    let dev = stddev(closes, period);
    let upper = middle.iter().zip(&dev).map(|(m, d)| m + nbdev_up * d).collect();
    let lower = middle.iter().zip(&dev).map(|(m, d)| m - nbdev_down * d).collect();
    Bands { upper, middle, lower }
}
