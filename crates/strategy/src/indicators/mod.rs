//! Indicator math used by the signal rules.
//!
//! Every function takes oldest-first input and returns a series of the same
//! length, `NaN` until the indicator has warmed up. A `NaN` anywhere in an
//! input window propagates to the output for that window.

pub mod average;
pub mod bands;
pub mod dmi;
pub mod macd;
pub mod oscillator;
pub mod volatility;

pub use average::{ema, sma, stddev};
pub use bands::{bollinger, Bands};
pub use dmi::{dmi, Dmi};
pub use macd::{macd, Macd};
pub use oscillator::{bias, cmo, stoch, Stoch};
pub use volatility::{atr, true_range};

/// Highest value in `values`, `NaN` if any element is `NaN` or the slice is empty.
pub fn highest(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest value in `values`, `NaN` if any element is `NaN` or the slice is empty.
pub fn lowest(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, epsilon={epsilon}"
    );
}

#[cfg(test)]
pub(crate) const EPSILON: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_and_lowest() {
        assert_eq!(highest(&[3.0, 7.0, 1.0]), 7.0);
        assert_eq!(lowest(&[3.0, 7.0, 1.0]), 1.0);
        assert!(highest(&[]).is_nan());
        assert!(lowest(&[1.0, f64::NAN]).is_nan());
    }
}
