//! Moving averages and rolling dispersion.

/// Simple moving average. First valid value at index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        result[i] = window.iter().sum::<f64>() / period as f64;
    }
    result
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// valid values. Leading `NaN`s (e.g. from an upstream indicator's warm-up)
/// are skipped before seeding.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    let seed_end = start + period;
    if seed_end > n {
        return result;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema_val = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = ema_val;
    for i in seed_end..n {
        ema_val = values[i] * k + ema_val * (1.0 - k);
        result[i] = ema_val;
    }
    result
}

/// Rolling population standard deviation.
pub fn stddev(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        result[i] = var.sqrt();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, EPSILON};

    #[test]
    fn sma_basic() {
        let result = sma(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0], 5);
        assert!(result[..4].iter().all(|v| v.is_nan()));
        assert_approx(result[4], 12.0, EPSILON);
        assert_approx(result[5], 13.0, EPSILON);
    }

    #[test]
    fn sma_propagates_nan() {
        let result = sma(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.5, EPSILON);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let result = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert!(result[1].is_nan());
        assert_approx(result[2], 4.0, EPSILON);
        // k = 0.5: 8 * 0.5 + 4 * 0.5
        assert_approx(result[3], 6.0, EPSILON);
    }

    #[test]
    fn ema_skips_leading_nan() {
        let result = ema(&[f64::NAN, f64::NAN, 1.0, 3.0, 5.0], 2);
        assert!(result[2].is_nan());
        assert_approx(result[3], 2.0, EPSILON);
        assert!(!result[4].is_nan());
    }

    #[test]
    fn stddev_of_constant_is_zero() {
        let result = stddev(&[5.0; 6], 4);
        assert_approx(result[5], 0.0, EPSILON);
    }

    #[test]
    fn stddev_population() {
        let result = stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert_approx(result[7], 2.0, EPSILON);
    }
}
