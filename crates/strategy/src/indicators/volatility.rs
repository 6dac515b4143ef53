//! True range and Wilder's ATR.

/// True range per bar. Index 0 has no previous close and is `NaN`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut result = vec![f64::NAN; n];
    for i in 1..n {
        let prev_close = close[i - 1];
        result[i] = (high[i] - low[i])
            .max((high[i] - prev_close).abs())
            .max((low[i] - prev_close).abs());
    }
    result
}

/// Wilder smoothing of `values` starting from index 1: the first output at
/// index `period` is the mean of `values[1..=period]`.
pub(crate) fn wilder_average(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }
    let mut avg = values[1..=period].iter().sum::<f64>() / period as f64;
    result[period] = avg;
    for i in (period + 1)..n {
        avg = (avg * (period - 1) as f64 + values[i]) / period as f64;
        result[i] = avg;
    }
    result
}

/// Average true range (Wilder). First valid value at index `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    wilder_average(&true_range(high, low, close), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, EPSILON};

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let tr = true_range(&[10.0, 15.0], &[9.0, 14.0], &[9.5, 14.5]);
        assert!(tr[0].is_nan());
        // gap up: high - prev_close = 15 - 9.5
        assert_approx(tr[1], 5.5, EPSILON);
    }

    #[test]
    fn atr_of_constant_range() {
        let high = [11.0; 6];
        let low = [9.0; 6];
        let close = [10.0; 6];
        let out = atr(&high, &low, &close, 3);
        assert!(out[2].is_nan());
        assert_approx(out[3], 2.0, EPSILON);
        assert_approx(out[5], 2.0, EPSILON);
    }

    #[test]
    fn atr_too_few_bars() {
        let out = atr(&[1.0, 2.0], &[0.5, 1.5], &[0.8, 1.8], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
