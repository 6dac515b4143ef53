use std::collections::VecDeque;

use common::{Bar, Error, Result};

/// Fixed-capacity, insertion-ordered buffer of the most recent bars.
///
/// The oldest bar is evicted once capacity is reached. `is_inited()` flips
/// to true the first time the buffer is full and never goes back.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    bars: VecDeque<Bar>,
    inited: bool,
}

/// Column view of a window suffix, oldest first, ready for indicator input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "window capacity must be > 0".into(),
            ));
        }
        Ok(Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
            inited: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn is_inited(&self) -> bool {
        self.inited
    }

    pub fn append(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        if self.bars.len() == self.capacity {
            self.inited = true;
        }
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// The last `k` bars, oldest first.
    pub fn slice_suffix(&self, k: usize) -> Result<impl Iterator<Item = &Bar> + '_> {
        if k > self.bars.len() {
            return Err(Error::Range {
                requested: k,
                available: self.bars.len(),
            });
        }
        Ok(self.bars.range(self.bars.len() - k..))
    }

    /// Column arrays of the last `k` bars.
    pub fn series(&self, k: usize) -> Result<Series> {
        let mut series = Series {
            open: Vec::with_capacity(k),
            high: Vec::with_capacity(k),
            low: Vec::with_capacity(k),
            close: Vec::with_capacity(k),
            volume: Vec::with_capacity(k),
        };
        for bar in self.slice_suffix(k)? {
            series.open.push(bar.open);
            series.high.push(bar.high);
            series.low.push(bar.low);
            series.close.push(bar.close);
            series.volume.push(bar.volume);
        }
        Ok(series)
    }

    /// Column arrays of the whole window, failing until the window is inited.
    pub fn full_series(&self) -> Result<Series> {
        if !self.inited {
            return Err(Error::InsufficientData {
                needed: self.capacity,
                available: self.bars.len(),
            });
        }
        self.series(self.bars.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Synthetic bars from closes: open = previous close, high/low one point outside.
    pub(crate) fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    symbol: "TEST".into(),
                    timestamp: base + Duration::minutes(i as i64),
                    open,
                    high: open.max(close) + 1.0,
                    low: open.min(close) - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RollingWindow::new(0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn inited_only_when_full() {
        let mut window = RollingWindow::new(3).unwrap();
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        window.append(bars[0].clone());
        window.append(bars[1].clone());
        assert!(!window.is_inited());
        window.append(bars[2].clone());
        assert!(window.is_inited());
        window.append(bars[3].clone());
        assert!(window.is_inited());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn evicts_oldest_bar_at_capacity() {
        let mut window = RollingWindow::new(2).unwrap();
        for bar in make_bars(&[1.0, 2.0, 3.0]) {
            window.append(bar);
        }
        let closes: Vec<f64> = window.slice_suffix(2).unwrap().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn suffix_longer_than_window_is_a_range_error() {
        let mut window = RollingWindow::new(5).unwrap();
        for bar in make_bars(&[1.0, 2.0]) {
            window.append(bar);
        }
        let err = window.slice_suffix(3).err().unwrap();
        assert!(matches!(err, Error::Range { requested: 3, available: 2 }));
    }

    #[test]
    fn series_is_oldest_first() {
        let mut window = RollingWindow::new(4).unwrap();
        for bar in make_bars(&[10.0, 11.0, 12.0, 13.0]) {
            window.append(bar);
        }
        let series = window.series(3).unwrap();
        assert_eq!(series.close, vec![11.0, 12.0, 13.0]);
        assert_eq!(series.open, vec![10.0, 11.0, 12.0]);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn full_series_requires_inited_window() {
        let mut window = RollingWindow::new(3).unwrap();
        window.append(make_bars(&[1.0])[0].clone());
        assert!(matches!(
            window.full_series(),
            Err(Error::InsufficientData { needed: 3, available: 1 })
        ));
    }
}
