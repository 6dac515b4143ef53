//! Trading-session calendar derived from bar timestamps.
//!
//! Bars are left-aligned: a bar stamped 21:00:00 covers 21:00 to 21:01.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::Deserialize;

use common::{Error, Result};

/// How a single bar relates to the session calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionEvent {
    /// Inside the reset window between the day close and the night open.
    pub boundary: bool,
    /// First bar of a continuous trading period.
    pub open: bool,
    /// Inside a pre-close window where positions are flattened.
    pub flatten: bool,
}

impl SessionEvent {
    /// A new trading session starts: per-session budgets reset.
    pub fn new_session(&self) -> bool {
        self.boundary || self.open
    }
}

/// Inclusive time-of-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Session times as written in the strategy file, `HH:MM:SS` strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_reset_window")]
    pub reset_window: [String; 2],
    #[serde(default = "default_open_times")]
    pub open_times: Vec<String>,
    #[serde(default = "default_flatten_windows")]
    pub flatten_windows: Vec<[String; 2]>,
}

fn default_reset_window() -> [String; 2] {
    ["15:00:00".into(), "21:00:00".into()]
}

fn default_open_times() -> Vec<String> {
    vec!["21:00:00".into(), "09:00:00".into()]
}

fn default_flatten_windows() -> Vec<[String; 2]> {
    vec![
        ["14:55:00".into(), "14:59:00".into()],
        ["22:55:00".into(), "22:59:00".into()],
    ]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_window: default_reset_window(),
            open_times: default_open_times(),
            flatten_windows: default_flatten_windows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionClock {
    reset_window: TimeRange,
    open_times: Vec<NaiveTime>,
    flatten_windows: Vec<TimeRange>,
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .map_err(|e| Error::Config(format!("invalid session time {s:?}: {e}")))
}

fn parse_range(range: &[String; 2]) -> Result<TimeRange> {
    let start = parse_time(&range[0])?;
    let end = parse_time(&range[1])?;
    if start > end {
        return Err(Error::Config(format!(
            "session window {}..{} ends before it starts",
            range[0], range[1]
        )));
    }
    Ok(TimeRange { start, end })
}

impl SessionClock {
    pub fn from_config(cfg: &SessionConfig) -> Result<Self> {
        Ok(Self {
            reset_window: parse_range(&cfg.reset_window)?,
            open_times: cfg
                .open_times
                .iter()
                .map(|t| parse_time(t))
                .collect::<Result<_>>()?,
            flatten_windows: cfg
                .flatten_windows
                .iter()
                .map(parse_range)
                .collect::<Result<_>>()?,
        })
    }

    pub fn classify(&self, timestamp: DateTime<Utc>) -> SessionEvent {
        let t = timestamp.time().with_nanosecond(0).unwrap_or(timestamp.time());
        SessionEvent {
            boundary: self.reset_window.contains(t),
            open: self.open_times.contains(&t),
            flatten: self.flatten_windows.iter().any(|w| w.contains(t)),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        let hms = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            reset_window: TimeRange {
                start: hms(15, 0),
                end: hms(21, 0),
            },
            open_times: vec![hms(21, 0), hms(9, 0)],
            flatten_windows: vec![
                TimeRange {
                    start: hms(14, 55),
                    end: hms(14, 59),
                },
                TimeRange {
                    start: hms(22, 55),
                    end: hms(22, 59),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn night_open_is_boundary_and_open() {
        let clock = SessionClock::default();
        let ev = clock.classify(at(21, 0));
        assert!(ev.boundary);
        assert!(ev.open);
        assert!(ev.new_session());
    }

    #[test]
    fn morning_open_is_open_only() {
        let ev = SessionClock::default().classify(at(9, 0));
        assert!(!ev.boundary);
        assert!(ev.open);
        assert!(ev.new_session());
    }

    #[test]
    fn pre_close_windows_flatten() {
        let clock = SessionClock::default();
        assert!(clock.classify(at(14, 55)).flatten);
        assert!(clock.classify(at(14, 59)).flatten);
        assert!(!clock.classify(at(15, 0)).flatten);
        assert!(clock.classify(at(22, 57)).flatten);
        assert!(!clock.classify(at(10, 30)).flatten);
    }

    #[test]
    fn intraday_bar_is_quiet() {
        assert_eq!(SessionClock::default().classify(at(10, 31)), SessionEvent::default());
    }

    #[test]
    fn config_defaults_match_default_clock() {
        let clock = SessionClock::from_config(&SessionConfig::default()).unwrap();
        assert_eq!(clock, SessionClock::default());
    }

    #[test]
    fn malformed_time_is_config_error() {
        let cfg = SessionConfig {
            open_times: vec!["9am".into()],
            ..SessionConfig::default()
        };
        assert!(matches!(SessionClock::from_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let cfg = SessionConfig {
            reset_window: ["21:00:00".into(), "15:00:00".into()],
            ..SessionConfig::default()
        };
        assert!(SessionClock::from_config(&cfg).is_err());
    }
}
