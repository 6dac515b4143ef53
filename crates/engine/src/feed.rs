use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{Bar, Error, Result};

/// One CSV row: symbol,timestamp,open,high,low,close,volume
#[derive(Debug, Deserialize)]
struct CsvBarRow {
    symbol: String,
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Replays bars read from a CSV file into the engine's bar channel.
///
/// Rows are validated up front: every timestamp must parse and each
/// symbol's timestamps must be non-decreasing. Bars of different symbols
/// may interleave.
#[derive(Debug)]
pub struct BarFeed {
    bars: Vec<Bar>,
}

impl BarFeed {
    pub fn from_csv(path: &str) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Data(format!("cannot open bar file '{path}': {e}")))?;
        let feed = Self::from_reader(file)?;
        info!(path = %path, bars = feed.len(), "Bar file loaded");
        Ok(feed)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut last_ts: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut bars = Vec::new();

        for (idx, rec) in rdr.deserialize::<CsvBarRow>().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            let row = rec.map_err(|e| Error::Data(format!("line {line}: {e}")))?;
            if row.symbol.trim().is_empty() {
                return Err(Error::Data(format!("line {line}: empty symbol")));
            }
            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| Error::Data(format!("line {line}: bad timestamp '{}'", row.timestamp)))?;

            if let Some(prev) = last_ts.get(&row.symbol) {
                if timestamp < *prev {
                    return Err(Error::Data(format!(
                        "line {line}: {} goes back in time ({timestamp} < {prev})",
                        row.symbol
                    )));
                }
            }
            last_ts.insert(row.symbol.clone(), timestamp);

            bars.push(Bar {
                symbol: row.symbol,
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Push every bar into the channel in file order. Call from
    /// `tokio::spawn`. Stops early if the engine drops its receiver.
    pub async fn run(self, bar_tx: mpsc::Sender<Bar>) {
        let total = self.bars.len();
        info!(bars = total, "Bar feed started");
        for (sent, bar) in self.bars.into_iter().enumerate() {
            if bar_tx.send(bar).await.is_err() {
                warn!(sent, total, "Bar feed: engine receiver closed");
                return;
            }
        }
        info!(bars = total, "Bar feed exhausted");
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEADER: &str = "symbol,timestamp,open,high,low,close,volume\n";

    #[test]
    fn parses_both_timestamp_forms() {
        let csv = format!(
            "{HEADER}rb,2024-05-06T09:00:00Z,1,2,0.5,1.5,10\nrb,2024-05-06 09:01:00,1.5,2,1,1.8,12\n"
        );
        let feed = BarFeed::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(
            feed.bars[1].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 1, 0).unwrap()
        );
        assert_eq!(feed.bars[1].close, 1.8);
    }

    #[test]
    fn offset_timestamps_are_normalised_to_utc() {
        let csv = format!("{HEADER}rb,2024-05-06T17:00:00+08:00,1,2,0.5,1.5,10\n");
        let feed = BarFeed::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(
            feed.bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn out_of_order_rows_are_rejected_per_symbol() {
        // Interleaved symbols are fine.
        let ok = format!(
            "{HEADER}rb,2024-05-06 09:01:00,1,1,1,1,1\nag,2024-05-06 09:00:00,1,1,1,1,1\n"
        );
        assert!(BarFeed::from_reader(ok.as_bytes()).is_ok());

        let bad = format!(
            "{HEADER}rb,2024-05-06 09:01:00,1,1,1,1,1\nrb,2024-05-06 09:00:00,1,1,1,1,1\n"
        );
        let err = BarFeed::from_reader(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Data(ref msg) if msg.contains("line 3")));
    }

    #[test]
    fn garbage_rows_are_data_errors() {
        let csv = format!("{HEADER}rb,yesterday,1,1,1,1,1\n");
        assert!(matches!(
            BarFeed::from_reader(csv.as_bytes()),
            Err(Error::Data(_))
        ));
        let csv = format!("{HEADER}rb,2024-05-06 09:00:00,one,1,1,1,1\n");
        assert!(matches!(
            BarFeed::from_reader(csv.as_bytes()),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn missing_file_is_a_data_error() {
        assert!(matches!(
            BarFeed::from_csv("/nonexistent/bars.csv"),
            Err(Error::Data(_))
        ));
    }

    #[tokio::test]
    async fn run_sends_bars_in_file_order() {
        let csv = format!(
            "{HEADER}rb,2024-05-06 09:00:00,1,1,1,1,1\nrb,2024-05-06 09:01:00,2,2,2,2,1\n"
        );
        let feed = BarFeed::from_reader(csv.as_bytes()).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(feed.run(tx));
        assert_eq!(rx.recv().await.unwrap().close, 1.0);
        assert_eq!(rx.recv().await.unwrap().close, 2.0);
        assert!(rx.recv().await.is_none());
    }
}
