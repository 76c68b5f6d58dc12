//! CSV file adapters for ticks and candle history.
//!
//! Ticks: `timestamp_ms,bid,ask[,volume]`.
//! Candles: `timestamp_ms,open,high,low,close,volume`.
//! Both files start with a header row.

use crate::domain::candle::{CandleBucket, Tick};
use crate::domain::error::GraphError;
use crate::ports::candle_history_port::CandleHistoryPort;
use crate::ports::tick_port::TickPort;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

fn field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: u64,
) -> Result<T, GraphError>
where
    T::Err: std::fmt::Display,
{
    record
        .get(index)
        .ok_or_else(|| GraphError::Data {
            reason: format!("line {}: missing {} column", line, name),
        })?
        .trim()
        .parse()
        .map_err(|e| GraphError::Data {
            reason: format!("line {}: invalid {} value: {}", line, name, e),
        })
}

fn read_records(path: &Path) -> Result<Vec<(u64, csv::StringRecord)>, GraphError> {
    let content = fs::read_to_string(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| GraphError::Data {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        records.push((line, record));
    }
    Ok(records)
}

pub struct CsvTickAdapter {
    path: PathBuf,
}

impl CsvTickAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TickPort for CsvTickAdapter {
    fn fetch_ticks(&self) -> Result<Vec<Tick>, GraphError> {
        let mut ticks = Vec::new();
        for (line, record) in read_records(&self.path)? {
            let volume = if record.len() > 3 {
                field(&record, 3, "volume", line)?
            } else {
                0.0
            };
            ticks.push(Tick {
                timestamp_ms: field(&record, 0, "timestamp_ms", line)?,
                bid: field(&record, 1, "bid", line)?,
                ask: field(&record, 2, "ask", line)?,
                volume,
            });
        }
        debug!(path = %self.path.display(), count = ticks.len(), "loaded ticks");
        Ok(ticks)
    }
}

/// Candle history loaded once from a CSV file.
pub struct CsvCandleHistory {
    candles: Vec<CandleBucket>,
}

impl CsvCandleHistory {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let mut candles = Vec::new();
        for (line, record) in read_records(path)? {
            candles.push(CandleBucket::from_ohlc(
                field(&record, 0, "timestamp_ms", line)?,
                field(&record, 1, "open", line)?,
                field(&record, 2, "high", line)?,
                field(&record, 3, "low", line)?,
                field(&record, 4, "close", line)?,
                field(&record, 5, "volume", line)?,
            ));
        }
        candles.sort_by_key(|c| c.open_ts);
        debug!(path = %path.display(), count = candles.len(), "loaded candle history");
        Ok(Self { candles })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

impl CandleHistoryPort for CsvCandleHistory {
    fn fetch_before(&self, timestamp_ms: i64, count: usize) -> Result<Vec<CandleBucket>, GraphError> {
        let end = self.candles.partition_point(|c| c.open_ts < timestamp_ms);
        Ok(self.candles[..end].iter().rev().take(count).copied().collect())
    }
}
