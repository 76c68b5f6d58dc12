//! Historical candle port used to backfill candle nodes.

use crate::domain::candle::CandleBucket;
use crate::domain::error::GraphError;

pub trait CandleHistoryPort {
    /// Up to `count` closed candles opening strictly before `timestamp_ms`,
    /// newest first.
    fn fetch_before(&self, timestamp_ms: i64, count: usize)
    -> Result<Vec<CandleBucket>, GraphError>;
}
