//! Tick-to-candle aggregation.
//!
//! Ticks are folded into fixed-width OHLC buckets keyed by the tick timestamp
//! truncated to the bucket width. The tick stream must be non-decreasing
//! relative to the most recently started bucket.

use crate::domain::cache::{CachePolicy, TimeKeyedCache};
use crate::domain::error::GraphError;
use tracing::{debug, warn};

/// A single price update from the feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub timestamp_ms: i64,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(timestamp_ms: i64, bid: f64, ask: f64) -> Self {
        Self {
            timestamp_ms,
            bid,
            ask,
            volume: 0.0,
        }
    }

    /// Tick with a single price on both sides.
    pub fn at(timestamp_ms: i64, price: f64) -> Self {
        Self::new(timestamp_ms, price, price)
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// OHLC summary of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleBucket {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub open_ts: i64,
    pub close_ts: i64,
    pub tick_count: u32,
    pub volume: f64,
}

impl CandleBucket {
    pub fn new(timestamp_ms: i64, price: f64, volume: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            open_ts: timestamp_ms,
            close_ts: timestamp_ms,
            tick_count: 1,
            volume,
        }
    }

    /// Fully formed candle, as loaded from history.
    pub fn from_ohlc(open_ts: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            open_ts,
            close_ts: open_ts,
            tick_count: 0,
            volume,
        }
    }

    /// Extends the bucket with a tick. An earlier timestamp than the current
    /// open replaces the open; a timestamp at or after the current close
    /// advances the close.
    pub fn update(&mut self, timestamp_ms: i64, price: f64, volume: f64) {
        if timestamp_ms < self.open_ts {
            self.open_ts = timestamp_ms;
            self.open = price;
        }
        if timestamp_ms >= self.close_ts {
            self.close_ts = timestamp_ms;
            self.close = price;
        }
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.tick_count += 1;
        self.volume += volume;
    }

    /// (high + low) / 2
    pub fn median(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// (high + low + close) / 3
    pub fn typical(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (high + low + 2 * close) / 4
    pub fn weighted(&self) -> f64 {
        (self.high + self.low + self.close * 2.0) / 4.0
    }
}

/// Outcome of folding one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleUpdate {
    pub key: i64,
    /// True when the tick started a new bucket.
    pub opened: bool,
    pub bucket: CandleBucket,
}

#[derive(Debug, Clone)]
pub struct CandleAggregator {
    width_ms: i64,
    buckets: TimeKeyedCache<CandleBucket>,
    last_key: Option<i64>,
}

impl CandleAggregator {
    pub fn new(width_ms: i64, policy: CachePolicy) -> Result<Self, GraphError> {
        if width_ms <= 0 {
            return Err(GraphError::ConfigInvalid {
                section: "candles".into(),
                key: "width_ms".into(),
                reason: format!("bucket width must be positive, got {}", width_ms),
            });
        }
        Ok(Self {
            width_ms,
            buckets: TimeKeyedCache::new(policy),
            last_key: None,
        })
    }

    pub fn width_ms(&self) -> i64 {
        self.width_ms
    }

    pub fn bucket_key(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.width_ms)
    }

    /// Key of the most recently started bucket.
    pub fn last_key(&self) -> Option<i64> {
        self.last_key
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, key: i64) -> Option<&CandleBucket> {
        self.buckets.peek(key)
    }

    /// Bucket keys in ascending order.
    pub fn keys(&self) -> Vec<i64> {
        self.buckets.keys()
    }

    pub fn on_tick(
        &mut self,
        timestamp_ms: i64,
        price: f64,
        volume: f64,
    ) -> Result<CandleUpdate, GraphError> {
        if let Some(last) = self.last_key {
            if timestamp_ms < last {
                warn!(timestamp_ms, last_bucket = last, "rejected out-of-order tick");
                return Err(GraphError::OutOfOrderTick {
                    timestamp: timestamp_ms,
                    last_bucket: last,
                });
            }
        }

        let key = self.bucket_key(timestamp_ms);
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.update(timestamp_ms, price, volume);
            return Ok(CandleUpdate {
                key,
                opened: false,
                bucket: *bucket,
            });
        }

        let bucket = CandleBucket::new(timestamp_ms, price, volume);
        self.buckets.put(key, bucket);
        self.last_key = Some(key);
        debug!(key, width_ms = self.width_ms, price, "opened candle bucket");
        Ok(CandleUpdate {
            key,
            opened: true,
            bucket,
        })
    }

    /// Drops the bucket stored under `key`.
    pub fn remove(&mut self, key: i64) -> Option<CandleBucket> {
        self.buckets.remove(key)
    }

    /// Inserts a closed bucket older than the live one (history backfill).
    /// Returns the bucket key it was stored under.
    pub fn insert_closed(&mut self, bucket: CandleBucket) -> Result<i64, GraphError> {
        let key = self.bucket_key(bucket.open_ts);
        let oldest = self.buckets.min_key().or(self.last_key);
        if let Some(oldest) = oldest {
            if key >= oldest {
                return Err(GraphError::OutOfOrderTick {
                    timestamp: bucket.open_ts,
                    last_bucket: oldest,
                });
            }
        }
        self.buckets.put(key, bucket);
        Ok(key)
    }
}
