//! Candle node: folds upstream ticks into fixed-width OHLC buckets.
//!
//! Bars are addressed by shift over the sequence of started buckets, so a
//! minute without ticks does not produce an empty bar. Older bars can be
//! loaded on demand from a [`CandleHistoryPort`].

use crate::domain::cache::CachePolicy;
use crate::domain::candle::{CandleAggregator, CandleBucket};
use crate::domain::capability::Capabilities;
use crate::domain::entry::Entry;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::history::{Direction, HistoryProvider, HistoryWindow};
use crate::domain::indicator::tick_source::TickSource;
use crate::domain::indicator::{Indicator, Reaction};
use crate::domain::value::Value;
use crate::ports::candle_history_port::CandleHistoryPort;
use crate::ports::price_feed::PriceFeed;
use std::cell::RefCell;
use tracing::{debug, warn};

struct CandleState {
    aggregator: CandleAggregator,
    /// Bucket keys, oldest first.
    keys: HistoryWindow<i64>,
    spread: f64,
}

pub struct Candles {
    state: RefCell<CandleState>,
    history: Option<Box<dyn CandleHistoryPort>>,
    fresh: bool,
}

/// Loads closed buckets older than the window's oldest key.
struct Backfill<'a> {
    port: Option<&'a dyn CandleHistoryPort>,
    aggregator: &'a mut CandleAggregator,
}

impl HistoryProvider<i64> for Backfill<'_> {
    fn regenerate(
        &mut self,
        from: i64,
        to: i64,
        direction: Direction,
        neighbour: Option<&i64>,
    ) -> Result<Vec<i64>, GraphError> {
        let (Direction::Backward, Some(port), Some(&oldest)) = (direction, self.port, neighbour)
        else {
            return Err(GraphError::HistoryGap {
                from,
                to,
                reason: "no candle history available".into(),
            });
        };

        let count = (from - to).unsigned_abs() as usize + 1;
        let buckets = port.fetch_before(oldest, count)?;
        debug!(before = oldest, requested = count, loaded = buckets.len(), "backfilling candles");

        let mut keys = Vec::with_capacity(buckets.len());
        for bucket in buckets.into_iter().take(count) {
            keys.push(self.aggregator.insert_closed(bucket)?);
        }
        Ok(keys)
    }
}

impl Candles {
    pub const OPEN: usize = 0;
    pub const HIGH: usize = 1;
    pub const LOW: usize = 2;
    pub const CLOSE: usize = 3;
    pub const VOLUME: usize = 4;

    pub fn new(width_ms: i64, policy: CachePolicy, history_size: usize) -> Result<Self, GraphError> {
        Ok(Self {
            state: RefCell::new(CandleState {
                aggregator: CandleAggregator::new(width_ms, policy)?,
                keys: HistoryWindow::new(history_size),
                spread: 0.0,
            }),
            history: None,
            fresh: false,
        })
    }

    /// Backfills older bars from `port` when a shift reaches past the loaded ones.
    pub fn with_history(mut self, port: Box<dyn CandleHistoryPort>) -> Self {
        self.history = Some(port);
        self
    }

    pub fn width_ms(&self) -> i64 {
        self.state.borrow().aggregator.width_ms()
    }

    pub fn bucket_count(&self) -> usize {
        self.state.borrow().aggregator.len()
    }

    /// Bucket for the bar `shift` positions back, loading history if needed.
    pub fn bucket_at(&self, shift: usize) -> Option<CandleBucket> {
        let key = self.key_at(shift)?;
        self.state.borrow().aggregator.bucket(key).copied()
    }

    fn key_at(&self, shift: usize) -> Option<i64> {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return self.state.try_borrow().ok()?.keys.peek_by_shift(shift).copied();
        };
        let CandleState {
            aggregator, keys, ..
        } = &mut *state;
        if let Some(&key) = keys.peek_by_shift(shift) {
            return Some(key);
        }

        let mut provider = Backfill {
            port: self.history.as_deref(),
            aggregator,
        };
        let found = keys.get_by_shift(shift, &mut provider).copied();
        found
            .inspect_err(|err| debug!(shift, error = %err, "candle unavailable"))
            .ok()
    }

    fn fold(&mut self, timestamp: i64, price: f64, volume: f64) -> Result<Entry, GraphError> {
        let state = self.state.get_mut();
        let update = state.aggregator.on_tick(timestamp, price, volume)?;
        if update.opened {
            // The oldest bar leaves the window; its bucket goes with it.
            if state.keys.len() == state.keys.max_size() {
                let oldest = state
                    .keys
                    .first_valid_index()
                    .and_then(|index| state.keys.get(index))
                    .copied();
                if let Some(oldest) = oldest {
                    state.aggregator.remove(oldest);
                }
            }
            state.keys.append(update.key);
        }
        let b = update.bucket;
        Ok(Entry::from_doubles(
            update.key,
            &[b.open, b.high, b.low, b.close, b.volume],
        ))
    }
}

impl Indicator for Candles {
    fn kind(&self) -> &'static str {
        "candles"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::OHLC
            | Capabilities::BUFFER
            | Capabilities::PRICE_FEED
            | Capabilities::BY_TIME
            | Capabilities::BY_SHIFT
    }

    fn requires(&self) -> Capabilities {
        Capabilities::TICKS | Capabilities::BID_ASK
    }

    fn value_count(&self) -> usize {
        5
    }

    fn compute(&self, _ctx: &ComputeContext<'_>, mode: usize, shift: usize) -> Option<Value> {
        let b = self.bucket_at(shift)?;
        let v = match mode {
            Self::OPEN => b.open,
            Self::HIGH => b.high,
            Self::LOW => b.low,
            Self::CLOSE => b.close,
            Self::VOLUME => b.volume,
            _ => return None,
        };
        Some(Value::Double(v))
    }

    fn on_tick(&mut self, _tick_id: u64) -> bool {
        std::mem::take(&mut self.fresh)
    }

    /// Folds a `[bid, ask, volume]` tick entry into the live bucket, priced on the bid.
    fn on_upstream_entry(&mut self, entry: &Entry) -> Result<Reaction, GraphError> {
        let (Some(bid), Some(ask)) = (entry.get(TickSource::BID), entry.get(TickSource::ASK))
        else {
            warn!(timestamp = entry.timestamp, "ignoring tick entry without prices");
            return Ok(Reaction::Ignore);
        };
        let volume = entry.get(TickSource::VOLUME).unwrap_or(0.0);

        let candle = self.fold(entry.timestamp, bid, volume)?;
        self.state.get_mut().spread = ask - bid;
        self.fresh = true;
        Ok(Reaction::Emit(vec![candle]))
    }

    fn feed(&self) -> Option<&dyn PriceFeed> {
        Some(self)
    }
}

impl PriceFeed for Candles {
    /// Close of the bar.
    fn bid(&self, shift: usize) -> Option<f64> {
        self.bucket_at(shift).map(|b| b.close)
    }

    /// Close of the bar plus the last seen spread.
    fn ask(&self, shift: usize) -> Option<f64> {
        let spread = self.state.try_borrow().ok()?.spread;
        self.bid(shift).map(|close| close + spread)
    }

    fn bar_time(&self, shift: usize) -> Option<i64> {
        self.key_at(shift)
    }

    fn bar_shift(&self, timestamp: i64) -> Option<usize> {
        let state = self.state.try_borrow().ok()?;
        let key = state.aggregator.bucket_key(timestamp);
        let current = state.keys.current_index();
        state
            .keys
            .iter()
            .rev()
            .find(|&(_, &k)| k == key)
            .map(|(index, _)| (current - index) as usize)
    }
}
