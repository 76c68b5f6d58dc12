//! Leaf node fed with raw ticks.
//!
//! Entries carry `[bid, ask, volume]` keyed by the tick timestamp. A tick in
//! the same millisecond as the newest one replaces it, so every position has
//! its own timestamp.

use crate::domain::candle::Tick;
use crate::domain::capability::Capabilities;
use crate::domain::entry::Entry;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::history::HistoryWindow;
use crate::domain::indicator::{Indicator, Reaction};
use crate::domain::value::Value;
use crate::ports::price_feed::PriceFeed;
use tracing::warn;

pub struct TickSource {
    ticks: HistoryWindow<Tick>,
    pending: bool,
}

impl TickSource {
    pub const BID: usize = 0;
    pub const ASK: usize = 1;
    pub const VOLUME: usize = 2;

    pub fn new(history_size: usize) -> Self {
        Self {
            ticks: HistoryWindow::new(history_size),
            pending: false,
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn latest(&self) -> Option<&Tick> {
        self.ticks.latest()
    }

    fn tick_at(&self, shift: usize) -> Option<&Tick> {
        self.ticks.peek_by_shift(shift)
    }
}

impl Indicator for TickSource {
    fn kind(&self) -> &'static str {
        "ticks"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::TICKS
            | Capabilities::BID_ASK
            | Capabilities::PRICE_FEED
            | Capabilities::BY_TIME
            | Capabilities::BY_SHIFT
    }

    fn value_count(&self) -> usize {
        3
    }

    fn compute(&self, _ctx: &ComputeContext<'_>, mode: usize, shift: usize) -> Option<Value> {
        let tick = self.tick_at(shift)?;
        let v = match mode {
            Self::BID => tick.bid,
            Self::ASK => tick.ask,
            Self::VOLUME => tick.volume,
            _ => return None,
        };
        Some(Value::Double(v))
    }

    fn on_tick(&mut self, _tick_id: u64) -> bool {
        std::mem::take(&mut self.pending)
    }

    fn on_upstream_entry(&mut self, _entry: &Entry) -> Result<Reaction, GraphError> {
        Ok(Reaction::Ignore)
    }

    fn accept_tick(&mut self, tick: &Tick) -> Result<Vec<Entry>, GraphError> {
        if let Some(last) = self.ticks.latest() {
            if tick.timestamp_ms < last.timestamp_ms {
                warn!(timestamp_ms = tick.timestamp_ms, last = last.timestamp_ms, "rejected out-of-order tick");
                return Err(GraphError::OutOfOrderTick {
                    timestamp: tick.timestamp_ms,
                    last_bucket: last.timestamp_ms,
                });
            }
        }
        let same_ms = self
            .ticks
            .latest()
            .is_some_and(|last| last.timestamp_ms == tick.timestamp_ms);
        if same_ms {
            self.ticks.replace_latest(*tick);
        } else {
            self.ticks.append(*tick);
        }
        self.pending = true;
        Ok(vec![Entry::from_doubles(
            tick.timestamp_ms,
            &[tick.bid, tick.ask, tick.volume],
        )])
    }

    fn feed(&self) -> Option<&dyn PriceFeed> {
        Some(self)
    }
}

impl PriceFeed for TickSource {
    fn bid(&self, shift: usize) -> Option<f64> {
        self.tick_at(shift).map(|t| t.bid)
    }

    fn ask(&self, shift: usize) -> Option<f64> {
        self.tick_at(shift).map(|t| t.ask)
    }

    fn bar_time(&self, shift: usize) -> Option<i64> {
        self.tick_at(shift).map(|t| t.timestamp_ms)
    }

    /// Shift of the newest tick at or before `timestamp`.
    fn bar_shift(&self, timestamp: i64) -> Option<usize> {
        let current = self.ticks.current_index();
        self.ticks
            .iter()
            .rev()
            .find(|(_, t)| t.timestamp_ms <= timestamp)
            .map(|(index, _)| (current - index) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Node, NodeConfig};
    use crate::domain::indicator::Sma;

    fn source() -> Node {
        Node::new("ticks", TickSource::new(100), NodeConfig::default())
    }

    #[test]
    fn pushes_become_entries() {
        let node = source();
        node.push_tick(Tick::new(1_000, 1.1, 1.2)).unwrap();
        node.push_tick(Tick::new(2_000, 1.3, 1.4)).unwrap();

        let latest = node.entry(0);
        assert_eq!(latest.timestamp, 2_000);
        assert_eq!(latest.get(TickSource::BID), Some(1.3));
        assert_eq!(latest.get(TickSource::ASK), Some(1.4));
        assert_eq!(node.entry(1).timestamp, 1_000);
        assert!(node.entry(2).is_insufficient());
    }

    #[test]
    fn feed_answers_by_shift_and_time() {
        let node = source();
        for (ts, bid) in [(1_000, 1.0), (2_000, 2.0), (3_000, 3.0)] {
            node.push_tick(Tick::new(ts, bid, bid + 0.1)).unwrap();
        }
        assert_eq!(node.bid(1), Some(2.0));
        assert_eq!(node.bar_time(2), Some(1_000));
        assert_eq!(node.bar_shift(2_500), Some(1));
        assert_eq!(node.bar_shift(3_000), Some(0));
        assert_eq!(node.bar_shift(500), None);
    }

    #[test]
    fn out_of_order_tick_is_rejected() {
        let node = source();
        node.push_tick(Tick::at(5_000, 1.0)).unwrap();
        let err = node.push_tick(Tick::at(4_999, 1.0)).unwrap_err();
        assert!(matches!(err, GraphError::OutOfOrderTick { timestamp: 4_999, .. }));
        // Same millisecond is fine.
        node.push_tick(Tick::at(5_000, 1.5)).unwrap();
        assert_eq!(node.entry(0).get(TickSource::BID), Some(1.5));
    }

    #[test]
    fn same_millisecond_tick_replaces_the_newest() {
        let node = source();
        let sma = Node::new("sma", Sma::new(2).unwrap(), NodeConfig::default());
        sma.set_data_source(&node, TickSource::BID).unwrap();

        node.push_tick(Tick::at(4_000, 1.0)).unwrap();
        node.push_tick(Tick::at(5_000, 3.0)).unwrap();
        assert_eq!(sma.value(0, 0), Some(2.0));

        node.push_tick(Tick::at(5_000, 2.0)).unwrap();
        assert_eq!(node.bar_time(0), Some(5_000));
        assert_eq!(node.bar_time(1), Some(4_000));
        assert_eq!(node.bid(1), Some(1.0));
        assert_eq!(node.entry(1).get(TickSource::BID), node.bid(1));
        assert_eq!(node.entry(0).get(TickSource::BID), Some(2.0));
        assert!(node.entry(2).is_insufficient());
        assert_eq!(sma.value(0, 0), Some(1.5));
    }

    #[test]
    fn tick_reports_pending_data_once() {
        let node = source();
        assert!(!node.tick(1));
        node.push_tick(Tick::at(1, 1.0)).unwrap();
        assert!(node.tick(2));
        assert!(!node.tick(3));
    }
}
