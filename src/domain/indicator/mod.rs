//! Node logic.
//!
//! Every graph node wraps one [`Indicator`]. The trait declares what the node
//! provides and requires, computes values on demand for a shift, and reacts
//! to ticks and to entries pushed by its upstream.

pub mod applied_price;
pub mod candles;
pub mod external;
pub mod sma;
pub mod tick_source;

pub use applied_price::{AppliedPrice, PriceKind};
pub use candles::Candles;
pub use external::External;
pub use sma::Sma;
pub use tick_source::TickSource;

use crate::domain::candle::Tick;
use crate::domain::capability::Capabilities;
use crate::domain::entry::Entry;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::value::{Value, ValueType};
use crate::ports::price_feed::PriceFeed;

/// How a node reacts to an entry its upstream just produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Nothing to do.
    Ignore,
    /// Drop the cached entry at the same timestamp, here and downstream.
    Invalidate,
    /// Store and forward these entries.
    Emit(Vec<Entry>),
}

pub trait Indicator {
    /// Short kind name used in logs and diagnostics.
    fn kind(&self) -> &'static str;

    fn provides(&self) -> Capabilities;

    fn requires(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Values per entry.
    fn value_count(&self) -> usize {
        1
    }

    fn value_type(&self) -> ValueType {
        ValueType::Double
    }

    /// Value of output `mode` at `shift`; `None` when there is not enough data.
    fn compute(&self, ctx: &ComputeContext<'_>, mode: usize, shift: usize) -> Option<Value>;

    /// Per-tick hook; returns whether this node produced new data.
    fn on_tick(&mut self, _tick_id: u64) -> bool {
        false
    }

    fn on_upstream_entry(&mut self, _entry: &Entry) -> Result<Reaction, GraphError> {
        Ok(Reaction::Invalidate)
    }

    /// Accepts a raw tick. Only leaf nodes fed by a tick port support this.
    fn accept_tick(&mut self, tick: &Tick) -> Result<Vec<Entry>, GraphError> {
        Err(GraphError::Data {
            reason: format!(
                "{} nodes do not accept raw ticks (tick at {} ms)",
                self.kind(),
                tick.timestamp_ms
            ),
        })
    }

    /// Called once before the next resolution after the node's parameters changed.
    fn on_params_changed(&mut self) {}

    /// Price feed implemented by this node, if any.
    fn feed(&self) -> Option<&dyn PriceFeed> {
        None
    }
}
