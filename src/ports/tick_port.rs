//! Tick source port.

use crate::domain::candle::Tick;
use crate::domain::error::GraphError;

pub trait TickPort {
    /// All ticks of the source in delivery order.
    fn fetch_ticks(&self) -> Result<Vec<Tick>, GraphError>;
}
