//! Price feed port.
//!
//! Nodes that do not implement a feed delegate these queries to the nearest
//! upstream node that does.

pub trait PriceFeed {
    fn bid(&self, shift: usize) -> Option<f64>;
    fn ask(&self, shift: usize) -> Option<f64>;

    /// Absolute timestamp (ms) of the bar or tick `shift` positions back.
    fn bar_time(&self, shift: usize) -> Option<i64>;

    /// Shift of the bar containing `timestamp`, if it is still addressable.
    fn bar_shift(&self, timestamp: i64) -> Option<usize>;

    fn spread(&self, shift: usize) -> Option<f64> {
        Some(self.ask(shift)? - self.bid(shift)?)
    }
}
