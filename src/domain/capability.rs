//! Declared node capabilities, used to match nodes with suitable upstreams.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    /// Exposes open/high/low/close buffers.
    pub const OHLC: Capabilities = Capabilities(1 << 0);
    /// Exposes bid/ask prices.
    pub const BID_ASK: Capabilities = Capabilities(1 << 1);
    /// Produces raw tick records.
    pub const TICKS: Capabilities = Capabilities(1 << 2);
    /// Exposes a single applied-price buffer.
    pub const APPLIED_PRICE: Capabilities = Capabilities(1 << 3);
    /// Exposes an arbitrary indexed value buffer.
    pub const BUFFER: Capabilities = Capabilities(1 << 4);
    /// Answers bar time / bid / ask queries for shifts.
    pub const PRICE_FEED: Capabilities = Capabilities(1 << 5);
    /// Addressable by absolute timestamp.
    pub const BY_TIME: Capabilities = Capabilities(1 << 6);
    /// Addressable by relative position.
    pub const BY_SHIFT: Capabilities = Capabilities(1 << 7);

    const NAMES: [(Capabilities, &'static str); 8] = [
        (Capabilities::OHLC, "ohlc"),
        (Capabilities::BID_ASK, "bid_ask"),
        (Capabilities::TICKS, "ticks"),
        (Capabilities::APPLIED_PRICE, "applied_price"),
        (Capabilities::BUFFER, "buffer"),
        (Capabilities::PRICE_FEED, "price_feed"),
        (Capabilities::BY_TIME, "by_time"),
        (Capabilities::BY_SHIFT, "by_shift"),
    ];

    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Capabilities of `required` missing from `self`.
    pub fn missing(self, required: Capabilities) -> Capabilities {
        Capabilities(required.0 & !self.0)
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Capabilities) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Capabilities::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}
