//! Port traits: the boundaries between the graph engine and its collaborators.

pub mod candle_history_port;
pub mod config_port;
pub mod handle_port;
pub mod price_feed;
pub mod tick_port;
