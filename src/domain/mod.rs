//! Core domain types and logic.

pub mod value;
pub mod entry;
pub mod cache;
pub mod history;
pub mod candle;
pub mod capability;
pub mod graph;
pub mod indicator;
pub mod pipeline;
pub mod config_validation;
pub mod error;
