//! Logging setup for the binary. Library code only emits events.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "indigraph=info";

/// Installs the fmt subscriber on stderr, filtered by `RUST_LOG` or
/// [`DEFAULT_FILTER`]. Does nothing if a subscriber is already set.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
