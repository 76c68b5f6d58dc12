//! Configuration validation.
//!
//! Validates every config field before a graph is built.

use crate::domain::error::GraphError;
use crate::domain::indicator::PriceKind;
use crate::ports::config_port::ConfigPort;

pub fn validate_graph_config(config: &dyn ConfigPort) -> Result<(), GraphError> {
    validate_max_hops(config)?;
    validate_cache(config)?;
    validate_history_size(config)?;
    validate_symbol(config)?;
    validate_candle_width(config)?;
    validate_applied_price(config)?;
    validate_sma_period(config)?;
    Ok(())
}

fn at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
) -> Result<i64, GraphError> {
    let value = config.get_int(section, key)?.unwrap_or(default);
    if value < min {
        return Err(GraphError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be at least {}", key, min),
        });
    }
    Ok(value)
}

fn validate_max_hops(config: &dyn ConfigPort) -> Result<(), GraphError> {
    at_least(config, "graph", "max_hops", 50, 1)?;
    Ok(())
}

fn validate_cache(config: &dyn ConfigPort) -> Result<(), GraphError> {
    let initial = at_least(config, "graph", "cache_initial_slots", 1024, 1)?;
    let max = at_least(config, "graph", "cache_max_slots", 86_400, 1)?;
    if max < initial {
        return Err(GraphError::ConfigInvalid {
            section: "graph".to_string(),
            key: "cache_max_slots".to_string(),
            reason: "cache_max_slots must not be below cache_initial_slots".to_string(),
        });
    }
    at_least(config, "graph", "cache_max_conflicts", 8, 1)?;
    Ok(())
}

/// Every bar in the history window needs a slot in the bucket cache.
fn validate_history_size(config: &dyn ConfigPort) -> Result<(), GraphError> {
    let history = at_least(config, "graph", "history_max_size", 5_000, 1)?;
    let max_slots = at_least(config, "graph", "cache_max_slots", 86_400, 1)?;
    if max_slots < history {
        return Err(GraphError::ConfigInvalid {
            section: "graph".to_string(),
            key: "cache_max_slots".to_string(),
            reason: format!(
                "cache_max_slots ({}) must not be below history_max_size ({})",
                max_slots, history
            ),
        });
    }
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), GraphError> {
    match config.get_string("feed", "symbol") {
        Some(s) if s.trim().is_empty() => Err(GraphError::ConfigInvalid {
            section: "feed".to_string(),
            key: "symbol".to_string(),
            reason: "symbol must not be empty".to_string(),
        }),
        _ => Ok(()),
    }
}

fn validate_candle_width(config: &dyn ConfigPort) -> Result<(), GraphError> {
    let Some(width) = config.get_int("candles", "width_ms")? else {
        return Err(GraphError::ConfigMissing {
            section: "candles".to_string(),
            key: "width_ms".to_string(),
        });
    };
    if width <= 0 {
        return Err(GraphError::ConfigInvalid {
            section: "candles".to_string(),
            key: "width_ms".to_string(),
            reason: "width_ms must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_applied_price(config: &dyn ConfigPort) -> Result<(), GraphError> {
    if let Some(kind) = config.get_string("indicator", "applied_price") {
        kind.parse::<PriceKind>()?;
    }
    Ok(())
}

fn validate_sma_period(config: &dyn ConfigPort) -> Result<(), GraphError> {
    at_least(config, "indicator", "sma_period", 14, 1)?;
    Ok(())
}
