//! Standard tick → candles → applied price → SMA pipeline.

use crate::domain::cache::CachePolicy;
use crate::domain::candle::Tick;
use crate::domain::config_validation::validate_graph_config;
use crate::domain::error::GraphError;
use crate::domain::graph::{Node, NodeConfig, TickClock};
use crate::domain::indicator::{AppliedPrice, Candles, PriceKind, Sma, TickSource};
use crate::ports::candle_history_port::CandleHistoryPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::tick_port::TickPort;
use tracing::info;

/// Typed view of the `[graph]`, `[feed]`, `[candles]` and `[indicator]` sections.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    pub node: NodeConfig,
    pub history_max_size: usize,
    pub symbol: Option<String>,
    pub ticks_path: Option<String>,
    pub history_path: Option<String>,
    pub candle_width_ms: i64,
    pub applied_price: PriceKind,
    pub sma_period: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            history_max_size: 5_000,
            symbol: None,
            ticks_path: None,
            history_path: None,
            candle_width_ms: 60_000,
            applied_price: PriceKind::Close,
            sma_period: 14,
        }
    }
}

impl GraphSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, GraphError> {
        validate_graph_config(config)?;
        let defaults = GraphSettings::default();
        let int = |section: &str, key: &str, default: i64| -> Result<i64, GraphError> {
            Ok(config.get_int(section, key)?.unwrap_or(default))
        };

        let cache = CachePolicy {
            initial_slots: int("graph", "cache_initial_slots", defaults.node.cache.initial_slots as i64)? as usize,
            max_slots: int("graph", "cache_max_slots", defaults.node.cache.max_slots as i64)? as usize,
            max_conflicts: int("graph", "cache_max_conflicts", defaults.node.cache.max_conflicts as i64)? as usize,
        };
        let applied_price = match config.get_string("indicator", "applied_price") {
            Some(s) => s.parse()?,
            None => defaults.applied_price,
        };

        Ok(Self {
            node: NodeConfig {
                max_hops: int("graph", "max_hops", defaults.node.max_hops as i64)? as usize,
                cache,
            },
            history_max_size: int("graph", "history_max_size", defaults.history_max_size as i64)? as usize,
            symbol: config.get_string("feed", "symbol"),
            ticks_path: non_empty(config.get_string("feed", "ticks")),
            history_path: non_empty(config.get_string("feed", "history")),
            candle_width_ms: int("candles", "width_ms", defaults.candle_width_ms)?,
            applied_price,
            sma_period: int("indicator", "sma_period", defaults.sma_period as i64)? as usize,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One row of replay output: a candle with its derived values.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRow {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub applied: Option<f64>,
    pub sma: Option<f64>,
}

/// Summary of a replay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayStats {
    pub ticks: usize,
    /// Tick ids that produced new data somewhere in the graph.
    pub productive: usize,
    pub candles: usize,
}

pub struct Pipeline {
    pub ticks: Node,
    pub candles: Node,
    pub price: Node,
    pub sma: Node,
    clock: TickClock,
}

impl Pipeline {
    pub fn build(
        settings: &GraphSettings,
        history: Option<Box<dyn CandleHistoryPort>>,
    ) -> Result<Self, GraphError> {
        let config = settings.node;
        let ticks = Node::new("ticks", TickSource::new(settings.history_max_size), config);

        let mut candles = Candles::new(settings.candle_width_ms, config.cache, settings.history_max_size)?;
        if let Some(port) = history {
            candles = candles.with_history(port);
        }
        let candles = Node::new("candles", candles, config);
        candles.set_data_source(&ticks, TickSource::BID)?;

        let price = Node::new(
            settings.applied_price.as_str(),
            AppliedPrice::new(settings.applied_price),
            config,
        );
        price.set_data_source(&candles, Candles::CLOSE)?;

        let sma = Node::new(
            format!("sma({})", settings.sma_period),
            Sma::new(settings.sma_period)?,
            config,
        );
        sma.set_data_source(&price, 0)?;

        info!(
            width_ms = settings.candle_width_ms,
            applied_price = %settings.applied_price,
            sma_period = settings.sma_period,
            "pipeline built"
        );
        Ok(Self {
            ticks,
            candles,
            price,
            sma,
            clock: TickClock::new(),
        })
    }

    /// Delivers one tick and propagates it under a fresh tick id.
    pub fn push(&mut self, tick: Tick) -> Result<bool, GraphError> {
        self.ticks.push_tick(tick)?;
        let id = self.clock.next_id();
        Ok(self.sma.tick(id))
    }

    pub fn replay(&mut self, port: &dyn TickPort) -> Result<ReplayStats, GraphError> {
        let ticks = port.fetch_ticks()?;
        let mut stats = ReplayStats::default();
        for tick in ticks {
            stats.ticks += 1;
            if self.push(tick)? {
                stats.productive += 1;
            }
        }
        stats.candles = self.bar_count();
        info!(ticks = stats.ticks, candles = stats.candles, "replay finished");
        Ok(stats)
    }

    /// Bars currently addressable by shift, newest first.
    pub fn bar_count(&self) -> usize {
        let mut count = 0;
        while self.candles.bar_time(count).is_some() {
            count += 1;
        }
        count
    }

    /// The newest `last` candles, oldest first.
    pub fn rows(&self, last: usize) -> Vec<CandleRow> {
        let mut rows = Vec::with_capacity(last);
        for shift in (0..last).rev() {
            let bar = self.candles.entry(shift);
            if !bar.is_valid() {
                continue;
            }
            let get = |mode| bar.get(mode).unwrap_or(f64::NAN);
            rows.push(CandleRow {
                timestamp_ms: bar.timestamp,
                open: get(Candles::OPEN),
                high: get(Candles::HIGH),
                low: get(Candles::LOW),
                close: get(Candles::CLOSE),
                volume: get(Candles::VOLUME),
                applied: self.price.value(shift, 0),
                sma: self.sma.value(shift, 0),
            });
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use approx::assert_relative_eq;

    #[test]
    fn settings_from_config() {
        let config = FileConfigAdapter::from_string(
            "[graph]\nmax_hops = 7\ncache_max_slots = 2048\nhistory_max_size = 2000\n[feed]\nsymbol = EURUSD\nticks = t.csv\n[candles]\nwidth_ms = 1000\n[indicator]\napplied_price = median\nsma_period = 3\n",
        )
        .unwrap();
        let settings = GraphSettings::from_config(&config).unwrap();
        assert_eq!(settings.node.max_hops, 7);
        assert_eq!(settings.node.cache.max_slots, 2048);
        assert_eq!(settings.node.cache.initial_slots, 1024);
        assert_eq!(settings.symbol.as_deref(), Some("EURUSD"));
        assert_eq!(settings.ticks_path.as_deref(), Some("t.csv"));
        assert_eq!(settings.history_path, None);
        assert_eq!(settings.candle_width_ms, 1000);
        assert_eq!(settings.applied_price, PriceKind::Median);
        assert_eq!(settings.sma_period, 3);
    }

    #[test]
    fn settings_reject_invalid_config() {
        let config = FileConfigAdapter::from_string("[indicator]\nsma_period = 3\n").unwrap();
        assert!(matches!(
            GraphSettings::from_config(&config),
            Err(GraphError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn pipeline_produces_sma_over_closes() {
        let settings = GraphSettings {
            candle_width_ms: 1_000,
            sma_period: 2,
            ..GraphSettings::default()
        };
        let mut pipeline = Pipeline::build(&settings, None).unwrap();
        for (ts, price) in [(0, 1.0), (500, 2.0), (1_000, 3.0), (2_000, 5.0)] {
            assert!(pipeline.push(Tick::at(ts, price)).unwrap());
        }

        let rows = pipeline.rows(3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].timestamp_ms, 0);
        assert_relative_eq!(rows[0].close, 2.0);
        assert_eq!(rows[0].sma, None);
        assert_relative_eq!(rows[1].sma.unwrap(), 2.5);
        assert_relative_eq!(rows[2].sma.unwrap(), 4.0);
        assert_eq!(pipeline.bar_count(), 3);
    }

    #[test]
    fn live_bar_updates_derived_values() {
        let settings = GraphSettings {
            candle_width_ms: 1_000,
            sma_period: 1,
            ..GraphSettings::default()
        };
        let mut pipeline = Pipeline::build(&settings, None).unwrap();
        pipeline.push(Tick::at(0, 1.0)).unwrap();
        assert_eq!(pipeline.sma.value(0, 0), Some(1.0));
        pipeline.push(Tick::at(10, 4.0)).unwrap();
        assert_eq!(pipeline.price.value(0, 0), Some(4.0));
        assert_eq!(pipeline.sma.value(0, 0), Some(4.0));
    }
}
