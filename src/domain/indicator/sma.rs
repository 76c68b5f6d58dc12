//! Simple Moving Average over the upstream's consumed mode.
//!
//! SMA[shift] = mean of the `period` upstream values at `shift..shift + period`.
//! Any missing upstream value in the window leaves the entry insufficient.

use crate::domain::capability::Capabilities;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::indicator::Indicator;
use crate::domain::value::Value;

pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, GraphError> {
        if period == 0 {
            return Err(GraphError::ConfigInvalid {
                section: "indicator".into(),
                key: "sma_period".into(),
                reason: "period must be at least 1".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn kind(&self) -> &'static str {
        "sma"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::BUFFER | Capabilities::BY_SHIFT
    }

    fn requires(&self) -> Capabilities {
        Capabilities::BY_SHIFT
    }

    fn compute(&self, ctx: &ComputeContext<'_>, _mode: usize, shift: usize) -> Option<Value> {
        let mut sum = 0.0;
        for offset in 0..self.period {
            sum += ctx.source_value(shift + offset)?;
        }
        Some(Value::Double(sum / self.period as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Tick;
    use crate::domain::graph::{Node, NodeConfig};
    use crate::domain::indicator::TickSource;
    use approx::assert_relative_eq;

    fn over_ticks(prices: &[f64], period: usize) -> (Node, Node) {
        let ticks = Node::new("ticks", TickSource::new(100), NodeConfig::default());
        let sma = Node::new("sma", Sma::new(period).unwrap(), NodeConfig::default());
        sma.set_data_source(&ticks, TickSource::BID).unwrap();
        for (i, &p) in prices.iter().enumerate() {
            ticks.push_tick(Tick::at(i as i64 * 1_000, p)).unwrap();
        }
        (ticks, sma)
    }

    #[test]
    fn averages_last_period_values() {
        let (_ticks, sma) = over_ticks(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_relative_eq!(sma.value(0, 0).unwrap(), 4.0);
        assert_relative_eq!(sma.value(1, 0).unwrap(), 3.0);
        assert_relative_eq!(sma.value(2, 0).unwrap(), 2.0);
    }

    #[test]
    fn warmup_is_insufficient() {
        let (_ticks, sma) = over_ticks(&[1.0, 2.0, 3.0], 3);
        assert!(sma.entry(0).is_valid());
        assert!(sma.entry(1).is_insufficient());
        assert_eq!(sma.entry(1).timestamp, 1_000);
    }

    #[test]
    fn consumes_selected_mode() {
        let ticks = Node::new("ticks", TickSource::new(10), NodeConfig::default());
        let sma = Node::new("sma", Sma::new(2).unwrap(), NodeConfig::default());
        sma.set_data_source(&ticks, TickSource::ASK).unwrap();
        ticks.push_tick(Tick::new(0, 1.0, 2.0)).unwrap();
        ticks.push_tick(Tick::new(1, 1.0, 4.0)).unwrap();
        assert_relative_eq!(sma.value(0, 0).unwrap(), 3.0);
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(Sma::new(0).is_err());
    }
}
