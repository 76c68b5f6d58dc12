//! Single price series derived from an OHLC upstream.

use crate::domain::capability::Capabilities;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::indicator::Indicator;
use crate::domain::indicator::candles::Candles;
use crate::domain::value::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceKind {
    Open,
    High,
    Low,
    Close,
    /// (H + L) / 2
    Median,
    /// (H + L + C) / 3
    Typical,
    /// (H + L + 2C) / 4
    Weighted,
}

impl PriceKind {
    pub const ALL: [PriceKind; 7] = [
        PriceKind::Open,
        PriceKind::High,
        PriceKind::Low,
        PriceKind::Close,
        PriceKind::Median,
        PriceKind::Typical,
        PriceKind::Weighted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PriceKind::Open => "open",
            PriceKind::High => "high",
            PriceKind::Low => "low",
            PriceKind::Close => "close",
            PriceKind::Median => "median",
            PriceKind::Typical => "typical",
            PriceKind::Weighted => "weighted",
        }
    }

    /// Applies the price formula to one OHLC bar.
    pub fn apply(self, open: f64, high: f64, low: f64, close: f64) -> f64 {
        match self {
            PriceKind::Open => open,
            PriceKind::High => high,
            PriceKind::Low => low,
            PriceKind::Close => close,
            PriceKind::Median => (high + low) / 2.0,
            PriceKind::Typical => (high + low + close) / 3.0,
            PriceKind::Weighted => (high + low + close * 2.0) / 4.0,
        }
    }
}

impl fmt::Display for PriceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PriceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| GraphError::ConfigInvalid {
                section: "indicator".into(),
                key: "applied_price".into(),
                reason: format!(
                    "unknown applied price '{}', expected one of open|high|low|close|median|typical|weighted",
                    s
                ),
            })
    }
}

pub struct AppliedPrice {
    kind: PriceKind,
}

impl AppliedPrice {
    pub fn new(kind: PriceKind) -> Self {
        Self { kind }
    }

    pub fn price_kind(&self) -> PriceKind {
        self.kind
    }
}

impl Indicator for AppliedPrice {
    fn kind(&self) -> &'static str {
        "applied_price"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::APPLIED_PRICE | Capabilities::BUFFER | Capabilities::BY_SHIFT
    }

    fn requires(&self) -> Capabilities {
        Capabilities::OHLC
    }

    fn compute(&self, ctx: &ComputeContext<'_>, _mode: usize, shift: usize) -> Option<Value> {
        let bar = ctx.source_entry(shift)?;
        let price = self.kind.apply(
            bar.get(Candles::OPEN)?,
            bar.get(Candles::HIGH)?,
            bar.get(Candles::LOW)?,
            bar.get(Candles::CLOSE)?,
        );
        Some(Value::Double(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("close".parse::<PriceKind>().unwrap(), PriceKind::Close);
        assert_eq!(" Typical ".parse::<PriceKind>().unwrap(), PriceKind::Typical);
        for kind in PriceKind::ALL {
            assert_eq!(kind.to_string().parse::<PriceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "vwap".parse::<PriceKind>().unwrap_err();
        assert!(matches!(err, GraphError::ConfigInvalid { .. }));
        assert!(err.to_string().contains("vwap"));
    }

    #[test]
    fn formulas() {
        let (o, h, l, c) = (1.0, 4.0, 2.0, 3.0);
        assert_relative_eq!(PriceKind::Open.apply(o, h, l, c), 1.0);
        assert_relative_eq!(PriceKind::Median.apply(o, h, l, c), 3.0);
        assert_relative_eq!(PriceKind::Typical.apply(o, h, l, c), 3.0);
        assert_relative_eq!(PriceKind::Weighted.apply(o, h, l, c), 3.0);
        assert_relative_eq!(PriceKind::Weighted.apply(0.0, 2.0, 1.0, 5.0), 3.25);
    }
}
