#![allow(dead_code)]

use indigraph::domain::candle::{CandleBucket, Tick};
use indigraph::domain::capability::Capabilities;
use indigraph::domain::error::GraphError;
use indigraph::domain::graph::{ComputeContext, Node, NodeConfig};
use indigraph::domain::indicator::Indicator;
use indigraph::domain::value::Value;
use indigraph::ports::candle_history_port::CandleHistoryPort;
use indigraph::ports::handle_port::{Handle, HandleResolver};
use indigraph::ports::tick_port::TickPort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

pub struct MockTickPort {
    pub ticks: Vec<Tick>,
    pub error: Option<String>,
}

impl MockTickPort {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self { ticks, error: None }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            ticks: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl TickPort for MockTickPort {
    fn fetch_ticks(&self) -> Result<Vec<Tick>, GraphError> {
        if let Some(reason) = &self.error {
            return Err(GraphError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.ticks.clone())
    }
}

/// In-memory candle history, sorted ascending by open time.
pub struct MockHistory {
    pub candles: Vec<CandleBucket>,
}

impl CandleHistoryPort for MockHistory {
    fn fetch_before(&self, timestamp_ms: i64, count: usize) -> Result<Vec<CandleBucket>, GraphError> {
        Ok(self
            .candles
            .iter()
            .rev()
            .filter(|c| c.open_ts < timestamp_ms)
            .take(count)
            .copied()
            .collect())
    }
}

/// Resolver serving `base + shift` per key, with scripted handle invalidation.
#[derive(Default)]
pub struct MockResolver {
    pub values: HashMap<String, f64>,
    pub acquires: Cell<u64>,
    pub reads: Cell<u64>,
    /// Handles below this id are reported invalid.
    pub valid_from: Cell<u64>,
    /// Make every read report an invalid handle.
    pub always_invalid: Cell<bool>,
    pub issued: RefCell<HashMap<u64, String>>,
}

impl MockResolver {
    pub fn with_value(mut self, key: &str, base: f64) -> Self {
        self.values.insert(key.to_string(), base);
        self
    }

    /// Invalidates every handle issued so far.
    pub fn invalidate_all(&self) {
        self.valid_from.set(self.acquires.get() + 1);
    }
}

impl HandleResolver for MockResolver {
    fn acquire(&self, key: &str) -> Result<Handle, GraphError> {
        if !self.values.contains_key(key) {
            return Err(GraphError::Data {
                reason: format!("unknown key {}", key),
            });
        }
        let id = self.acquires.get() + 1;
        self.acquires.set(id);
        self.issued.borrow_mut().insert(id, key.to_string());
        Ok(Handle(id))
    }

    fn read(&self, handle: Handle, _mode: usize, shift: usize) -> Result<Option<f64>, GraphError> {
        self.reads.set(self.reads.get() + 1);
        let key = self.issued.borrow().get(&handle.0).cloned();
        if self.always_invalid.get() || handle.0 < self.valid_from.get() || key.is_none() {
            return Err(GraphError::InvalidHandle {
                key: key.unwrap_or_default(),
            });
        }
        let base = key.and_then(|k| self.values.get(&k).copied());
        Ok(base.map(|b| b + shift as f64))
    }
}

/// Records the order nodes are ticked in.
pub struct Recorder {
    pub name: &'static str,
    pub log: Rc<RefCell<Vec<&'static str>>>,
    pub produces: bool,
}

impl Indicator for Recorder {
    fn kind(&self) -> &'static str {
        "recorder"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::BUFFER
    }

    fn compute(&self, _ctx: &ComputeContext<'_>, _mode: usize, _shift: usize) -> Option<Value> {
        None
    }

    fn on_tick(&mut self, _tick_id: u64) -> bool {
        self.log.borrow_mut().push(self.name);
        self.produces
    }
}

pub fn recorder(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>, produces: bool) -> Node {
    Node::new(
        name,
        Recorder {
            name,
            log: log.clone(),
            produces,
        },
        NodeConfig::default(),
    )
}

pub fn ticks_at(points: &[(i64, f64)]) -> Vec<Tick> {
    points.iter().map(|&(ts, p)| Tick::at(ts, p)).collect()
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
