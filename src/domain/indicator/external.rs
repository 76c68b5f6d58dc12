//! Node whose values are computed outside the graph and read through a
//! [`HandleResolver`].
//!
//! The handle is acquired lazily and kept until a parameter change or until
//! the resolver reports it invalid. An invalid handle is re-acquired once per
//! read; a second failure leaves that shift without data.

use crate::domain::capability::Capabilities;
use crate::domain::error::GraphError;
use crate::domain::graph::ComputeContext;
use crate::domain::indicator::Indicator;
use crate::domain::value::Value;
use crate::ports::handle_port::{Handle, HandleResolver};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub struct External {
    key: String,
    resolver: Rc<dyn HandleResolver>,
    handle: Cell<Option<Handle>>,
    value_count: usize,
}

impl External {
    pub fn new(key: impl Into<String>, resolver: Rc<dyn HandleResolver>, value_count: usize) -> Self {
        Self {
            key: key.into(),
            resolver,
            handle: Cell::new(None),
            value_count: value_count.max(1),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Currently held handle, if any.
    pub fn handle(&self) -> Option<Handle> {
        self.handle.get()
    }

    fn acquire(&self) -> Result<Handle, GraphError> {
        let handle = self.resolver.acquire(&self.key)?;
        self.handle.set(Some(handle));
        debug!(key = %self.key, handle = handle.0, "acquired handle");
        Ok(handle)
    }

    fn read(&self, mode: usize, shift: usize) -> Result<Option<f64>, GraphError> {
        let handle = match self.handle.get() {
            Some(h) => h,
            None => self.acquire()?,
        };
        match self.resolver.read(handle, mode, shift) {
            Err(GraphError::InvalidHandle { .. }) => {
                self.handle.set(None);
                info!(key = %self.key, stale = handle.0, "re-acquiring invalid handle");
                let fresh = self.acquire()?;
                self.resolver.read(fresh, mode, shift)
            }
            other => other,
        }
    }
}

impl Indicator for External {
    fn kind(&self) -> &'static str {
        "external"
    }

    fn provides(&self) -> Capabilities {
        Capabilities::BUFFER | Capabilities::BY_SHIFT
    }

    /// Bar times come from the upstream feed.
    fn requires(&self) -> Capabilities {
        Capabilities::PRICE_FEED
    }

    fn value_count(&self) -> usize {
        self.value_count
    }

    fn compute(&self, _ctx: &ComputeContext<'_>, mode: usize, shift: usize) -> Option<Value> {
        match self.read(mode, shift) {
            Ok(v) => v.map(Value::Double),
            Err(err) => {
                warn!(key = %self.key, mode, shift, error = %err, "external read failed");
                None
            }
        }
    }

    fn on_params_changed(&mut self) {
        self.handle.set(None);
    }
}
