//! Data-source graph.
//!
//! A [`Node`] owns its cache and its [`Indicator`] logic, holds a shared
//! reference to at most one upstream node (plus optional extra dependencies),
//! and keeps weak back-references to its listeners. Ownership runs
//! downstream → upstream only; listener edges are used for notification.
//!
//! Everything here is single-threaded: nodes are `Rc`-shared and `!Send`.

use crate::domain::cache::{CachePolicy, TimeKeyedCache};
use crate::domain::candle::Tick;
use crate::domain::capability::Capabilities;
use crate::domain::entry::Entry;
use crate::domain::error::GraphError;
use crate::domain::indicator::{Indicator, Reaction};
use crate::ports::price_feed::PriceFeed;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

/// Per-node settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Hop budget for cycle detection and upstream searches.
    pub max_hops: usize,
    pub cache: CachePolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_hops: 50,
            cache: CachePolicy::default(),
        }
    }
}

/// Monotonic source of tick sequence ids.
#[derive(Debug, Default, Clone)]
pub struct TickClock {
    last: u64,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last_id(&self) -> u64 {
        self.last
    }
}

struct Upstream {
    node: Node,
    mode: usize,
}

struct NodeState {
    cache: TimeKeyedCache<Entry>,
    generation: u32,
    changed: bool,
    last_tick: Option<u64>,
    last_tick_result: bool,
}

struct NodeInner {
    name: String,
    config: NodeConfig,
    logic: RefCell<Box<dyn Indicator>>,
    upstream: RefCell<Option<Upstream>>,
    dependencies: RefCell<Vec<Node>>,
    listeners: RefCell<Vec<Weak<NodeInner>>>,
    state: RefCell<NodeState>,
}

/// Shared handle to a graph node.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

/// Non-owning handle to a graph node.
#[derive(Clone)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl Node {
    pub fn new(name: impl Into<String>, logic: impl Indicator + 'static, config: NodeConfig) -> Self {
        Self::from_boxed(name, Box::new(logic), config)
    }

    pub fn from_boxed(name: impl Into<String>, logic: Box<dyn Indicator>, config: NodeConfig) -> Self {
        Node(Rc::new(NodeInner {
            name: name.into(),
            config,
            logic: RefCell::new(logic),
            upstream: RefCell::new(None),
            dependencies: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            state: RefCell::new(NodeState {
                cache: TimeKeyedCache::new(config.cache),
                generation: 0,
                changed: false,
                last_tick: None,
                last_tick_result: false,
            }),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn config(&self) -> NodeConfig {
        self.0.config
    }

    pub fn kind(&self) -> &'static str {
        self.0.logic.borrow().kind()
    }

    pub fn provides(&self) -> Capabilities {
        self.0.logic.borrow().provides()
    }

    pub fn requires(&self) -> Capabilities {
        self.0.logic.borrow().requires()
    }

    pub fn value_count(&self) -> usize {
        self.0.logic.borrow().value_count()
    }

    pub fn same_node(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub fn upstream(&self) -> Option<Node> {
        self.0.upstream.borrow().as_ref().map(|up| up.node.clone())
    }

    /// Output mode of the upstream this node consumes.
    pub fn data_source_mode(&self) -> Option<usize> {
        self.0.upstream.borrow().as_ref().map(|up| up.mode)
    }

    pub fn dependencies(&self) -> Vec<Node> {
        self.0.dependencies.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.live_listeners().len()
    }

    pub fn cache_len(&self) -> usize {
        self.0.state.borrow().cache.len()
    }

    /// Cached entry for an absolute timestamp, without resolving anything.
    pub fn cached(&self, timestamp: i64) -> Option<Entry> {
        self.0.state.borrow().cache.peek(timestamp).cloned()
    }

    pub fn generation(&self) -> u32 {
        self.0.state.borrow().generation
    }

    /// Attaches `source` as this node's upstream, consuming its output `mode`.
    ///
    /// Fails without touching the topology when `source` can reach this node,
    /// when `mode` is not one of its outputs, or when it lacks the
    /// capabilities this node requires.
    pub fn set_data_source(&self, source: &Node, mode: usize) -> Result<(), GraphError> {
        self.check_reachable(source)?;

        let count = source.value_count();
        if mode >= count {
            return Err(GraphError::ModeOutOfRange {
                node: source.name().to_string(),
                mode,
                count,
            });
        }

        let required = self.requires();
        let provided = source.provides();
        if !provided.contains(required) {
            warn!(node = %self.name(), source = %source.name(), %required, %provided, "incompatible data source");
            return Err(GraphError::IncompatibleCapabilities {
                node: self.name().to_string(),
                source_node: source.name().to_string(),
                required: required.to_string(),
                provided: provided.to_string(),
            });
        }

        let previous = self.0.upstream.borrow_mut().replace(Upstream {
            node: source.clone(),
            mode,
        });
        if let Some(prev) = previous {
            prev.node.remove_listener(self);
        }
        source.add_listener(self);

        info!(node = %self.name(), source = %source.name(), mode, "attached data source");
        Ok(())
    }

    /// Detaches the upstream, returning it.
    pub fn remove_data_source(&self) -> Option<Node> {
        let previous = self.0.upstream.borrow_mut().take()?;
        previous.node.remove_listener(self);
        debug!(node = %self.name(), source = %previous.node.name(), "detached data source");
        Some(previous.node)
    }

    /// Registers an extra node this one depends on; it is ticked after the upstream.
    pub fn add_dependency(&self, dependency: &Node) -> Result<(), GraphError> {
        self.check_reachable(dependency)?;
        let mut deps = self.0.dependencies.borrow_mut();
        if !deps.iter().any(|d| d.same_node(dependency)) {
            deps.push(dependency.clone());
        }
        Ok(())
    }

    /// Raises the parameter-changed flag. The resource handle is invalidated
    /// on the next resolution; valid cached entries are kept, negative ones
    /// are re-evaluated.
    pub fn set_changed(&self) {
        let mut st = self.0.state.borrow_mut();
        st.changed = true;
        st.generation = st.generation.wrapping_add(1);
    }

    /// Entry for the bar `shift` positions back.
    ///
    /// Returns the cached entry when there is one (valid, or negative under
    /// the current generation); otherwise computes, caches and returns it.
    /// A shift with no bar time yields an uncached insufficient entry with
    /// timestamp 0.
    pub fn entry(&self, shift: usize) -> Entry {
        self.apply_changed();

        let Some(timestamp) = self.bar_time(shift) else {
            return Entry::insufficient(0);
        };

        let generation = {
            let mut st = self.0.state.borrow_mut();
            let generation = st.generation;
            if let Some(hit) = st.cache.get(timestamp) {
                if hit.is_valid() || hit.generation == generation {
                    return hit.clone();
                }
            }
            generation
        };

        let mut entry = self.resolve(shift, timestamp);
        entry.generation = generation;
        if entry.is_insufficient() {
            trace!(node = %self.name(), shift, timestamp, "insufficient data");
        }
        self.0
            .state
            .borrow_mut()
            .cache
            .put(timestamp, entry.clone());
        entry
    }

    /// Value of output `mode` at `shift`, when the entry is valid.
    pub fn value(&self, shift: usize, mode: usize) -> Option<f64> {
        self.entry(shift).get(mode)
    }

    /// Propagates tick `tick_id`: upstream first, then extra dependencies,
    /// then this node's own hook. Returns whether any node visited produced
    /// new data. Repeating an id returns the memoized result.
    pub fn tick(&self, tick_id: u64) -> bool {
        {
            let mut st = self.0.state.borrow_mut();
            if st.last_tick == Some(tick_id) {
                return st.last_tick_result;
            }
            st.last_tick = Some(tick_id);
            st.last_tick_result = false;
        }

        let mut produced = false;
        if let Some(up) = self.upstream() {
            produced |= up.tick(tick_id);
        }
        for dep in self.dependencies() {
            produced |= dep.tick(tick_id);
        }
        produced |= self.0.logic.borrow_mut().on_tick(tick_id);

        trace!(node = %self.name(), tick_id, produced, "ticked");
        self.0.state.borrow_mut().last_tick_result = produced;
        produced
    }

    /// Delivers a raw tick to a leaf node and emits whatever it produces.
    pub fn push_tick(&self, tick: Tick) -> Result<(), GraphError> {
        let entries = self.0.logic.borrow_mut().accept_tick(&tick)?;
        for entry in entries {
            self.emit(entry)?;
        }
        Ok(())
    }

    /// Stores a produced entry and notifies every live listener.
    ///
    /// Every listener is notified even when one of them fails; a failing
    /// listener has its entry at that timestamp dropped so it recomputes on
    /// the next read. The first failure is returned.
    pub fn emit(&self, entry: Entry) -> Result<(), GraphError> {
        {
            let mut st = self.0.state.borrow_mut();
            let mut stored = entry.clone();
            stored.generation = st.generation;
            st.cache.put(entry.timestamp, stored);
        }

        let mut first_error = None;
        for listener in self.live_listeners() {
            let reaction = listener.0.logic.borrow_mut().on_upstream_entry(&entry);
            let result = match reaction {
                Ok(Reaction::Ignore) => Ok(()),
                Ok(Reaction::Invalidate) => {
                    listener.invalidate(entry.timestamp);
                    Ok(())
                }
                Ok(Reaction::Emit(produced)) => produced
                    .into_iter()
                    .try_for_each(|e| listener.emit(e)),
                Err(e) => {
                    listener.invalidate(entry.timestamp);
                    Err(e)
                }
            };
            if let Err(e) = result {
                warn!(node = %self.name(), listener = %listener.name(), timestamp = entry.timestamp, error = %e, "listener failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drops the cached entry at `timestamp` here and in every node downstream.
    pub fn invalidate(&self, timestamp: i64) {
        self.0.state.borrow_mut().cache.remove(timestamp);
        for listener in self.live_listeners() {
            listener.invalidate(timestamp);
        }
    }

    /// Nearest node (this one first, then up the upstream chain) providing `required`.
    pub fn best_data_source(&self, required: Capabilities) -> Option<Node> {
        let mut current = Some(self.clone());
        let mut hops = 0;
        while let Some(node) = current {
            if node.provides().contains(required) {
                return Some(node);
            }
            hops += 1;
            if hops > self.0.config.max_hops {
                break;
            }
            current = node.upstream();
        }
        None
    }

    pub fn require_data_source(&self, required: Capabilities) -> Result<Node, GraphError> {
        self.best_data_source(required)
            .ok_or_else(|| GraphError::MissingDataSource {
                node: self.name().to_string(),
                required: required.to_string(),
            })
    }

    pub fn bid(&self, shift: usize) -> Option<f64> {
        self.with_feed(|feed| feed.bid(shift)).flatten()
    }

    pub fn ask(&self, shift: usize) -> Option<f64> {
        self.with_feed(|feed| feed.ask(shift)).flatten()
    }

    pub fn spread(&self, shift: usize) -> Option<f64> {
        self.with_feed(|feed| feed.spread(shift)).flatten()
    }

    pub fn bar_time(&self, shift: usize) -> Option<i64> {
        self.with_feed(|feed| feed.bar_time(shift)).flatten()
    }

    pub fn bar_shift(&self, timestamp: i64) -> Option<usize> {
        self.with_feed(|feed| feed.bar_shift(timestamp)).flatten()
    }

    /// Runs `f` against the nearest price feed, this node first.
    fn with_feed<T>(&self, f: impl FnOnce(&dyn PriceFeed) -> T) -> Option<T> {
        let mut current = Some(self.clone());
        let mut hops = 0;
        while let Some(node) = current {
            {
                let logic = node.0.logic.borrow();
                if let Some(feed) = logic.feed() {
                    return Some(f(feed));
                }
            }
            hops += 1;
            if hops > self.0.config.max_hops {
                break;
            }
            current = node.upstream();
        }
        None
    }

    fn resolve(&self, shift: usize, timestamp: i64) -> Entry {
        let logic = self.0.logic.borrow();
        let ctx = ComputeContext { node: self };
        let count = logic.value_count();

        let mut values = Vec::with_capacity(count);
        for mode in 0..count {
            match logic.compute(&ctx, mode, shift) {
                Some(value) => values.push(value),
                None => return Entry::insufficient(timestamp),
            }
        }
        let mut entry = Entry::new(timestamp, values);
        entry.validate(Some(count));
        entry
    }

    fn apply_changed(&self) {
        let changed = std::mem::take(&mut self.0.state.borrow_mut().changed);
        if changed {
            if let Ok(mut logic) = self.0.logic.try_borrow_mut() {
                logic.on_params_changed();
                debug!(node = %self.name(), "parameters changed, resource handle reset");
            } else {
                self.0.state.borrow_mut().changed = true;
            }
        }
    }

    /// Fails when `candidate` (or anything it depends on) reaches this node
    /// within the hop budget, or when the budget runs out.
    fn check_reachable(&self, candidate: &Node) -> Result<(), GraphError> {
        let max_hops = self.0.config.max_hops;
        let mut visited: HashSet<*const NodeInner> = HashSet::new();
        let mut stack = vec![(candidate.clone(), 0usize)];

        while let Some((node, hops)) = stack.pop() {
            if node.same_node(self) {
                warn!(node = %self.name(), source = %candidate.name(), hops, "rejected circular dependency");
                return Err(GraphError::CircularDependency {
                    node: self.name().to_string(),
                    source_node: candidate.name().to_string(),
                });
            }
            if !visited.insert(Rc::as_ptr(&node.0)) {
                continue;
            }

            let mut next = node.dependencies();
            next.extend(node.upstream());
            if next.is_empty() {
                continue;
            }
            if hops >= max_hops {
                return Err(GraphError::DependencyTooDeep {
                    node: self.name().to_string(),
                    max_hops,
                });
            }
            stack.extend(next.into_iter().map(|n| (n, hops + 1)));
        }
        Ok(())
    }

    fn add_listener(&self, listener: &Node) {
        let mut listeners = self.0.listeners.borrow_mut();
        listeners.retain(|w| w.strong_count() > 0);
        let ptr = Rc::as_ptr(&listener.0);
        if !listeners.iter().any(|w| w.as_ptr() == ptr) {
            listeners.push(Rc::downgrade(&listener.0));
        }
    }

    fn remove_listener(&self, listener: &Node) {
        let ptr = Rc::as_ptr(&listener.0);
        self.0
            .listeners
            .borrow_mut()
            .retain(|w| w.strong_count() > 0 && w.as_ptr() != ptr);
    }

    fn live_listeners(&self) -> Vec<Node> {
        let mut listeners = self.0.listeners.borrow_mut();
        listeners.retain(|w| w.strong_count() > 0);
        listeners.iter().filter_map(|w| w.upgrade().map(Node)).collect()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.0.name)
            .field("upstream", &self.upstream().map(|n| n.name().to_string()))
            .finish()
    }
}

/// View of the graph handed to [`Indicator::compute`].
pub struct ComputeContext<'a> {
    node: &'a Node,
}

impl<'a> ComputeContext<'a> {
    pub fn node_name(&self) -> &str {
        self.node.name()
    }

    pub fn upstream(&self) -> Option<Node> {
        self.node.upstream()
    }

    pub fn data_source_mode(&self) -> usize {
        self.node.data_source_mode().unwrap_or(0)
    }

    /// Upstream entry at `shift`.
    pub fn source_entry(&self, shift: usize) -> Option<Entry> {
        self.upstream().map(|up| up.entry(shift))
    }

    /// Upstream value of the consumed mode at `shift`.
    pub fn source_value(&self, shift: usize) -> Option<f64> {
        let mode = self.data_source_mode();
        self.upstream()?.value(shift, mode)
    }

    pub fn best_source(&self, required: Capabilities) -> Option<Node> {
        self.node.best_data_source(required)
    }

    pub fn bar_time(&self, shift: usize) -> Option<i64> {
        self.node.bar_time(shift)
    }

    pub fn bid(&self, shift: usize) -> Option<f64> {
        self.node.bid(shift)
    }

    pub fn ask(&self, shift: usize) -> Option<f64> {
        self.node.ask(shift)
    }
}
