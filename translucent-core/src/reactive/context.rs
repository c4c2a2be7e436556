//! Reactive Context
//!
//! The context owns the graph and is the only entry point into it. Every
//! public operation resolves names, takes the graph lock for bookkeeping, and
//! releases it again before any user function runs. Functions re-enter the
//! context through their [`Env`], so reads made while a cell is computing
//! find that cell at the top of the call stack and record an edge to it.
//!
//! # Scheduling
//!
//! Writes invalidate synchronously and then flush. A flush drains the queue
//! of stale observers until it is empty, so observers that invalidate other
//! observers are picked up in the same flush. A flush requested while any
//! cell is computing is skipped and left to the outermost operation.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as Json;

use super::callable::CellFn;
use super::config::ContextConfig;
use super::env::Env;
use super::trace::Trace;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::graph::{is_valid_name, CellId, CellKind, Node, Scheduler};

/// Names a cell, either by name or by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKey<'a> {
    /// A registered cell name.
    Name(&'a str),
    /// An id returned by registration.
    Id(CellId),
}

impl<'a> From<&'a str> for CellKey<'a> {
    fn from(name: &'a str) -> Self {
        CellKey::Name(name)
    }
}

impl<'a> From<&'a String> for CellKey<'a> {
    fn from(name: &'a String) -> Self {
        CellKey::Name(name)
    }
}

impl From<CellId> for CellKey<'_> {
    fn from(id: CellId) -> Self {
        CellKey::Id(id)
    }
}

/// Snapshot of one cell, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellInfo {
    /// Arena id of the cell.
    pub id: CellId,
    /// Registered name.
    pub name: String,
    /// Value, expression or observer.
    pub kind: CellKind,
    /// Last stored value (stale if `invalidated`).
    pub value: Json,
    /// Fingerprint recorded when the value was last stored.
    pub fingerprint: Fingerprint,
    /// True while the cell awaits recomputation.
    pub invalidated: bool,
    /// Number of times the cell's function has run.
    pub exec_count: u64,
    /// Whether an observer is suspended. Always false for other kinds.
    pub suspended: bool,
    /// Whether an expression caches its results.
    pub memoized: bool,
    /// Number of cached results held by a memoized expression.
    pub cached_results: usize,
    /// Cells this cell read during its last computation.
    pub parents: Vec<String>,
    /// Cells that read this cell since it was last invalidated.
    pub children: Vec<String>,
}

/// The reactive context.
///
/// ```rust
/// use translucent_core::{Context, Result};
/// use serde_json::json;
///
/// # fn main() -> Result<()> {
/// let ctx = Context::new();
/// ctx.new_value("a", 5)?;
/// ctx.new_expression("b", |env| {
///     let a: i64 = env.get_as("a")?;
///     Ok(json!(a + 1))
/// })?;
/// assert_eq!(ctx.get_value("b")?, json!(6));
///
/// ctx.set_value("a", 10)?;
/// assert_eq!(ctx.get_value("b")?, json!(11));
/// # Ok(())
/// # }
/// ```
pub struct Context {
    pub(crate) config: ContextConfig,
    safe: AtomicBool,
    pub(crate) graph: Mutex<Scheduler>,
    pub(crate) trace: Trace,
}

impl Context {
    /// Create a context with the default configuration (safe mode on).
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a context with the given configuration.
    pub fn with_config(config: ContextConfig) -> Self {
        tracing::debug!(target: "translucent_core", ?config, "creating reactive context");
        Self {
            safe: AtomicBool::new(config.safe),
            config,
            graph: Mutex::new(Scheduler::new()),
            trace: Trace::new(),
        }
    }

    /// Current configuration, including any later [`set_safe`](Self::set_safe).
    pub fn config(&self) -> ContextConfig {
        self.config.clone().safe(self.is_safe())
    }

    /// Whether fingerprint integrity checking is on.
    pub fn is_safe(&self) -> bool {
        self.safe.load(Ordering::Relaxed)
    }

    /// Switch safe mode on or off. Takes effect from the next operation.
    pub fn set_safe(&self, safe: bool) {
        tracing::debug!(target: "translucent_core", safe, "safe mode switched");
        self.safe.store(safe, Ordering::Relaxed);
    }

    /// A tracking environment over this context.
    ///
    /// Reads made through it outside of any running cell record no edges.
    pub fn env(&self) -> Env<'_> {
        Env::new(self)
    }

    // ---- registration ----

    /// Register a value cell.
    pub fn new_value(&self, name: &str, value: impl Into<Json>) -> Result<CellId> {
        let node = Node::value(name.to_string(), value.into());
        first(self.register(vec![node])?)
    }

    /// Register several value cells at once.
    pub fn new_values<I, N, V>(&self, pairs: I) -> Result<Vec<CellId>>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Json>,
    {
        let nodes = pairs
            .into_iter()
            .map(|(name, value)| Node::value(name.into(), value.into()))
            .collect();
        self.register(nodes)
    }

    /// Register an expression cell.
    pub fn new_expression<F>(&self, name: &str, f: F) -> Result<CellId>
    where
        F: Fn(&Env<'_>) -> Result<Json> + Send + Sync + 'static,
    {
        let node = Node::expression(name.to_string(), Arc::new(f));
        first(self.register(vec![node])?)
    }

    /// Register several expression cells at once.
    pub fn new_expressions<I, N>(&self, pairs: I) -> Result<Vec<CellId>>
    where
        I: IntoIterator<Item = (N, CellFn)>,
        N: Into<String>,
    {
        let nodes = pairs
            .into_iter()
            .map(|(name, func)| Node::expression(name.into(), func))
            .collect();
        self.register(nodes)
    }

    /// Register an observer cell.
    ///
    /// The observer does not run until it is invalidated or [`Context::run`]
    /// is called.
    pub fn new_observer<F>(&self, name: &str, f: F) -> Result<CellId>
    where
        F: Fn(&Env<'_>) -> Result<Json> + Send + Sync + 'static,
    {
        let node = Node::observer(name.to_string(), Arc::new(f));
        first(self.register(vec![node])?)
    }

    /// Register several observer cells at once.
    pub fn new_observers<I, N>(&self, pairs: I) -> Result<Vec<CellId>>
    where
        I: IntoIterator<Item = (N, CellFn)>,
        N: Into<String>,
    {
        let nodes = pairs
            .into_iter()
            .map(|(name, func)| Node::observer(name.into(), func))
            .collect();
        self.register(nodes)
    }

    /// Validate a batch, then insert it and wake observers waiting on it.
    fn register(&self, nodes: Vec<Node>) -> Result<Vec<CellId>> {
        if nodes.is_empty() {
            return Err(Error::Arguments(
                "at least one name/value pair must be provided".to_string(),
            ));
        }

        {
            let graph = self.graph.lock();
            let mut batch = IndexSet::with_capacity(nodes.len());
            for node in &nodes {
                if !is_valid_name(&node.name) {
                    return Err(Error::InvalidName(node.name.clone()));
                }
                if graph.lookup(&node.name).is_some() || !batch.insert(node.name.as_str()) {
                    return Err(Error::DuplicateName(node.name.clone()));
                }
            }
        }

        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (id, waiting) = {
                let mut graph = self.graph.lock();
                let name = node.name.clone();
                self.trace
                    .log(format_args!("new_{}({})", node.kind().noun(), name));
                let id = graph.insert(node)?;
                (id, graph.take_pending(&name))
            };
            for observer in waiting {
                self.run_observer(observer)?;
            }
            ids.push(id);
        }

        self.flush()?;
        Ok(ids)
    }

    // ---- reads and writes ----

    /// Resolve a read made through an environment or from outside the graph.
    pub(crate) fn read(&self, name: &str, isolate: bool) -> Result<Json> {
        let (id, kind, caller) = {
            let mut graph = self.graph.lock();
            let id = graph
                .lookup(name)
                .ok_or_else(|| Error::UndefinedKey(name.to_string()))?;
            let kind = graph.node(id).kind();
            if kind == CellKind::Observer {
                return Err(Error::ObserverRead(name.to_string()));
            }
            let caller = if isolate { None } else { graph.caller() };
            match caller {
                Some(caller) if caller != id => graph.add_edge(id, caller),
                Some(_) => self.trace.log(format_args!("[self reference]")),
                None => {}
            }
            (id, kind, caller)
        };

        let value = {
            let suffix = if isolate { " [isolated]" } else { "" };
            let _block = self
                .trace
                .block(format_args!("get_value({}){}", name, suffix));
            match kind {
                CellKind::Value => self.read_input(id, isolate),
                _ => self.evaluate(id)?,
            }
        };

        if let Some(caller) = caller {
            self.record_access(caller, name, &value);
        }
        self.trace.log(format_args!("=> {}", self.trace.show(&value)));
        Ok(value)
    }

    /// Read a cell, recording a dependency if called from a running cell.
    pub fn get_value(&self, name: &str) -> Result<Json> {
        self.read(name, false)
    }

    /// Read a cell without recording a dependency.
    pub fn get_value_isolated(&self, name: &str) -> Result<Json> {
        self.read(name, true)
    }

    fn value_id(&self, name: &str) -> Result<CellId> {
        let graph = self.graph.lock();
        let id = graph.resolve(CellKey::Name(name))?;
        if !graph.node(id).is_value() {
            return Err(Error::wrong_kind(name, "value"));
        }
        Ok(id)
    }

    /// Write a value cell.
    ///
    /// Dependents are invalidated if the value changed, then stale observers
    /// run before this returns (unless called from inside a running cell).
    pub fn set_value(&self, name: &str, value: impl Into<Json>) -> Result<()> {
        let value = value.into();
        let id = self.value_id(name)?;
        let _block = self
            .trace
            .block(format_args!("set_value({}, {})", name, self.trace.show(&value)));
        self.assign(id, value)
    }

    /// Write several value cells. Every name is checked before any write.
    pub fn set_values<I, N, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<Json>,
    {
        let pairs: Vec<(N, Json)> = pairs
            .into_iter()
            .map(|(name, value)| (name, value.into()))
            .collect();
        if pairs.is_empty() {
            return Err(Error::Arguments(
                "at least one name/value pair must be provided".to_string(),
            ));
        }

        let mut batch = IndexSet::with_capacity(pairs.len());
        for (name, _) in &pairs {
            let name = name.as_ref();
            self.value_id(name)?;
            if !batch.insert(name) {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }

        for (name, value) in pairs {
            self.set_value(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Write a value cell, registering it first if the name is unknown.
    pub fn set_or_create_value(&self, name: &str, value: impl Into<Json>) -> Result<()> {
        if self.contains(name) {
            self.set_value(name, value)
        } else {
            self.new_value(name, value).map(|_| ())
        }
    }

    /// Mutate a stored value without notifying anyone.
    ///
    /// This is how a caller changes a container it obtained from the graph
    /// in place. The stored fingerprint is left untouched, so safe mode
    /// notices the change on the next integrity check.
    pub fn modify_in_place<'a, F>(&self, key: impl Into<CellKey<'a>>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Json),
    {
        let (id, mut value) = {
            let graph = self.graph.lock();
            let id = graph.resolve(key.into())?;
            (id, graph.node(id).value.clone())
        };
        f(&mut value);
        self.graph.lock().node_mut(id).value = value;
        Ok(())
    }

    // ---- scheduling ----

    /// Run every stale observer once, in registration order, then flush.
    ///
    /// In safe mode the whole graph is checked for in-place mutation first.
    pub fn run(&self) -> Result<()> {
        if self.is_safe() {
            self.check_hash_integrity(None)?;
        }

        let _block = self.trace.block(format_args!("run()"));
        let observers: Vec<CellId> = {
            let graph = self.graph.lock();
            graph
                .ids()
                .into_iter()
                .filter(|id| graph.node(*id).is_observer())
                .collect()
        };
        for id in observers {
            let stale = self.graph.lock().node(id).invalidated;
            if stale {
                self.run_observer(id)?;
            }
        }
        self.flush()
    }

    /// Run queued observers until the queue is empty.
    ///
    /// Does nothing while a cell is computing; the outermost operation
    /// flushes instead.
    pub fn flush(&self) -> Result<()> {
        let busy = self.graph.lock().is_busy();
        if busy {
            self.trace.log(format_args!("no flush (already running)"));
            return Ok(());
        }

        let _block = self.trace.block(format_args!("flush()"));
        loop {
            let next = self.graph.lock().pop_queued();
            let Some(id) = next else {
                break;
            };
            let name = self.graph.lock().node(id).name.clone();
            let _step = self
                .trace
                .block(format_args!("flush_queue.pop({}).run()", name));
            self.run_observer(id)?;
        }
        Ok(())
    }

    // ---- inspection ----

    /// Whether a cell is currently computing.
    pub fn is_running<'a>(&self, key: impl Into<CellKey<'a>>) -> Result<bool> {
        let id = self.graph.lock().resolve(key.into())?;
        Ok(self.is_running_id(id))
    }

    /// Snapshot a cell.
    pub fn inspect<'a>(&self, key: impl Into<CellKey<'a>>) -> Result<CellInfo> {
        let graph = self.graph.lock();
        let id = graph.resolve(key.into())?;
        let node = graph.node(id);
        let names = |ids: &IndexSet<CellId>| -> Vec<String> {
            ids.iter().map(|id| graph.node(*id).name.clone()).collect()
        };
        Ok(CellInfo {
            id,
            name: node.name.clone(),
            kind: node.kind(),
            value: node.value.clone(),
            fingerprint: node.fingerprint,
            invalidated: node.invalidated,
            exec_count: node.exec_count,
            suspended: node.is_suspended(),
            memoized: node.is_memoized(),
            cached_results: node.memo().map_or(0, |memo| memo.len()),
            parents: names(node.parents()),
            children: names(node.children()),
        })
    }

    /// Whether a cell with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.graph.lock().lookup(name).is_some()
    }

    /// Number of registered cells.
    pub fn len(&self) -> usize {
        self.graph.lock().len()
    }

    /// Whether no cell is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.graph.lock().names().map(str::to_string).collect()
    }

    // ---- logging ----

    /// Attach a text sink for the diagnostic trace.
    pub fn start_log<W>(&self, writer: W)
    where
        W: Write + Send + 'static,
    {
        self.trace.start(Box::new(writer));
    }

    /// Detach the text sink. `tracing` events are still emitted.
    pub fn stop_log(&self) {
        self.trace.stop();
    }

    /// Set how values are rendered in the trace.
    ///
    /// The formatter runs while the graph is locked and must not call back
    /// into the context.
    pub fn set_formatter<F>(&self, formatter: F)
    where
        F: Fn(&Json) -> String + Send + Sync + 'static,
    {
        self.trace.set_formatter(Arc::new(formatter));
    }
}

fn first(ids: Vec<CellId>) -> Result<CellId> {
    ids.into_iter()
        .next()
        .ok_or_else(|| Error::Arguments("registration produced no cell".to_string()))
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph.lock();
        f.debug_struct("Context")
            .field("config", &self.config())
            .field("cells", &graph.len())
            .field("queued", &graph.queued().len())
            .finish()
    }
}
