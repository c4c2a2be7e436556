//! Graph Scheduler
//!
//! The scheduler owns every cell of a context and all the bookkeeping that
//! decides what runs next:
//!
//! - the registry, mapping names to arena slots in registration order
//! - parent/child edges, kept symmetric
//! - the call stack of cells currently computing
//! - the flush queue of invalidated observers
//! - the pending table of observers waiting for a name to be registered
//!
//! # Invalidation
//!
//! Invalidating a cell marks it stale, enqueues it if it is a live observer,
//! invalidates every child, then tears down its own edges. Edges are rebuilt
//! from scratch when the cell is next computed, so a computation that takes a
//! different branch never keeps dependencies it no longer reads.
//!
//! The scheduler never runs user code. Everything here executes under the
//! context's graph lock.

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{CellId, Node};
use crate::error::{Error, Result};
use crate::reactive::trace::Trace;
use crate::reactive::CellKey;

pub(crate) struct Scheduler {
    /// All cells, indexed by `CellId`.
    nodes: Vec<Node>,

    /// Registry by name, in registration order.
    names: IndexMap<String, CellId>,

    /// Cells currently computing, innermost last.
    call_stack: Vec<CellId>,

    /// Invalidated observers awaiting a run. Drained last-in first-out.
    flush_queue: Vec<CellId>,

    /// Observers that failed on a name that did not exist yet.
    pending: IndexMap<String, SmallVec<[CellId; 2]>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: IndexMap::new(),
            call_stack: Vec::new(),
            flush_queue: Vec::new(),
            pending: IndexMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<CellId> {
        self.names.get(name).copied()
    }

    pub(crate) fn resolve(&self, key: CellKey<'_>) -> Result<CellId> {
        match key {
            CellKey::Name(name) => self
                .lookup(name)
                .ok_or_else(|| Error::UndefinedKey(name.to_string())),
            CellKey::Id(id) if id.index() < self.nodes.len() => Ok(id),
            CellKey::Id(id) => Err(Error::UndefinedKey(id.to_string())),
        }
    }

    pub(crate) fn node(&self, id: CellId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: CellId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Every cell id, in registration order.
    pub(crate) fn ids(&self) -> Vec<CellId> {
        (0..self.nodes.len()).map(CellId::new).collect()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Add a cell to the arena and the registry.
    pub(crate) fn insert(&mut self, node: Node) -> Result<CellId> {
        if self.names.contains_key(&node.name) {
            return Err(Error::DuplicateName(node.name));
        }
        let id = CellId::new(self.nodes.len());
        self.names.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Add an edge: `child` read `parent`.
    pub(crate) fn add_edge(&mut self, parent: CellId, child: CellId) {
        self.node_mut(child).add_parent(parent);
        self.node_mut(parent).add_child(child);
    }

    /// Mark a cell and everything downstream of it as stale.
    pub(crate) fn invalidate(&mut self, id: CellId, trace: &Trace) {
        let node = &mut self.nodes[id.index()];
        node.invalidated = true;

        if node.is_observer() && !node.is_suspended() {
            if self.flush_queue.contains(&id) {
                trace.log(format_args!("{} in flush_queue", node.name));
            } else {
                trace.log(format_args!("flush_queue.append({})", node.name));
                self.flush_queue.push(id);
            }
        }

        let _block = trace.block(format_args!("{}.invalidate()", self.nodes[id.index()].name));

        // Taking the children first also terminates cycles of expressions.
        let children = self.node_mut(id).take_children();
        for child in children {
            self.invalidate(child, trace);
        }

        let parents = self.node_mut(id).take_parents();
        for parent in parents {
            self.node_mut(parent).remove_child(id);
        }
    }

    pub(crate) fn push_frame(&mut self, id: CellId) {
        self.call_stack.push(id);
    }

    /// Remove the innermost frame of `id`.
    pub(crate) fn pop_frame(&mut self, id: CellId) {
        if let Some(pos) = self.call_stack.iter().rposition(|frame| *frame == id) {
            self.call_stack.remove(pos);
        }
    }

    pub(crate) fn is_running(&self, id: CellId) -> bool {
        self.call_stack.contains(&id)
    }

    pub(crate) fn is_busy(&self) -> bool {
        !self.call_stack.is_empty()
    }

    /// The cell whose computation is currently reading, if any.
    pub(crate) fn caller(&self) -> Option<CellId> {
        self.call_stack.last().copied()
    }

    /// Pop the most recently queued observer that still needs a run.
    pub(crate) fn pop_queued(&mut self) -> Option<CellId> {
        while let Some(id) = self.flush_queue.pop() {
            if self.node(id).invalidated {
                return Some(id);
            }
        }
        None
    }

    pub(crate) fn dequeue(&mut self, id: CellId) {
        self.flush_queue.retain(|queued| *queued != id);
    }

    pub(crate) fn queued(&self) -> &[CellId] {
        &self.flush_queue
    }

    pub(crate) fn register_pending(&mut self, name: String, observer: CellId) {
        let waiting = self.pending.entry(name).or_default();
        if !waiting.contains(&observer) {
            waiting.push(observer);
        }
    }

    /// Remove and return the observers waiting on `name`, next to run first.
    pub(crate) fn take_pending(&mut self, name: &str) -> SmallVec<[CellId; 2]> {
        let mut waiting = self.pending.shift_remove(name).unwrap_or_default();
        waiting.reverse();
        waiting
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::function;
    use serde_json::{json, Value as Json};

    fn value(scheduler: &mut Scheduler, name: &str) -> CellId {
        scheduler
            .insert(Node::value(name.to_string(), json!(0)))
            .unwrap()
    }

    fn expression(scheduler: &mut Scheduler, name: &str) -> CellId {
        let func = function(|_env| Ok(Json::Null));
        scheduler
            .insert(Node::expression(name.to_string(), func))
            .unwrap()
    }

    fn observer(scheduler: &mut Scheduler, name: &str) -> CellId {
        let func = function(|_env| Ok(Json::Null));
        scheduler
            .insert(Node::observer(name.to_string(), func))
            .unwrap()
    }

    fn settle(scheduler: &mut Scheduler) {
        for id in scheduler.ids() {
            scheduler.node_mut(id).invalidated = false;
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut scheduler = Scheduler::new();
        let a = value(&mut scheduler, "a");
        let b = expression(&mut scheduler, "b");

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.lookup("a"), Some(a));
        assert_eq!(scheduler.lookup("b"), Some(b));
        assert_eq!(scheduler.lookup("c"), None);
        assert_eq!(scheduler.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut scheduler = Scheduler::new();
        value(&mut scheduler, "a");

        let result = scheduler.insert(Node::value("a".into(), json!(1)));
        assert!(matches!(result, Err(Error::DuplicateName(name)) if name == "a"));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn resolve_by_name_and_id() {
        let mut scheduler = Scheduler::new();
        let a = value(&mut scheduler, "a");

        assert_eq!(scheduler.resolve(CellKey::Name("a")).unwrap(), a);
        assert_eq!(scheduler.resolve(CellKey::Id(a)).unwrap(), a);
        assert!(matches!(
            scheduler.resolve(CellKey::Name("zz")),
            Err(Error::UndefinedKey(_))
        ));
        assert!(matches!(
            scheduler.resolve(CellKey::Id(CellId::new(9))),
            Err(Error::UndefinedKey(_))
        ));
    }

    #[test]
    fn edges_are_symmetric() {
        let mut scheduler = Scheduler::new();
        let a = value(&mut scheduler, "a");
        let b = expression(&mut scheduler, "b");

        scheduler.add_edge(a, b);
        scheduler.add_edge(a, b);

        assert_eq!(scheduler.node(a).children().len(), 1);
        assert!(scheduler.node(a).children().contains(&b));
        assert!(scheduler.node(b).parents().contains(&a));
    }

    #[test]
    fn invalidation_propagates_and_tears_down_edges() {
        let trace = Trace::new();
        let mut scheduler = Scheduler::new();

        // a -> b -> c, plus a -> c
        let a = value(&mut scheduler, "a");
        let b = expression(&mut scheduler, "b");
        let c = observer(&mut scheduler, "c");
        scheduler.add_edge(a, b);
        scheduler.add_edge(b, c);
        scheduler.add_edge(a, c);
        settle(&mut scheduler);

        scheduler.invalidate(a, &trace);

        assert!(scheduler.node(b).invalidated);
        assert!(scheduler.node(c).invalidated);
        assert_eq!(scheduler.queued(), &[c]);
        for id in [a, b, c] {
            assert!(scheduler.node(id).children().is_empty());
        }
        assert!(scheduler.node(b).parents().is_empty());
        assert!(scheduler.node(c).parents().is_empty());
    }

    #[test]
    fn invalidation_terminates_on_cycles() {
        let trace = Trace::new();
        let mut scheduler = Scheduler::new();
        let a = expression(&mut scheduler, "a");
        let b = expression(&mut scheduler, "b");
        scheduler.add_edge(a, b);
        scheduler.add_edge(b, a);
        settle(&mut scheduler);

        scheduler.invalidate(a, &trace);

        assert!(scheduler.node(a).invalidated);
        assert!(scheduler.node(b).invalidated);
    }

    #[test]
    fn suspended_observers_are_not_queued() {
        let trace = Trace::new();
        let mut scheduler = Scheduler::new();
        let a = value(&mut scheduler, "a");
        let c = observer(&mut scheduler, "c");
        scheduler.add_edge(a, c);
        scheduler.node_mut(c).set_suspended(true);

        scheduler.invalidate(a, &trace);

        assert!(scheduler.node(c).invalidated);
        assert!(scheduler.queued().is_empty());
    }

    #[test]
    fn flush_queue_is_lifo_and_skips_settled_entries() {
        let trace = Trace::new();
        let mut scheduler = Scheduler::new();
        let c = observer(&mut scheduler, "c");
        let d = observer(&mut scheduler, "d");
        let e = observer(&mut scheduler, "e");
        settle(&mut scheduler);

        scheduler.invalidate(c, &trace);
        scheduler.invalidate(d, &trace);
        scheduler.invalidate(e, &trace);
        scheduler.invalidate(c, &trace);
        assert_eq!(scheduler.queued(), &[c, d, e]);

        scheduler.node_mut(d).invalidated = false;

        assert_eq!(scheduler.pop_queued(), Some(e));
        assert_eq!(scheduler.pop_queued(), Some(c));
        assert_eq!(scheduler.pop_queued(), None);
    }

    #[test]
    fn call_stack_tracks_nested_frames() {
        let mut scheduler = Scheduler::new();
        let b = expression(&mut scheduler, "b");
        let c = observer(&mut scheduler, "c");

        assert!(!scheduler.is_busy());
        scheduler.push_frame(c);
        scheduler.push_frame(b);
        scheduler.push_frame(b);
        assert_eq!(scheduler.caller(), Some(b));
        assert!(scheduler.is_running(c));

        scheduler.pop_frame(b);
        assert!(scheduler.is_running(b));
        scheduler.pop_frame(b);
        assert!(!scheduler.is_running(b));
        assert_eq!(scheduler.caller(), Some(c));

        scheduler.pop_frame(c);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn pending_observers_are_deduplicated() {
        let mut scheduler = Scheduler::new();
        let c = observer(&mut scheduler, "c");
        let d = observer(&mut scheduler, "d");

        scheduler.register_pending("a".into(), c);
        scheduler.register_pending("a".into(), c);
        scheduler.register_pending("a".into(), d);

        let waiting = scheduler.take_pending("a");
        assert_eq!(waiting.as_slice(), &[d, c]);
        assert!(scheduler.take_pending("a").is_empty());
    }
}
