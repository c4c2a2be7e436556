//! Graph Nodes
//!
//! This module defines the cells that live in the dependency graph.

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;
use serde_json::Value as Json;

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::reactive::{CellFn, MemoCache};

/// Identifier of a cell within its context.
///
/// Ids are dense indices into the context's arena and stay valid for the
/// lifetime of the context (cells are never removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellId(usize);

impl CellId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of cell in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// An input cell. Externally mutable, no function.
    Value,

    /// A derived cell. Recomputed lazily when read after an invalidation.
    Expression,

    /// A side-effecting cell. Re-run eagerly when invalidated.
    Observer,
}

impl CellKind {
    pub(crate) fn noun(self) -> &'static str {
        match self {
            CellKind::Value => "value",
            CellKind::Expression => "expression",
            CellKind::Observer => "observer",
        }
    }
}

/// Kind-specific state of a cell.
pub(crate) enum Body {
    Value,
    Expression { func: CellFn, memo: MemoCache },
    Observer { func: CellFn, suspended: bool },
}

/// Check a cell name against the identifier grammar.
///
/// A name is either a plain identifier starting with an ASCII letter, or an
/// identifier starting with two or more underscores (reserved for generated
/// names). A single leading underscore or a leading digit is rejected.
pub fn is_valid_name(name: &str) -> bool {
    let rest = if let Some(rest) = name.strip_prefix("__") {
        rest
    } else {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => chars.as_str(),
            _ => return false,
        }
    };
    rest.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// A cell in the dependency graph.
pub(crate) struct Node {
    pub(crate) name: String,
    body: Body,

    /// Last stored or computed value.
    pub(crate) value: Json,

    /// Fingerprint of `value` at the time it was stored.
    pub(crate) fingerprint: Fingerprint,

    /// True until the cell has been recomputed since the last invalidation.
    pub(crate) invalidated: bool,

    /// Number of completed runs.
    pub(crate) exec_count: u64,

    /// Cells this cell read during its last computation.
    parents: IndexSet<CellId>,

    /// Cells that read this cell since it was last invalidated.
    children: IndexSet<CellId>,
}

impl Node {
    pub(crate) fn new(name: String, body: Body, value: Json) -> Self {
        Self {
            name,
            body,
            fingerprint: fingerprint(&value),
            value,
            invalidated: true,
            exec_count: 0,
            parents: IndexSet::new(),
            children: IndexSet::new(),
        }
    }

    pub(crate) fn value(name: String, value: Json) -> Self {
        Self::new(name, Body::Value, value)
    }

    pub(crate) fn expression(name: String, func: CellFn) -> Self {
        let memo = MemoCache::default();
        Self::new(name, Body::Expression { func, memo }, Json::Null)
    }

    pub(crate) fn observer(name: String, func: CellFn) -> Self {
        let body = Body::Observer {
            func,
            suspended: false,
        };
        Self::new(name, body, Json::Null)
    }

    pub(crate) fn kind(&self) -> CellKind {
        match self.body {
            Body::Value => CellKind::Value,
            Body::Expression { .. } => CellKind::Expression,
            Body::Observer { .. } => CellKind::Observer,
        }
    }

    pub(crate) fn is_value(&self) -> bool {
        self.kind() == CellKind::Value
    }

    pub(crate) fn is_observer(&self) -> bool {
        self.kind() == CellKind::Observer
    }

    /// The wrapped function, for expressions and observers.
    pub(crate) fn function(&self) -> Option<&CellFn> {
        match &self.body {
            Body::Value => None,
            Body::Expression { func, .. } | Body::Observer { func, .. } => Some(func),
        }
    }

    pub(crate) fn memo(&self) -> Option<&MemoCache> {
        match &self.body {
            Body::Expression { memo, .. } => Some(memo),
            _ => None,
        }
    }

    pub(crate) fn memo_mut(&mut self) -> Option<&mut MemoCache> {
        match &mut self.body {
            Body::Expression { memo, .. } => Some(memo),
            _ => None,
        }
    }

    pub(crate) fn is_memoized(&self) -> bool {
        self.memo().is_some_and(MemoCache::is_enabled)
    }

    pub(crate) fn is_suspended(&self) -> bool {
        matches!(self.body, Body::Observer { suspended: true, .. })
    }

    /// Returns false if this is not an observer.
    pub(crate) fn set_suspended(&mut self, value: bool) -> bool {
        match &mut self.body {
            Body::Observer { suspended, .. } => {
                *suspended = value;
                true
            }
            _ => false,
        }
    }

    /// Store a new value together with its fingerprint.
    pub(crate) fn store(&mut self, value: Json) {
        self.fingerprint = fingerprint(&value);
        self.value = value;
    }

    /// True if the live value no longer matches the stored fingerprint.
    pub(crate) fn is_mutated(&self) -> bool {
        fingerprint(&self.value) != self.fingerprint
    }

    pub(crate) fn parents(&self) -> &IndexSet<CellId> {
        &self.parents
    }

    pub(crate) fn children(&self) -> &IndexSet<CellId> {
        &self.children
    }

    pub(crate) fn add_parent(&mut self, id: CellId) {
        self.parents.insert(id);
    }

    pub(crate) fn add_child(&mut self, id: CellId) {
        self.children.insert(id);
    }

    pub(crate) fn remove_child(&mut self, id: CellId) {
        self.children.shift_remove(&id);
    }

    pub(crate) fn take_parents(&mut self) -> IndexSet<CellId> {
        std::mem::take(&mut self.parents)
    }

    pub(crate) fn take_children(&mut self) -> IndexSet<CellId> {
        std::mem::take(&mut self.children)
    }
}
