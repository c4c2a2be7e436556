//! Expression Cells
//!
//! An expression is a derived cell that recomputes lazily: invalidation only
//! marks it stale, and the next read runs its function again.
//!
//! A read also recomputes when the expression is already on the call stack.
//! A self-referential expression therefore runs once per distinct read
//! inside one top-level evaluation rather than handing back a half-computed
//! value.
//!
//! # Memoization
//!
//! A memoized expression caches each result under the set of
//! `(name, fingerprint)` pairs that run actually read. Different runs of the
//! same expression may read different cells depending on the branch taken,
//! so keys vary in shape.
//!
//! Before recomputing, the cache is scanned for a key that is a subset of the
//! current state of every value and every fresh expression. A hit means every cell the
//! cached run depended on still holds the same content, whatever happened to
//! unrelated cells, so the cached result is reused and its edges restored.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::Value as Json;

use super::{CellKey, Context};
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::graph::CellId;

type MemoKey = BTreeSet<(String, Fingerprint)>;

/// Result cache of one expression.
#[derive(Debug, Default)]
pub(crate) struct MemoCache {
    enabled: bool,

    /// Cached results in insertion order.
    entries: IndexMap<MemoKey, Json>,

    /// Reads made by the run in progress.
    accessed: IndexMap<String, Fingerprint>,
}

impl MemoCache {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.accessed.clear();
    }

    /// First cached entry whose key is contained in `state`.
    fn lookup(&self, state: &MemoKey) -> Option<(&MemoKey, &Json)> {
        self.entries.iter().find(|(key, _)| key.is_subset(state))
    }

    fn begin_run(&mut self) {
        self.accessed.clear();
    }

    /// Record a read made by the current run. The first read of a name wins.
    fn record(&mut self, name: &str, value: &Json) {
        if !self.accessed.contains_key(name) {
            self.accessed.insert(name.to_string(), fingerprint(value));
        }
    }

    /// Cache `value` under the reads of the current run. Returns false if an
    /// identical key was already cached.
    fn store(&mut self, value: Json, capacity: Option<usize>) -> bool {
        let key: MemoKey = self
            .accessed
            .iter()
            .map(|(name, fingerprint)| (name.clone(), *fingerprint))
            .collect();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        if let Some(capacity) = capacity {
            while self.entries.len() > capacity {
                self.entries.shift_remove_index(0);
            }
        }
        true
    }
}

impl Context {
    /// Read an expression, recomputing it if stale or already running.
    pub(crate) fn evaluate(&self, id: CellId) -> Result<Json> {
        let memoized = {
            let graph = self.graph.lock();
            let node = graph.node(id);
            if !node.invalidated && !graph.is_running(id) {
                return Ok(node.value.clone());
            }
            node.is_memoized()
        };

        if memoized {
            if let Some(value) = self.recall(id) {
                return Ok(value);
            }
        }

        self.try_run(id)?;

        let mut graph = self.graph.lock();
        let node = graph.node_mut(id);
        let value = node.value.clone();
        if memoized {
            let name = node.name.clone();
            if let Some(memo) = node.memo_mut() {
                if memo.store(value.clone(), self.config.memo_capacity) {
                    self.trace.log(format_args!(
                        "updating cache: {} -> {}",
                        name,
                        self.trace.show(&value)
                    ));
                }
            }
        }
        Ok(value)
    }

    /// Look for a cached result valid in the current state.
    fn recall(&self, id: CellId) -> Option<Json> {
        let mut graph = self.graph.lock();
        // A stale expression's stored fingerprint describes its old result,
        // so it cannot vouch for a key. Leaving it out forces a real run.
        let state: MemoKey = graph
            .nodes()
            .filter(|node| node.is_value() || (!node.is_observer() && !node.invalidated))
            .map(|node| (node.name.clone(), node.fingerprint))
            .collect();

        let hit = graph
            .node(id)
            .memo()
            .and_then(|memo| memo.lookup(&state))
            .map(|(key, value)| (key.clone(), value.clone()));

        let Some((key, value)) = hit else {
            if let Some(memo) = graph.node_mut(id).memo_mut() {
                memo.begin_run();
            }
            return None;
        };

        let node = graph.node(id);
        self.trace.log(format_args!(
            "retrieving value from cache: {} -> {}",
            node.name,
            self.trace.show(&value)
        ));
        for (name, _) in &key {
            if let Some(parent) = graph.lookup(name) {
                if parent != id {
                    graph.add_edge(parent, id);
                }
            }
        }
        let node = graph.node_mut(id);
        node.store(value.clone());
        node.invalidated = false;
        Some(value)
    }

    /// Note a tracked read made by `caller`, if it is a memoized expression.
    pub(crate) fn record_access(&self, caller: CellId, name: &str, value: &Json) {
        let mut graph = self.graph.lock();
        let node = graph.node_mut(caller);
        if !node.is_memoized() {
            return;
        }
        if let Some(memo) = node.memo_mut() {
            memo.record(name, value);
        }
    }

    /// Enable or disable result caching for an expression.
    pub fn memoize<'a>(&self, key: impl Into<CellKey<'a>>, enable: bool) -> Result<()> {
        let mut graph = self.graph.lock();
        let id = graph.resolve(key.into())?;
        let node = graph.node_mut(id);
        let name = node.name.clone();
        let memo = node
            .memo_mut()
            .ok_or_else(|| Error::wrong_kind(&name, "expression"))?;
        memo.set_enabled(enable);
        self.trace.log(format_args!("{}.memoize({})", name, enable));
        Ok(())
    }

    /// Drop every cached result of an expression.
    pub fn clear_memo<'a>(&self, key: impl Into<CellKey<'a>>) -> Result<()> {
        let mut graph = self.graph.lock();
        let id = graph.resolve(key.into())?;
        let node = graph.node_mut(id);
        let name = node.name.clone();
        let memo = node
            .memo_mut()
            .ok_or_else(|| Error::wrong_kind(&name, "expression"))?;
        memo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(pairs: &[(&str, Json)]) -> MemoKey {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), fingerprint(value)))
            .collect()
    }

    #[test]
    fn store_skips_identical_keys() {
        let mut memo = MemoCache::default();
        memo.begin_run();
        memo.record("a", &json!(1));
        assert!(memo.store(json!(10), None));

        memo.begin_run();
        memo.record("a", &json!(1));
        assert!(!memo.store(json!(99), None));
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn first_read_of_a_name_wins() {
        let mut memo = MemoCache::default();
        memo.begin_run();
        memo.record("a", &json!(1));
        memo.record("a", &json!(2));
        memo.store(json!("x"), None);

        let state = key(&[("a", json!(1))]);
        assert_eq!(memo.lookup(&state).map(|(_, v)| v.clone()), Some(json!("x")));
    }

    #[test]
    fn lookup_matches_subsets_only() {
        let mut memo = MemoCache::default();
        memo.begin_run();
        memo.record("a", &json!(1));
        memo.store(json!("one"), None);

        let wider = key(&[("a", json!(1)), ("b", json!(5))]);
        assert!(memo.lookup(&wider).is_some());

        let changed = key(&[("a", json!(2)), ("b", json!(5))]);
        assert!(memo.lookup(&changed).is_none());
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let mut memo = MemoCache::default();
        for n in 0..3 {
            memo.begin_run();
            memo.record("a", &json!(n));
            memo.store(json!(n * 10), Some(2));
        }
        assert_eq!(memo.len(), 2);
        assert!(memo.lookup(&key(&[("a", json!(0))])).is_none());
        assert!(memo.lookup(&key(&[("a", json!(2))])).is_some());
    }

    #[test]
    fn memoize_rejects_non_expressions() {
        let ctx = Context::new();
        ctx.new_value("v", 1).unwrap();
        ctx.new_observer("o", |_env| Ok(Json::Null)).unwrap();

        assert!(matches!(ctx.memoize("v", true), Err(Error::WrongKind { .. })));
        assert!(matches!(ctx.memoize("o", true), Err(Error::WrongKind { .. })));
        assert!(matches!(ctx.memoize("nope", true), Err(Error::UndefinedKey(_))));
    }
}
