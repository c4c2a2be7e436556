//! Value Cells
//!
//! A value is an input cell. Its content only changes through
//! [`Context::set_value`], which decides whether dependents need to hear
//! about the write:
//!
//! - a write of an unequal value always invalidates;
//! - in safe mode, a write whose fingerprint differs from the stored one
//!   also invalidates, which catches a container that was modified in place
//!   and then written back unchanged.
//!
//! The value and its fingerprint are stored either way, then the context
//! flushes.

use serde_json::Value as Json;

use super::Context;
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::graph::CellId;

impl Context {
    /// Write a value cell and flush.
    pub(crate) fn assign(&self, id: CellId, value: Json) -> Result<()> {
        let name = self.graph.lock().node(id).name.clone();
        let _block = self
            .trace
            .block(format_args!("{}.set_value({})", name, self.trace.show(&value)));

        {
            let mut graph = self.graph.lock();
            let new_fingerprint = fingerprint(&value);
            let node = graph.node(id);
            let changed = node.value != value
                || (self.is_safe() && node.fingerprint != new_fingerprint);
            if changed {
                graph.invalidate(id, &self.trace);
            }
            let node = graph.node_mut(id);
            node.value = value;
            node.fingerprint = new_fingerprint;
        }

        self.flush()
    }

    /// Read a value cell. A tracked read marks the cell fresh.
    pub(crate) fn read_input(&self, id: CellId, isolate: bool) -> Json {
        let mut graph = self.graph.lock();
        let node = graph.node_mut(id);
        if !isolate {
            node.invalidated = false;
        }
        node.value.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::Context;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn equal_write_does_not_invalidate() {
        let ctx = Context::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        ctx.new_value("a", json!([1, 2])).unwrap();
        ctx.new_observer("b", move |env| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            env.get("a")
        })
        .unwrap();
        ctx.run().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        ctx.set_value("a", json!([1, 2])).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        ctx.set_value("a", json!([1, 2, 3])).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tracked_read_clears_stale_flag() {
        let ctx = Context::new();
        let a = ctx.new_value("a", 1).unwrap();
        assert!(ctx.inspect(a).unwrap().invalidated);

        ctx.env().isolated().get("a").unwrap();
        assert!(ctx.inspect(a).unwrap().invalidated);

        ctx.get_value("a").unwrap();
        assert!(!ctx.inspect(a).unwrap().invalidated);
    }

    #[test]
    fn write_back_after_in_place_change_invalidates_in_safe_mode() {
        let ctx = Context::new();
        ctx.new_value("xs", json!([1])).unwrap();
        ctx.new_observer("len", |env| {
            let xs: Vec<i64> = env.get_as("xs")?;
            Ok(json!(xs.len()))
        })
        .unwrap();
        ctx.run().unwrap();

        ctx.modify_in_place("xs", |xs| {
            if let Some(items) = xs.as_array_mut() {
                items.push(json!(2));
            }
        })
        .unwrap();
        let current = ctx.get_value("xs").unwrap();
        ctx.set_value("xs", current).unwrap();

        let info = ctx.inspect("len").unwrap();
        assert_eq!(info.exec_count, 2);
        assert_eq!(info.value, json!(2));
    }
}
