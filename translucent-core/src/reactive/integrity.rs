//! Hash Integrity
//!
//! In safe mode the context re-fingerprints cells to find values that were
//! changed in place behind its back.
//!
//! A mutated value cell is repaired by writing its live content back through
//! the normal write path, so dependents are invalidated. A mutated
//! expression or observer result that is not stale is a contract violation:
//! something modified a derived value that the graph considers current.

use super::Context;
use crate::error::{Error, Result};
use crate::graph::CellId;

impl Context {
    /// Re-fingerprint `subset` (or every cell) and repair or reject drift.
    pub(crate) fn check_hash_integrity(&self, subset: Option<&[CellId]>) -> Result<()> {
        if !self.is_safe() {
            return Ok(());
        }

        let ids = match subset {
            Some(ids) => ids.to_vec(),
            None => self.graph.lock().ids(),
        };

        // Inputs first: repairing them invalidates the derived cells that
        // read the stale content.
        for &id in &ids {
            let repair = {
                let graph = self.graph.lock();
                let node = graph.node(id);
                if !node.is_value() || !node.is_mutated() {
                    continue;
                }
                self.trace
                    .log(format_args!("outdated hash detected for {}", node.name));
                node.value.clone()
            };
            self.assign(id, repair)?;
        }

        let graph = self.graph.lock();
        for &id in &ids {
            let node = graph.node(id);
            if !node.is_value() && !node.invalidated && node.is_mutated() {
                return Err(Error::IntegrityViolation(node.name.clone()));
            }
        }
        Ok(())
    }

    /// Check every cell for in-place mutation.
    ///
    /// Does nothing unless the context is in safe mode.
    pub fn check_integrity(&self) -> Result<()> {
        self.check_hash_integrity(None)
    }
}
