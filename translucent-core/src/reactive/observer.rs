//! Observer Cells
//!
//! Observers are the eager end of the graph. Invalidation puts a live
//! observer on the flush queue, and the next flush runs it.
//!
//! An observer that reads a name that does not exist yet is not an error
//! for the caller: the observer is parked in the pending table under that
//! name, and re-runs as soon as a cell with that name is registered.

use super::{CellKey, Context};
use crate::error::{Error, Result};
use crate::graph::CellId;

impl Context {
    /// Run an observer, parking it on an undefined key.
    pub(crate) fn run_observer(&self, id: CellId) -> Result<()> {
        match self.try_run(id) {
            Ok(()) => Ok(()),
            Err(Error::UndefinedKey(name)) => {
                let mut graph = self.graph.lock();
                self.trace.log(format_args!(
                    "pending[{}].append({})",
                    name,
                    graph.node(id).name
                ));
                graph.register_pending(name, id);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Stop an observer from being scheduled.
    ///
    /// A suspended observer still goes stale when its inputs change, but is
    /// not queued. It is also taken off the flush queue if already there.
    pub fn suspend<'a>(&self, key: impl Into<CellKey<'a>>) -> Result<()> {
        let mut graph = self.graph.lock();
        let id = graph.resolve(key.into())?;
        let node = graph.node_mut(id);
        if !node.set_suspended(true) {
            return Err(Error::wrong_kind(&node.name, "observer"));
        }
        self.trace.log(format_args!("{}.suspend()", node.name));
        graph.dequeue(id);
        Ok(())
    }

    /// Let a suspended observer be scheduled again.
    ///
    /// With `run` set, an observer that went stale while suspended runs
    /// immediately. Either way the context flushes afterwards.
    pub fn resume<'a>(&self, key: impl Into<CellKey<'a>>, run: bool) -> Result<()> {
        let catch_up = {
            let mut graph = self.graph.lock();
            let id = graph.resolve(key.into())?;
            let node = graph.node_mut(id);
            let was_suspended = node.is_suspended();
            if !node.set_suspended(false) {
                return Err(Error::wrong_kind(&node.name, "observer"));
            }
            self.trace.log(format_args!("{}.resume({})", node.name, run));
            (was_suspended && run && node.invalidated).then_some(id)
        };

        if let Some(id) = catch_up {
            self.run_observer(id)?;
        }
        self.flush()
    }

    /// Whether an observer is currently suspended.
    pub fn is_suspended<'a>(&self, key: impl Into<CellKey<'a>>) -> Result<bool> {
        let graph = self.graph.lock();
        let id = graph.resolve(key.into())?;
        Ok(graph.node(id).is_suspended())
    }
}
