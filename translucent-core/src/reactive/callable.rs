//! Callable Cells
//!
//! Expressions and observers share one run routine. A run pushes the cell
//! onto the context's call stack, clears its stale flag, calls the wrapped
//! function with a fresh tracking environment, and stores the result.
//!
//! The stale flag is cleared *before* the function runs. A function that
//! reads its own cell therefore sees a fresh cell unless something it wrote
//! during this run invalidated it again, which is what lets self-referential
//! expressions terminate.

use std::sync::Arc;

use serde_json::Value as Json;

use super::env::Env;
use super::Context;
use crate::error::{Error, Result};
use crate::graph::CellId;

/// A cell function: computes a value from the environment.
pub type CellFn = Arc<dyn Fn(&Env<'_>) -> Result<Json> + Send + Sync>;

/// Wrap a closure as a [`CellFn`].
///
/// ```rust
/// use translucent_core::{function, CellFn};
/// use serde_json::json;
///
/// let double: CellFn = function(|env| {
///     let x: i64 = env.get_as("x")?;
///     Ok(json!(x * 2))
/// });
/// ```
pub fn function<F>(f: F) -> CellFn
where
    F: Fn(&Env<'_>) -> Result<Json> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Guard for one call-stack frame.
///
/// Dropping the frame pops the cell off the call stack and counts the run,
/// on every exit path.
struct CallFrame<'a> {
    context: &'a Context,
    id: CellId,
}

impl<'a> CallFrame<'a> {
    fn enter(context: &'a Context, id: CellId) -> (Self, Option<CellFn>, String) {
        let mut graph = context.graph.lock();
        graph.push_frame(id);
        let node = graph.node_mut(id);
        node.invalidated = false;
        let func = node.function().cloned();
        let name = node.name.clone();
        (Self { context, id }, func, name)
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        let mut graph = self.context.graph.lock();
        graph.pop_frame(self.id);
        graph.node_mut(self.id).exec_count += 1;
    }
}

impl Context {
    /// Run the function of an expression or observer and store its result.
    ///
    /// On an undefined key the cell is left stale and the error propagates.
    pub(crate) fn try_run(&self, id: CellId) -> Result<()> {
        let (_frame, func, name) = CallFrame::enter(self, id);
        let Some(func) = func else {
            return Ok(());
        };

        let _block = self.trace.block(format_args!("{}.run()", name));
        let env = Env::new(self);
        let outcome = func(&env);

        let parents = {
            let mut graph = self.graph.lock();
            let node = graph.node_mut(id);
            match outcome {
                Ok(value) => node.store(value),
                Err(err) => {
                    if let Error::UndefinedKey(_) = err {
                        self.trace.log(format_args!("=> UndefinedKey"));
                        node.invalidated = true;
                    }
                    return Err(err);
                }
            }
            if self.is_safe() {
                node.parents().iter().copied().collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };

        if !parents.is_empty() {
            self.check_hash_integrity(Some(parents.as_slice()))?;
        }
        Ok(())
    }

    /// True if the cell is anywhere on the call stack.
    pub(crate) fn is_running_id(&self, id: CellId) -> bool {
        self.graph.lock().is_running(id)
    }
}
