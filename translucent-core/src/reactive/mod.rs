//! Reactive Engine
//!
//! This module implements the reactive context: a graph of named cells that
//! recomputes exactly the affected subgraph when an input changes.
//!
//! # Concepts
//!
//! ## Values
//!
//! A Value is an input cell holding externally-set data. Writing a value that
//! differs from the stored one invalidates everything that read it, then
//! flushes the observers that became stale.
//!
//! ## Expressions
//!
//! An Expression is a derived cell wrapping a function of the environment.
//! Expressions are lazy: invalidation only marks them stale, and they
//! recompute on the next read. An expression can be memoized, in which case
//! results are cached by the fingerprints of exactly the cells each run read.
//!
//! ## Observers
//!
//! An Observer is a side-effecting cell. Observers are eager: invalidation
//! queues them, and the queue is drained as soon as the outermost operation
//! completes. A suspended observer is marked stale but not queued.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered while a function runs. The context keeps an
//! explicit call stack of computing cells; a read made through the
//! environment records an edge from the innermost running cell to the cell
//! being read. Reads through an isolated environment record nothing.
//!
//! The call stack doubles as the reentrancy guard for flushing: a write made
//! from inside a running cell queues observers but leaves draining to the
//! outermost caller.

mod callable;
mod config;
mod context;
mod env;
mod expression;
mod integrity;
mod observer;
pub(crate) mod trace;
mod value;

pub use callable::{function, CellFn};
pub use config::ContextConfig;
pub use context::{CellInfo, CellKey, Context};
pub use env::{Env, Isolation};
pub(crate) use expression::MemoCache;
pub use trace::Formatter;
