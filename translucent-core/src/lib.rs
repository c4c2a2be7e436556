//! Translucent Core
//!
//! This crate provides the reactive engine of the Translucent framework: a
//! context of named cells that recomputes exactly the affected part of the
//! graph when an input changes.
//!
//! - Values: inputs set from outside
//! - Expressions: lazy derived cells, optionally memoized
//! - Observers: eager cells that run side effects when their inputs change
//!
//! Dependencies are never declared. They are recorded while cell functions
//! run, from the reads those functions make through their environment.
//!
//! # Architecture
//!
//! - `reactive`: the context, its public API and the cell semantics
//! - `graph`: the arena of cells and the scheduling bookkeeping
//! - `fingerprint`: content hashes used to detect changes
//! - `error`: the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use translucent_core::{Context, Result};
//!
//! # fn main() -> Result<()> {
//! let ctx = Context::new();
//! ctx.new_value("count", 0)?;
//! ctx.new_expression("doubled", |env| {
//!     let count: i64 = env.get_as("count")?;
//!     Ok(json!(count * 2))
//! })?;
//!
//! let seen = Arc::new(AtomicI64::new(-1));
//! let seen_clone = seen.clone();
//! ctx.new_observer("print", move |env| {
//!     let doubled: i64 = env.get_as("doubled")?;
//!     seen_clone.store(doubled, Ordering::SeqCst);
//!     Ok(json!(null))
//! })?;
//! ctx.run()?;
//! assert_eq!(seen.load(Ordering::SeqCst), 0);
//!
//! // The observer re-runs before set_value returns.
//! ctx.set_value("count", 5)?;
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod reactive;

pub use error::{Error, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use graph::{is_valid_name, CellId, CellKind};
pub use reactive::{
    function, CellFn, CellInfo, CellKey, Context, ContextConfig, Env, Formatter, Isolation,
};
