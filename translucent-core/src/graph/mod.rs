//! Dependency Graph
//!
//! This module implements the graph of cells owned by a reactive context.
//!
//! # Overview
//!
//! - Nodes are cells: values, expressions and observers
//! - Edges are reads: if A read B during its last computation, B is a parent
//!   of A and A is a child of B
//!
//! Unlike a static dependency graph, edges here are transient. Invalidating
//! a cell tears down its edges, and the next computation of that cell
//! records them again from the reads it actually makes. Cycles are allowed.
//!
//! # Design Decisions
//!
//! 1. Cells live in an arena indexed by `CellId`. Edges are index sets on
//!    the nodes, so there are no reference cycles to manage.
//!
//! 2. Both directions are stored and kept symmetric: parents to tear edges
//!    down, children to propagate invalidation.
//!
//! 3. Ids are never reused. Cells cannot be removed from a context.

mod node;
mod scheduler;

pub use node::{is_valid_name, CellId, CellKind};
pub(crate) use node::Node;
pub(crate) use scheduler::Scheduler;
