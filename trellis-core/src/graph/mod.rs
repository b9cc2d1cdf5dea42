//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive sources and the computations that read them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent sources (signals, stores) or computations (computed
//!   values, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! When a source changes, the graph yields its downstream set in
//! topological order; the runtime then brings each affected node up to date
//! before any listener of the source runs.
//!
//! Cycles are rejected when an edge is added, so a cyclic dependency is
//! reported as a configuration error rather than looping forever.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
