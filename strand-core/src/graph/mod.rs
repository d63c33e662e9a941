//! Dependency Graph
//!
//! This module implements the graph that records which derivations read
//! which reactive nodes, plus the queue that batches reaction re-runs.
//!
//! # Overview
//!
//! - Nodes are atoms (cells), computeds, or reactions
//! - An edge from A to B means B read A during its most recent run
//!
//! The graph is rediscovered at runtime: every run of a derivation reports
//! what it read, and the store reconciles that against the previous run.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a `slotmap` arena and refer to each other by id, so the
//!    graph may contain arbitrary sharing without reference cycles.
//!
//! 2. Both directions are stored (`dependencies` and `observers`) so that
//!    change propagation and disposal are both local operations.
//!
//! 3. Edge sets are insertion ordered, which makes propagation order, and
//!    therefore reaction order, deterministic.

mod node;
mod scheduler;
mod store;
mod tree;

pub use node::{DerivationState, Node, NodeId, NodeKind};
pub use scheduler::BatchScheduler;
pub use store::{DependencyDiff, DependencyGraph};
pub use tree::{DependencyTree, ObserverTree};
