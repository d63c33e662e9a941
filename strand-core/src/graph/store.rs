//! Dependency Graph Store
//!
//! The arena of nodes plus the edge bookkeeping. Edges are stored twice,
//! as `dependencies` on the reader and `observers` on the node being read,
//! and every mutation here keeps both sides in step.
//!
//! # Reconciliation
//!
//! After a derivation runs, the set of nodes it read is diffed against the
//! set it read last time:
//!
//! 1. Nodes only in the old set lose the derivation as an observer
//! 2. Nodes only in the new set gain it
//! 3. Nodes in both are left untouched
//!
//! The new set then replaces the old one, so a derivation is subscribed to
//! exactly what it read on its latest run.

use indexmap::IndexSet;
use slotmap::SlotMap;

use super::node::{Node, NodeId};

/// Result of reconciling a derivation's dependencies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencyDiff {
    /// Nodes the derivation newly subscribed to.
    pub added: Vec<NodeId>,
    /// Nodes the derivation unsubscribed from.
    pub removed: Vec<NodeId>,
}

impl DependencyDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Arena of graph nodes keyed by [`NodeId`].
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: SlotMap<NodeId, Node>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the graph, dropping every edge that touches it.
    pub fn remove(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.remove_observer(node_id);
            }
        }

        for observer_id in node.observers() {
            if let Some(observer) = self.nodes.get_mut(*observer_id) {
                observer.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    /// Add an edge: `derivation` reads `dependency`.
    pub fn subscribe(&mut self, dependency: NodeId, derivation: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(dependency) {
            dep_node.add_observer(derivation);
        }
        if let Some(derived_node) = self.nodes.get_mut(derivation) {
            derived_node.add_dependency(dependency);
        }
    }

    /// Remove an edge.
    pub fn unsubscribe(&mut self, dependency: NodeId, derivation: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(dependency) {
            dep_node.remove_observer(derivation);
        }
        if let Some(derived_node) = self.nodes.get_mut(derivation) {
            derived_node.remove_dependency(dependency);
        }
    }

    /// Replace a derivation's dependencies with the set observed during its
    /// latest run and fix up the observer sets on both sides of the diff.
    ///
    /// Ids that are no longer in the graph, and the derivation itself, are
    /// dropped from `observed`.
    pub fn reconcile(&mut self, derivation: NodeId, observed: IndexSet<NodeId>) -> DependencyDiff {
        let observed: IndexSet<NodeId> = observed
            .into_iter()
            .filter(|id| *id != derivation && self.nodes.contains_key(*id))
            .collect();

        let Some(node) = self.nodes.get_mut(derivation) else {
            return DependencyDiff::default();
        };
        let old = node.replace_dependencies(observed);

        let mut diff = DependencyDiff::default();
        for dep_id in &old {
            let still_read = self
                .nodes
                .get(derivation)
                .is_some_and(|n| n.dependencies().contains(dep_id));
            if !still_read {
                if let Some(dep) = self.nodes.get_mut(*dep_id) {
                    dep.remove_observer(derivation);
                }
                diff.removed.push(*dep_id);
            }
        }

        let added: Vec<NodeId> = self
            .nodes
            .get(derivation)
            .map(|n| {
                n.dependencies()
                    .iter()
                    .filter(|id| !old.contains(*id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        for dep_id in &added {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.add_observer(derivation);
            }
        }
        diff.added = added;

        diff
    }

    /// Unsubscribe a derivation from everything it depends on.
    ///
    /// Returns the number of edges removed.
    pub fn detach(&mut self, derivation: NodeId) -> usize {
        let Some(node) = self.nodes.get_mut(derivation) else {
            return 0;
        };
        let old = node.replace_dependencies(IndexSet::new());
        for dep_id in &old {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.remove_observer(derivation);
            }
        }
        old.len()
    }

    /// Snapshot of a node's observers, in subscription order.
    pub fn observers_of(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node_id)
            .map(|n| n.observers().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a node's dependencies, in first-read order.
    pub fn dependencies_of(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node_id)
            .map(|n| n.dependencies().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the total number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
