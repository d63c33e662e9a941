//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use indexmap::IndexSet;

slotmap::new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Keys are generational: once a node is removed its id never aliases a
    /// node created later.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An observable cell. Atoms have observers but no dependencies.
    Atom,

    /// A computed value. Computeds have dependencies and may have observers;
    /// they act as cells towards the derivations that read them.
    Computed,

    /// A reaction. Reactions are leaves: dependencies but no observers.
    Reaction,
}

/// Lifecycle state of a derivation.
///
/// Atoms stay `Idle` for their whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationState {
    /// Up to date with every dependency.
    Idle,

    /// Currently running inside `track`.
    Tracking,

    /// A computed dependency is stale; whether its value changed is unknown
    /// until it is refreshed.
    PossiblyStale,

    /// A dependency definitely changed since the last run.
    Stale,

    /// Torn down. Terminal.
    Disposed,
}

impl DerivationState {
    /// Ordering used when raising staleness: a notification never lowers it.
    pub(crate) fn staleness(self) -> u8 {
        match self {
            Self::Idle | Self::Tracking => 0,
            Self::PossiblyStale => 1,
            Self::Stale => 2,
            Self::Disposed => u8::MAX,
        }
    }

    /// Whether the derivation may need to run again.
    pub fn is_stale(self) -> bool {
        matches!(self, Self::PossiblyStale | Self::Stale)
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Human-readable name, used in errors and dependency trees.
    name: String,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current lifecycle state.
    state: DerivationState,

    /// Nodes this node read during its most recent completed run, in first-read
    /// order.
    dependencies: IndexSet<NodeId>,

    /// Derivations that read this node during their most recent run.
    observers: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            state: match kind {
                NodeKind::Atom => DerivationState::Idle,
                // Start stale so the first read or schedule runs the body.
                NodeKind::Computed | NodeKind::Reaction => DerivationState::Stale,
            },
            dependencies: IndexSet::new(),
            observers: IndexSet::new(),
        }
    }

    /// Create a new atom node.
    pub fn atom(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Atom, name)
    }

    /// Create a new computed node.
    pub fn computed(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Computed, name)
    }

    /// Create a new reaction node.
    pub fn reaction(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Reaction, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether the node runs a body (computed or reaction).
    pub fn is_derivation(&self) -> bool {
        self.kind != NodeKind::Atom
    }

    pub fn state(&self) -> DerivationState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == DerivationState::Disposed
    }

    pub(crate) fn set_state(&mut self, state: DerivationState) {
        self.state = state;
    }

    /// Raise staleness to `level` if it is currently lower.
    ///
    /// Returns the previous state.
    pub(crate) fn raise(&mut self, level: DerivationState) -> DerivationState {
        let previous = self.state;
        if previous != DerivationState::Disposed && level.staleness() > previous.staleness() {
            self.state = level;
        }
        previous
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    pub(crate) fn add_observer(&mut self, node_id: NodeId) -> bool {
        self.observers.insert(node_id)
    }

    /// Remove an observer, keeping the remaining observers in order.
    pub(crate) fn remove_observer(&mut self, node_id: NodeId) -> bool {
        self.observers.shift_remove(&node_id)
    }

    pub(crate) fn add_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.insert(node_id)
    }

    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.shift_remove(&node_id)
    }

    /// Swap in a new dependency set, returning the old one.
    pub(crate) fn replace_dependencies(&mut self, deps: IndexSet<NodeId>) -> IndexSet<NodeId> {
        std::mem::replace(&mut self.dependencies, deps)
    }

    pub(crate) fn take_observers(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.observers)
    }
}
