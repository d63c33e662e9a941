//! Atoms
//!
//! An [`Atom`] is the engine-facing half of any reactive data source. A
//! container embeds one and calls [`report_observed`](Atom::report_observed)
//! on every read and [`report_changed`](Atom::report_changed) after every
//! write that made an observable difference. Deciding what counts as a
//! difference is the container's business.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::graph::{Node, NodeId};

/// A node in the dependency graph that derivations can read.
///
/// Cloning shares the node. The node leaves the graph when the last clone
/// is dropped.
#[derive(Clone)]
pub struct Atom {
    inner: Rc<AtomInner>,
}

struct AtomInner {
    runtime: Runtime,
    id: NodeId,
    /// Number of changes reported so far.
    version: Cell<u64>,
}

impl Atom {
    /// Register a new atom with the runtime.
    pub fn new(runtime: &Runtime, name: impl Into<String>) -> Self {
        let id = runtime.register(Node::atom(name));
        Self {
            inner: Rc::new(AtomInner {
                runtime: runtime.clone(),
                id,
                version: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.runtime.name_of(self.inner.id).unwrap_or_default()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Record a read by the running derivation, if there is one.
    ///
    /// Returns `true` if the read was recorded.
    pub fn report_observed(&self) -> bool {
        self.inner.runtime.report_observed(self.inner.id)
    }

    /// Notify observers that this atom changed.
    pub fn report_changed(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.runtime.report_changed(self.inner.id);
    }

    /// Number of changes reported over the atom's lifetime.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of derivations currently observing this atom.
    pub fn observer_count(&self) -> usize {
        self.inner.runtime.observer_count(self.inner.id)
    }
}

impl Drop for AtomInner {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_get_distinct_ids() {
        let rt = Runtime::new();
        let a = Atom::new(&rt, "a");
        let b = Atom::new(&rt, "b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn report_changed_bumps_version() {
        let rt = Runtime::new();
        let atom = Atom::new(&rt, "a");
        assert_eq!(atom.version(), 0);
        atom.report_changed();
        atom.report_changed();
        assert_eq!(atom.version(), 2);
    }

    #[test]
    fn dropping_last_clone_removes_the_node() {
        let rt = Runtime::new();
        let atom = Atom::new(&rt, "a");
        let clone = atom.clone();
        let id = atom.id();

        drop(atom);
        assert!(rt.name_of(id).is_some());
        drop(clone);
        assert!(rt.name_of(id).is_none());
        assert_eq!(rt.node_count(), 0);
    }
}
