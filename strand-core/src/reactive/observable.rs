//! Observable Implementation
//!
//! An [`Observable`] is the plain value cell: it holds a value and tells the
//! runtime about reads and writes through an embedded [`Atom`].
//!
//! # How Observables Work
//!
//! 1. `get` inside a derivation records the read, so the derivation
//!    depends on this cell after its run completes.
//!
//! 2. `set` compares the new value with the current one using the cell's
//!    comparer. Equal writes are dropped without notifying anyone.
//!
//! 3. A different value is stored, then observers are notified.
//!
//! The value sits behind its own `Rc`, and readers get a clone of that
//! handle. No borrow of the cell is held while user code runs, so a
//! closure passed to [`with`](Observable::with) may write the cell it is
//! reading.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::atom::Atom;
use super::comparer::{self, Comparer};
use super::runtime::Runtime;
use crate::graph::NodeId;

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use strand_core::reactive::{Observable, Runtime};
///
/// let rt = Runtime::new();
/// let count = Observable::new(&rt, 0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Observable<T: 'static> {
    atom: Atom,
    value: Rc<RefCell<Rc<T>>>,
    equals: Comparer<T>,
}

impl<T: 'static> Observable<T> {
    /// Create a cell using value equality to detect changes.
    pub fn new(runtime: &Runtime, value: T) -> Self
    where
        T: PartialEq,
    {
        let name = runtime.unique_name("Observable");
        Self::with_comparer(runtime, name, value, comparer::structural())
    }

    /// Create a named cell using value equality.
    pub fn named(runtime: &Runtime, name: impl Into<String>, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_comparer(runtime, name, value, comparer::structural())
    }

    /// Create a named cell with an explicit equality policy.
    pub fn with_comparer(
        runtime: &Runtime,
        name: impl Into<String>,
        value: T,
        equals: Comparer<T>,
    ) -> Self {
        Self {
            atom: Atom::new(runtime, name),
            value: Rc::new(RefCell::new(Rc::new(value))),
            equals,
        }
    }

    pub fn id(&self) -> NodeId {
        self.atom.id()
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    fn current(&self) -> Rc<T> {
        Rc::clone(&self.value.borrow())
    }

    /// Read the value through a closure, recording the read.
    ///
    /// `f` sees the value as it was when the call started, even if it
    /// writes the cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.atom.report_observed();
        f(&*self.current())
    }

    /// Read the value without recording a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.current())
    }

    /// Store a new value and notify observers if it differs from the
    /// current one. Returns whether a change was reported.
    pub fn set(&self, value: T) -> bool {
        if (self.equals)(&*self.current(), &value) {
            return false;
        }
        self.value.replace(Rc::new(value));
        self.atom.report_changed();
        true
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&*self.current());
        self.set(next)
    }

    /// Number of derivations currently reading this cell.
    pub fn observer_count(&self) -> usize {
        self.atom.observer_count()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Get the current value, recording the read.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            value: Rc::clone(&self.value),
            equals: Rc::clone(&self.equals),
        }
    }
}

impl<T: Debug + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("name", &self.atom.name())
            .field("value", &*self.current())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
