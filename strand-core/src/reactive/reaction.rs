//! Reaction Implementation
//!
//! A Reaction is a side-effecting derivation that re-runs whenever
//! something it read changes.
//!
//! # How Reactions Work
//!
//! 1. A reaction is created with a name and an `on_invalidate` callback.
//!    Nothing runs until [`schedule`](Reaction::schedule) is called.
//!
//! 2. `schedule` fires the callback once, synchronously. The callback
//!    normally calls [`track`](Reaction::track) with the body, which records
//!    the body's reads as the reaction's dependencies.
//!
//! 3. When a dependency changes, the reaction is queued. When the outermost
//!    batch closes the callback fires again, at most once per drain.
//!
//! The callback decides *when* the body runs. Calling `track` straight away
//! gives an autorun; handing the `Reaction` to a timer gives a debounced
//! variant (see [`crate::api`]).
//!
//! # Differences from Computed
//!
//! - Computeds return a value; reactions do not.
//! - Computeds are lazy (evaluate on read); reactions are eager (run when
//!   their dependencies change).
//! - Computeds can be read by other derivations; reactions are leaves.
//!
//! # Disposal
//!
//! [`dispose`](Reaction::dispose), or a [`Disposer`] obtained from the
//! reaction, unsubscribes it from everything and makes it inert. Disposal
//! is idempotent and may be called from inside the reaction's own body.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::{DerivationState, NodeId};

/// Handle to a reaction registered with a runtime.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use strand_core::reactive::{Observable, Reaction, Runtime};
///
/// let rt = Runtime::new();
/// let count = Observable::new(&rt, 0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let (c, s) = (count.clone(), seen.clone());
/// let reaction = Reaction::new(&rt, "logger", move |r| r.track(|| s.set(c.get())));
/// reaction.schedule().unwrap();
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Reaction {
    runtime: Runtime,
    id: NodeId,
}

impl Reaction {
    /// Register a reaction. It does not run until scheduled.
    pub fn new<F>(runtime: &Runtime, name: impl Into<String>, on_invalidate: F) -> Self
    where
        F: Fn(&Reaction) -> Result<()> + 'static,
    {
        let id = runtime.register_reaction(name.into(), Rc::new(on_invalidate));
        Self::from_parts(runtime.clone(), id)
    }

    pub(crate) fn from_parts(runtime: Runtime, id: NodeId) -> Self {
        Self { runtime, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> String {
        self.runtime.name_of(self.id).unwrap_or_default()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn state(&self) -> DerivationState {
        self.runtime
            .state_of(self.id)
            .unwrap_or(DerivationState::Disposed)
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == DerivationState::Disposed
    }

    /// Run `f` as this reaction's body, recording what it reads.
    ///
    /// Returns `f`'s result, or [`CyclicDependency`] if this reaction is
    /// already running further up the stack. A disposed reaction follows
    /// the runtime's disposed-read policy.
    ///
    /// [`CyclicDependency`]: crate::ReactiveError::CyclicDependency
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        self.runtime.track(self.id, f)
    }

    /// Arm the reaction: fire its callback now, or at the end of the current
    /// batch if one is open.
    pub fn schedule(&self) -> Result<()> {
        self.runtime.schedule_reaction(self.id)
    }

    /// Tear the reaction down. Idempotent.
    pub fn dispose(&self) {
        self.runtime.dispose(self.id);
    }

    /// A standalone handle that disposes this reaction.
    pub fn disposer(&self) -> Disposer {
        Disposer {
            runtime: self.runtime.clone(),
            id: self.id,
        }
    }

    /// Number of nodes read on the latest run.
    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.id)
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Idempotent teardown for a reaction.
///
/// Dropping a `Disposer` does not dispose anything.
#[derive(Clone)]
pub struct Disposer {
    runtime: Runtime,
    id: NodeId,
}

impl Disposer {
    /// Dispose the reaction. Safe to call any number of times.
    pub fn dispose(&self) {
        self.runtime.dispose(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        matches!(
            self.runtime.state_of(self.id),
            None | Some(DerivationState::Disposed)
        )
    }

    /// The reaction this disposer tears down.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
