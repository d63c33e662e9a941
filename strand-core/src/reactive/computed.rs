//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change, and only when someone reads it.
//!
//! # How Computeds Work
//!
//! 1. On first read, the computed runs its expression under tracking and
//!    caches the result.
//!
//! 2. When read again with no dependency changed, the cache is returned.
//!
//! 3. When a cell it read changes, it is marked stale. Nothing runs yet.
//!
//! 4. On the next read (or when a reaction that depends on it is about to
//!    run), the expression re-runs. The new value is compared with the
//!    cached one using the computed's comparer.
//!
//! 5. Only a different value is propagated. Observers that were waiting to
//!    learn whether this computed changed are marked stale; an equal value
//!    lets them settle without running.
//!
//! # Cycles
//!
//! A computed that ends up reading itself, directly or through other
//! computeds, fails with [`ReactiveError::CyclicDependency`]. Every
//! computed on the cycle returns the error from its current read, whatever
//! its expression did with the inner failure, and is left stale.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::comparer::{self, Comparer};
use super::runtime::{ComputedNode, Runtime};
use crate::error::Result;
use crate::graph::{DerivationState, Node, NodeId};

/// A lazily evaluated, memoized value derived from other reactive nodes.
///
/// Cloning a `Computed` creates a new handle to the same node. The node is
/// disposed when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use strand_core::reactive::{Computed, Observable, Runtime};
///
/// let rt = Runtime::new();
/// let price = Observable::new(&rt, 10);
/// let p = price.clone();
/// let with_tax = Computed::new(&rt, move || p.get() * 2);
///
/// assert_eq!(with_tax.get().unwrap(), 20);
/// price.set(4);
/// assert_eq!(with_tax.get().unwrap(), 8);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T: 'static> {
    runtime: Runtime,
    id: NodeId,

    /// The expression.
    compute: Box<dyn Fn() -> T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    /// Decides whether a re-evaluation produced a different value.
    equals: Comparer<T>,

    /// Number of times the expression has run under tracking.
    runs: Cell<usize>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed using value equality.
    ///
    /// The expression is not run until the first read.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        let name = runtime.unique_name("Computed");
        Self::with_comparer(runtime, name, compute, comparer::structural())
    }

    /// Create a named computed using value equality.
    pub fn named<F>(runtime: &Runtime, name: impl Into<String>, compute: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        Self::with_comparer(runtime, name, compute, comparer::structural())
    }

    /// Create a named computed with an explicit equality policy.
    pub fn with_comparer<F>(
        runtime: &Runtime,
        name: impl Into<String>,
        compute: F,
        equals: Comparer<T>,
    ) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let id = runtime.register(Node::computed(name));
        let inner = Rc::new(ComputedInner {
            runtime: runtime.clone(),
            id,
            compute: Box::new(compute),
            value: RefCell::new(None),
            equals,
            runs: Cell::new(0),
        });
        let hook: Weak<dyn ComputedNode> = Rc::downgrade(&inner) as Weak<dyn ComputedNode>;
        runtime.attach_computed(id, hook);

        Self { inner }
    }

    /// Get the current value, re-evaluating first if it is stale.
    ///
    /// Inside a derivation, the read makes that derivation depend on this
    /// computed.
    pub fn get(&self) -> Result<T> {
        let inner = &self.inner;
        let runtime = &inner.runtime;

        if runtime.is_on_stack(inner.id) {
            return Err(runtime.cycle_error(inner.id));
        }
        if self.is_disposed() {
            return runtime.read_disposed(inner.id, || (inner.compute)());
        }

        runtime.report_observed(inner.id);
        inner.read()
    }

    /// Get the current value without making the running derivation depend
    /// on it.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.runtime.untracked(|| self.get())
    }

    /// Tear down the computed. Further reads follow the runtime's
    /// [`DisposedReadPolicy`](crate::config::DisposedReadPolicy).
    pub fn dispose(&self) {
        self.inner.runtime.dispose(self.inner.id);
    }
}

impl<T: 'static> Computed<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.runtime.name_of(self.inner.id).unwrap_or_default()
    }

    pub fn state(&self) -> DerivationState {
        self.inner
            .runtime
            .state_of(self.inner.id)
            .unwrap_or(DerivationState::Disposed)
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == DerivationState::Disposed
    }

    /// Number of times the expression has been evaluated under tracking.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of derivations currently reading this computed.
    pub fn observer_count(&self) -> usize {
        self.inner.runtime.observer_count(self.inner.id)
    }

    /// Number of nodes read on the latest evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn read(&self) -> Result<T> {
        if !self.runtime.should_compute(self.id) {
            if let Some(value) = self.value.borrow().as_ref() {
                return Ok(value.clone());
            }
        }
        self.recompute().map(|(value, _)| value)
    }

    /// Evaluate under tracking, cache, and propagate if the value changed.
    fn recompute(&self) -> Result<(T, bool)> {
        let next = self.runtime.track(self.id, || (self.compute)())?;
        self.runs.set(self.runs.get() + 1);

        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if !changed {
            // Equal under the comparer: keep serving the cached value.
            let cached = self.value.borrow().clone();
            return Ok((cached.unwrap_or(next), false));
        }

        *self.value.borrow_mut() = Some(next.clone());
        self.runtime.propagate_confirmed(self.id);
        Ok((next, true))
    }
}

impl<T: Clone + 'static> ComputedNode for ComputedInner<T> {
    fn refresh(&self) -> Result<bool> {
        if self.runtime.is_on_stack(self.id) {
            return Err(self.runtime.cycle_error(self.id));
        }
        if !self.runtime.should_compute(self.id) {
            return Ok(false);
        }
        self.recompute().map(|(_, changed)| changed)
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisposedReadPolicy, RuntimeConfig};
    use crate::error::ReactiveError;
    use crate::reactive::Observable;

    #[test]
    fn computed_evaluates_lazily() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        let computed = Computed::new(&rt, move || {
            calls_clone.set(calls_clone.get() + 1);
            42
        });

        assert!(!computed.has_value());
        assert_eq!(calls.get(), 0);

        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(calls.get(), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn computed_caches_when_fresh() {
        let rt = Runtime::new();
        let computed = Computed::new(&rt, || 42);

        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(computed.run_count(), 1);
        assert_eq!(computed.state(), DerivationState::Idle);
    }

    #[test]
    fn stale_until_read() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 1);
        let c = cell.clone();
        let doubled = Computed::new(&rt, move || c.get() * 2);

        assert_eq!(doubled.get().unwrap(), 2);
        cell.set(5);
        assert_eq!(doubled.state(), DerivationState::Stale);
        assert_eq!(doubled.run_count(), 1);

        assert_eq!(doubled.get().unwrap(), 10);
        assert_eq!(doubled.run_count(), 2);
    }

    #[test]
    fn computed_chain_is_possibly_stale_downstream() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 1);
        let c = cell.clone();
        let positive = Computed::new(&rt, move || c.get() > 0);
        let p = positive.clone();
        let label = Computed::new(&rt, move || if p.get().unwrap_or(false) { "yes" } else { "no" });

        assert_eq!(label.get().unwrap(), "yes");
        cell.set(2);
        assert_eq!(positive.state(), DerivationState::Stale);
        assert_eq!(label.state(), DerivationState::PossiblyStale);

        // `positive` re-evaluates to the same value, so `label` does not run.
        assert_eq!(label.get().unwrap(), "yes");
        assert_eq!(positive.run_count(), 2);
        assert_eq!(label.run_count(), 1);
    }

    #[test]
    fn direct_self_reference_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let computed = Computed::named(&rt, "selfish", move || {
            let me = slot_clone.borrow().clone();
            me.map_or(0, |c| c.get().unwrap_or(-1)) + 1
        });
        *slot.borrow_mut() = Some(computed.clone());

        let err = computed.get().unwrap_err();
        assert_eq!(
            err,
            ReactiveError::CyclicDependency {
                name: "selfish".to_string()
            }
        );
        assert_eq!(computed.state(), DerivationState::Stale);
        assert_eq!(rt.tracking_depth(), 0);

        // Break the cycle so the handles can be freed.
        slot.borrow_mut().take();
    }

    #[test]
    fn disposed_read_follows_policy() {
        let rt = Runtime::new();
        let computed = Computed::new(&rt, || 3);
        computed.dispose();
        assert_eq!(computed.get().unwrap(), 3);
        assert_eq!(computed.run_count(), 0);

        let strict = Runtime::with_config(
            RuntimeConfig::default().with_disposed_read(DisposedReadPolicy::Error),
        );
        let computed = Computed::named(&strict, "gone", || 3);
        computed.dispose();
        assert_eq!(
            computed.get().unwrap_err(),
            ReactiveError::DisposedDerivationUsed {
                name: "gone".to_string()
            }
        );
    }

    #[test]
    fn dropping_last_handle_unsubscribes() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 1);
        let c = cell.clone();
        let computed = Computed::new(&rt, move || c.get() + 1);
        computed.get().unwrap();
        assert_eq!(cell.observer_count(), 1);

        drop(computed);
        assert_eq!(cell.observer_count(), 0);
    }

    #[test]
    fn custom_comparer_controls_propagation() {
        let rt = Runtime::new();
        let cell = Observable::new(&rt, 10);
        let c = cell.clone();
        // Only the tens digit matters.
        let bucket = Computed::with_comparer(
            &rt,
            "bucket",
            move || c.get(),
            Rc::new(|a: &i32, b: &i32| a / 10 == b / 10),
        );
        let b = bucket.clone();
        let label = Computed::new(&rt, move || b.get().unwrap_or_default());

        assert_eq!(label.get().unwrap(), 10);
        cell.set(15);
        // Equal under the comparer: the cached 10 is kept.
        assert_eq!(label.get().unwrap(), 10);
        assert_eq!(label.run_count(), 1);

        cell.set(21);
        assert_eq!(label.get().unwrap(), 21);
    }
}
