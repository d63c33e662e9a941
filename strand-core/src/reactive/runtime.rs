//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects atoms, computeds,
//! and reactions. It owns the dependency graph, the tracking context, and
//! the batch queue.
//!
//! # How It Works
//!
//! 1. Running a derivation pushes a tracking frame. Every atom or computed
//!    read while the frame is on top is recorded in it.
//!
//! 2. When the run ends, the recorded reads are reconciled against the
//!    previous run: stale edges are dropped, new ones added.
//!
//! 3. When an atom changes, the runtime:
//!    a. Marks observing computeds stale and their observers possibly stale
//!    b. Queues observing reactions
//!    c. Drains the queue once the outermost batch closes
//!
//! 4. Before a queued reaction runs, its stale computed dependencies are
//!    refreshed in read order. If none of them produced a different value
//!    the reaction is skipped.
//!
//! # Threading
//!
//! A runtime is single-threaded and re-entrant. Handles are cheap clones of
//! one shared context; separate runtimes share nothing.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::SecondaryMap;
use tracing::{debug, error, trace, warn};

use super::context::{Frame, TrackingStack};
use super::reaction::Reaction;
use crate::config::{DisposedReadPolicy, RuntimeConfig};
use crate::error::{ReactiveError, Result};
use crate::graph::{
    BatchScheduler, DependencyGraph, DependencyTree, DerivationState, Node, NodeId, NodeKind,
    ObserverTree,
};

/// Callback fired when a queued reaction is due to run.
pub(crate) type ReactionCallback = Rc<dyn Fn(&Reaction) -> Result<()>>;

/// Type-erased view of a computed, used to refresh it during propagation.
pub(crate) trait ComputedNode {
    /// Bring the cached value up to date. Returns whether it changed.
    fn refresh(&self) -> Result<bool>;
}

/// Handle to a reactive runtime.
///
/// Cloning the handle shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<DependencyGraph>,
    context: RefCell<TrackingStack>,
    batch: RefCell<BatchScheduler>,
    reactions: RefCell<SecondaryMap<NodeId, ReactionCallback>>,
    computeds: RefCell<SecondaryMap<NodeId, Weak<dyn ComputedNode>>>,
    next_name: Cell<u64>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(DependencyGraph::new()),
                context: RefCell::new(TrackingStack::new()),
                batch: RefCell::new(BatchScheduler::new()),
                reactions: RefCell::new(SecondaryMap::new()),
                computeds: RefCell::new(SecondaryMap::new()),
                next_name: Cell::new(1),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Generate a name such as `Autorun@3`, unique within this runtime.
    pub(crate) fn unique_name(&self, prefix: &str) -> String {
        let id = self.inner.next_name.get();
        self.inner.next_name.set(id + 1);
        format!("{prefix}@{id}")
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub(crate) fn register(&self, node: Node) -> NodeId {
        self.inner.graph.borrow_mut().insert(node)
    }

    pub(crate) fn attach_computed(&self, id: NodeId, node: Weak<dyn ComputedNode>) {
        self.inner.computeds.borrow_mut().insert(id, node);
    }

    pub(crate) fn register_reaction(&self, name: String, callback: ReactionCallback) -> NodeId {
        let id = self.register(Node::reaction(name));
        self.inner.reactions.borrow_mut().insert(id, callback);
        id
    }

    /// Remove a node whose owner went away.
    ///
    /// Called from `Drop` impls, so it tolerates a graph that is already
    /// borrowed instead of panicking.
    pub(crate) fn release(&self, id: NodeId) {
        match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => {
                graph.remove(id);
            }
            Err(_) => warn!(node = ?id, "graph busy, node left in place"),
        }
        if let Ok(mut batch) = self.inner.batch.try_borrow_mut() {
            batch.remove(id);
        }
        if let Ok(mut computeds) = self.inner.computeds.try_borrow_mut() {
            computeds.remove(id);
        }
    }

    // ------------------------------------------------------------------
    // Cell contract
    // ------------------------------------------------------------------

    /// Attribute a read of `id` to the running derivation, if any.
    ///
    /// Returns `true` if the read was recorded.
    pub fn report_observed(&self, id: NodeId) -> bool {
        self.inner.context.borrow_mut().record(id)
    }

    /// Notify observers of `id` that it changed.
    ///
    /// Opens an implicit batch, so reactions run before this returns unless
    /// an outer batch is still open.
    pub fn report_changed(&self, id: NodeId) {
        self.start_batch();
        let _batch = BatchGuard(self);

        let observers = self.inner.graph.borrow().observers_of(id);
        trace!(node = ?id, observers = observers.len(), "change reported");
        for observer in observers {
            self.mark_stale(observer, DerivationState::Stale);
        }
    }

    /// Raise staleness on `id` and push possible staleness through the
    /// computeds downstream of it, breadth first.
    ///
    /// A computed that was already stale has told its observers before,
    /// so only observers that have since settled are visited again. A
    /// computed going stale also reaches derivations still running that
    /// read it earlier in the same run, since they are not subscribed yet.
    /// Reactions are queued whatever their previous state, which lets a
    /// reaction whose last run failed be triggered by the next change.
    fn mark_stale(&self, id: NodeId, level: DerivationState) {
        let mut work = VecDeque::from([(id, level)]);

        while let Some((id, level)) = work.pop_front() {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            if node.kind() == NodeKind::Atom || node.is_disposed() {
                continue;
            }

            let previous = node.raise(level);
            match node.kind() {
                NodeKind::Computed => {
                    let mut observers = node.observers().clone();
                    let was_fresh = previous.staleness() == 0;
                    if was_fresh {
                        observers.extend(self.inner.context.borrow().readers_of(id));
                    }
                    work.extend(
                        observers
                            .into_iter()
                            .filter(|observer| {
                                was_fresh
                                    || graph.get(*observer).is_some_and(|n| {
                                        n.kind() == NodeKind::Reaction
                                            || n.state().staleness() == 0
                                    })
                            })
                            .map(|observer| (observer, DerivationState::PossiblyStale)),
                    );
                }
                NodeKind::Reaction => {
                    if self.inner.batch.borrow_mut().enqueue(id) {
                        trace!(reaction = %node.name(), "reaction queued");
                    }
                }
                NodeKind::Atom => {}
            }
        }
    }

    /// A computed produced a new value: observers that were only possibly
    /// stale are now definitely stale.
    pub(crate) fn propagate_confirmed(&self, id: NodeId) {
        let mut graph = self.inner.graph.borrow_mut();
        for observer in graph.observers_of(id) {
            if let Some(node) = graph.get_mut(observer) {
                if node.state() == DerivationState::PossiblyStale {
                    node.set_state(DerivationState::Stale);
                }
            }
        }
    }

    /// Decide whether a derivation has to run, refreshing computed
    /// dependencies as needed.
    pub(crate) fn should_compute(&self, id: NodeId) -> bool {
        match self.state_of(id) {
            Some(DerivationState::Stale) => return true,
            Some(DerivationState::PossiblyStale) => {}
            _ => return false,
        }

        for dep in self.dependencies(id) {
            let hook = {
                let graph = self.inner.graph.borrow();
                let stale_computed = graph
                    .get(dep)
                    .is_some_and(|n| n.kind() == NodeKind::Computed && n.state().is_stale());
                if stale_computed {
                    self.inner.computeds.borrow().get(dep).and_then(Weak::upgrade)
                } else {
                    None
                }
            };
            let Some(hook) = hook else {
                continue;
            };

            if let Err(err) = hook.refresh() {
                // Let the derivation run and see the error on its own read.
                debug!(error = %err, "dependency failed to refresh");
                self.set_state(id, DerivationState::Stale);
                return true;
            }
            if self.state_of(id) == Some(DerivationState::Stale) {
                return true;
            }
        }

        let mut graph = self.inner.graph.borrow_mut();
        if let Some(node) = graph.get_mut(id) {
            if node.state() == DerivationState::PossiblyStale {
                node.set_state(DerivationState::Idle);
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Run `f` as derivation `id`, recording what it reads and reconciling
    /// subscriptions afterwards.
    ///
    /// The tracking frame is popped even if `f` panics; the derivation is
    /// then left stale and the panic keeps unwinding.
    pub(crate) fn track<T>(&self, id: NodeId, f: impl FnOnce() -> T) -> Result<T> {
        if self.is_on_stack(id) {
            return Err(self.cycle_error(id));
        }
        match self.state_of(id) {
            None | Some(DerivationState::Disposed) => return self.read_disposed(id, f),
            _ => self.set_state(id, DerivationState::Tracking),
        }

        self.start_batch();
        let _batch = BatchGuard(self);

        self.inner.context.borrow_mut().push(Frame::tracking(id));
        let mut guard = TrackingGuard {
            runtime: self,
            id,
            active: true,
        };
        let value = f();
        let frame = guard.complete();

        if frame.is_cyclic() {
            self.mark_failed(id);
            let name = self.name_of(id).unwrap_or_default();
            return Err(ReactiveError::CyclicDependency { name });
        }

        self.reconcile(id, frame);
        Ok(value)
    }

    /// Build the error for a derivation found on its own tracking stack and
    /// flag every frame in the cycle.
    pub(crate) fn cycle_error(&self, id: NodeId) -> ReactiveError {
        self.inner.context.borrow_mut().mark_cycle(id);
        let name = self.name_of(id).unwrap_or_default();
        debug!(derivation = %name, "cycle detected");
        ReactiveError::CyclicDependency { name }
    }

    /// Evaluate `f` on behalf of a disposed derivation, per the configured
    /// policy.
    pub(crate) fn read_disposed<T>(&self, id: NodeId, f: impl FnOnce() -> T) -> Result<T> {
        match self.inner.config.disposed_read {
            DisposedReadPolicy::Ignore => Ok(self.untracked(f)),
            DisposedReadPolicy::Error => {
                let name = self.name_of(id).unwrap_or_default();
                warn!(derivation = %name, "disposed derivation used");
                Err(ReactiveError::DisposedDerivationUsed { name })
            }
        }
    }

    fn pop_frame(&self, id: NodeId) -> Frame {
        let frame = self.inner.context.borrow_mut().pop();
        debug_assert_eq!(
            frame.as_ref().and_then(Frame::derivation),
            Some(id),
            "tracking frame mismatch"
        );
        frame.unwrap_or_else(Frame::untracked)
    }

    fn mark_failed(&self, id: NodeId) {
        let mut graph = self.inner.graph.borrow_mut();
        if let Some(node) = graph.get_mut(id) {
            if !node.is_disposed() {
                node.set_state(DerivationState::Stale);
            }
        }
    }

    fn reconcile(&self, id: NodeId, frame: Frame) {
        let mut graph = self.inner.graph.borrow_mut();
        match graph.get(id).map(Node::state) {
            // Disposed mid-run: already detached, stay that way.
            None | Some(DerivationState::Disposed) => return,
            _ => {}
        }

        let diff = graph.reconcile(id, frame.into_observed());
        if !diff.is_empty() {
            trace!(
                derivation = ?id,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "dependencies updated"
            );
        }

        if let Some(node) = graph.get_mut(id) {
            if node.state() == DerivationState::Tracking {
                node.set_state(DerivationState::Idle);
            }
        }
    }

    /// Run `f` without recording any reads it makes.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        self.inner.context.borrow_mut().push(Frame::untracked());
        let _guard = UntrackedGuard(self);
        f()
    }

    /// Whether reads are currently being attributed to a derivation.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.borrow().is_tracking()
    }

    /// The derivation reads are currently attributed to.
    pub fn current_derivation(&self) -> Option<NodeId> {
        self.inner.context.borrow().current()
    }

    /// Number of frames on the tracking stack, sentinels included.
    pub fn tracking_depth(&self) -> usize {
        self.inner.context.borrow().depth()
    }

    pub(crate) fn is_on_stack(&self, id: NodeId) -> bool {
        self.inner.context.borrow().contains(id)
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Open a batch. Pair with [`end_batch`](Self::end_batch).
    pub fn start_batch(&self) {
        self.inner.batch.borrow_mut().start();
    }

    /// Close a batch, draining queued reactions if it was the outermost.
    pub fn end_batch(&self) {
        let flush = self.inner.batch.borrow_mut().end();
        if flush && !std::thread::panicking() {
            self.run_reactions();
        }
    }

    /// Run `f` inside a batch.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        self.start_batch();
        let _batch = BatchGuard(self);
        f()
    }

    /// Run `f` as an action: batched, and without tracking its reads.
    pub fn action<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let span = tracing::debug_span!("action", name);
        let _entered = span.enter();
        self.batch(|| self.untracked(f))
    }

    /// Current batch depth.
    pub fn batch_depth(&self) -> usize {
        self.inner.batch.borrow().depth()
    }

    /// Number of reactions waiting for the batch to close.
    pub fn pending_reactions(&self) -> usize {
        self.inner.batch.borrow().pending_len()
    }

    fn run_reactions(&self) {
        if !self.inner.batch.borrow_mut().begin_flush() {
            return;
        }
        let _flush = FlushGuard(self);
        let limit = self.inner.config.max_reaction_iterations;
        let mut iterations = 0;

        loop {
            let pending = self.inner.batch.borrow_mut().take_pending();
            if pending.is_empty() {
                break;
            }

            iterations += 1;
            if iterations > limit {
                let err = ReactiveError::ReactionLoop { iterations: limit };
                error!(error = %err, dropped = pending.len(), "aborting reaction flush");
                self.abandon(pending);
                break;
            }

            debug!(count = pending.len(), iteration = iterations, "flushing reactions");
            let mut remaining = Requeue {
                runtime: self,
                pending: pending.into_iter(),
            };
            for id in remaining.pending.by_ref() {
                self.run_reaction(id);
            }
        }
    }

    fn run_reaction(&self, id: NodeId) {
        self.inner.batch.borrow_mut().begin_run(id);
        if !self.should_compute(id) {
            return;
        }
        let Some(callback) = self.inner.reactions.borrow().get(id).cloned() else {
            return;
        };

        let reaction = Reaction::from_parts(self.clone(), id);
        let name = reaction.name();
        debug!(reaction = %name, "running reaction");
        if let Err(err) = callback(&reaction) {
            error!(reaction = %name, error = %err, "reaction failed");
        }
    }

    /// Drop queued reactions without running them. They stay subscribed and
    /// can be triggered again by a later change.
    fn abandon(&self, pending: impl IntoIterator<Item = NodeId>) {
        let mut graph = self.inner.graph.borrow_mut();
        for id in pending {
            if let Some(node) = graph.get_mut(id) {
                if node.state().is_stale() {
                    node.set_state(DerivationState::Idle);
                }
            }
        }
    }

    /// First run of a reaction.
    ///
    /// Runs the callback now, or queues it if a batch or flush is in
    /// progress. Errors from an immediate run are returned.
    pub(crate) fn schedule_reaction(&self, id: NodeId) -> Result<()> {
        {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            if node.is_disposed() {
                return Ok(());
            }
            node.raise(DerivationState::Stale);
        }

        let deferred = {
            let batch = self.inner.batch.borrow();
            batch.in_batch() || batch.is_flushing()
        };
        if deferred {
            self.inner.batch.borrow_mut().enqueue(id);
            return Ok(());
        }

        self.start_batch();
        let _batch = BatchGuard(self);
        let Some(callback) = self.inner.reactions.borrow().get(id).cloned() else {
            return Ok(());
        };
        callback(&Reaction::from_parts(self.clone(), id))
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    /// Tear down a derivation: unsubscribe it everywhere, drop it from the
    /// queue, and ignore it from now on. Idempotent.
    ///
    /// A reaction leaves the graph entirely. A computed keeps a disposed
    /// node until its last handle drops, so reads through those handles can
    /// still be reported by name.
    pub fn dispose(&self, id: NodeId) {
        let callback = {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            if !node.is_derivation() || node.is_disposed() {
                return;
            }
            node.set_state(DerivationState::Disposed);
            let name = node.name().to_string();
            let kind = node.kind();
            let edges = graph.detach(id);
            if kind == NodeKind::Reaction {
                graph.remove(id);
            }
            debug!(derivation = %name, edges, "derivation disposed");

            self.inner.batch.borrow_mut().remove(id);
            self.inner.computeds.borrow_mut().remove(id);
            self.inner.reactions.borrow_mut().remove(id)
        };
        // The callback may own cells; drop it with no borrows held.
        drop(callback);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn state_of(&self, id: NodeId) -> Option<DerivationState> {
        self.inner.graph.borrow().get(id).map(Node::state)
    }

    pub(crate) fn set_state(&self, id: NodeId, state: DerivationState) {
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.set_state(state);
        }
    }

    pub fn name_of(&self, id: NodeId) -> Option<String> {
        self.inner
            .graph
            .borrow()
            .get(id)
            .map(|n| n.name().to_string())
    }

    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.inner.graph.borrow().get(id).map(Node::kind)
    }

    /// Derivations currently observing `id`.
    pub fn observers(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.graph.borrow().observers_of(id)
    }

    /// Nodes `id` read on its most recent run.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.graph.borrow().dependencies_of(id)
    }

    pub fn observer_count(&self, id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .get(id)
            .map_or(0, |n| n.observers().len())
    }

    pub fn dependency_count(&self, id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .get(id)
            .map_or(0, |n| n.dependencies().len())
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().len()
    }

    pub fn dependency_tree(&self, id: NodeId) -> Option<DependencyTree> {
        self.inner.graph.borrow().dependency_tree(id)
    }

    pub fn observer_tree(&self, id: NodeId) -> Option<ObserverTree> {
        self.inner.graph.borrow().observer_tree(id)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("batch_depth", &self.batch_depth())
            .field("pending_reactions", &self.pending_reactions())
            .field("tracking_depth", &self.tracking_depth())
            .finish()
    }
}

/// Closes a batch when dropped.
struct BatchGuard<'a>(&'a Runtime);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.end_batch();
    }
}

/// Clears the flushing flag when dropped.
struct FlushGuard<'a>(&'a Runtime);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.batch.borrow_mut().finish_flush();
    }
}

/// Puts reactions that a panicking flush never reached back on the queue.
struct Requeue<'a> {
    runtime: &'a Runtime,
    pending: indexmap::set::IntoIter<NodeId>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        let mut batch = self.runtime.inner.batch.borrow_mut();
        for id in self.pending.by_ref() {
            batch.requeue(id);
        }
    }
}

/// Pops an untracked sentinel when dropped.
struct UntrackedGuard<'a>(&'a Runtime);

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.context.borrow_mut().pop();
    }
}

/// Pops a tracking frame when dropped.
///
/// On the normal path `complete` hands the frame back; if the body panics
/// the drop pops it and leaves the derivation stale.
struct TrackingGuard<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    active: bool,
}

impl TrackingGuard<'_> {
    fn complete(&mut self) -> Frame {
        self.active = false;
        self.runtime.pop_frame(self.id)
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.runtime.inner.context.borrow_mut().pop();
            self.runtime.mark_failed(self.id);
        }
    }
}
