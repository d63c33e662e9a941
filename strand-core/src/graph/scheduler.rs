//! Batch Scheduler
//!
//! The scheduler decides when queued reactions run. Writes inside a batch
//! only queue reactions; the queue is drained once the outermost batch
//! closes.
//!
//! # Algorithm
//!
//! 1. `start` increments the batch depth
//! 2. Change notifications `enqueue` reactions; an id already queued is not
//!    queued twice
//! 3. `end` decrements the depth and reports whether the queue should be
//!    drained now (depth back at zero and no drain already in progress)
//! 4. The runtime drains with `take_pending`, in insertion order, until the
//!    queue stays empty. Taken reactions stay in flight until `begin_run`,
//!    so a change that reaches them before they run does not queue them a
//!    second time
//!
//! Nested batches share the one counter and the one queue.

use indexmap::IndexSet;

use super::node::NodeId;

/// Batch depth plus the pending-reaction queue.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    /// Number of open batches.
    depth: usize,

    /// Reactions waiting for the outermost batch to close, in enqueue order.
    pending: IndexSet<NodeId>,

    /// Reactions taken for the current drain that have not started yet.
    in_flight: IndexSet<NodeId>,

    /// Whether the runtime is currently draining the queue.
    flushing: bool,
}

impl BatchScheduler {
    /// Create a new idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch. Returns the new depth.
    pub fn start(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    /// Close a batch.
    ///
    /// Returns `true` when this closed the outermost batch and the queue
    /// should be drained by the caller.
    pub fn end(&mut self) -> bool {
        debug_assert!(self.depth > 0, "end_batch called without start_batch");
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0 && !self.flushing
    }

    /// Current batch depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether any batch is open.
    pub fn in_batch(&self) -> bool {
        self.depth > 0
    }

    /// Queue a reaction. Returns `false` if it was already queued or is
    /// about to run in the current drain.
    pub fn enqueue(&mut self, reaction: NodeId) -> bool {
        if self.in_flight.contains(&reaction) {
            return false;
        }
        self.pending.insert(reaction)
    }

    /// Drop a reaction from the queue, preserving the order of the rest.
    pub fn remove(&mut self, reaction: NodeId) -> bool {
        let in_flight = self.in_flight.swap_remove(&reaction);
        self.pending.shift_remove(&reaction) || in_flight
    }

    pub fn is_queued(&self, reaction: NodeId) -> bool {
        self.pending.contains(&reaction) || self.in_flight.contains(&reaction)
    }

    /// Number of queued reactions.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take the whole queue, leaving it empty. The taken reactions are in
    /// flight until [`begin_run`](Self::begin_run) or the end of the drain.
    pub fn take_pending(&mut self) -> IndexSet<NodeId> {
        let taken = std::mem::take(&mut self.pending);
        self.in_flight = taken.clone();
        taken
    }

    /// A taken reaction is starting; changes from here on queue it again.
    pub fn begin_run(&mut self, reaction: NodeId) {
        self.in_flight.swap_remove(&reaction);
    }

    /// Put a taken reaction that never ran back on the queue.
    pub fn requeue(&mut self, reaction: NodeId) {
        self.in_flight.swap_remove(&reaction);
        self.pending.insert(reaction);
    }

    /// Mark the start of a drain. Returns `false` if one is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        true
    }

    /// Mark the end of a drain.
    pub fn finish_flush(&mut self) {
        self.flushing = false;
        self.in_flight.clear();
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }
}
