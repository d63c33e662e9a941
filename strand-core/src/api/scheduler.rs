//! Deferred task scheduling.
//!
//! Delayed reactions never touch timers directly. They hand a task to a
//! [`TaskScheduler`], which decides when it runs:
//!
//! - [`VirtualClock`] runs tasks when time is advanced by hand, for tests
//!   and simulations.
//! - [`TokioScheduler`] runs tasks on a tokio `LocalSet` after a real
//!   (or paused-and-advanced) delay.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::trace;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Something that can run a task after a delay.
pub trait TaskScheduler {
    fn schedule(&self, delay: Duration, task: Task);
}

/// A manually advanced clock.
///
/// Tasks run in deadline order; tasks with the same deadline run in the
/// order they were submitted.
#[derive(Default)]
pub struct VirtualClock {
    state: RefCell<ClockState>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    sequence: u64,
    queue: BTreeMap<(Duration, u64), Task>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Move time forward by `by`, running every task that comes due.
    ///
    /// Tasks submitted while advancing also run if their deadline falls
    /// inside the window. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;

        loop {
            let task = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .queue
                    .first_key_value()
                    .is_some_and(|((deadline, _), _)| *deadline <= target);
                if !due {
                    break;
                }
                let Some(((deadline, _), task)) = state.queue.pop_first() else {
                    break;
                };
                state.now = deadline;
                task
            };
            // Run with the clock unborrowed so the task can schedule more.
            task();
            ran += 1;
        }

        self.state.borrow_mut().now = target;
        ran
    }
}

impl TaskScheduler for VirtualClock {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut state = self.state.borrow_mut();
        let deadline = state.now + delay;
        let sequence = state.sequence;
        state.sequence += 1;
        trace!(?deadline, "task scheduled on virtual clock");
        state.queue.insert((deadline, sequence), task);
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs tasks with `tokio::task::spawn_local`.
///
/// Must be used from inside a `tokio::task::LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
