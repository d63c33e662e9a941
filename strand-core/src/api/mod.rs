//! Wrapper API
//!
//! Convenience constructors over [`Reaction`](crate::reactive::Reaction):
//!
//! - [`autorun`]: re-run a closure whenever what it read changes
//! - [`when`]: run an effect once a predicate becomes true
//! - [`autorun_async`]: an autorun whose runs are deferred and folded
//! - [`reaction`]: feed the value of a tracked expression to an untracked
//!   effect
//!
//! Deferred variants take a [`TaskScheduler`]. Use [`VirtualClock`] in
//! tests and [`TokioScheduler`] inside a tokio `LocalSet`.

mod autorun;
mod scheduler;

pub use autorun::{autorun, autorun_async, reaction, when, ReactionOptions};
pub use scheduler::{Task, TaskScheduler, TokioScheduler, VirtualClock};
