//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: atoms, computeds,
//! reactions, and the runtime that connects them.
//!
//! # Concepts
//!
//! ## Atoms and Observables
//!
//! An Atom is the contract every reactive data source satisfies: it reports
//! reads and writes to the runtime. [`Observable`] is the plain value cell
//! built on an atom.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed, and it only
//! notifies its own observers when the re-evaluated value is different.
//!
//! ## Reactions
//!
//! A Reaction is a side-effecting derivation. It is queued whenever a
//! dependency changes and runs at most once per batch.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered at runtime. While a derivation runs, the
//! runtime's tracking stack records every atom or computed it reads; when
//! the run ends, that set is diffed against the previous run's set and the
//! graph is updated. There is no global state: every [`Runtime`] is an
//! independent graph.

mod atom;
pub mod comparer;
mod computed;
mod context;
mod observable;
mod reaction;
mod runtime;

pub use atom::Atom;
pub use comparer::Comparer;
pub use computed::Computed;
pub use context::{Frame, TrackingStack};
pub use observable::Observable;
pub use reaction::{Disposer, Reaction};
pub use runtime::Runtime;
