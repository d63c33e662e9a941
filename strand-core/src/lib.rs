//! Strand Core
//!
//! This crate provides the dependency-tracking and scheduling engine for
//! the Strand reactive runtime. It implements:
//!
//! - Reactive primitives (observables, computeds, reactions)
//! - Runtime dependency discovery with set-diff reconciliation
//! - Glitch-free, batched propagation of changes
//! - Convenience wrappers (`autorun`, `when`, `reaction`) with deferred
//!   variants driven by an injected scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the runtime, the cell contract and the derivations
//! - `graph`: the node arena, edge sets and the batch queue
//! - `api`: wrapper functions and task schedulers
//! - `config`: runtime configuration
//! - `error`: the engine's error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use strand_core::api::autorun;
//! use strand_core::reactive::{Computed, Observable, Runtime};
//!
//! let rt = Runtime::new();
//!
//! // Create a cell
//! let count = Observable::new(&rt, 0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Computed::new(&rt, move || c.get() * 2);
//!
//! // Create a reaction
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let (c, d, s) = (count.clone(), doubled.clone(), seen.clone());
//! let _disposer = autorun(&rt, None, move || {
//!     s.borrow_mut().push((c.get(), d.get().unwrap()));
//! })
//! .unwrap();
//!
//! // Update the cell; the reaction runs again
//! count.set(5);
//! assert_eq!(*seen.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{DisposedReadPolicy, RuntimeConfig};
pub use error::{ReactiveError, Result};
