//! Runtime Configuration
//!
//! Tunables for a [`Runtime`](crate::reactive::Runtime). Every field has a
//! default, so a partial JSON document is enough:
//!
//! ```rust
//! use strand_core::config::{RuntimeConfig, DisposedReadPolicy};
//!
//! let config = RuntimeConfig::from_json(r#"{ "disposed_read": "error" }"#).unwrap();
//! assert_eq!(config.disposed_read, DisposedReadPolicy::Error);
//! assert_eq!(config.max_reaction_iterations, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What happens when code explicitly reads or tracks a disposed derivation.
///
/// Writes and enqueue attempts against disposed derivations are always
/// ignored; this only governs explicit reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposedReadPolicy {
    /// Evaluate the body without tracking and return its value.
    #[default]
    Ignore,

    /// Return [`ReactiveError::DisposedDerivationUsed`](crate::ReactiveError).
    Error,
}

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on flush iterations before the pending queue is dropped.
    ///
    /// One iteration runs every reaction queued at that moment; reactions
    /// that write their own dependencies re-queue themselves and consume
    /// further iterations.
    pub max_reaction_iterations: usize,

    /// Policy for explicit reads of disposed derivations.
    pub disposed_read: DisposedReadPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_reaction_iterations: 100,
            disposed_read: DisposedReadPolicy::Ignore,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Set the flush iteration limit.
    pub fn with_max_reaction_iterations(mut self, limit: usize) -> Self {
        self.max_reaction_iterations = limit;
        self
    }

    /// Set the disposed-read policy.
    pub fn with_disposed_read(mut self, policy: DisposedReadPolicy) -> Self {
        self.disposed_read = policy;
        self
    }
}
