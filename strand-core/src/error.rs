//! Error types for the reactive engine.

use thiserror::Error;

/// Errors reported by the dependency-tracking engine.
///
/// Panics raised by user code inside a derivation are not represented here;
/// they unwind through the engine untouched once its bookkeeping is restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A derivation read itself, directly or through a chain of computeds.
    #[error("cyclic dependency detected while evaluating `{name}`")]
    CyclicDependency { name: String },

    /// A disposed derivation was read or tracked under the `Error` policy.
    #[error("derivation `{name}` was used after it was disposed")]
    DisposedDerivationUsed { name: String },

    /// Reactions kept invalidating each other and never settled.
    #[error("reactions did not converge after {iterations} iterations")]
    ReactionLoop { iterations: usize },

    /// A runtime configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
