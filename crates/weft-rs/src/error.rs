//! Error type shared by the engine and its collaborators.
//!
//! Every lazy sequence in the engine yields `Result<PromptElement, WeftError>`.
//! A failure is yielded once as an `Err` item and the enclosing sequence
//! ends there; the engine itself never retries or suppresses failures.

use thiserror::Error;

/// Failure surfaced while producing prompt elements.
///
/// `Clone` so that a deferred value can be awaited by more than one slot
/// (deferred inputs are shared futures).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WeftError {
    /// A deferred action-input resolved to an error.
    #[error("deferred value rejected: {0}")]
    Deferred(String),

    /// The completion function (model connector) failed.
    #[error("completion failed: {0}")]
    Completion(String),

    /// An externally supplied element stream failed.
    #[error("element stream failed: {0}")]
    Stream(String),

    /// Invalid configuration (connector settings, CLI input).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used across the crate.
pub type Result<T, E = WeftError> = std::result::Result<T, E>;
