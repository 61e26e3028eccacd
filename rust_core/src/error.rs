//! Error types for density evaluation and kernel transitions.

use thiserror::Error;

/// Errors raised while executing a program, evaluating its density, or
/// running a transition.
///
/// None of these are retried inside the kernel: a failed step discards the
/// attempted transition and the caller resumes from its last accepted state.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HmcError {
    /// Ambiguous or missing name-to-slot mapping, a name matched by both
    /// selectors, or a shape mismatch between state, cache and sites.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The parent edges of one execution do not form a DAG.
    ///
    /// Unreachable for programs built through [`crate::intercept::Trace`],
    /// which only accepts parents that already exist.
    #[error("dependency cycle through node `{0}`")]
    Cycle(String),

    /// Non-finite log-probability or gradient, or invalid distribution
    /// parameters.
    #[error("numerical error: {0}")]
    Numeric(String),
}

pub type Result<T> = std::result::Result<T, HmcError>;
