//! Error handling for the tax engine
//!
//! Defines the error taxonomy for lot matching and wash-sale processing and
//! establishes a unified Result type using anyhow for context chaining.

use thiserror::Error;

/// Core error types for engine operations.
///
/// Only `InvariantViolation` is fatal to a computation, and then only for the
/// affected account. Everything else is downgraded to a [`crate::models::Warning`]
/// by the pipeline and carried alongside the output.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("matching error: {0}")]
    Matching(String),

    #[error("reconciliation input error: {0}")]
    ReconciliationInput(String),

    #[error("invariant violation in account {account_id}: {detail}")]
    InvariantViolation { account_id: String, detail: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type Result<T> = anyhow::Result<T>;
