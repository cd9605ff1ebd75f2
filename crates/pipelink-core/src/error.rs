//! Error types for Pipelink

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed input to a public operation, rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target already linked, or rollback target already rolled back or
    /// superseded by later edits. Reported, never retried.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying store transaction failed; the batch item is marked failed
    /// and processing continues with the next item.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A discovered invariant violation (e.g. a link column pointing at a
    /// missing record). Surfaced for operator attention, never auto-corrected.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Import error: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, Error>;
