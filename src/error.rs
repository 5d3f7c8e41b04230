//! Error type shared by the index and the block storage layer.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArtError>;

/// Errors surfaced by index operations.
///
/// A missing key is never an error: lookups return `None` and erases return
/// `false`. Node growth never fails either.
#[derive(Debug, Error)]
pub enum ArtError {
    /// The underlying block store failed, or a read ran past the end of a
    /// block chain.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Persisted data could not be decoded.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// An internal invariant was violated. The operation was aborted.
    #[error("internal error: {0}")]
    Internal(&'static str),
    /// A caller-supplied value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A unique or primary index already holds the key.
    #[error("constraint violation: duplicate key {0}")]
    ConstraintViolation(String),
}

impl ArtError {
    /// Returns true for errors caused by bad persisted data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, ArtError::Corruption(_))
    }
}
