//! Index configuration.

use crate::error::{ArtError, Result};
use crate::storage::BLOCK_HEADER_SIZE;

/// Default block size for stores created by the index itself (256 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Smallest block size accepted by the block stores.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Constraint enforced on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexConstraint {
    /// Any number of row ids per key.
    #[default]
    None,
    /// At most one row id per key.
    Unique,
    /// Primary key; behaves like [`IndexConstraint::Unique`].
    Primary,
}

impl IndexConstraint {
    /// Whether a second row id for an existing key must be rejected.
    pub fn is_unique(self) -> bool {
        matches!(self, IndexConstraint::Unique | IndexConstraint::Primary)
    }
}

/// Configuration for an [`Art`](crate::Art).
#[derive(Debug, Clone)]
pub struct ArtConfig {
    /// Uniqueness constraint checked on insert.
    pub constraint: IndexConstraint,
    /// Block size of the in-memory store created by [`Art::with_config`](crate::Art::with_config).
    pub block_size: usize,
    /// Verify block checksums when nodes are read back.
    pub verify_checksums: bool,
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            constraint: IndexConstraint::None,
            block_size: DEFAULT_BLOCK_SIZE,
            verify_checksums: true,
        }
    }
}

impl ArtConfig {
    /// Configuration for a unique index.
    pub fn unique() -> Self {
        Self::default().with_constraint(IndexConstraint::Unique)
    }

    /// Set the insert constraint.
    pub fn with_constraint(mut self, constraint: IndexConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Set the block size used for self-created stores.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Enable or disable checksum verification on reads.
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }
}

/// Block sizes must leave room for the chain header and keep offsets within
/// the 32-bit field of a swizzled pointer.
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size < MIN_BLOCK_SIZE || block_size <= BLOCK_HEADER_SIZE {
        return Err(ArtError::InvalidArgument(format!(
            "block size {block_size} is below the minimum of {MIN_BLOCK_SIZE}"
        )));
    }
    if block_size as u64 > u32::MAX as u64 {
        return Err(ArtError::InvalidArgument(format!(
            "block size {block_size} does not fit a 32-bit offset"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArtConfig::default();
        assert_eq!(config.constraint, IndexConstraint::None);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.verify_checksums);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_constraints() {
        assert!(!IndexConstraint::None.is_unique());
        assert!(IndexConstraint::Unique.is_unique());
        assert!(IndexConstraint::Primary.is_unique());
        assert!(ArtConfig::unique().constraint.is_unique());
    }

    #[test]
    fn test_block_size_validation() {
        assert!(ArtConfig::default().with_block_size(16).validate().is_err());
        assert!(ArtConfig::default().with_block_size(MIN_BLOCK_SIZE).validate().is_ok());
    }
}
