//! Swizzled pointer words.
//!
//! A child reference on disk is a single `u64`:
//!
//! - Bit 63: swizzled flag
//! - Bits 32..=62: block id
//! - Bits 0..=31: offset within the block
//! - `0`: null (no child)
//!
//! In memory the tree uses [`Child`](crate::art::Child) instead; these words
//! only exist in the serialized form.

use std::fmt;

use super::{BlockId, BlockPointer, INVALID_INDEX};
use crate::error::{ArtError, Result};

/// A serialized child reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SwizzledPointer(u64);

impl SwizzledPointer {
    const SWIZZLE_BIT: u64 = 1u64 << 63;
    const HALF_BITS: u32 = 32;
    const OFFSET_MASK: u64 = (1u64 << Self::HALF_BITS) - 1;
    /// Largest block id that fits the 31-bit field.
    pub const MAX_BLOCK_ID: u64 = (1u64 << 31) - 1;
    /// Largest offset that fits the 32-bit field.
    pub const MAX_OFFSET: u64 = Self::OFFSET_MASK;
    /// The "not yet written" pointer.
    pub const NULL: SwizzledPointer = SwizzledPointer(0);

    /// Encode a block location.
    ///
    /// Returns [`SwizzledPointer::NULL`] if either argument is the invalid
    /// index sentinel.
    pub fn generate(block_id: u64, offset: u64) -> Result<Self> {
        if block_id == INVALID_INDEX || offset == INVALID_INDEX {
            return Ok(Self::NULL);
        }
        if block_id > Self::MAX_BLOCK_ID {
            return Err(ArtError::InvalidArgument(format!(
                "block id {block_id} exceeds swizzled pointer range"
            )));
        }
        if offset > Self::MAX_OFFSET {
            return Err(ArtError::InvalidArgument(format!(
                "offset {offset} exceeds swizzled pointer range"
            )));
        }
        Ok(Self(Self::SWIZZLE_BIT | (block_id << Self::HALF_BITS) | offset))
    }

    /// Wrap a raw word read from storage.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw word.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_swizzled(self) -> bool {
        self.0 & Self::SWIZZLE_BIT != 0
    }

    /// Decode the block location. Fails on words that are not swizzled.
    pub fn block_info(self) -> Result<(BlockId, u64)> {
        if !self.is_swizzled() {
            return Err(ArtError::Internal("block info requested for an unswizzled pointer"));
        }
        let word = self.0 & !Self::SWIZZLE_BIT;
        Ok((word >> Self::HALF_BITS, word & Self::OFFSET_MASK))
    }

    /// Decode into a [`BlockPointer`].
    pub fn block_pointer(self) -> Result<BlockPointer> {
        let (block_id, offset) = self.block_info()?;
        Ok(BlockPointer::new(block_id, offset as u32))
    }
}

impl TryFrom<BlockPointer> for SwizzledPointer {
    type Error = ArtError;

    fn try_from(ptr: BlockPointer) -> Result<Self> {
        Self::generate(ptr.block_id, ptr.offset as u64)
    }
}

impl fmt::Debug for SwizzledPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_info() {
            Ok((block, offset)) => write!(f, "Swizzled({block}:{offset})"),
            Err(_) if self.is_null() => write!(f, "Swizzled(null)"),
            Err(_) => write!(f, "Raw({:#x})", self.0),
        }
    }
}

/// Whether `word` is a swizzled pointer.
pub fn is_swizzled(word: u64) -> bool {
    SwizzledPointer::from_raw(word).is_swizzled()
}

/// Encode `(block_id, offset)` as a swizzled word, `0` for sentinel inputs.
pub fn generate_swizzled_pointer(block_id: u64, offset: u64) -> Result<u64> {
    SwizzledPointer::generate(block_id, offset).map(SwizzledPointer::raw)
}

/// Decode a swizzled word into `(block_id, offset)`.
pub fn swizzled_block_info(word: u64) -> Result<(BlockId, u64)> {
    SwizzledPointer::from_raw(word).block_info()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let max_block = SwizzledPointer::MAX_BLOCK_ID;
        let max_offset = SwizzledPointer::MAX_OFFSET;
        let cases = [
            (0, 0),
            (0, 1),
            (1, 0),
            (7, 4096),
            (max_block, 0),
            (0, max_offset),
            (max_block - 1, max_offset - 1),
            (max_block, max_offset),
        ];
        for (block, offset) in cases {
            let word = generate_swizzled_pointer(block, offset).unwrap();
            assert!(is_swizzled(word), "({block}, {offset}) must be swizzled");
            assert_eq!(swizzled_block_info(word).unwrap(), (block, offset));
        }
    }

    #[test]
    fn test_block_zero_offset_zero_is_not_null() {
        let ptr = SwizzledPointer::generate(0, 0).unwrap();
        assert!(!ptr.is_null());
        assert_eq!(ptr.raw(), 1u64 << 63);
    }

    #[test]
    fn test_sentinel_gives_null() {
        assert_eq!(generate_swizzled_pointer(INVALID_INDEX, 5).unwrap(), 0);
        assert_eq!(generate_swizzled_pointer(5, INVALID_INDEX).unwrap(), 0);
        assert_eq!(generate_swizzled_pointer(INVALID_INDEX, INVALID_INDEX).unwrap(), 0);
        assert!(!is_swizzled(0));
    }

    #[test]
    fn test_plain_words_are_not_swizzled() {
        for word in [0u64, 1, 0x1000, (1u64 << 63) - 1] {
            assert!(!is_swizzled(word));
            assert!(matches!(swizzled_block_info(word), Err(ArtError::Internal(_))));
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        let block = SwizzledPointer::MAX_BLOCK_ID + 1;
        assert!(matches!(
            generate_swizzled_pointer(block, 0),
            Err(ArtError::InvalidArgument(_))
        ));
        let offset = SwizzledPointer::MAX_OFFSET + 1;
        assert!(matches!(
            generate_swizzled_pointer(0, offset),
            Err(ArtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_block_pointer_conversion() {
        let ptr = BlockPointer::new(42, 12);
        let word = SwizzledPointer::try_from(ptr).unwrap();
        assert_eq!(word.block_pointer().unwrap(), ptr);
    }
}
