//! Block storage the index serializes into and lazily loads from.
//!
//! Nodes are written as a sequential byte stream over a chain of fixed-size
//! blocks ("meta blocks"). Each block starts with a small header:
//!
//! ```text
//! [next_block: u64 LE][crc32: u32 LE][payload ...]
//! ```
//!
//! A node is addressed by the block it starts in and its byte offset within
//! that block, see [`BlockPointer`].

mod file;
mod memory;
mod meta;
mod swizzle;

use std::fmt;

use crate::error::Result;

pub use file::FileBlockStore;
pub use memory::MemoryBlockStore;
pub use meta::{MetaBlockReader, MetaBlockWriter};
pub use swizzle::{
    generate_swizzled_pointer, is_swizzled, swizzled_block_info, SwizzledPointer,
};

/// Identifier of a block within a store.
pub type BlockId = u64;

/// Sentinel for "no block" / "no offset".
pub const INVALID_INDEX: u64 = u64::MAX;

/// Bytes reserved at the start of every block for the chain header.
pub const BLOCK_HEADER_SIZE: usize = 12;

/// Location of a serialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPointer {
    /// Block the node starts in.
    pub block_id: BlockId,
    /// Byte offset of the node within the block.
    pub offset: u32,
}

impl BlockPointer {
    /// Create a pointer.
    pub fn new(block_id: BlockId, offset: u32) -> Self {
        Self { block_id, offset }
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_id, self.offset)
    }
}

/// A store of fixed-size blocks.
///
/// Implementations provide their own interior synchronization; the index
/// only ever reads or writes whole blocks.
pub trait BlockStore: Send + Sync {
    /// Size of every block in bytes.
    fn block_size(&self) -> usize;

    /// Reserve a new block and return its id.
    fn allocate_block(&self) -> Result<BlockId>;

    /// Read a whole block into `dst` (`dst.len() == block_size()`).
    fn read_block(&self, id: BlockId, dst: &mut [u8]) -> Result<()>;

    /// Write a whole block from `src` (`src.len() == block_size()`).
    fn write_block(&self, id: BlockId, src: &[u8]) -> Result<()>;

    /// Number of blocks allocated so far.
    fn block_count(&self) -> u64;

    /// Flush written blocks to durable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
