//! In-process block store.

use std::io;

use parking_lot::RwLock;
use tracing::debug;

use super::{BlockId, BlockStore};
use crate::config::{validate_block_size, DEFAULT_BLOCK_SIZE};
use crate::error::{ArtError, Result};

/// Blocks kept in memory. Used for tests and for indexes that are only
/// checkpointed to release memory.
pub struct MemoryBlockStore {
    block_size: usize,
    blocks: RwLock<Vec<Box<[u8]>>>,
}

impl MemoryBlockStore {
    /// Create an empty store.
    pub fn new(block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;
        debug!(block_size, "created memory block store");
        Ok(Self {
            block_size,
            blocks: RwLock::new(Vec::new()),
        })
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(ArtError::InvalidArgument(format!(
                "buffer of {len} bytes does not match block size {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            blocks: RwLock::new(Vec::new()),
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate_block(&self) -> Result<BlockId> {
        let mut blocks = self.blocks.write();
        blocks.push(vec![0u8; self.block_size].into_boxed_slice());
        Ok((blocks.len() - 1) as BlockId)
    }

    fn read_block(&self, id: BlockId, dst: &mut [u8]) -> Result<()> {
        self.check_len(dst.len())?;
        let blocks = self.blocks.read();
        let block = blocks.get(id as usize).ok_or_else(|| {
            ArtError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("block {id} was never allocated"),
            ))
        })?;
        dst.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, id: BlockId, src: &[u8]) -> Result<()> {
        self.check_len(src.len())?;
        let mut blocks = self.blocks.write();
        let block = blocks.get_mut(id as usize).ok_or_else(|| {
            ArtError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("block {id} was never allocated"),
            ))
        })?;
        block.copy_from_slice(src);
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }
}
