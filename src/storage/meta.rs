//! Sequential byte streams over chained blocks.
//!
//! The writer fills one block buffer at a time. When it runs out of room it
//! allocates the next block, links it from the current header and flushes.
//! The reader follows the same links, so a value may straddle a block
//! boundary.

use std::io;

use tracing::warn;

use super::{BlockId, BlockPointer, BlockStore, BLOCK_HEADER_SIZE, INVALID_INDEX};
use crate::config::validate_block_size;
use crate::error::{ArtError, Result};

const NEXT_FIELD: std::ops::Range<usize> = 0..8;
const CRC_FIELD: std::ops::Range<usize> = 8..12;

fn block_checksum(block: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&block[NEXT_FIELD]);
    hasher.update(&block[BLOCK_HEADER_SIZE..]);
    hasher.finalize()
}

fn read_u64_at(block: &[u8], range: std::ops::Range<usize>) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&block[range]);
    u64::from_le_bytes(buf)
}

/// Appends a byte stream to a fresh chain of blocks.
pub struct MetaBlockWriter<'a> {
    store: &'a dyn BlockStore,
    block: Vec<u8>,
    block_id: BlockId,
    offset: usize,
    blocks_written: u64,
}

impl<'a> MetaBlockWriter<'a> {
    /// Start a new chain in `store`.
    pub fn new(store: &'a dyn BlockStore) -> Result<Self> {
        validate_block_size(store.block_size())?;
        let block_id = store.allocate_block()?;
        Ok(Self {
            store,
            block: vec![0u8; store.block_size()],
            block_id,
            offset: BLOCK_HEADER_SIZE,
            blocks_written: 0,
        })
    }

    /// Location of the next byte to be written.
    pub fn position(&mut self) -> Result<BlockPointer> {
        if self.offset >= self.block.len() {
            self.advance()?;
        }
        Ok(BlockPointer::new(self.block_id, self.offset as u32))
    }

    /// Number of blocks in the chain so far, including the current one.
    pub fn block_count(&self) -> u64 {
        self.blocks_written + 1
    }

    /// Append raw bytes, chaining new blocks as needed.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.offset >= self.block.len() {
                self.advance()?;
            }
            let n = data.len().min(self.block.len() - self.offset);
            self.block[self.offset..self.offset + n].copy_from_slice(&data[..n]);
            self.offset += n;
            data = &data[n..];
        }
        Ok(())
    }

    /// Append a little-endian `u8`.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Append a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Append a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Append a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Append a little-endian `i64`.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Terminate the chain and flush the last block.
    pub fn finish(mut self) -> Result<()> {
        self.flush(INVALID_INDEX)
    }

    fn advance(&mut self) -> Result<()> {
        let next = self.store.allocate_block()?;
        self.flush(next)?;
        self.block_id = next;
        self.block.fill(0);
        self.offset = BLOCK_HEADER_SIZE;
        self.blocks_written += 1;
        Ok(())
    }

    fn flush(&mut self, next: BlockId) -> Result<()> {
        self.block[NEXT_FIELD].copy_from_slice(&next.to_le_bytes());
        let crc = block_checksum(&self.block);
        self.block[CRC_FIELD].copy_from_slice(&crc.to_le_bytes());
        self.store.write_block(self.block_id, &self.block)
    }
}

/// Reads a byte stream starting at a [`BlockPointer`], following the chain.
pub struct MetaBlockReader<'a> {
    store: &'a dyn BlockStore,
    block: Vec<u8>,
    block_id: BlockId,
    next: BlockId,
    offset: usize,
    verify: bool,
}

impl<'a> MetaBlockReader<'a> {
    /// Position a reader at `ptr`.
    pub fn open(store: &'a dyn BlockStore, ptr: BlockPointer, verify: bool) -> Result<Self> {
        let block_size = store.block_size();
        validate_block_size(block_size)?;
        let offset = ptr.offset as usize;
        if offset < BLOCK_HEADER_SIZE || offset >= block_size {
            warn!(%ptr, block_size, "block offset out of range");
            return Err(ArtError::Corruption(format!(
                "offset {offset} of {ptr} is outside the payload of a {block_size} byte block"
            )));
        }
        let mut reader = Self {
            store,
            block: vec![0u8; block_size],
            block_id: ptr.block_id,
            next: INVALID_INDEX,
            offset,
            verify,
        };
        reader.load(ptr.block_id)?;
        Ok(reader)
    }

    /// Fill `out`, following the chain across block boundaries.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if self.offset >= self.block.len() {
                if self.next == INVALID_INDEX {
                    return Err(ArtError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("read past the end of the block chain at block {}", self.block_id),
                    )));
                }
                self.load(self.next)?;
                self.offset = BLOCK_HEADER_SIZE;
            }
            let n = (out.len() - filled).min(self.block.len() - self.offset);
            out[filled..filled + n].copy_from_slice(&self.block[self.offset..self.offset + n]);
            self.offset += n;
            filled += n;
        }
        Ok(())
    }

    /// Read `len` bytes, refusing lengths above `max`.
    pub fn read_vec(&mut self, len: usize, max: usize) -> Result<Vec<u8>> {
        if len > max {
            warn!(len, max, "serialized length exceeds limit");
            return Err(ArtError::Corruption(format!(
                "serialized length {len} exceeds limit {max}"
            )));
        }
        let mut out = vec![0u8; len];
        self.read_bytes(&mut out)?;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn load(&mut self, id: BlockId) -> Result<()> {
        self.store.read_block(id, &mut self.block)?;
        if self.verify {
            let mut stored = [0u8; 4];
            stored.copy_from_slice(&self.block[CRC_FIELD]);
            let stored = u32::from_le_bytes(stored);
            let actual = block_checksum(&self.block);
            if stored != actual {
                warn!(block = id, stored, actual, "block checksum mismatch");
                return Err(ArtError::Corruption(format!(
                    "checksum mismatch in block {id}: stored {stored:#010x}, computed {actual:#010x}"
                )));
            }
        }
        self.block_id = id;
        self.next = read_u64_at(&self.block, NEXT_FIELD);
        Ok(())
    }
}
