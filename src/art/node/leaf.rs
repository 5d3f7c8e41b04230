use smallvec::SmallVec;

use super::{corrupt, write_header, NodeType, RowId, MAX_SERIALIZED_LEN};
use crate::encoding::Key;
use crate::error::{ArtError, Result};
use crate::storage::{BlockPointer, MetaBlockReader, MetaBlockWriter};

/// A full key and the row ids stored under it.
///
/// Each row id appears at most once; insertion order is kept.
#[derive(Clone, Default)]
pub struct Leaf {
    key: Key,
    rows: SmallVec<[RowId; 1]>,
}

impl Leaf {
    /// Leaf holding one row id.
    pub fn new(key: Key, row_id: RowId) -> Self {
        let mut rows = SmallVec::new();
        rows.push(row_id);
        Self { key, rows }
    }

    /// The full key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Row ids in insertion order.
    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    /// Number of row ids.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row_id: RowId) -> bool {
        self.rows.contains(&row_id)
    }

    /// Add a row id. Returns false if it was already present.
    pub fn add(&mut self, row_id: RowId) -> bool {
        if self.contains(row_id) {
            return false;
        }
        self.rows.push(row_id);
        true
    }

    /// Remove a row id. Returns false if it was absent.
    pub fn remove(&mut self, row_id: RowId) -> bool {
        match self.rows.iter().position(|&r| r == row_id) {
            Some(pos) => {
                self.rows.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(super) fn serialize(&self, writer: &mut MetaBlockWriter<'_>) -> Result<BlockPointer> {
        // Anything the reader would refuse must not be written.
        if self.key.len() > MAX_SERIALIZED_LEN || self.rows.len() > MAX_SERIALIZED_LEN {
            return Err(ArtError::InvalidArgument(format!(
                "leaf with {} key bytes and {} row ids exceeds the limit of {MAX_SERIALIZED_LEN}",
                self.key.len(),
                self.rows.len()
            )));
        }
        let ptr = writer.position()?;
        write_header(writer, NodeType::Leaf, &[], 0)?;
        writer.write_u32(self.rows.len() as u32)?;
        for &row in &self.rows {
            writer.write_i64(row)?;
        }
        writer.write_u32(self.key.len() as u32)?;
        writer.write_bytes(self.key.as_bytes())?;
        Ok(ptr)
    }

    pub(super) fn read(reader: &mut MetaBlockReader<'_>) -> Result<Self> {
        let row_count = reader.read_u32()? as usize;
        if row_count == 0 || row_count > MAX_SERIALIZED_LEN {
            return Err(corrupt(format!("leaf with {row_count} row ids")));
        }
        let mut rows = SmallVec::with_capacity(row_count.min(64));
        for _ in 0..row_count {
            rows.push(reader.read_i64()?);
        }
        let key_len = reader.read_u32()? as usize;
        let key = Key::from(reader.read_vec(key_len, MAX_SERIALIZED_LEN)?);
        Ok(Self { key, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlockStore;

    #[test]
    fn test_row_set_semantics() {
        let mut leaf = Leaf::new(Key::from(b"k"), 1);
        assert!(leaf.add(2));
        assert!(!leaf.add(1));
        assert_eq!(leaf.rows(), &[1, 2]);
        assert!(leaf.remove(1));
        assert!(!leaf.remove(1));
        assert_eq!(leaf.rows(), &[2]);
        assert!(leaf.remove(2));
        assert!(leaf.is_empty());
        assert_eq!(leaf.len(), 0);
    }

    #[test]
    fn test_serialize_rejects_oversized_key() {
        let store = MemoryBlockStore::new(4096).unwrap();
        let mut writer = MetaBlockWriter::new(&store).unwrap();
        let leaf = Leaf::new(Key::from(vec![7u8; MAX_SERIALIZED_LEN + 1]), 1);
        assert!(matches!(leaf.serialize(&mut writer), Err(ArtError::InvalidArgument(_))));
        assert_eq!(writer.position().unwrap().offset as usize, crate::storage::BLOCK_HEADER_SIZE);
    }
}
