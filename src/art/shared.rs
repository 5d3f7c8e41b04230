use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Art, Probe, RowId};
use crate::encoding::Key;
use crate::error::Result;
use crate::storage::BlockPointer;

/// Thread-safe wrapper around an [`Art`].
///
/// Lookups that only touch resident nodes share a read lock. A lookup that
/// has to load nodes from the block store retries under the write lock.
pub struct SharedArt {
    inner: RwLock<Art>,
}

impl SharedArt {
    /// Wrap an index.
    pub fn new(art: Art) -> Self {
        Self {
            inner: RwLock::new(art),
        }
    }

    /// Unwrap the index.
    pub fn into_inner(self) -> Art {
        self.inner.into_inner()
    }

    /// Row ids stored under `key`.
    pub fn lookup(&self, key: &Key) -> Result<Option<Vec<RowId>>> {
        {
            let art = self.inner.read();
            match art.probe(key)? {
                Probe::Found(rows) => return Ok(Some(rows.to_vec())),
                Probe::NotFound => return Ok(None),
                Probe::NotResident => {}
            }
        }
        let mut art = self.inner.write();
        Ok(art.lookup(key)?.map(<[RowId]>::to_vec))
    }

    /// Whether `key` has any row ids.
    pub fn contains(&self, key: &Key) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// See [`Art::insert`].
    pub fn insert(&self, key: &Key, row_id: RowId) -> Result<bool> {
        self.inner.write().insert(key, row_id)
    }

    /// See [`Art::erase`].
    pub fn erase(&self, key: &Key, row_id: RowId) -> Result<bool> {
        self.inner.write().erase(key, row_id)
    }

    /// See [`Art::checkpoint`].
    pub fn checkpoint(&self) -> Result<Option<BlockPointer>> {
        self.inner.write().checkpoint()
    }

    /// Shared access for probes, stats and serialization.
    pub fn read(&self) -> RwLockReadGuard<'_, Art> {
        self.inner.read()
    }

    /// Exclusive access for scans and bulk changes.
    pub fn write(&self) -> RwLockWriteGuard<'_, Art> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::config::ArtConfig;
    use crate::storage::{BlockStore, MemoryBlockStore};

    #[test]
    fn test_concurrent_readers_and_writer() {
        let shared = Arc::new(SharedArt::new(Art::new()));
        for i in 0..1_000u32 {
            shared.insert(&Key::encode(&i), i as RowId).unwrap();
        }

        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 1_000..2_000u32 {
                    shared.insert(&Key::encode(&i), i as RowId).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|t| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for i in (t..1_000u32).step_by(4) {
                        let rows = shared.lookup(&Key::encode(&i)).unwrap();
                        assert_eq!(rows, Some(vec![i as RowId]));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(shared.read().stats().leaf_count, 2_000);
    }

    #[test]
    fn test_lookup_loads_under_write_lock() {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new(1024).unwrap());
        let shared = SharedArt::new(Art::with_store(store, ArtConfig::default()));
        for i in 0..100u64 {
            shared.insert(&Key::encode(&i), -(i as RowId)).unwrap();
        }
        shared.checkpoint().unwrap();
        assert_eq!(shared.read().probe(&Key::encode(&7u64)).unwrap(), Probe::NotResident);

        assert_eq!(shared.lookup(&Key::encode(&7u64)).unwrap(), Some(vec![-7]));
        assert!(!shared.contains(&Key::encode(&500u64)).unwrap());
        assert!(shared.erase(&Key::encode(&7u64), -7).unwrap());
        assert_eq!(shared.lookup(&Key::encode(&7u64)).unwrap(), None);
        assert!(!shared.into_inner().is_empty());
    }
}
