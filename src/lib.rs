//! # art-index
//!
//! An Adaptive Radix Tree index over order-preserving encoded keys, with
//! nodes persisted to fixed-size blocks and loaded back lazily.
//!
//! Based on "The Adaptive Radix Tree: ARTful Indexing for Main-Memory
//! Databases" (ICDE 2013, Leis et al.)
//!
//! Each key maps to one or more row ids. Unique and primary indexes allow
//! only one row id per key. A checkpoint writes every resident node into a
//! [`BlockStore`] and replaces the in-memory tree by a single swizzled
//! pointer; later operations pull in only the nodes on their path.
//!
//! ## Example
//!
//! ```rust
//! use art_index::{Art, Key};
//!
//! let mut art = Art::new();
//! art.insert(&Key::encode("hello"), 1)?;
//! art.insert(&Key::encode("world"), 2)?;
//! art.insert(&Key::encode("world"), 3)?;
//!
//! assert_eq!(art.lookup(&Key::encode("hello"))?, Some(&[1][..]));
//! assert_eq!(art.lookup(&Key::encode("world"))?, Some(&[2, 3][..]));
//!
//! let root = art.checkpoint()?.expect("index is not empty");
//! let mut reopened = Art::open(art.store().clone(), root, Default::default())?;
//! assert!(reopened.contains(&Key::encode("hello"))?);
//! # Ok::<(), art_index::ArtError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod art;
pub mod config;
pub mod encoding;
pub mod error;
pub mod storage;

pub use art::{
    Art, ArtStats, Child, Cursor, CursorPosition, Leaf, Node, NodeType, Probe, RowId, SharedArt,
};
pub use config::{ArtConfig, IndexConstraint};
pub use encoding::{EncodeKey, Key, KeyBuilder};
pub use error::{ArtError, Result};
pub use storage::{BlockId, BlockPointer, BlockStore, FileBlockStore, MemoryBlockStore};

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn random_key(rng: &mut StdRng) -> Vec<u8> {
        // Small alphabet so keys share prefixes and end inside each other.
        let len = rng.gen_range(0..9);
        (0..len).map(|_| rng.gen_range(0..4u8)).collect()
    }

    fn contents(art: &mut Art) -> Vec<(Vec<u8>, RowId)> {
        art.iter()
            .map(|item| item.map(|(key, row)| (key.as_bytes().to_vec(), row)))
            .collect::<Result<_>>()
            .unwrap()
    }

    fn expected(model: &BTreeMap<Vec<u8>, Vec<RowId>>) -> Vec<(Vec<u8>, RowId)> {
        model
            .iter()
            .flat_map(|(key, rows)| rows.iter().map(move |&row| (key.clone(), row)))
            .collect()
    }

    #[test]
    fn test_randomized_insert_erase_lookup() {
        init_tracing();
        let mut rng = StdRng::seed_from_u64(2);
        let mut art = Art::new();
        let mut model: BTreeMap<Vec<u8>, Vec<RowId>> = BTreeMap::new();

        for _ in 0..50_000 {
            let op = rng.gen_range(0..100);
            let key = random_key(&mut rng);
            let row = rng.gen_range(0..4);
            match op {
                0..=49 => {
                    let rows = model.entry(key.clone()).or_default();
                    let fresh = !rows.contains(&row);
                    if fresh {
                        rows.push(row);
                    }
                    assert_eq!(art.insert(&Key::from(key), row).unwrap(), fresh);
                }
                50..=79 => {
                    let removed = match model.get_mut(&key) {
                        Some(rows) => match rows.iter().position(|&r| r == row) {
                            Some(pos) => {
                                rows.remove(pos);
                                if rows.is_empty() {
                                    model.remove(&key);
                                }
                                true
                            }
                            None => false,
                        },
                        None => false,
                    };
                    assert_eq!(art.erase(&Key::from(key), row).unwrap(), removed);
                }
                _ => {
                    let want = model.get(&key).map(Vec::as_slice);
                    assert_eq!(art.lookup(&Key::from(key)).unwrap(), want);
                }
            }
        }

        assert!(art.verify_integrity().is_empty(), "{:?}", art.verify_integrity());
        assert_eq!(contents(&mut art), expected(&model));
        assert_eq!(art.is_empty(), model.is_empty());
    }

    #[test]
    fn test_randomized_with_checkpoints() {
        init_tracing();
        let mut rng = StdRng::seed_from_u64(7);
        let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new(512).unwrap());
        let mut art = Art::with_store(store.clone(), ArtConfig::default());
        let mut model: BTreeMap<Vec<u8>, Vec<RowId>> = BTreeMap::new();

        for round in 0..20 {
            for _ in 0..500 {
                let key: u32 = rng.gen_range(0..2_000);
                let row: RowId = rng.gen_range(-2..2);
                let encoded = Key::encode(&key);
                let bytes = encoded.as_bytes().to_vec();
                if rng.gen_bool(0.7) {
                    let rows = model.entry(bytes).or_default();
                    if !rows.contains(&row) {
                        rows.push(row);
                    }
                    art.insert(&encoded, row).unwrap();
                } else {
                    if let Some(rows) = model.get_mut(&bytes) {
                        rows.retain(|&r| r != row);
                        if rows.is_empty() {
                            model.remove(&bytes);
                        }
                    }
                    art.erase(&encoded, row).unwrap();
                }
            }
            let root = art.checkpoint().unwrap();
            if round % 3 == 0 {
                if let Some(root) = root {
                    art = Art::open(store.clone(), root, ArtConfig::default()).unwrap();
                }
            }
        }

        assert_eq!(contents(&mut art), expected(&model));
        assert!(art.verify_integrity().is_empty());
    }

    #[test]
    fn test_unique_index_keeps_first_row() {
        let mut art = Art::with_config(ArtConfig::unique()).unwrap();
        let mut seen = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        for row in 0..5_000 {
            let key: i16 = rng.gen();
            let result = art.insert(&Key::encode(&key), row);
            if seen.insert(key) {
                assert!(result.unwrap());
            } else {
                assert!(matches!(result, Err(ArtError::ConstraintViolation(_))));
            }
        }
        assert_eq!(art.stats().leaf_count, seen.len());
        assert_eq!(art.stats().row_count, seen.len());
    }

    #[test]
    fn test_compound_keys_scan_in_column_order() {
        let mut art = Art::new();
        for (row, (a, b)) in [(2i32, "x"), (-1, "z"), (2, ""), (-1, "a"), (10, "m")].iter().enumerate() {
            let key = Key::builder().push(a).push(*b).finish();
            art.insert(&key, row as RowId).unwrap();
        }
        let rows: Vec<RowId> = art.iter().map(|item| item.unwrap().1).collect();
        assert_eq!(rows, vec![3, 1, 2, 0, 4]);
    }
}

#[cfg(test)]
mod proptests;
