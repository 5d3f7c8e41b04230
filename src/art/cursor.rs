//! Ordered scans.
//!
//! A cursor does not pin tree nodes. It remembers the key it stopped at and
//! how many row ids of that key it already returned, and seeks from the root
//! again for every leaf. That keeps it valid across lazy loading and lets a
//! saved [`CursorPosition`] be resumed after the index was modified.

use std::ops::Bound;

use super::node::{Child, Leaf, Node, NodeLoader, RowId};
use super::Art;
use crate::encoding::Key;
use crate::error::{ArtError, Result};

/// Where a scan continues: the lower bound, the upper bound, and how many
/// row ids of the lower bound key were already returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPosition {
    lower: Bound<Key>,
    upper: Bound<Key>,
    skip: usize,
}

impl CursorPosition {
    pub(crate) fn new(lower: Bound<Key>, upper: Bound<Key>) -> Self {
        Self {
            lower,
            upper,
            skip: 0,
        }
    }

    /// Lower bound of the remaining scan.
    pub fn lower(&self) -> &Bound<Key> {
        &self.lower
    }

    /// Upper bound of the scan.
    pub fn upper(&self) -> &Bound<Key> {
        &self.upper
    }

    fn admits(&self, key: &Key) -> bool {
        match &self.upper {
            Bound::Included(upper) => key <= upper,
            Bound::Excluded(upper) => key < upper,
            Bound::Unbounded => true,
        }
    }
}

/// Iterator over `(key, row_id)` pairs in ascending key order. Row ids of
/// one key come out in insertion order.
pub struct Cursor<'a> {
    art: &'a mut Art,
    position: CursorPosition,
    current: Option<Leaf>,
    done: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(art: &'a mut Art, position: CursorPosition) -> Self {
        Self {
            art,
            position,
            current: None,
            done: false,
        }
    }

    /// Snapshot of where the scan stands, for [`Art::resume`].
    pub fn position(&self) -> CursorPosition {
        self.position.clone()
    }

    fn fail(&mut self, err: ArtError) -> Option<Result<(Key, RowId)>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<(Key, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(leaf) = &self.current {
                if let Some(&row) = leaf.rows().get(self.position.skip) {
                    self.position.skip += 1;
                    return Some(Ok((leaf.key().clone(), row)));
                }
                self.position.lower = Bound::Excluded(leaf.key().clone());
                self.position.skip = 0;
                self.current = None;
            }

            let leaf = match self.art.seek(&self.position.lower) {
                Ok(Some(leaf)) => leaf,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => return self.fail(err),
            };
            if !self.position.admits(leaf.key()) {
                self.done = true;
                return None;
            }
            // The saved skip count only applies if the same key came back.
            let same_key = matches!(&self.position.lower, Bound::Included(key) if key == leaf.key());
            if !same_key {
                self.position.skip = 0;
            }
            self.position.lower = Bound::Included(leaf.key().clone());
            self.current = Some(leaf);
        }
    }
}

fn satisfies(key: &Key, lower: &Bound<Key>) -> bool {
    match lower {
        Bound::Included(bound) => key >= bound,
        Bound::Excluded(bound) => key > bound,
        Bound::Unbounded => true,
    }
}

/// Smallest leaf below `slot`.
fn leftmost(mut slot: &mut Child, loader: NodeLoader<'_>) -> Result<Option<Leaf>> {
    loop {
        let node = match slot.resolve(loader)? {
            Node::Leaf(leaf) => return Ok(Some(leaf.clone())),
            inner => inner,
        };
        match node.min_child_mut()? {
            Some(child) => slot = child,
            None => return Ok(None),
        }
    }
}

/// Smallest leaf below `slot` whose key satisfies `lower`. `depth` is the
/// number of key bytes consumed above `slot`.
pub(crate) fn seek(
    slot: &mut Child,
    lower: &Bound<Key>,
    depth: usize,
    loader: NodeLoader<'_>,
) -> Result<Option<Leaf>> {
    let node = slot.resolve(loader)?;
    if let Node::Leaf(leaf) = node {
        return Ok(if satisfies(leaf.key(), lower) {
            Some(leaf.clone())
        } else {
            None
        });
    }
    let bound = match lower {
        Bound::Included(bound) | Bound::Excluded(bound) => bound,
        Bound::Unbounded => return leftmost(slot, loader),
    };

    let prefix_len = node.prefix().len();
    let matched = node.prefix_mismatch(bound, depth);
    if matched < prefix_len {
        // Either the bound ends inside the prefix or the prefix diverges
        // from it; the whole subtree falls on one side.
        let greater = match bound.get(depth + matched) {
            None => true,
            Some(byte) => node.prefix()[matched] > byte,
        };
        return if greater {
            leftmost(slot, loader)
        } else {
            Ok(None)
        };
    }

    let depth = depth + prefix_len;
    let bytes = node.child_bytes();
    let (first, rest) = match bound.get(depth) {
        None => {
            // Only the terminal can equal the bound; every child is greater.
            if let Some(terminal) = node.header_mut()?.terminal.as_mut() {
                if let Some(leaf) = seek(terminal, lower, depth, loader)? {
                    return Ok(Some(leaf));
                }
            }
            (None, &bytes[..])
        }
        Some(byte) => {
            let split = bytes.partition_point(|&b| b <= byte);
            let first = (split > 0 && bytes[split - 1] == byte).then_some(byte);
            (first, &bytes[split..])
        }
    };

    if let Some(byte) = first {
        if let Some(child) = node.child_mut(byte)? {
            if let Some(leaf) = seek(child, lower, depth + 1, loader)? {
                return Ok(Some(leaf));
            }
        }
    }
    for &byte in rest {
        if let Some(child) = node.child_mut(byte)? {
            if let Some(leaf) = leftmost(child, loader)? {
                return Ok(Some(leaf));
            }
        }
    }
    Ok(None)
}
