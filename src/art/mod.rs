//! Adaptive Radix Tree (ART) index.
//!
//! Based on "The Adaptive Radix Tree: ARTful Indexing for Main-Memory Databases"
//! by Leis et al., 2013.
//!
//! Key features:
//! - Adaptive node sizes (4, 16, 48, 256 children)
//! - Path compression with the full prefix stored in each node
//! - Multiple row ids per key, optionally unique
//! - Nodes persisted to a [`BlockStore`] and loaded lazily on first access

mod cursor;
mod debug;
mod node;
mod shared;

use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ArtConfig;
use crate::encoding::{common_prefix_len, Key};
use crate::error::{ArtError, Result};
use crate::storage::{BlockPointer, BlockStore, MemoryBlockStore, MetaBlockWriter};

pub use cursor::{Cursor, CursorPosition};
pub use node::{
    Child, Header, Leaf, Node, Node16, Node256, Node4, Node48, NodeLoader, NodeType, Prefix,
    RowId, SortedNode,
};
pub use shared::SharedArt;

use node::MAX_SERIALIZED_LEN;

/// Node and row counts of the resident part of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtStats {
    /// Number of Node4 instances
    pub node4_count: usize,
    /// Number of Node16 instances
    pub node16_count: usize,
    /// Number of Node48 instances
    pub node48_count: usize,
    /// Number of Node256 instances
    pub node256_count: usize,
    /// Number of leaf nodes
    pub leaf_count: usize,
    /// Row ids across all resident leaves
    pub row_count: usize,
    /// Bytes of resident leaf keys
    pub key_bytes: usize,
    /// Children still in block storage
    pub swizzled_count: usize,
}

impl ArtStats {
    /// Number of resident inner nodes.
    pub fn inner_count(&self) -> usize {
        self.node4_count + self.node16_count + self.node48_count + self.node256_count
    }

    fn visit(&mut self, child: &Child) {
        let Some(node) = child.resident() else {
            self.swizzled_count += 1;
            return;
        };
        match node {
            Node::Leaf(leaf) => {
                self.leaf_count += 1;
                self.row_count += leaf.len();
                self.key_bytes += leaf.key().len();
                return;
            }
            Node::Node4(_) => self.node4_count += 1,
            Node::Node16(_) => self.node16_count += 1,
            Node::Node48(_) => self.node48_count += 1,
            Node::Node256(_) => self.node256_count += 1,
        }
        if let Some(terminal) = node.terminal() {
            self.visit(terminal);
        }
        for (_, child) in node.children() {
            self.visit(child);
        }
    }
}

/// Result of a lookup that is not allowed to load nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<'a> {
    /// The key is present with these row ids.
    Found(&'a [RowId]),
    /// The key is absent.
    NotFound,
    /// The search reached a node that is still in block storage.
    NotResident,
}

/// What an erase did to the subtree it descended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Erased {
    NotFound,
    Removed,
    /// The subtree is now empty and its parent must drop the slot.
    RemovedEmpty,
}

/// An Adaptive Radix Tree mapping encoded keys to row ids.
pub struct Art {
    root: Option<Child>,
    store: Arc<dyn BlockStore>,
    config: ArtConfig,
}

impl Art {
    /// Create an empty index backed by an in-memory block store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryBlockStore::default()), ArtConfig::default())
    }

    /// Create an empty index with its own in-memory store of
    /// `config.block_size` blocks.
    pub fn with_config(config: ArtConfig) -> Result<Self> {
        config.validate()?;
        let store = MemoryBlockStore::new(config.block_size)?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Create an empty index that serializes into `store`.
    pub fn with_store(store: Arc<dyn BlockStore>, config: ArtConfig) -> Self {
        Self {
            root: None,
            store,
            config,
        }
    }

    /// Open a persisted index rooted at `root`. Only the root node is read;
    /// everything below it loads on demand.
    pub fn open(store: Arc<dyn BlockStore>, root: BlockPointer, config: ArtConfig) -> Result<Self> {
        let mut art = Self::with_store(store, config);
        let mut child = Child::Swizzled(root);
        child.resolve(art.loader())?;
        art.root = Some(child);
        debug!(%root, "opened index");
        Ok(art)
    }

    /// The configuration.
    pub fn config(&self) -> &ArtConfig {
        &self.config
    }

    /// The block store nodes are serialized into.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn loader(&self) -> NodeLoader<'_> {
        NodeLoader::new(self.store.as_ref(), self.config.verify_checksums)
    }

    /// Add `row_id` under `key`.
    ///
    /// Returns `false` if the pair was already present. Unique and primary
    /// indexes reject a new row id for an existing key. Keys longer than a
    /// leaf can persist are rejected with [`ArtError::InvalidArgument`].
    pub fn insert(&mut self, key: &Key, row_id: RowId) -> Result<bool> {
        if key.len() > MAX_SERIALIZED_LEN {
            return Err(ArtError::InvalidArgument(format!(
                "key of {} bytes exceeds the limit of {MAX_SERIALIZED_LEN}",
                key.len()
            )));
        }
        let loader = NodeLoader::new(self.store.as_ref(), self.config.verify_checksums);
        let unique = self.config.constraint.is_unique();
        match self.root.as_mut() {
            Some(root) => insert_into(root, key, row_id, 0, loader, unique),
            None => {
                self.root = Some(Child::new(Node::new_leaf(key.clone(), row_id)));
                Ok(true)
            }
        }
    }

    /// Remove `row_id` from `key`. Returns `false` if the pair was absent.
    pub fn erase(&mut self, key: &Key, row_id: RowId) -> Result<bool> {
        let loader = NodeLoader::new(self.store.as_ref(), self.config.verify_checksums);
        let Some(root) = self.root.as_mut() else {
            return Ok(false);
        };
        match erase_from(root, key, row_id, 0, loader)? {
            Erased::NotFound => Ok(false),
            Erased::Removed => Ok(true),
            Erased::RemovedEmpty => {
                self.root = None;
                Ok(true)
            }
        }
    }

    /// Row ids stored under `key`, loading nodes on the path as needed.
    pub fn lookup(&mut self, key: &Key) -> Result<Option<&[RowId]>> {
        let loader = NodeLoader::new(self.store.as_ref(), self.config.verify_checksums);
        let Some(mut slot) = self.root.as_mut() else {
            return Ok(None);
        };
        let mut depth = 0;
        loop {
            let node = match slot.resolve(loader)? {
                Node::Leaf(leaf) => {
                    return Ok(if leaf.key() == key { Some(leaf.rows()) } else { None });
                }
                inner => inner,
            };
            let prefix_len = node.prefix().len();
            if node.prefix_mismatch(key, depth) < prefix_len {
                return Ok(None);
            }
            depth += prefix_len;
            let next = match key.get(depth) {
                None => node.header_mut()?.terminal.as_mut(),
                Some(byte) => {
                    depth += 1;
                    node.child_mut(byte)?
                }
            };
            match next {
                Some(child) => slot = child,
                None => return Ok(None),
            }
        }
    }

    /// Whether `key` has any row ids.
    pub fn contains(&mut self, key: &Key) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Look up `key` using only resident nodes.
    pub fn probe(&self, key: &Key) -> Result<Probe<'_>> {
        let Some(mut child) = self.root.as_ref() else {
            return Ok(Probe::NotFound);
        };
        let mut depth = 0;
        loop {
            let Some(node) = child.resident() else {
                return Ok(Probe::NotResident);
            };
            if let Node::Leaf(leaf) = node {
                return Ok(if leaf.key() == key {
                    Probe::Found(leaf.rows())
                } else {
                    Probe::NotFound
                });
            }
            let prefix_len = node.prefix().len();
            if node.prefix_mismatch(key, depth) < prefix_len {
                return Ok(Probe::NotFound);
            }
            depth += prefix_len;
            let next = match key.get(depth) {
                None => node.terminal(),
                Some(byte) => {
                    depth += 1;
                    node.child(byte)?
                }
            };
            match next {
                Some(next) => child = next,
                None => return Ok(Probe::NotFound),
            }
        }
    }

    /// Smallest key in the index.
    pub fn minimum(&mut self) -> Result<Option<Key>> {
        self.extreme(Node::min_child_mut)
    }

    /// Largest key in the index.
    pub fn maximum(&mut self) -> Result<Option<Key>> {
        self.extreme(Node::max_child_mut)
    }

    fn extreme(
        &mut self,
        step: fn(&mut Node) -> Result<Option<&mut Child>>,
    ) -> Result<Option<Key>> {
        let loader = NodeLoader::new(self.store.as_ref(), self.config.verify_checksums);
        let Some(mut slot) = self.root.as_mut() else {
            return Ok(None);
        };
        loop {
            let node = match slot.resolve(loader)? {
                Node::Leaf(leaf) => return Ok(Some(leaf.key().clone())),
                inner => inner,
            };
            match step(node)? {
                Some(child) => slot = child,
                None => return Err(ArtError::Internal("inner node without children")),
            }
        }
    }

    /// Iterate over `(key, row_id)` pairs with keys in `range`, ascending.
    pub fn range<R: RangeBounds<Key>>(&mut self, range: R) -> Cursor<'_> {
        let position = CursorPosition::new(range.start_bound().cloned(), range.end_bound().cloned());
        Cursor::new(self, position)
    }

    /// Iterate over every key starting with `prefix`.
    pub fn prefix_scan(&mut self, prefix: &[u8]) -> Cursor<'_> {
        let upper = match prefix_end(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        let position = CursorPosition::new(Bound::Included(Key::from_slice(prefix)), upper);
        Cursor::new(self, position)
    }

    /// Iterate over the whole index.
    pub fn iter(&mut self) -> Cursor<'_> {
        self.range(..)
    }

    /// Continue a scan from a position saved with [`Cursor::position`].
    pub fn resume(&mut self, position: CursorPosition) -> Cursor<'_> {
        Cursor::new(self, position)
    }

    /// First leaf whose key satisfies `lower`.
    pub(crate) fn seek(&mut self, lower: &Bound<Key>) -> Result<Option<Leaf>> {
        let loader = NodeLoader::new(self.store.as_ref(), self.config.verify_checksums);
        match self.root.as_mut() {
            Some(root) => cursor::seek(root, lower, 0, loader),
            None => Ok(None),
        }
    }

    /// Counts over the resident part of the tree. Does not load anything.
    pub fn stats(&self) -> ArtStats {
        let mut stats = ArtStats::default();
        if let Some(root) = &self.root {
            stats.visit(root);
        }
        stats
    }

    /// Write every resident node to the store and return the root location.
    ///
    /// Subtrees that were never loaded keep their existing location. The
    /// in-memory tree is left untouched.
    pub fn serialize(&self) -> Result<Option<BlockPointer>> {
        match &self.root {
            None => Ok(None),
            Some(Child::Swizzled(ptr)) => Ok(Some(*ptr)),
            Some(Child::Memory(node)) => {
                let mut writer = MetaBlockWriter::new(self.store.as_ref())?;
                let ptr = node.serialize(&mut writer)?;
                let blocks = writer.block_count();
                writer.finish()?;
                debug!(root = %ptr, blocks, "serialized index");
                Ok(Some(ptr))
            }
        }
    }

    /// Serialize, sync the store, and drop the resident tree. Later accesses
    /// load nodes back on demand.
    pub fn checkpoint(&mut self) -> Result<Option<BlockPointer>> {
        let root = self.serialize()?;
        self.store.sync()?;
        self.root = root.map(Child::Swizzled);
        debug!(root = ?root, "checkpointed index");
        Ok(root)
    }
}

impl Default for Art {
    fn default() -> Self {
        Self::new()
    }
}

fn new_leaf(key: &Key, row_id: RowId) -> Child {
    Child::new(Node::new_leaf(key.clone(), row_id))
}

/// Hang `child` below `branch`: under `byte`, or as the terminal when the
/// key ends at the branch.
fn attach(branch: &mut Node, byte: Option<u8>, child: Child) -> Result<()> {
    match byte {
        Some(byte) => branch.insert_child(byte, child),
        None => {
            branch.header_mut()?.terminal = Some(child);
            Ok(())
        }
    }
}

fn insert_into(
    slot: &mut Child,
    key: &Key,
    row_id: RowId,
    depth: usize,
    loader: NodeLoader<'_>,
    unique: bool,
) -> Result<bool> {
    let node = slot.resolve(loader)?;

    if let Node::Leaf(leaf) = node {
        if leaf.key() == key {
            if leaf.contains(row_id) {
                return Ok(false);
            }
            if unique {
                return Err(ArtError::ConstraintViolation(key.to_hex()));
            }
            return Ok(leaf.add(row_id));
        }
        // Split the leaf: a new Node4 holds the shared bytes and both leaves.
        let existing = leaf.key().clone();
        let rest_existing = existing.as_bytes().get(depth..).unwrap_or(&[]);
        let rest_new = key.as_bytes().get(depth..).unwrap_or(&[]);
        let split = depth + common_prefix_len(rest_existing, rest_new);
        let old = std::mem::replace(slot, Child::new(Node::new_node4(&key.as_bytes()[depth..split])));
        let branch = slot.resolve(loader)?;
        attach(branch, existing.get(split), old)?;
        attach(branch, key.get(split), new_leaf(key, row_id))?;
        return Ok(true);
    }

    let prefix_len = node.prefix().len();
    let matched = node.prefix_mismatch(key, depth);
    if matched < prefix_len {
        // Split the prefix: the new branch keeps the matched part, the old
        // node keeps what follows the diverging byte.
        let mut branch = Node::new_node4(&[]);
        Node::copy_prefix(node, &mut branch)?;
        branch.header_mut()?.prefix.truncate(matched);
        let header = node.header_mut()?;
        let old_byte = header.prefix[matched];
        header.prefix.drain(..=matched);
        trace!(depth, matched, "split prefix");

        let old = std::mem::replace(slot, Child::new(branch));
        let branch = slot.resolve(loader)?;
        attach(branch, Some(old_byte), old)?;
        attach(branch, key.get(depth + matched), new_leaf(key, row_id))?;
        return Ok(true);
    }

    let depth = depth + prefix_len;
    match key.get(depth) {
        None => {
            let header = node.header_mut()?;
            match header.terminal.as_mut() {
                Some(terminal) => insert_into(terminal, key, row_id, depth, loader, unique),
                None => {
                    header.terminal = Some(new_leaf(key, row_id));
                    Ok(true)
                }
            }
        }
        Some(byte) => match node.child_mut(byte)? {
            Some(child) => insert_into(child, key, row_id, depth + 1, loader, unique),
            None => {
                node.insert_child(byte, new_leaf(key, row_id))?;
                Ok(true)
            }
        },
    }
}

fn erase_from(
    slot: &mut Child,
    key: &Key,
    row_id: RowId,
    depth: usize,
    loader: NodeLoader<'_>,
) -> Result<Erased> {
    let node = slot.resolve(loader)?;

    if let Node::Leaf(leaf) = node {
        if leaf.key() != key || !leaf.remove(row_id) {
            return Ok(Erased::NotFound);
        }
        return Ok(if leaf.is_empty() {
            Erased::RemovedEmpty
        } else {
            Erased::Removed
        });
    }

    let prefix_len = node.prefix().len();
    if node.prefix_mismatch(key, depth) < prefix_len {
        return Ok(Erased::NotFound);
    }
    let depth = depth + prefix_len;
    let outcome = match key.get(depth) {
        None => {
            let header = node.header_mut()?;
            let Some(terminal) = header.terminal.as_mut() else {
                return Ok(Erased::NotFound);
            };
            let outcome = erase_from(terminal, key, row_id, depth, loader)?;
            if outcome == Erased::RemovedEmpty {
                header.terminal = None;
            }
            outcome
        }
        Some(byte) => {
            let Some(child) = node.child_mut(byte)? else {
                return Ok(Erased::NotFound);
            };
            let outcome = erase_from(child, key, row_id, depth + 1, loader)?;
            if outcome == Erased::RemovedEmpty {
                node.erase_child(byte)?;
            }
            outcome
        }
    };

    match outcome {
        Erased::RemovedEmpty => compact(slot, loader),
        other => Ok(other),
    }
}

/// Collapse an inner node that just lost a child or its terminal.
fn compact(slot: &mut Child, loader: NodeLoader<'_>) -> Result<Erased> {
    let node = slot.resolve(loader)?;
    match (node.count(), node.terminal().is_some()) {
        (0, false) => Ok(Erased::RemovedEmpty),
        (0, true) => {
            let terminal = node
                .header_mut()?
                .terminal
                .take()
                .ok_or(ArtError::Internal("terminal vanished during merge"))?;
            *slot = terminal;
            trace!("replaced node by its terminal leaf");
            Ok(Erased::Removed)
        }
        (1, false) => {
            let prefix = Prefix::from_slice(node.prefix());
            let (byte, child) = node.take_only_child()?;
            let mut child = child.into_node(loader)?;
            if !child.is_leaf() {
                let header = child.header_mut()?;
                let mut merged = prefix;
                merged.push(byte);
                merged.extend_from_slice(&header.prefix);
                header.prefix = merged;
            }
            trace!(byte, "merged node into its only child");
            *slot = Child::Memory(child);
            Ok(Erased::Removed)
        }
        _ => Ok(Erased::Removed),
    }
}

/// Exclusive upper bound of all keys starting with `prefix`, `None` when
/// there is none (empty prefix or all `0xFF`).
fn prefix_end(prefix: &[u8]) -> Option<Key> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(Key::from(end));
        }
    }
    None
}
