//! ART node types with adaptive sizing.
//!
//! Inner nodes pick their layout from the number of children:
//!
//! - Node4: up to 4 children, sorted key array
//! - Node16: 5-16 children, sorted key array
//! - Node48: 17-48 children, 256-byte index into 48 slots
//! - Node256: 49-256 children, direct array indexing
//!
//! Every inner node carries a [`Header`]: the compressed path prefix and an
//! optional terminal leaf for the key that ends exactly at this node. Leaves
//! store the full key, so prefixes are never needed to reconstruct keys.
//!
//! Children are [`Child`] values, either resident or still in block storage.

mod leaf;
mod node256;
mod node48;
mod sorted;

use std::fmt;

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::encoding::{common_prefix_len, Key};
use crate::error::{ArtError, Result};
use crate::storage::{BlockPointer, BlockStore, MetaBlockReader, MetaBlockWriter, SwizzledPointer};

pub use leaf::Leaf;
pub use node256::Node256;
pub use node48::Node48;
pub use sorted::{Node16, Node4, SortedNode};

/// Opaque row identifier stored in leaves.
pub type RowId = i64;

/// Compressed path bytes of an inner node.
pub type Prefix = SmallVec<[u8; 8]>;

/// Upper bound for any length read back from storage (prefixes, keys, rows).
pub(crate) const MAX_SERIALIZED_LEN: usize = 1 << 26;

/// The type of a node, doubling as its on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    /// Up to 4 children.
    Node4 = 0,
    /// Up to 16 children.
    Node16 = 1,
    /// Up to 48 children.
    Node48 = 2,
    /// Up to 256 children.
    Node256 = 3,
    /// A key with its row ids.
    Leaf = 4,
}

impl NodeType {
    /// Decode an on-disk tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NodeType::Node4),
            1 => Some(NodeType::Node16),
            2 => Some(NodeType::Node48),
            3 => Some(NodeType::Node256),
            4 => Some(NodeType::Leaf),
            _ => None,
        }
    }

    /// The on-disk tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Maximum number of children, zero for leaves.
    pub fn capacity(self) -> usize {
        match self {
            NodeType::Node4 => 4,
            NodeType::Node16 => 16,
            NodeType::Node48 => 48,
            NodeType::Node256 => 256,
            NodeType::Leaf => 0,
        }
    }

    /// Variant to shrink into once `count` children remain, if any.
    pub fn shrink_target(self, count: usize) -> Option<NodeType> {
        match self {
            NodeType::Node16 if count <= NodeType::Node4.capacity() => Some(NodeType::Node4),
            NodeType::Node48 if count <= NodeType::Node16.capacity() => Some(NodeType::Node16),
            NodeType::Node256 if count <= NodeType::Node48.capacity() => Some(NodeType::Node48),
            _ => None,
        }
    }
}

/// State shared by all inner node variants.
#[derive(Default)]
pub struct Header {
    /// Bytes every key below this node shares at this depth.
    pub prefix: Prefix,
    /// Leaf for the key that ends at this node, if any.
    pub terminal: Option<Child>,
}

impl Header {
    /// Header with the given prefix and no terminal.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            prefix: Prefix::from_slice(prefix),
            terminal: None,
        }
    }
}

/// Reads nodes back from a block store.
#[derive(Clone, Copy)]
pub struct NodeLoader<'a> {
    store: &'a dyn BlockStore,
    verify: bool,
}

impl<'a> NodeLoader<'a> {
    /// Loader over `store`, optionally verifying block checksums.
    pub fn new(store: &'a dyn BlockStore, verify: bool) -> Self {
        Self { store, verify }
    }

    /// Deserialize the single node at `ptr`. Its children stay swizzled.
    pub fn load(&self, ptr: BlockPointer) -> Result<Node> {
        let mut reader = MetaBlockReader::open(self.store, ptr, self.verify)?;
        let tag = reader.read_u8()?;
        let node_type = NodeType::from_tag(tag).ok_or_else(|| {
            warn!(%ptr, tag, "unknown node tag");
            ArtError::Corruption(format!("unknown node tag {tag} at {ptr}"))
        })?;
        let prefix_len = reader.read_u32()? as usize;
        let prefix = Prefix::from_vec(reader.read_vec(prefix_len, MAX_SERIALIZED_LEN)?);
        let count = reader.read_u16()? as usize;
        let header = Header {
            prefix,
            terminal: None,
        };
        let node = match node_type {
            NodeType::Leaf => Node::Leaf(Leaf::read(&mut reader)?),
            NodeType::Node4 => Node::Node4(Node4::read(&mut reader, header, count)?),
            NodeType::Node16 => Node::Node16(Node16::read(&mut reader, header, count)?),
            NodeType::Node48 => Node::Node48(Node48::read(&mut reader, header, count)?),
            NodeType::Node256 => Node::Node256(Node256::read(&mut reader, header, count)?),
        };
        trace!(%ptr, ?node_type, count, "materialized node");
        Ok(node)
    }
}

/// A reference to a child node.
pub enum Child {
    /// The node is resident.
    Memory(Box<Node>),
    /// The node lives in block storage and is loaded on first access.
    Swizzled(BlockPointer),
}

impl Child {
    /// Wrap a resident node.
    pub fn new(node: Node) -> Self {
        Child::Memory(Box::new(node))
    }

    /// Whether the child still has to be loaded.
    pub fn is_swizzled(&self) -> bool {
        matches!(self, Child::Swizzled(_))
    }

    /// The node, if resident.
    pub fn resident(&self) -> Option<&Node> {
        match self {
            Child::Memory(node) => Some(&**node),
            Child::Swizzled(_) => None,
        }
    }

    /// The node, loading it first if needed. Loading is shallow.
    pub fn resolve(&mut self, loader: NodeLoader<'_>) -> Result<&mut Node> {
        if let Child::Swizzled(ptr) = *self {
            *self = Child::new(loader.load(ptr)?);
        }
        match self {
            Child::Memory(node) => Ok(&mut **node),
            Child::Swizzled(_) => Err(ArtError::Internal("child still swizzled after loading")),
        }
    }

    /// Take the node out, loading it first if needed.
    pub fn into_node(self, loader: NodeLoader<'_>) -> Result<Box<Node>> {
        match self {
            Child::Memory(node) => Ok(node),
            Child::Swizzled(ptr) => Ok(Box::new(loader.load(ptr)?)),
        }
    }

    /// Write the child (post-order) unless it is already in storage, and
    /// return its swizzled word.
    fn serialize(&self, writer: &mut MetaBlockWriter<'_>) -> Result<u64> {
        let ptr = match self {
            Child::Memory(node) => node.serialize(writer)?,
            Child::Swizzled(ptr) => *ptr,
        };
        Ok(SwizzledPointer::try_from(ptr)?.raw())
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Memory(node) => node.fmt(f),
            Child::Swizzled(ptr) => write!(f, "Swizzled({ptr})"),
        }
    }
}

/// Word for an optional child slot, `0` when empty.
fn child_word(child: Option<&Child>, writer: &mut MetaBlockWriter<'_>) -> Result<u64> {
    match child {
        Some(child) => child.serialize(writer),
        None => Ok(0),
    }
}

/// Decode a child word read from storage.
fn read_child(word: u64) -> Result<Option<Child>> {
    if word == 0 {
        return Ok(None);
    }
    let ptr = SwizzledPointer::from_raw(word);
    if !ptr.is_swizzled() {
        warn!(word, "child word is not a swizzled pointer");
        return Err(ArtError::Corruption(format!(
            "child word {word:#x} is not a swizzled pointer"
        )));
    }
    Ok(Some(Child::Swizzled(ptr.block_pointer()?)))
}

fn write_header(
    writer: &mut MetaBlockWriter<'_>,
    node_type: NodeType,
    prefix: &[u8],
    count: usize,
) -> Result<()> {
    writer.write_u8(node_type.tag())?;
    writer.write_u32(prefix.len() as u32)?;
    writer.write_bytes(prefix)?;
    writer.write_u16(count as u16)
}

fn corrupt(what: String) -> ArtError {
    warn!(%what, "invalid serialized node");
    ArtError::Corruption(what)
}

/// A node in the Adaptive Radix Tree.
pub enum Node {
    /// A key with its row ids.
    Leaf(Leaf),
    /// Up to 4 children.
    Node4(Node4),
    /// Up to 16 children.
    Node16(Node16),
    /// Up to 48 children.
    Node48(Node48),
    /// Up to 256 children.
    Node256(Node256),
}

impl Node {
    /// Create a leaf holding a single row id.
    pub fn new_leaf(key: Key, row_id: RowId) -> Self {
        Node::Leaf(Leaf::new(key, row_id))
    }

    /// Create an empty Node4 with the given prefix.
    pub fn new_node4(prefix: &[u8]) -> Self {
        Node::Node4(Node4::new(Header::with_prefix(prefix)))
    }

    /// Get the node type.
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Node4(_) => NodeType::Node4,
            Node::Node16(_) => NodeType::Node16,
            Node::Node48(_) => NodeType::Node48,
            Node::Node256(_) => NodeType::Node256,
        }
    }

    /// Whether this is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Number of children, not counting the terminal.
    pub fn count(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Node4(n) => n.count(),
            Node::Node16(n) => n.count(),
            Node::Node48(n) => n.count(),
            Node::Node256(n) => n.count(),
        }
    }

    /// Header of an inner node.
    pub fn header(&self) -> Option<&Header> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => Some(&n.header),
            Node::Node16(n) => Some(&n.header),
            Node::Node48(n) => Some(&n.header),
            Node::Node256(n) => Some(&n.header),
        }
    }

    /// Mutable header of an inner node.
    pub fn header_mut(&mut self) -> Result<&mut Header> {
        match self {
            Node::Leaf(_) => Err(ArtError::Internal("leaf has no header")),
            Node::Node4(n) => Ok(&mut n.header),
            Node::Node16(n) => Ok(&mut n.header),
            Node::Node48(n) => Ok(&mut n.header),
            Node::Node256(n) => Ok(&mut n.header),
        }
    }

    /// Compressed prefix, empty for leaves.
    pub fn prefix(&self) -> &[u8] {
        self.header().map_or(&[], |h| &h.prefix)
    }

    /// The terminal child, if any.
    pub fn terminal(&self) -> Option<&Child> {
        self.header().and_then(|h| h.terminal.as_ref())
    }

    /// Copy the compressed prefix of `src` into `dst`.
    pub fn copy_prefix(src: &Node, dst: &mut Node) -> Result<()> {
        let prefix = Prefix::from_slice(src.prefix());
        dst.header_mut()?.prefix = prefix;
        Ok(())
    }

    /// Number of prefix bytes that match `key` starting at `depth`.
    ///
    /// Equals the prefix length on a full match. If the key ends inside the
    /// prefix, the result is where it ends.
    pub fn prefix_mismatch(&self, key: &Key, depth: usize) -> usize {
        let rest = key.as_bytes().get(depth..).unwrap_or(&[]);
        common_prefix_len(self.prefix(), rest)
    }

    /// Child for a partial key.
    pub fn child(&self, byte: u8) -> Result<Option<&Child>> {
        match self {
            Node::Leaf(_) => Err(ArtError::Internal("child lookup on a leaf")),
            Node::Node4(n) => Ok(n.get(byte)),
            Node::Node16(n) => Ok(n.get(byte)),
            Node::Node48(n) => Ok(n.get(byte)),
            Node::Node256(n) => Ok(n.get(byte)),
        }
    }

    /// Mutable child for a partial key.
    pub fn child_mut(&mut self, byte: u8) -> Result<Option<&mut Child>> {
        match self {
            Node::Leaf(_) => Err(ArtError::Internal("child lookup on a leaf")),
            Node::Node4(n) => Ok(n.get_mut(byte)),
            Node::Node16(n) => Ok(n.get_mut(byte)),
            Node::Node48(n) => Ok(n.get_mut(byte)),
            Node::Node256(n) => Ok(n.get_mut(byte)),
        }
    }

    /// All children with their partial keys, ascending.
    pub fn children(&self) -> Vec<(u8, &Child)> {
        match self {
            Node::Leaf(_) => Vec::new(),
            Node::Node4(n) => n.entries().collect(),
            Node::Node16(n) => n.entries().collect(),
            Node::Node48(n) => n.entries().collect(),
            Node::Node256(n) => n.entries().collect(),
        }
    }

    /// Partial keys of all children, ascending.
    pub fn child_bytes(&self) -> Vec<u8> {
        self.children().into_iter().map(|(byte, _)| byte).collect()
    }

    /// Leftmost slot: the terminal, else the smallest partial key.
    pub fn min_child_mut(&mut self) -> Result<Option<&mut Child>> {
        if self.header_mut()?.terminal.is_some() {
            return Ok(self.header_mut()?.terminal.as_mut());
        }
        match self.child_bytes().first() {
            Some(&byte) => self.child_mut(byte),
            None => Ok(None),
        }
    }

    /// Rightmost slot: the largest partial key, else the terminal.
    pub fn max_child_mut(&mut self) -> Result<Option<&mut Child>> {
        match self.child_bytes().last() {
            Some(&byte) => self.child_mut(byte),
            None => Ok(self.header_mut()?.terminal.as_mut()),
        }
    }

    /// Overwrite the child stored under `byte`.
    pub fn replace_child(&mut self, byte: u8, child: Child) -> Result<()> {
        match self.child_mut(byte)? {
            Some(slot) => {
                *slot = child;
                Ok(())
            }
            None => Err(ArtError::Internal("replacing a child that does not exist")),
        }
    }

    /// Insert a child, growing into the next larger variant when full.
    /// An existing child under `byte` is replaced.
    pub fn insert_child(&mut self, byte: u8, child: Child) -> Result<()> {
        if let Some(slot) = self.child_mut(byte)? {
            *slot = child;
            return Ok(());
        }
        if self.count() >= self.node_type().capacity() {
            self.grow()?;
        }
        match self {
            Node::Leaf(_) => Err(ArtError::Internal("inserting a child into a leaf")),
            Node::Node4(n) => n.insert(byte, child),
            Node::Node16(n) => n.insert(byte, child),
            Node::Node48(n) => n.insert(byte, child),
            Node::Node256(n) => n.insert(byte, child),
        }
    }

    /// Remove the child under `byte`, shrinking into the next smaller variant
    /// once the remaining children fit it.
    pub fn erase_child(&mut self, byte: u8) -> Result<Option<Child>> {
        let removed = match self {
            Node::Leaf(_) => return Err(ArtError::Internal("erasing a child from a leaf")),
            Node::Node4(n) => n.remove(byte),
            Node::Node16(n) => n.remove(byte),
            Node::Node48(n) => n.remove(byte),
            Node::Node256(n) => n.remove(byte),
        };
        if removed.is_some() {
            if let Some(target) = self.node_type().shrink_target(self.count()) {
                self.convert(target)?;
            }
        }
        Ok(removed)
    }

    /// Remove and return the only child of a node with exactly one.
    pub fn take_only_child(&mut self) -> Result<(u8, Child)> {
        let bytes = self.child_bytes();
        let &[byte] = bytes.as_slice() else {
            return Err(ArtError::Internal("node does not have exactly one child"));
        };
        let child = match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => n.remove(byte),
            Node::Node16(n) => n.remove(byte),
            Node::Node48(n) => n.remove(byte),
            Node::Node256(n) => n.remove(byte),
        };
        child
            .map(|child| (byte, child))
            .ok_or(ArtError::Internal("child vanished during merge"))
    }

    fn grow(&mut self) -> Result<()> {
        let target = match self.node_type() {
            NodeType::Node4 => NodeType::Node16,
            NodeType::Node16 => NodeType::Node48,
            NodeType::Node48 => NodeType::Node256,
            NodeType::Node256 | NodeType::Leaf => {
                return Err(ArtError::Internal("node cannot grow"));
            }
        };
        self.convert(target)
    }

    /// Re-layout an inner node as `target`, moving the header and children.
    fn convert(&mut self, target: NodeType) -> Result<()> {
        let from = self.node_type();
        let (header, entries) = match self {
            Node::Leaf(_) => return Err(ArtError::Internal("converting a leaf")),
            Node::Node4(n) => n.take_parts(),
            Node::Node16(n) => n.take_parts(),
            Node::Node48(n) => n.take_parts(),
            Node::Node256(n) => n.take_parts(),
        };
        if entries.len() > target.capacity() {
            return Err(ArtError::Internal("children do not fit the target node"));
        }
        *self = match target {
            NodeType::Node4 => Node::Node4(Node4::from_parts(header, entries)),
            NodeType::Node16 => Node::Node16(Node16::from_parts(header, entries)),
            NodeType::Node48 => Node::Node48(Node48::from_parts(header, entries)),
            NodeType::Node256 => Node::Node256(Node256::from_parts(header, entries)),
            NodeType::Leaf => return Err(ArtError::Internal("converting into a leaf")),
        };
        trace!(?from, to = ?target, count = self.count(), "resized node");
        Ok(())
    }

    /// Write this node and every resident node below it. Children are
    /// written first; swizzled children keep their existing location.
    pub fn serialize(&self, writer: &mut MetaBlockWriter<'_>) -> Result<BlockPointer> {
        match self {
            Node::Leaf(leaf) => leaf.serialize(writer),
            Node::Node4(n) => n.serialize(NodeType::Node4, writer),
            Node::Node16(n) => n.serialize(NodeType::Node16, writer),
            Node::Node48(n) => n.serialize(writer),
            Node::Node256(n) => n.serialize(writer),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(leaf) => f
                .debug_struct("Leaf")
                .field("key", &leaf.key())
                .field("rows", &leaf.rows())
                .finish(),
            inner => f
                .debug_struct(match inner.node_type() {
                    NodeType::Node4 => "Node4",
                    NodeType::Node16 => "Node16",
                    NodeType::Node48 => "Node48",
                    _ => "Node256",
                })
                .field("prefix", &Key::from_slice(inner.prefix()))
                .field("count", &inner.count())
                .field("keys", &inner.child_bytes())
                .field("terminal", &inner.terminal().is_some())
                .finish(),
        }
    }
}
