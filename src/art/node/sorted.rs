//! Node4 and Node16: parallel arrays of sorted partial keys and children.

use super::{child_word, corrupt, read_child, write_header, Child, Header, NodeType};
use crate::error::{ArtError, Result};
use crate::storage::{BlockPointer, MetaBlockReader, MetaBlockWriter};

/// A node with up to 4 children.
pub type Node4 = SortedNode<4>;

/// A node with up to 16 children.
pub type Node16 = SortedNode<16>;

/// Inner node with up to `N` children, partial keys kept sorted ascending.
pub struct SortedNode<const N: usize> {
    /// Prefix and terminal.
    pub header: Header,
    count: u8,
    keys: [u8; N],
    children: [Option<Child>; N],
}

impl<const N: usize> SortedNode<N> {
    /// Create an empty node.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            count: 0,
            keys: [0; N],
            children: std::array::from_fn(|_| None),
        }
    }

    /// Build from children sorted by partial key. At most `N` entries.
    pub fn from_parts(header: Header, entries: Vec<(u8, Child)>) -> Self {
        debug_assert!(entries.len() <= N);
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        let mut node = Self::new(header);
        for (i, (byte, child)) in entries.into_iter().enumerate() {
            node.keys[i] = byte;
            node.children[i] = Some(child);
        }
        node.count = node.children.iter().filter(|c| c.is_some()).count() as u8;
        node
    }

    /// Move the header and children out, leaving the node empty.
    pub fn take_parts(&mut self) -> (Header, Vec<(u8, Child)>) {
        let header = std::mem::take(&mut self.header);
        let count = self.count();
        let entries = self.keys[..count]
            .iter()
            .zip(self.children[..count].iter_mut())
            .filter_map(|(&byte, slot)| slot.take().map(|child| (byte, child)))
            .collect();
        self.count = 0;
        self.keys = [0; N];
        (header, entries)
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    fn position(&self, byte: u8) -> std::result::Result<usize, usize> {
        self.keys[..self.count()].binary_search(&byte)
    }

    pub fn get(&self, byte: u8) -> Option<&Child> {
        let i = self.position(byte).ok()?;
        self.children[i].as_ref()
    }

    pub fn get_mut(&mut self, byte: u8) -> Option<&mut Child> {
        let i = self.position(byte).ok()?;
        self.children[i].as_mut()
    }

    /// Insert or replace the child under `byte`.
    pub fn insert(&mut self, byte: u8, child: Child) -> Result<()> {
        let count = self.count();
        match self.position(byte) {
            Ok(i) => self.children[i] = Some(child),
            Err(_) if count == N => return Err(ArtError::Internal("sorted node is full")),
            Err(i) => {
                self.keys.copy_within(i..count, i + 1);
                self.children[i..=count].rotate_right(1);
                self.keys[i] = byte;
                self.children[i] = Some(child);
                self.count += 1;
            }
        }
        Ok(())
    }

    /// Remove the child under `byte`, keeping the arrays dense.
    pub fn remove(&mut self, byte: u8) -> Option<Child> {
        let i = self.position(byte).ok()?;
        let count = self.count();
        let child = self.children[i].take();
        self.children[i..count].rotate_left(1);
        self.keys.copy_within(i + 1..count, i);
        self.keys[count - 1] = 0;
        self.count -= 1;
        child
    }

    /// Children with their partial keys, ascending.
    pub fn entries(&self) -> impl Iterator<Item = (u8, &Child)> + '_ {
        let count = self.count();
        self.keys[..count]
            .iter()
            .zip(self.children[..count].iter())
            .filter_map(|(&byte, slot)| slot.as_ref().map(|child| (byte, child)))
    }

    pub(super) fn serialize(
        &self,
        node_type: NodeType,
        writer: &mut MetaBlockWriter<'_>,
    ) -> Result<BlockPointer> {
        let mut words = [0u64; N];
        for (word, slot) in words.iter_mut().zip(self.children.iter()) {
            *word = child_word(slot.as_ref(), writer)?;
        }
        let terminal = child_word(self.header.terminal.as_ref(), writer)?;

        let ptr = writer.position()?;
        write_header(writer, node_type, &self.header.prefix, self.count())?;
        writer.write_bytes(&self.keys)?;
        for word in words {
            writer.write_u64(word)?;
        }
        writer.write_u64(terminal)?;
        Ok(ptr)
    }

    pub(super) fn read(
        reader: &mut MetaBlockReader<'_>,
        mut header: Header,
        count: usize,
    ) -> Result<Self> {
        if count > N {
            return Err(corrupt(format!("node with capacity {N} claims {count} children")));
        }
        let mut keys = [0u8; N];
        reader.read_bytes(&mut keys)?;
        if !keys[..count].windows(2).all(|w| w[0] < w[1]) {
            return Err(corrupt(format!("partial keys out of order: {:?}", &keys[..count])));
        }
        let mut node = Self::new(Header::default());
        for i in 0..N {
            let child = read_child(reader.read_u64()?)?;
            if child.is_some() != (i < count) {
                return Err(corrupt(format!("child slot {i} does not match count {count}")));
            }
            node.children[i] = child;
        }
        header.terminal = read_child(reader.read_u64()?)?;
        node.header = header;
        node.keys = keys;
        node.count = count as u8;
        Ok(node)
    }
}
