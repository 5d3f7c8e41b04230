use super::{child_word, corrupt, read_child, write_header, Child, Header, NodeType};
use crate::error::{ArtError, Result};
use crate::storage::{BlockPointer, MetaBlockReader, MetaBlockWriter};

const EMPTY: u8 = 0xFF;
const SLOTS: usize = 48;

/// A node with up to 48 children, addressed through a 256-byte index.
pub struct Node48 {
    /// Prefix and terminal.
    pub header: Header,
    count: u8,
    index: Box<[u8; 256]>,
    children: Box<[Option<Child>; SLOTS]>,
}

impl Node48 {
    /// Create an empty node.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            count: 0,
            index: Box::new([EMPTY; 256]),
            children: Box::new(std::array::from_fn(|_| None)),
        }
    }

    /// Build from children sorted by partial key. At most 48 entries.
    pub fn from_parts(header: Header, entries: Vec<(u8, Child)>) -> Self {
        debug_assert!(entries.len() <= SLOTS);
        let mut node = Self::new(header);
        for (slot, (byte, child)) in entries.into_iter().enumerate() {
            node.index[byte as usize] = slot as u8;
            node.children[slot] = Some(child);
            node.count += 1;
        }
        node
    }

    /// Move the header and children out in key order, leaving the node empty.
    pub fn take_parts(&mut self) -> (Header, Vec<(u8, Child)>) {
        let header = std::mem::take(&mut self.header);
        let mut entries = Vec::with_capacity(self.count());
        for byte in 0..=255u8 {
            let slot = std::mem::replace(&mut self.index[byte as usize], EMPTY);
            if slot != EMPTY {
                if let Some(child) = self.children[slot as usize].take() {
                    entries.push((byte, child));
                }
            }
        }
        self.count = 0;
        (header, entries)
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn get(&self, byte: u8) -> Option<&Child> {
        match self.index[byte as usize] {
            EMPTY => None,
            slot => self.children[slot as usize].as_ref(),
        }
    }

    pub fn get_mut(&mut self, byte: u8) -> Option<&mut Child> {
        match self.index[byte as usize] {
            EMPTY => None,
            slot => self.children[slot as usize].as_mut(),
        }
    }

    /// Insert or replace the child under `byte`, reusing freed slots.
    pub fn insert(&mut self, byte: u8, child: Child) -> Result<()> {
        if let Some(existing) = self.get_mut(byte) {
            *existing = child;
            return Ok(());
        }
        let slot = self
            .children
            .iter()
            .position(Option::is_none)
            .ok_or(ArtError::Internal("Node48 is full"))?;
        self.index[byte as usize] = slot as u8;
        self.children[slot] = Some(child);
        self.count += 1;
        Ok(())
    }

    pub fn remove(&mut self, byte: u8) -> Option<Child> {
        let slot = std::mem::replace(&mut self.index[byte as usize], EMPTY);
        if slot == EMPTY {
            return None;
        }
        let child = self.children[slot as usize].take();
        if child.is_some() {
            self.count -= 1;
        }
        child
    }

    /// Children with their partial keys, ascending.
    pub fn entries(&self) -> impl Iterator<Item = (u8, &Child)> + '_ {
        self.index.iter().enumerate().filter_map(|(byte, &slot)| {
            if slot == EMPTY {
                return None;
            }
            self.children[slot as usize]
                .as_ref()
                .map(|child| (byte as u8, child))
        })
    }

    /// Writes children compacted into slots in key order.
    pub(super) fn serialize(&self, writer: &mut MetaBlockWriter<'_>) -> Result<BlockPointer> {
        let mut index = [EMPTY; 256];
        let mut words = [0u64; SLOTS];
        for (slot, (byte, child)) in self.entries().enumerate() {
            index[byte as usize] = slot as u8;
            words[slot] = child_word(Some(child), writer)?;
        }
        let terminal = child_word(self.header.terminal.as_ref(), writer)?;

        let ptr = writer.position()?;
        write_header(writer, NodeType::Node48, &self.header.prefix, self.count())?;
        writer.write_bytes(&index)?;
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
        if count > SLOTS {
            return Err(corrupt(format!("Node48 claims {count} children")));
        }
        let mut index = [EMPTY; 256];
        reader.read_bytes(&mut index)?;
        let mut node = Self::new(Header::default());
        for slot in node.children.iter_mut() {
            *slot = read_child(reader.read_u64()?)?;
        }
        header.terminal = read_child(reader.read_u64()?)?;

        let mut used = [false; SLOTS];
        for (byte, &slot) in index.iter().enumerate() {
            if slot == EMPTY {
                continue;
            }
            let s = slot as usize;
            if s >= SLOTS || used[s] || node.children[s].is_none() {
                return Err(corrupt(format!("Node48 index {byte} points at bad slot {slot}")));
            }
            used[s] = true;
        }
        let mapped = used.iter().filter(|&&u| u).count();
        let filled = node.children.iter().filter(|c| c.is_some()).count();
        if mapped != count || filled != count {
            return Err(corrupt(format!(
                "Node48 count {count} disagrees with {mapped} indexed and {filled} stored children"
            )));
        }
        node.header = header;
        node.index = Box::new(index);
        node.count = count as u8;
        Ok(node)
    }
}
