use super::{child_word, corrupt, read_child, write_header, Child, Header, NodeType};
use crate::error::Result;
use crate::storage::{BlockPointer, MetaBlockReader, MetaBlockWriter};

/// A node with up to 256 children, indexed directly by partial key.
pub struct Node256 {
    /// Prefix and terminal.
    pub header: Header,
    count: u16,
    children: Box<[Option<Child>; 256]>,
}

impl Node256 {
    /// Create an empty node.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            count: 0,
            children: Box::new(std::array::from_fn(|_| None)),
        }
    }

    /// Build from children with distinct partial keys.
    pub fn from_parts(header: Header, entries: Vec<(u8, Child)>) -> Self {
        let mut node = Self::new(header);
        for (byte, child) in entries {
            if node.children[byte as usize].replace(child).is_none() {
                node.count += 1;
            }
        }
        node
    }

    /// Move the header and children out in key order, leaving the node empty.
    pub fn take_parts(&mut self) -> (Header, Vec<(u8, Child)>) {
        let header = std::mem::take(&mut self.header);
        let entries = self
            .children
            .iter_mut()
            .enumerate()
            .filter_map(|(byte, slot)| slot.take().map(|child| (byte as u8, child)))
            .collect();
        self.count = 0;
        (header, entries)
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn get(&self, byte: u8) -> Option<&Child> {
        self.children[byte as usize].as_ref()
    }

    pub fn get_mut(&mut self, byte: u8) -> Option<&mut Child> {
        self.children[byte as usize].as_mut()
    }

    pub fn insert(&mut self, byte: u8, child: Child) -> Result<()> {
        if self.children[byte as usize].replace(child).is_none() {
            self.count += 1;
        }
        Ok(())
    }

    pub fn remove(&mut self, byte: u8) -> Option<Child> {
        let child = self.children[byte as usize].take();
        if child.is_some() {
            self.count -= 1;
        }
        child
    }

    pub fn entries(&self) -> impl Iterator<Item = (u8, &Child)> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(byte, slot)| slot.as_ref().map(|child| (byte as u8, child)))
    }

    pub(super) fn serialize(&self, writer: &mut MetaBlockWriter<'_>) -> Result<BlockPointer> {
        let mut words = [0u64; 256];
        for (word, slot) in words.iter_mut().zip(self.children.iter()) {
            *word = child_word(slot.as_ref(), writer)?;
        }
        let terminal = child_word(self.header.terminal.as_ref(), writer)?;

        let ptr = writer.position()?;
        write_header(writer, NodeType::Node256, &self.header.prefix, self.count())?;
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
        let mut node = Self::new(Header::default());
        for slot in node.children.iter_mut() {
            *slot = read_child(reader.read_u64()?)?;
        }
        header.terminal = read_child(reader.read_u64()?)?;
        let filled = node.children.iter().filter(|c| c.is_some()).count();
        if filled != count {
            return Err(corrupt(format!(
                "Node256 count {count} disagrees with {filled} stored children"
            )));
        }
        node.header = header;
        node.count = count as u16;
        Ok(node)
    }
}
