//! Debug utilities for ART troubleshooting.
//!
//! Both helpers only look at resident nodes; swizzled subtrees are shown as
//! their block location and are not checked.

use std::fmt::Write;

use super::node::{Child, Leaf, Node};
use super::Art;
use crate::encoding::to_hex as hex;

impl Art {
    /// Render the resident tree, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        match &self.root {
            Some(root) => dump_child(&mut out, root, 0),
            None => out.push_str("(empty)\n"),
        }
        out
    }

    /// Check structural invariants of the resident tree. Returns a list of
    /// problems found; empty when the tree is consistent.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Some(root) = &self.root {
            verify_child(root, &mut Vec::new(), &mut issues);
        }
        issues
    }
}

fn dump_child(out: &mut String, child: &Child, indent: usize) {
    let pad = "  ".repeat(indent);
    let node = match child {
        Child::Swizzled(ptr) => {
            let _ = writeln!(out, "{pad}<swizzled {ptr}>");
            return;
        }
        Child::Memory(node) => node,
    };
    match &**node {
        Node::Leaf(leaf) => {
            let _ = writeln!(out, "{pad}Leaf key={} rows={:?}", leaf.key().to_hex(), leaf.rows());
        }
        inner => {
            let _ = writeln!(
                out,
                "{pad}{:?} prefix={} children={}",
                inner.node_type(),
                hex(inner.prefix()),
                inner.count()
            );
            if let Some(terminal) = inner.terminal() {
                let _ = writeln!(out, "{pad}  [$] ->");
                dump_child(out, terminal, indent + 2);
            }
            for (byte, child) in inner.children() {
                let _ = writeln!(out, "{pad}  [{byte:02x}] ->");
                dump_child(out, child, indent + 2);
            }
        }
    }
}

fn verify_child(child: &Child, path: &mut Vec<u8>, issues: &mut Vec<String>) {
    match child.resident() {
        None => {}
        Some(Node::Leaf(leaf)) => verify_leaf(leaf, path, issues),
        Some(inner) => verify_inner(inner, path, issues),
    }
}

fn verify_leaf(leaf: &Leaf, path: &[u8], issues: &mut Vec<String>) {
    let key = leaf.key().to_hex();
    if !leaf.key().starts_with(path) {
        issues.push(format!("leaf {key} stored under path {}", hex(path)));
    }
    if leaf.is_empty() {
        issues.push(format!("leaf {key} has no row ids"));
    }
    let mut rows = leaf.rows().to_vec();
    rows.sort_unstable();
    if rows.windows(2).any(|w| w[0] == w[1]) {
        issues.push(format!("leaf {key} has duplicate row ids {:?}", leaf.rows()));
    }
}

fn verify_inner(node: &Node, path: &mut Vec<u8>, issues: &mut Vec<String>) {
    let start = path.len();
    path.extend_from_slice(node.prefix());
    let at = hex(path);
    let node_type = node.node_type();
    let count = node.count();
    let children = node.children();

    if children.len() != count {
        issues.push(format!("{node_type:?} at {at} counts {count} but holds {}", children.len()));
    }
    if count > node_type.capacity() {
        issues.push(format!("{node_type:?} at {at} over capacity with {count}"));
    }
    if !children.windows(2).all(|w| w[0].0 < w[1].0) {
        issues.push(format!("{node_type:?} at {at} children out of order"));
    }
    if node_type.shrink_target(count).is_some() {
        issues.push(format!("{node_type:?} at {at} underfull with {count}"));
    }
    let terminal = node.terminal();
    if count == 0 || (count == 1 && terminal.is_none()) {
        issues.push(format!("{node_type:?} at {at} should have been merged"));
    }

    if let Some(terminal) = terminal {
        match terminal.resident() {
            Some(Node::Leaf(leaf)) if leaf.key().as_bytes() != path.as_slice() => {
                issues.push(format!("terminal at {at} holds key {}", leaf.key().to_hex()));
            }
            Some(Node::Leaf(_)) | None => {}
            Some(other) => {
                issues.push(format!("terminal at {at} is a {:?}", other.node_type()));
            }
        }
        verify_child(terminal, path, issues);
    }
    for (byte, child) in children {
        path.push(byte);
        verify_child(child, path, issues);
        path.pop();
    }
    path.truncate(start);
}

#[cfg(test)]
mod tests {
    use crate::art::{Art, RowId};
    use crate::encoding::Key;

    #[test]
    fn test_dump_shows_structure() {
        let mut art = Art::new();
        assert_eq!(art.dump(), "(empty)\n");
        art.insert(&Key::from(b"ab"), 1).unwrap();
        art.insert(&Key::from(b"ac"), 2).unwrap();
        art.insert(&Key::from(b"a"), 3).unwrap();
        let dump = art.dump();
        assert!(dump.starts_with("Node4 prefix=61 children=2"), "{dump}");
        assert!(dump.contains("[$] ->"));
        assert!(dump.contains("Leaf key=6162 rows=[1]"));
    }

    #[test]
    fn test_verify_integrity_after_churn() {
        let mut art = Art::new();
        for i in 0..2_000u32 {
            let key = Key::encode(&(i.wrapping_mul(2_654_435_761) % 5_000));
            art.insert(&key, i as RowId).unwrap();
        }
        assert!(art.verify_integrity().is_empty(), "{:?}", art.verify_integrity());
        for i in (0..2_000u32).step_by(3) {
            let key = Key::encode(&(i.wrapping_mul(2_654_435_761) % 5_000));
            art.erase(&key, i as RowId).unwrap();
        }
        assert!(art.verify_integrity().is_empty(), "{:?}", art.verify_integrity());
    }
}
