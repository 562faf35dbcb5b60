//! Packed on-disk B-tree node, leaf or internal, one [`NODE_SIZE`] record.
//!
//! Layout (little-endian):
//!
//! ```text
//! 0  kind: u8 (0 leaf, 1 internal)
//! 1  pad: u8
//! 2  count: u16
//! 4  reserved: u32
//! 8  leaf:     count x u16 width
//!    internal: count x { child_ref: u32, child_lines: u32,
//!                        hist: BUCKETS x (count: u32, sum: u64) }
//! ```
//!
//! Unused tail bytes are zero, so encoding is deterministic and sealed node
//! records are byte-identical across runs.

use crate::error::{IndexError, IndexResult};
use crate::hist::{Histogram, HIST_BYTES};
use crate::store::nodes::NODE_SIZE;

/// Header bytes before the entry area.
pub const HEADER_BYTES: usize = 8;

/// Widths per leaf node.
pub const LEAF_FANOUT: usize = (NODE_SIZE - HEADER_BYTES) / 2;

/// Bytes per internal entry.
pub const ENTRY_BYTES: usize = 8 + HIST_BYTES;

/// Entries per internal node.
pub const INTERNAL_FANOUT: usize = (NODE_SIZE - HEADER_BYTES) / ENTRY_BYTES;

/// Sentinel child ref marking the entry that mirrors the live spine node
/// one level below. Never present in sealed nodes.
pub const SPINE_CHILD: u32 = u32::MAX;

const KIND_LEAF: u8 = 0;
const KIND_INTERNAL: u8 = 1;

#[derive(Debug, Clone)]
/// One internal-node entry: a child subtree's ref, exact line count and
/// exact width histogram.
pub struct Entry {
  pub child_ref: u32,
  pub child_lines: u64,
  pub hist: Histogram,
}

impl Entry {
  /// Fresh mirror entry for a just-created spine child.
  pub fn spine_mirror() -> Entry {
    Entry {
      child_ref: SPINE_CHILD,
      child_lines: 0,
      hist: Histogram::new(),
    }
  }
}

#[derive(Debug, Clone)]
/// In-memory form of one tree node.
pub enum Node {
  Leaf { widths: Vec<u16> },
  Internal { entries: Vec<Entry> },
}

impl Node {
  pub fn new_leaf() -> Node {
    Node::Leaf {
      widths: Vec::with_capacity(LEAF_FANOUT),
    }
  }

  pub fn new_internal() -> Node {
    Node::Internal {
      entries: Vec::with_capacity(INTERNAL_FANOUT),
    }
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Node::Leaf { .. })
  }

  /// Number of entries (widths for a leaf, child entries for an internal).
  pub fn count(&self) -> usize {
    match self {
      Node::Leaf { widths } => widths.len(),
      Node::Internal { entries } => entries.len(),
    }
  }

  /// Logical lines under this node.
  pub fn lines(&self) -> u64 {
    match self {
      Node::Leaf { widths } => widths.len() as u64,
      Node::Internal { entries } => entries.iter().map(|e| e.child_lines).sum(),
    }
  }

  /// Exact width histogram of all lines under this node.
  pub fn hist(&self) -> Histogram {
    let mut hist = Histogram::new();
    match self {
      Node::Leaf { widths } => {
        for w in widths {
          hist.add(*w);
        }
      }
      Node::Internal { entries } => {
        for e in entries {
          hist.add_hist(&e.hist);
        }
      }
    }
    hist
  }

  /// Push a width into a leaf.
  ///
  /// # Panics
  ///
  /// It panics on an internal node or a full leaf.
  pub fn push_width(&mut self, width: u16) {
    match self {
      Node::Leaf { widths } => {
        assert!(widths.len() < LEAF_FANOUT);
        widths.push(width);
      }
      Node::Internal { .. } => panic!("push_width on internal node"),
    }
  }

  /// Push an entry into an internal node.
  ///
  /// # Panics
  ///
  /// It panics on a leaf or a full internal node.
  pub fn push_entry(&mut self, entry: Entry) {
    match self {
      Node::Internal { entries } => {
        assert!(entries.len() < INTERNAL_FANOUT);
        entries.push(entry);
      }
      Node::Leaf { .. } => panic!("push_entry on leaf node"),
    }
  }

  /// Mutable access to the last entry of an internal node.
  ///
  /// # Panics
  ///
  /// It panics on a leaf or an empty internal node.
  pub fn last_entry_mut(&mut self) -> &mut Entry {
    match self {
      Node::Internal { entries } => entries.last_mut().expect("empty internal node"),
      Node::Leaf { .. } => panic!("last_entry_mut on leaf node"),
    }
  }

  /// Encode into one zero-padded [`NODE_SIZE`] record.
  pub fn encode(&self) -> IndexResult<Vec<u8>> {
    let mut buf = vec![0u8; NODE_SIZE];
    let count = self.count();
    buf[0] = if self.is_leaf() { KIND_LEAF } else { KIND_INTERNAL };
    buf[2..4].copy_from_slice(&(count as u16).to_le_bytes());
    match self {
      Node::Leaf { widths } => {
        debug_assert!(widths.len() <= LEAF_FANOUT);
        for (i, w) in widths.iter().enumerate() {
          let at = HEADER_BYTES + i * 2;
          buf[at..at + 2].copy_from_slice(&w.to_le_bytes());
        }
      }
      Node::Internal { entries } => {
        debug_assert!(entries.len() <= INTERNAL_FANOUT);
        for (i, e) in entries.iter().enumerate() {
          let at = HEADER_BYTES + i * ENTRY_BYTES;
          let child_lines = u32::try_from(e.child_lines).map_err(|_| {
            IndexError::Corruption("child line count overflows u32".to_string())
          })?;
          buf[at..at + 4].copy_from_slice(&e.child_ref.to_le_bytes());
          buf[at + 4..at + 8].copy_from_slice(&child_lines.to_le_bytes());
          e.hist.encode_into(&mut buf[at + 8..at + 8 + HIST_BYTES])?;
        }
      }
    }
    Ok(buf)
  }

  /// Decode one record written by [`Node::encode`].
  pub fn decode(buf: &[u8]) -> IndexResult<Node> {
    if buf.len() != NODE_SIZE {
      return Err(IndexError::Corruption(format!(
        "node record has {} bytes",
        buf.len()
      )));
    }
    let kind = buf[0];
    let count = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    match kind {
      KIND_LEAF => {
        if count > LEAF_FANOUT {
          return Err(IndexError::Corruption(format!(
            "leaf count {count} exceeds fanout"
          )));
        }
        let widths = (0..count)
          .map(|i| {
            let at = HEADER_BYTES + i * 2;
            u16::from_le_bytes([buf[at], buf[at + 1]])
          })
          .collect();
        Ok(Node::Leaf { widths })
      }
      KIND_INTERNAL => {
        if count > INTERNAL_FANOUT {
          return Err(IndexError::Corruption(format!(
            "internal count {count} exceeds fanout"
          )));
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
          let at = HEADER_BYTES + i * ENTRY_BYTES;
          let child_ref = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
          let child_lines = u32::from_le_bytes(buf[at + 4..at + 8].try_into().unwrap());
          let hist = Histogram::decode_from(&buf[at + 8..at + 8 + HIST_BYTES])?;
          entries.push(Entry {
            child_ref,
            child_lines: child_lines as u64,
            hist,
          });
        }
        Ok(Node::Internal { entries })
      }
      other => Err(IndexError::Corruption(format!("unknown node kind {other}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn geometry1() {
    assert_eq!(LEAF_FANOUT, 2044);
    assert_eq!(INTERNAL_FANOUT, 6);
    assert!(HEADER_BYTES + INTERNAL_FANOUT * ENTRY_BYTES <= NODE_SIZE);
  }

  #[test]
  fn codec_leaf1() {
    let mut node = Node::new_leaf();
    for w in [0u16, 80, 65535] {
      node.push_width(w);
    }
    let buf = node.encode().unwrap();
    let back = Node::decode(&buf).unwrap();
    match back {
      Node::Leaf { widths } => assert_eq!(widths, vec![0, 80, 65535]),
      _ => panic!("expected leaf"),
    }
  }

  #[test]
  fn codec_internal1() {
    let mut hist = Histogram::new();
    hist.add(10);
    hist.add(500);
    let mut node = Node::new_internal();
    node.push_entry(Entry {
      child_ref: 7,
      child_lines: 2,
      hist: hist.clone(),
    });
    node.push_entry(Entry::spine_mirror());
    assert_eq!(node.lines(), 2);

    let buf = node.encode().unwrap();
    let back = Node::decode(&buf).unwrap();
    match back {
      Node::Internal { entries } => {
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].child_ref, 7);
        assert_eq!(entries[0].child_lines, 2);
        assert_eq!(entries[0].hist, hist);
        assert_eq!(entries[1].child_ref, SPINE_CHILD);
        assert_eq!(entries[1].child_lines, 0);
      }
      _ => panic!("expected internal"),
    }
  }

  #[test]
  fn codec_invalid1() {
    assert!(Node::decode(&[0u8; 16]).is_err());
    let mut buf = vec![0u8; NODE_SIZE];
    buf[0] = 9;
    assert!(Node::decode(&buf).is_err());
  }
}
