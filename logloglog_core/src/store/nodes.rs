//! The node store: fixed-size sealed tree nodes over a memory-mapped file.
//!
//! The file length defines the node count; a node's ref is its record index,
//! assigned at append time. Sealed nodes are immutable, so the store never
//! rewrites a record. The live right spine is not here, it travels in the
//! metadata sidecar until its nodes seal.

use crate::error::{IndexError, IndexResult};
use crate::store::mmap::MmapFile;

use std::path::Path;

/// On-disk node record size in bytes.
pub const NODE_SIZE: usize = 4096;

#[derive(Debug)]
/// Append-only store of [`NODE_SIZE`]-byte node records.
pub struct NodeStore {
  data: MmapFile,
}

impl NodeStore {
  pub fn open(path: &Path) -> IndexResult<NodeStore> {
    Ok(NodeStore {
      data: MmapFile::open(path)?,
    })
  }

  /// Number of sealed nodes.
  pub fn count(&self) -> u64 {
    self.data.len() / NODE_SIZE as u64
  }

  /// Append one sealed node record.
  ///
  /// # Return
  ///
  /// It returns the new node's ref.
  pub fn append(&mut self, record: &[u8]) -> IndexResult<u32> {
    debug_assert_eq!(record.len(), NODE_SIZE);
    // u32::MAX is reserved as the live-spine sentinel ref.
    let node_ref = match u32::try_from(self.count()) {
      Ok(node_ref) if node_ref != u32::MAX => node_ref,
      _ => {
        return Err(IndexError::Corruption(
          "node store ref space exhausted".to_string(),
        ));
      }
    };
    self.data.append(record)?;
    Ok(node_ref)
  }

  /// Read the sealed node at `node_ref`.
  pub fn read(&self, node_ref: u32) -> IndexResult<&[u8]> {
    self
      .data
      .read(node_ref as u64 * NODE_SIZE as u64, NODE_SIZE)
  }

  /// Shrink back to `count` sealed nodes.
  pub fn truncate(&mut self, count: u64) -> IndexResult<()> {
    self.data.truncate(count * NODE_SIZE as u64)
  }

  pub fn flush(&self) -> IndexResult<()> {
    self.data.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_read1() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = NodeStore::open(&dir.path().join("nodes.dat")).unwrap();
    assert_eq!(store.count(), 0);

    let a = vec![0xAAu8; NODE_SIZE];
    let b = vec![0xBBu8; NODE_SIZE];
    assert_eq!(store.append(&a).unwrap(), 0);
    assert_eq!(store.append(&b).unwrap(), 1);
    assert_eq!(store.count(), 2);
    assert_eq!(store.read(0).unwrap(), a.as_slice());
    assert_eq!(store.read(1).unwrap(), b.as_slice());
    assert!(store.read(2).is_err());
  }
}
