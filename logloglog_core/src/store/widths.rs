//! The width array: display width of every logical line at infinite
//! terminal width, packed `u16` little-endian, one record per line.
//!
//! Redundant with the widths stored in sealed tree leaves on purpose:
//! either structure can be rebuilt from the other, and tests use the array
//! as ground truth for the tree.

use crate::error::{IndexError, IndexResult};
use crate::store::mmap::MmapFile;

use std::path::Path;

/// Bytes per record.
const RECORD: u64 = 2;

#[derive(Debug)]
/// Append-only `line index -> u16 display width` store.
pub struct WidthArray {
  data: MmapFile,
}

impl WidthArray {
  pub fn open(path: &Path) -> IndexResult<WidthArray> {
    Ok(WidthArray {
      data: MmapFile::open(path)?,
    })
  }

  /// Number of recorded lines.
  pub fn len(&self) -> u64 {
    self.data.len() / RECORD
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Record the width of the next logical line.
  pub fn append(&mut self, width: u16) -> IndexResult<()> {
    self.data.append(&width.to_le_bytes())?;
    Ok(())
  }

  /// Width of line `index`.
  ///
  /// # Return
  ///
  /// It returns [`IndexError::OutOfRange`] when `index >= len()`.
  pub fn get(&self, index: u64) -> IndexResult<u16> {
    if index >= self.len() {
      return Err(IndexError::OutOfRange(format!(
        "line {index} >= {}",
        self.len()
      )));
    }
    let bytes = self.data.read(index * RECORD, RECORD as usize)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
  }

  /// Shrink back to `lines` records.
  pub fn truncate(&mut self, lines: u64) -> IndexResult<()> {
    self.data.truncate(lines * RECORD)
  }

  pub fn flush(&self) -> IndexResult<()> {
    self.data.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_get1() {
    let dir = tempfile::tempdir().unwrap();
    let mut widths = WidthArray::open(&dir.path().join("widths.dat")).unwrap();
    assert_eq!(widths.len(), 0);

    for w in [0u16, 80, 65535, 7] {
      widths.append(w).unwrap();
    }
    assert_eq!(widths.len(), 4);
    assert_eq!(widths.get(0).unwrap(), 0);
    assert_eq!(widths.get(2).unwrap(), 65535);
    assert!(widths.get(4).is_err());
  }

  #[test]
  fn reopen1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widths.dat");
    {
      let mut widths = WidthArray::open(&path).unwrap();
      for w in 0..100u16 {
        widths.append(w).unwrap();
      }
      widths.flush().unwrap();
    }
    let mut widths = WidthArray::open(&path).unwrap();
    widths.truncate(100).unwrap();
    assert_eq!(widths.len(), 100);
    assert_eq!(widths.get(99).unwrap(), 99);
  }
}
