//! Per-line byte offsets into the source file, packed `u64` little-endian.
//!
//! Record `i` is the byte offset where line `i`'s content starts. The end
//! of line `i` is the start of line `i + 1` (or the indexed byte length for
//! the last line) minus its terminator.

use crate::error::{IndexError, IndexResult};
use crate::store::mmap::MmapFile;

use std::path::Path;

const RECORD: u64 = 8;

#[derive(Debug)]
/// Append-only `line index -> source byte offset` store.
pub struct OffsetArray {
  data: MmapFile,
}

impl OffsetArray {
  pub fn open(path: &Path) -> IndexResult<OffsetArray> {
    Ok(OffsetArray {
      data: MmapFile::open(path)?,
    })
  }

  pub fn len(&self) -> u64 {
    self.data.len() / RECORD
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Record the byte offset of the next logical line's start.
  ///
  /// # Panics
  ///
  /// Debug builds panic if `offset` is below the previously recorded one
  /// (offsets are monotone in an append-only log).
  pub fn append(&mut self, offset: u64) -> IndexResult<()> {
    #[cfg(debug_assertions)]
    if self.len() > 0 {
      let last = self.get(self.len() - 1)?;
      debug_assert!(offset > last, "offset {offset} not above last {last}");
    }
    self.data.append(&offset.to_le_bytes())?;
    Ok(())
  }

  /// Byte offset of line `index`'s start.
  pub fn get(&self, index: u64) -> IndexResult<u64> {
    if index >= self.len() {
      return Err(IndexError::OutOfRange(format!(
        "line {index} >= {}",
        self.len()
      )));
    }
    let bytes = self.data.read(index * RECORD, RECORD as usize)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
  }

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
    let mut offsets = OffsetArray::open(&dir.path().join("offsets.dat")).unwrap();
    offsets.append(0).unwrap();
    offsets.append(17).unwrap();
    offsets.append(40).unwrap();
    assert_eq!(offsets.len(), 3);
    assert_eq!(offsets.get(1).unwrap(), 17);
    assert!(offsets.get(3).is_err());
  }
}
