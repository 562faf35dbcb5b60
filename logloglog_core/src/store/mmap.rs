//! Append-only memory-mapped file with page-aligned growth.

use crate::error::{IndexError, IndexResult};

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Growth quantum. The file is extended to a multiple of this before the
/// mapping is refreshed, so appends stay O(1) amortized.
pub const GROW_CHUNK: u64 = 64 * 1024;

fn chunk_up(bytes: u64) -> u64 {
  bytes.div_ceil(GROW_CHUNK).max(1) * GROW_CHUNK
}

#[derive(Debug)]
/// An append-only fixed-record file, memory-mapped read/write.
///
/// The published length is an atomic byte counter stored with release
/// ordering after record bytes land in the mapping; readers load it with
/// acquire ordering, so any offset below the observed length is fully
/// readable. Only one writer extends the file.
pub struct MmapFile {
  file: File,
  map: MmapMut,
  len: AtomicU64,
  capacity: u64,
}

impl MmapFile {
  /// Open (creating if missing) and map the file at `path`.
  ///
  /// The published length starts at the on-disk file size; callers restore
  /// the authoritative length from metadata via [`MmapFile::truncate`].
  pub fn open(path: &Path) -> IndexResult<MmapFile> {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .open(path)?;
    let len = file.metadata()?.len();
    let capacity = chunk_up(len);
    if capacity != len {
      file.set_len(capacity)?;
    }
    // Safety: a single writer extends the file; readers only touch offsets
    // below the published length.
    let map = unsafe { MmapOptions::new().len(capacity as usize).map_mut(&file)? };
    Ok(MmapFile {
      file,
      map,
      len: AtomicU64::new(len),
      capacity,
    })
  }

  /// Published length in bytes.
  pub fn len(&self) -> u64 {
    self.len.load(Ordering::Acquire)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Append `bytes` at the current end, growing the file first if needed.
  ///
  /// # Return
  ///
  /// It returns the byte offset the record was written at.
  pub fn append(&mut self, bytes: &[u8]) -> IndexResult<u64> {
    let offset = self.len.load(Ordering::Relaxed);
    let end = offset + bytes.len() as u64;
    if end > self.capacity {
      self.grow(end)?;
    }
    self.map[offset as usize..end as usize].copy_from_slice(bytes);
    // Publish after the record bytes are in place.
    self.len.store(end, Ordering::Release);
    Ok(offset)
  }

  /// Read `len` bytes at `offset`, bounds-checked against the published
  /// length.
  pub fn read(&self, offset: u64, len: usize) -> IndexResult<&[u8]> {
    let end = offset + len as u64;
    if end > self.len() {
      return Err(IndexError::Corruption(format!(
        "read of {len} bytes at {offset} past published length {}",
        self.len()
      )));
    }
    Ok(&self.map[offset as usize..end as usize])
  }

  /// Shrink the published length, the file and the mapping back to
  /// `new_len` bytes, zeroing the stale tail of the retained chunk.
  pub fn truncate(&mut self, new_len: u64) -> IndexResult<()> {
    if new_len >= self.len() {
      return Ok(());
    }
    let capacity = chunk_up(new_len);
    if capacity < self.capacity {
      self.file.set_len(capacity)?;
      self.map = unsafe { MmapOptions::new().len(capacity as usize).map_mut(&self.file)? };
      self.capacity = capacity;
    }
    self.map[new_len as usize..self.capacity as usize].fill(0);
    self.len.store(new_len, Ordering::Release);
    Ok(())
  }

  /// Flush dirty pages to disk.
  pub fn flush(&self) -> IndexResult<()> {
    self.map.flush()?;
    Ok(())
  }

  fn grow(&mut self, needed: u64) -> IndexResult<()> {
    let capacity = chunk_up(needed);
    // Extend the file before remapping; the new tail reads as zeros.
    self.file.set_len(capacity)?;
    self.map = unsafe { MmapOptions::new().len(capacity as usize).map_mut(&self.file)? };
    self.capacity = capacity;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_read1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.dat");
    let mut file = MmapFile::open(&path).unwrap();
    assert!(file.is_empty());

    assert_eq!(file.append(b"hello").unwrap(), 0);
    assert_eq!(file.append(b"world").unwrap(), 5);
    assert_eq!(file.len(), 10);
    assert_eq!(file.read(0, 5).unwrap(), b"hello");
    assert_eq!(file.read(5, 5).unwrap(), b"world");
    assert!(file.read(6, 5).is_err());
  }

  #[test]
  fn grow1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.dat");
    let mut file = MmapFile::open(&path).unwrap();

    // Cross several growth chunks.
    let record = [7u8; 4096];
    for _ in 0..64 {
      file.append(&record).unwrap();
    }
    assert_eq!(file.len(), 64 * 4096);
    assert_eq!(file.read(63 * 4096, 4096).unwrap(), &record);
  }

  #[test]
  fn reopen1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.dat");
    {
      let mut file = MmapFile::open(&path).unwrap();
      file.append(b"persistent").unwrap();
      file.flush().unwrap();
    }
    let file = MmapFile::open(&path).unwrap();
    // Reopen publishes the padded on-disk size until truncated back.
    assert!(file.len() >= 10);
    assert_eq!(file.read(0, 10).unwrap(), b"persistent");
  }

  #[test]
  fn truncate1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.dat");
    let mut file = MmapFile::open(&path).unwrap();
    file.append(&[1u8; 1000]).unwrap();
    file.truncate(4).unwrap();
    assert_eq!(file.len(), 4);
    assert_eq!(file.read(0, 4).unwrap(), &[1, 1, 1, 1]);

    // The stale tail is zeroed, so re-appends are byte-deterministic.
    file.append(&[2u8; 4]).unwrap();
    assert_eq!(file.read(0, 8).unwrap(), &[1, 1, 1, 1, 2, 2, 2, 2]);
  }
}
