//! The binary metadata sidecar: geometry, source identity, counters and the
//! live right-spine snapshot.
//!
//! Layout (all little-endian):
//!
//! ```text
//! 0   magic "LLL1"
//! 4   version: u32
//! 8   node_size: u32
//! 12  leaf_fanout: u32
//! 16  internal_fanout: u32
//! 20  bucket_count: u32
//! 24  bucket_exact: u32
//! 28  reserved: u32
//! 32  source_device: u64
//! 40  source_inode: u64
//! 48  source_created: i64 (seconds)
//! 56  source_created_nsec: i64
//! 64  indexed_bytes: u64
//! 72  total_lines: u64
//! 80  sealed_nodes: u64
//! 88  height: u32
//! 92  root_ref: u32
//! 96  right-spine snapshot: height x NODE_SIZE, level 0 (leaf) first
//! ```
//!
//! Any geometry mismatch reads as [`IndexError::Corruption`], which the
//! index answers with a rebuild. The record is written to a temp file and
//! renamed into place.

use crate::error::{IndexError, IndexResult};
use crate::hist;
use crate::store::nodes::NODE_SIZE;
use crate::tree::node::{INTERNAL_FANOUT, LEAF_FANOUT};

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

const MAGIC: [u8; 4] = *b"LLL1";
const VERSION: u32 = 1;
const HEADER_BYTES: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Identity of a source log file.
///
/// Appends must not change the identity, so the file's creation time is
/// used, not the inode change time; replacing the file (rotation) changes
/// inode and creation time and invalidates the cache.
pub struct SourceId {
  pub device: u64,
  pub inode: u64,
  pub created: i64,
  pub created_nsec: i64,
}

impl SourceId {
  /// Identity of the file behind `metadata`.
  pub fn of(metadata: &fs::Metadata) -> SourceId {
    let (created, created_nsec) = match metadata.created() {
      Ok(time) => match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i64),
        Err(_) => (0, 0),
      },
      Err(_) => (0, 0),
    };
    #[cfg(unix)]
    {
      use std::os::unix::fs::MetadataExt;
      SourceId {
        device: metadata.dev(),
        inode: metadata.ino(),
        created,
        created_nsec,
      }
    }
    #[cfg(not(unix))]
    {
      SourceId {
        device: 0,
        inode: 0,
        created,
        created_nsec,
      }
    }
  }

  /// First 8 hex digits of a blake3 hash over the identity, used to name
  /// the cache directory so distinct identities coexist.
  pub fn fingerprint(&self) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&self.device.to_le_bytes());
    hasher.update(&self.inode.to_le_bytes());
    hasher.update(&self.created.to_le_bytes());
    hasher.update(&self.created_nsec.to_le_bytes());
    hasher.finalize().to_hex()[..8].to_string()
  }
}

#[derive(Debug, Clone)]
/// Decoded metadata sidecar.
pub struct Metadata {
  pub source: SourceId,
  pub indexed_bytes: u64,
  pub total_lines: u64,
  pub sealed_nodes: u64,
  pub height: u32,
  pub root_ref: u32,
  /// Right-spine snapshot, level 0 (rightmost leaf) first, one
  /// [`NODE_SIZE`] record per level.
  pub spine: Vec<Vec<u8>>,
}

impl Metadata {
  /// Read and validate the sidecar at `path`.
  ///
  /// # Return
  ///
  /// It returns `Ok(None)` when the file does not exist yet.
  /// It returns [`IndexError::Corruption`] on magic/geometry mismatch or a
  /// short file.
  pub fn read(path: &Path) -> IndexResult<Option<Metadata>> {
    let mut file = match File::open(path) {
      Ok(file) => file,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.len() < HEADER_BYTES {
      return Err(IndexError::Corruption("metadata file too short".to_string()));
    }
    if buf[0..4] != MAGIC {
      return Err(IndexError::Corruption("bad metadata magic".to_string()));
    }

    let u32_at = |at: usize| u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
    let u64_at = |at: usize| u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
    let i64_at = |at: usize| i64::from_le_bytes(buf[at..at + 8].try_into().unwrap());

    let geometry = [
      (u32_at(4), VERSION, "version"),
      (u32_at(8), NODE_SIZE as u32, "node size"),
      (u32_at(12), LEAF_FANOUT as u32, "leaf fanout"),
      (u32_at(16), INTERNAL_FANOUT as u32, "internal fanout"),
      (u32_at(20), hist::BUCKETS as u32, "bucket count"),
      (u32_at(24), hist::EXACT as u32, "bucket layout"),
    ];
    for (got, want, what) in geometry {
      if got != want {
        return Err(IndexError::Corruption(format!(
          "metadata {what} mismatch: got {got}, want {want}"
        )));
      }
    }

    let height = u32_at(88);
    let expected = HEADER_BYTES + height as usize * NODE_SIZE;
    if buf.len() != expected {
      return Err(IndexError::Corruption(format!(
        "metadata length {} does not match height {height}",
        buf.len()
      )));
    }
    let spine = (0..height as usize)
      .map(|level| {
        let at = HEADER_BYTES + level * NODE_SIZE;
        buf[at..at + NODE_SIZE].to_vec()
      })
      .collect();

    Ok(Some(Metadata {
      source: SourceId {
        device: u64_at(32),
        inode: u64_at(40),
        created: i64_at(48),
        created_nsec: i64_at(56),
      },
      indexed_bytes: u64_at(64),
      total_lines: u64_at(72),
      sealed_nodes: u64_at(80),
      height,
      root_ref: u32_at(92),
      spine,
    }))
  }

  /// Write the sidecar to `path` via a temp file and rename.
  pub fn write(&self, path: &Path) -> IndexResult<()> {
    debug_assert_eq!(self.spine.len(), self.height as usize);
    let mut buf = Vec::with_capacity(HEADER_BYTES + self.spine.len() * NODE_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(NODE_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&(LEAF_FANOUT as u32).to_le_bytes());
    buf.extend_from_slice(&(INTERNAL_FANOUT as u32).to_le_bytes());
    buf.extend_from_slice(&(hist::BUCKETS as u32).to_le_bytes());
    buf.extend_from_slice(&(hist::EXACT as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&self.source.device.to_le_bytes());
    buf.extend_from_slice(&self.source.inode.to_le_bytes());
    buf.extend_from_slice(&self.source.created.to_le_bytes());
    buf.extend_from_slice(&self.source.created_nsec.to_le_bytes());
    buf.extend_from_slice(&self.indexed_bytes.to_le_bytes());
    buf.extend_from_slice(&self.total_lines.to_le_bytes());
    buf.extend_from_slice(&self.sealed_nodes.to_le_bytes());
    buf.extend_from_slice(&self.height.to_le_bytes());
    buf.extend_from_slice(&self.root_ref.to_le_bytes());
    for record in &self.spine {
      debug_assert_eq!(record.len(), NODE_SIZE);
      buf.extend_from_slice(record);
    }

    let tmp = path.with_extension("tmp");
    {
      let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
      file.write_all(&buf)?;
      file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Metadata {
    Metadata {
      source: SourceId {
        device: 3,
        inode: 12345,
        created: 1700000000,
        created_nsec: 42,
      },
      indexed_bytes: 9999,
      total_lines: 123,
      sealed_nodes: 2,
      height: 2,
      root_ref: 3,
      spine: vec![vec![0u8; NODE_SIZE], vec![1u8; NODE_SIZE]],
    }
  }

  #[test]
  fn roundtrip1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata");
    assert!(Metadata::read(&path).unwrap().is_none());

    let m = sample();
    m.write(&path).unwrap();
    let back = Metadata::read(&path).unwrap().unwrap();
    assert_eq!(back.source, m.source);
    assert_eq!(back.indexed_bytes, m.indexed_bytes);
    assert_eq!(back.total_lines, m.total_lines);
    assert_eq!(back.sealed_nodes, m.sealed_nodes);
    assert_eq!(back.height, m.height);
    assert_eq!(back.root_ref, m.root_ref);
    assert_eq!(back.spine, m.spine);
  }

  #[test]
  fn corrupt1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata");
    let m = sample();
    m.write(&path).unwrap();

    // Flip the magic.
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();
    assert!(Metadata::read(&path).unwrap_err().is_corruption());

    // Truncate mid-spine.
    m.write(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    assert!(Metadata::read(&path).unwrap_err().is_corruption());
  }

  #[test]
  fn fingerprint1() {
    let a = sample().source;
    let mut b = a;
    b.inode += 1;
    assert_eq!(a.fingerprint().len(), 8);
    assert_ne!(a.fingerprint(), b.fingerprint());
  }
}
