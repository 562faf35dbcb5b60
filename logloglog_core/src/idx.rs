//! The top-level index binding a raw log file to its cache files and
//! serving the row-addressable view.
//!
//! One [`Index`] owns four files under
//! `cache_dir/<basename>.<fingerprint>/`: the width array, the offset
//! array, the node store and the metadata sidecar. Opening identifies the
//! source, restores or rebuilds the cached state, then catches up to the
//! source EOF. [`Index::update`] is incremental and only ever advances at
//! line boundaries, so it can be interrupted and retried without
//! corrupting state.

use crate::error::{IndexError, IndexResult};
use crate::opt::IndexOptions;
use crate::store::meta::{Metadata, SourceId};
use crate::store::nodes::NodeStore;
use crate::store::offsets::OffsetArray;
use crate::store::widths::WidthArray;
use crate::tree::WrapTree;
use crate::wrap;

use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WIDTHS_FILE: &str = "widths.dat";
const OFFSETS_FILE: &str = "offsets.dat";
const NODES_FILE: &str = "nodes.dat";
const META_FILE: &str = "metadata";

/// Initial splitter window; doubled while a single line overflows it.
const INGEST_WINDOW: usize = 8 << 20;

#[derive(Debug)]
/// A width-indexed, row-addressable view over one append-only log file.
pub struct Index {
  source_path: PathBuf,
  source: File,
  source_id: SourceId,
  options: IndexOptions,
  cache_dir: PathBuf,
  indexed_bytes: u64,
  widths: WidthArray,
  offsets: OffsetArray,
  tree: WrapTree,
}

impl Index {
  /// Open (or create) the index for the log at `source_path`, restore
  /// cached state when the source identity still matches, and catch up to
  /// the source EOF.
  pub fn open(source_path: impl AsRef<Path>, options: IndexOptions) -> IndexResult<Index> {
    let source_path = source_path.as_ref().to_path_buf();
    let source = open_source(&source_path)?;
    let source_id = SourceId::of(&source.metadata()?);
    let cache_dir = cache_dir_for(&options, &source_path, &source_id);
    fs::create_dir_all(&cache_dir)?;
    debug!("opening index for {:?} in {:?}", source_path, cache_dir);

    let mut widths = WidthArray::open(&cache_dir.join(WIDTHS_FILE))?;
    let mut offsets = OffsetArray::open(&cache_dir.join(OFFSETS_FILE))?;
    let mut store = NodeStore::open(&cache_dir.join(NODES_FILE))?;

    let source_len = source.metadata()?.len();
    let restored = match Metadata::read(&cache_dir.join(META_FILE)) {
      Ok(Some(m)) if m.source == source_id && source_len >= m.indexed_bytes => {
        match WrapTree::decode_spine(&m.spine, m.total_lines) {
          Ok(spine) => Some((m, spine)),
          Err(e) => {
            warn!("discarding cached tree: {e}");
            None
          }
        }
      }
      Ok(Some(_)) => {
        warn!("source identity changed or source shrank, rebuilding");
        None
      }
      Ok(None) => None,
      Err(e) if e.is_corruption() => {
        warn!("corrupt metadata, rebuilding: {e}");
        None
      }
      Err(e) => return Err(e),
    };

    let restored = match restored {
      Some((m, spine)) => {
        widths.truncate(m.total_lines)?;
        offsets.truncate(m.total_lines)?;
        store.truncate(m.sealed_nodes)?;
        if widths.len() == m.total_lines
          && offsets.len() == m.total_lines
          && store.count() == m.sealed_nodes
        {
          Some((m, spine))
        } else {
          warn!("cache files shorter than metadata, rebuilding");
          None
        }
      }
      None => None,
    };
    let (tree, indexed_bytes) = match restored {
      Some((m, spine)) => (
        WrapTree::from_parts(store, spine, m.total_lines),
        m.indexed_bytes,
      ),
      None => {
        widths.truncate(0)?;
        offsets.truncate(0)?;
        store.truncate(0)?;
        (WrapTree::create(store), 0)
      }
    };

    let mut index = Index {
      source_path,
      source,
      source_id,
      options,
      cache_dir,
      indexed_bytes,
      widths,
      offsets,
      tree,
    };
    index.update()?;
    Ok(index)
  }

  /// Catch the index up to the source EOF.
  ///
  /// Detects rotation (identity change) and shrinkage first, rebuilding
  /// silently in either case. A trailing line with no terminator is not
  /// indexed and is retried on the next call.
  pub fn update(&mut self) -> IndexResult<()> {
    let path_meta = fs::metadata(&self.source_path)?;
    let id = SourceId::of(&path_meta);
    if id != self.source_id {
      warn!("source {:?} rotated, rebuilding index", self.source_path);
      self.source = open_source(&self.source_path)?;
      self.source_id = id;
      self.rebind_cache()?;
    } else if path_meta.len() < self.indexed_bytes {
      warn!("source {:?} shrank, rebuilding index", self.source_path);
      self.rebuild()?;
    }

    let source_len = self.source.metadata()?.len();
    if source_len > self.indexed_bytes {
      self.ingest(source_len)?;
    }
    self.flush()
  }

  /// Total indexed logical lines.
  pub fn len(&self) -> u64 {
    self.tree.total_lines()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Cache directory holding this index's files.
  pub fn cache_dir(&self) -> &Path {
    &self.cache_dir
  }

  /// Display width of logical line `line`.
  pub fn width_of(&self, line: u64) -> IndexResult<u16> {
    self.widths.get(line)
  }

  /// Text of logical line `line`, terminator stripped.
  pub fn get(&self, line: u64) -> IndexResult<String> {
    let total = self.len();
    if line >= total {
      return Err(IndexError::OutOfRange(format!("line {line} >= {total}")));
    }
    let start = self.offsets.get(line)?;
    let end = if line + 1 < total {
      self.offsets.get(line + 1)?
    } else {
      self.indexed_bytes
    };
    let mut buf = vec![0u8; (end - start) as usize];
    let mut reader = &self.source;
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut buf)?;
    if buf.last() == Some(&b'\n') {
      buf.pop();
      if buf.last() == Some(&b'\r') {
        buf.pop();
      }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
  }

  /// Append one line to the source file and index it.
  ///
  /// A `\n` terminator is written after `text`; multi-line text gets every
  /// completed line indexed.
  pub fn append(&mut self, text: &str) -> IndexResult<()> {
    let mut writer = &self.source;
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")?;
    self.update()
  }

  /// Total display rows at `terminal_width`.
  pub fn rows_at_width(&self, terminal_width: u16) -> IndexResult<u64> {
    self.tree.rows_at_width(terminal_width)
  }

  /// Display row to `(logical line, residual row)` at `terminal_width`.
  pub fn locate(&self, terminal_width: u16, row: u64) -> IndexResult<(u64, u64)> {
    self.tree.locate(terminal_width, row)
  }

  /// Cumulative display-row offset of the start of `line` at
  /// `terminal_width`.
  pub fn row_of(&self, terminal_width: u16, line: u64) -> IndexResult<u64> {
    self.tree.row_of(terminal_width, line)
  }

  /// Row-addressable view over `[start, end)` display rows at
  /// `terminal_width`, both bounds clamped to the current total.
  pub fn at(&self, terminal_width: u16, start: u64, end: Option<u64>) -> IndexResult<View<'_>> {
    let total = self.tree.rows_at_width(terminal_width)?;
    let end = end.unwrap_or(total).min(total);
    let start = start.min(end);
    Ok(View {
      index: self,
      terminal_width,
      start,
      end,
    })
  }

  // Ingestion {

  fn ingest(&mut self, source_len: u64) -> IndexResult<()> {
    let width_fn = self.options.width_fn().clone();
    let split_fn = self.options.split_fn().clone();

    // Safety: the resource model has one writer appending to the source;
    // bytes below EOF are stable.
    let map = unsafe { Mmap::map(&self.source)? };
    let end = source_len.min(map.len() as u64);
    let mut pos = self.indexed_bytes;
    let mut window = INGEST_WINDOW;

    while pos < end {
      let take = window.min((end - pos) as usize);
      let chunk = &map[pos as usize..pos as usize + take];
      let split = split_fn(chunk);
      if split.consumed == 0 {
        if pos + take as u64 >= end {
          // Trailing partial line; retried on the next update.
          break;
        }
        window = window.saturating_mul(2);
        continue;
      }
      debug_assert!(split.consumed <= take);
      for range in &split.lines {
        let text = String::from_utf8_lossy(&chunk[range.clone()]);
        let width = width_fn(&text);
        self.widths.append(width)?;
        self.offsets.append(pos + range.start as u64)?;
        self.tree.append(width)?;
      }
      pos += split.consumed as u64;
      // Advance only at line boundaries, so an interrupted update resumes
      // cleanly.
      self.indexed_bytes = pos;
      window = INGEST_WINDOW;
    }
    debug!(
      "indexed {} lines through byte {}",
      self.tree.total_lines(),
      self.indexed_bytes
    );
    Ok(())
  }

  /// Persist data files, then the metadata sidecar with the live spine.
  fn flush(&mut self) -> IndexResult<()> {
    self.widths.flush()?;
    self.offsets.flush()?;
    self.tree.flush()?;

    let sealed_nodes = self.tree.sealed_nodes();
    let height = self.tree.height();
    let root_ref = u32::try_from(sealed_nodes + height as u64 - 1)
      .map_err(|_| IndexError::Corruption("root ref overflows u32".to_string()))?;
    let meta = Metadata {
      source: self.source_id,
      indexed_bytes: self.indexed_bytes,
      total_lines: self.tree.total_lines(),
      sealed_nodes,
      height,
      root_ref,
      spine: self.tree.spine_snapshot()?,
    };
    meta.write(&self.cache_dir.join(META_FILE))
  }

  /// Drop all cached state in place and restart indexing from byte 0.
  fn rebuild(&mut self) -> IndexResult<()> {
    self.widths.truncate(0)?;
    self.offsets.truncate(0)?;
    self.tree.clear()?;
    self.indexed_bytes = 0;
    Ok(())
  }

  /// Rebind to the cache directory of the current source identity and
  /// start over. Used when the source was rotated mid-session; the old
  /// directory is left for its own identity.
  fn rebind_cache(&mut self) -> IndexResult<()> {
    self.cache_dir = cache_dir_for(&self.options, &self.source_path, &self.source_id);
    fs::create_dir_all(&self.cache_dir)?;
    self.widths = WidthArray::open(&self.cache_dir.join(WIDTHS_FILE))?;
    self.offsets = OffsetArray::open(&self.cache_dir.join(OFFSETS_FILE))?;
    self.tree = WrapTree::create(NodeStore::open(&self.cache_dir.join(NODES_FILE))?);
    self.indexed_bytes = 0;
    self.rebuild()
  }

  // Ingestion }
}

fn open_source(path: &Path) -> IndexResult<File> {
  // Append access backs `Index::append`; fall back to read-only sources.
  match OpenOptions::new().read(true).append(true).open(path) {
    Ok(file) => Ok(file),
    Err(_) => Ok(OpenOptions::new().read(true).open(path)?),
  }
}

fn cache_dir_for(options: &IndexOptions, source_path: &Path, id: &SourceId) -> PathBuf {
  let basename = source_path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| "source".to_string());
  options
    .cache_dir()
    .join(format!("{basename}.{}", id.fingerprint()))
}

#[derive(Debug, Clone, Copy)]
/// A lazy, restartable view of `[start, end)` display rows at one terminal
/// width.
pub struct View<'a> {
  index: &'a Index,
  terminal_width: u16,
  start: u64,
  end: u64,
}

impl<'a> View<'a> {
  /// Number of display rows in the view.
  pub fn len(&self) -> u64 {
    self.end - self.start
  }

  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }

  /// Text of display row `row` within the view.
  pub fn get(&self, row: u64) -> IndexResult<String> {
    if row >= self.len() {
      return Err(IndexError::OutOfRange(format!(
        "view row {row} >= {}",
        self.len()
      )));
    }
    let (line, residual) = self
      .index
      .tree
      .locate(self.terminal_width, self.start + row)?;
    let text = self.index.get(line)?;
    let width_fn = self.index.options.width_fn().clone();
    let sliced = wrap::slice(&text, self.terminal_width, residual, |cluster| {
      width_fn(cluster)
    });
    Ok(sliced.to_string())
  }

  /// Iterate the view's rows from the top. Restartable: each call starts a
  /// fresh pass.
  pub fn iter(&self) -> ViewIter<'a, '_> {
    ViewIter { view: self, next: 0 }
  }
}

#[derive(Debug)]
/// Iterator over a [`View`]'s display rows.
pub struct ViewIter<'a, 'v> {
  view: &'v View<'a>,
  next: u64,
}

impl Iterator for ViewIter<'_, '_> {
  type Item = IndexResult<String>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next >= self.view.len() {
      return None;
    }
    let row = self.view.get(self.next);
    self.next += 1;
    Some(row)
  }
}
