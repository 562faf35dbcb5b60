//! The wrap tree: an append-only, memory-mapped B-tree whose internal
//! entries carry width histograms, answering the two dual positional
//! queries in O(log n):
//!
//! - [`WrapTree::locate`]: display row at a terminal width to (logical
//!   line, residual row).
//! - [`WrapTree::row_of`]: logical line to its cumulative display-row
//!   offset at a terminal width.
//!
//! Keys are implicit positional indices, so there is no comparison, no
//! rotation and no delete rebalancing. Only the right spine (the path from
//! the root to the rightmost leaf) is mutable; every other node is sealed
//! into the node store the moment it fills and never touched again.
//!
//! Histograms make `rows` queries cheap but are only exact when the query
//! width exceeds every occupied range bucket. Row accounting must be exact,
//! so wherever a histogram is inexact for the query width the evaluation
//! descends into that subtree instead, bottoming out at leaf widths which
//! are always exact.

use crate::error::{IndexError, IndexResult};
use crate::hist::Histogram;
use crate::store::nodes::NodeStore;
use crate::tree::node::{Entry, Node, INTERNAL_FANOUT, LEAF_FANOUT, SPINE_CHILD};
use crate::wrap;

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

pub mod node;

#[derive(Debug)]
/// Append-only width-histogram B-tree over one node store.
pub struct WrapTree {
  store: NodeStore,
  // Right spine, level 0 = rightmost leaf, last = root. In internal spine
  // nodes the last entry mirrors the spine node one level below and carries
  // the sentinel `SPINE_CHILD` ref until that child seals.
  spine: Vec<Node>,
  total_lines: AtomicU64,
}

impl WrapTree {
  /// Create an empty tree over `store`.
  pub fn create(store: NodeStore) -> WrapTree {
    WrapTree {
      store,
      spine: vec![Node::new_leaf()],
      total_lines: AtomicU64::new(0),
    }
  }

  /// Decode and validate a right-spine snapshot against its recorded line
  /// count. Level 0 (the rightmost leaf) comes first.
  pub fn decode_spine(records: &[Vec<u8>], total_lines: u64) -> IndexResult<Vec<Node>> {
    if records.is_empty() {
      return Err(IndexError::Corruption("empty spine snapshot".to_string()));
    }
    let mut spine = Vec::with_capacity(records.len());
    for record in records {
      spine.push(Node::decode(record)?);
    }
    if !spine[0].is_leaf() {
      return Err(IndexError::Corruption(
        "spine level 0 is not a leaf".to_string(),
      ));
    }

    // Mirror entries must agree with the level below them.
    let mut below = spine[0].lines();
    for (level, node) in spine.iter().enumerate().skip(1) {
      let entries = match node {
        Node::Internal { entries } if !entries.is_empty() => entries,
        _ => {
          return Err(IndexError::Corruption(format!(
            "spine level {level} is not a populated internal node"
          )));
        }
      };
      let last = entries.last().expect("checked non-empty");
      if last.child_ref != SPINE_CHILD || last.child_lines != below || last.hist.lines() != below
      {
        return Err(IndexError::Corruption(format!(
          "spine level {level} mirror entry out of sync"
        )));
      }
      below = node.lines();
    }
    if below != total_lines {
      return Err(IndexError::Corruption(format!(
        "spine accounts for {below} lines, metadata says {total_lines}"
      )));
    }
    Ok(spine)
  }

  /// Assemble a tree from a store and an already validated spine.
  pub fn from_parts(store: NodeStore, spine: Vec<Node>, total_lines: u64) -> WrapTree {
    WrapTree {
      store,
      spine,
      total_lines: AtomicU64::new(total_lines),
    }
  }

  /// Total logical lines.
  pub fn total_lines(&self) -> u64 {
    self.total_lines.load(Ordering::Acquire)
  }

  /// Tree height, 1 for a single leaf.
  pub fn height(&self) -> u32 {
    self.spine.len() as u32
  }

  /// Sealed nodes in the store.
  pub fn sealed_nodes(&self) -> u64 {
    self.store.count()
  }

  /// Encode the live right spine, level 0 first, for the metadata sidecar.
  pub fn spine_snapshot(&self) -> IndexResult<Vec<Vec<u8>>> {
    self.spine.iter().map(|node| node.encode()).collect()
  }

  /// Flush sealed node pages to disk.
  pub fn flush(&self) -> IndexResult<()> {
    self.store.flush()
  }

  /// Drop everything: truncate the store and reset to an empty tree.
  pub fn clear(&mut self) -> IndexResult<()> {
    self.store.truncate(0)?;
    self.spine = vec![Node::new_leaf()];
    self.total_lines.store(0, Ordering::Release);
    Ok(())
  }

  // Append {

  /// Append the width of the next logical line.
  ///
  /// O(log n) amortized: one sealed leaf every [`LEAF_FANOUT`] appends plus
  /// rare internal seals; otherwise only in-memory spine updates.
  pub fn append(&mut self, width: u16) -> IndexResult<()> {
    if self.spine[0].count() == LEAF_FANOUT {
      self.seal_leaf()?;
    }
    self.spine[0].push_width(width);
    for level in 1..self.spine.len() {
      let mirror = self.spine[level].last_entry_mut();
      mirror.child_lines += 1;
      mirror.hist.add(width);
    }
    self._internal_check();
    // Publish visibility only after every spine node reflects the line.
    self.total_lines.fetch_add(1, Ordering::Release);
    Ok(())
  }

  fn seal_leaf(&mut self) -> IndexResult<()> {
    let sealed = std::mem::replace(&mut self.spine[0], Node::new_leaf());
    let lines = sealed.lines();
    let hist = sealed.hist();
    let node_ref = self.store.append(&sealed.encode()?)?;
    trace!("sealed leaf {node_ref} covering {lines} lines");
    self.attach_sealed(1, node_ref, lines, hist)
  }

  /// Record a freshly sealed child at `level`, sealing upward as long as
  /// parents are full, growing the tree when the cascade exits the root.
  fn attach_sealed(
    &mut self,
    level: usize,
    node_ref: u32,
    lines: u64,
    hist: Histogram,
  ) -> IndexResult<()> {
    if level == self.spine.len() {
      // The sealed node was the whole old root's subtree: grow one level.
      let mut root = Node::new_internal();
      root.push_entry(Entry {
        child_ref: node_ref,
        child_lines: lines,
        hist,
      });
      root.push_entry(Entry::spine_mirror());
      self.spine.push(root);
      trace!("tree height grew to {}", self.spine.len());
      return Ok(());
    }

    // The mirror entry already carries the subtree's exact line count and
    // histogram; sealing only pins the ref.
    {
      let mirror = self.spine[level].last_entry_mut();
      debug_assert_eq!(mirror.child_ref, SPINE_CHILD);
      debug_assert_eq!(mirror.child_lines, lines);
      mirror.child_ref = node_ref;
    }

    if self.spine[level].count() == INTERNAL_FANOUT {
      let sealed = std::mem::replace(&mut self.spine[level], Node::new_internal());
      let sealed_lines = sealed.lines();
      let sealed_hist = sealed.hist();
      let sealed_ref = self.store.append(&sealed.encode()?)?;
      trace!("sealed internal {sealed_ref} at level {level}");
      self.attach_sealed(level + 1, sealed_ref, sealed_lines, sealed_hist)?;
    }
    self.spine[level].push_entry(Entry::spine_mirror());
    Ok(())
  }

  // Append }

  // Queries {

  /// Total display rows across the whole log at `terminal_width`. Exact
  /// for every width.
  pub fn rows_at_width(&self, terminal_width: u16) -> IndexResult<u64> {
    if self.total_lines() == 0 {
      return Ok(0);
    }
    self.spine_rows(self.spine.len() - 1, terminal_width)
  }

  /// Find the logical line containing display row `target_row` at
  /// `terminal_width`.
  ///
  /// # Return
  ///
  /// It returns `(line index, residual row within that line)`.
  /// It returns [`IndexError::OutOfRange`] when `target_row` is at or past
  /// [`WrapTree::rows_at_width`].
  pub fn locate(&self, terminal_width: u16, target_row: u64) -> IndexResult<(u64, u64)> {
    let total = self.rows_at_width(terminal_width)?;
    if target_row >= total {
      return Err(IndexError::OutOfRange(format!(
        "row {target_row} >= {total} at width {terminal_width}"
      )));
    }

    let mut remaining = target_row;
    let mut line_base: u64 = 0;
    let mut level = self.spine.len() - 1;
    loop {
      match &self.spine[level] {
        Node::Leaf { widths } => {
          for (i, w) in widths.iter().enumerate() {
            let rows = wrap::rows(*w, terminal_width);
            if remaining < rows {
              return Ok((line_base + i as u64, remaining));
            }
            remaining -= rows;
          }
          return Err(IndexError::Corruption(
            "row accounting overran the spine leaf".to_string(),
          ));
        }
        Node::Internal { entries } => {
          let mut next: Option<u32> = None;
          for e in entries {
            let rows = self.entry_rows(e, level, terminal_width)?;
            if remaining < rows {
              next = Some(e.child_ref);
              break;
            }
            remaining -= rows;
            line_base += e.child_lines;
          }
          match next {
            Some(SPINE_CHILD) => level -= 1,
            Some(child_ref) => {
              return self.locate_sealed(child_ref, terminal_width, remaining, line_base);
            }
            None => {
              return Err(IndexError::Corruption(
                "row accounting overran an internal spine node".to_string(),
              ));
            }
          }
        }
      }
    }
  }

  /// Cumulative display-row offset of the start of logical line `line` at
  /// `terminal_width`.
  pub fn row_of(&self, terminal_width: u16, line: u64) -> IndexResult<u64> {
    let total = self.total_lines();
    if line >= total {
      return Err(IndexError::OutOfRange(format!("line {line} >= {total}")));
    }

    let mut rows: u64 = 0;
    let mut line_rem = line;
    let mut level = self.spine.len() - 1;
    loop {
      match &self.spine[level] {
        Node::Leaf { widths } => {
          debug_assert!((line_rem as usize) < widths.len());
          for w in &widths[..line_rem as usize] {
            rows += wrap::rows(*w, terminal_width);
          }
          return Ok(rows);
        }
        Node::Internal { entries } => {
          let mut next: Option<u32> = None;
          for e in entries {
            if line_rem < e.child_lines {
              next = Some(e.child_ref);
              break;
            }
            line_rem -= e.child_lines;
            rows += self.entry_rows(e, level, terminal_width)?;
          }
          match next {
            Some(SPINE_CHILD) => level -= 1,
            Some(child_ref) => {
              return self.row_of_sealed(child_ref, terminal_width, line_rem, rows);
            }
            None => {
              return Err(IndexError::Corruption(
                "line accounting overran an internal spine node".to_string(),
              ));
            }
          }
        }
      }
    }
  }

  /// Exact rows under one entry. Uses the histogram when it is exact at
  /// this width, otherwise descends into the child subtree.
  fn entry_rows(&self, entry: &Entry, level: usize, terminal_width: u16) -> IndexResult<u64> {
    if entry.hist.exact_for(terminal_width) {
      return Ok(entry.hist.rows(terminal_width));
    }
    if entry.child_ref == SPINE_CHILD {
      self.spine_rows(level - 1, terminal_width)
    } else {
      self.sealed_rows(entry.child_ref, terminal_width)
    }
  }

  /// Exact rows under the spine node at `level`.
  fn spine_rows(&self, level: usize, terminal_width: u16) -> IndexResult<u64> {
    match &self.spine[level] {
      Node::Leaf { widths } => Ok(
        widths
          .iter()
          .map(|w| wrap::rows(*w, terminal_width))
          .sum(),
      ),
      Node::Internal { entries } => {
        let mut total: u64 = 0;
        for e in entries {
          total += self.entry_rows(e, level, terminal_width)?;
        }
        Ok(total)
      }
    }
  }

  /// Exact rows under the sealed node at `node_ref`.
  fn sealed_rows(&self, node_ref: u32, terminal_width: u16) -> IndexResult<u64> {
    match self.read_node(node_ref)? {
      Node::Leaf { widths } => Ok(
        widths
          .iter()
          .map(|w| wrap::rows(*w, terminal_width))
          .sum(),
      ),
      Node::Internal { entries } => {
        let mut total: u64 = 0;
        for e in &entries {
          total += self.sealed_entry_rows(e, terminal_width)?;
        }
        Ok(total)
      }
    }
  }

  fn sealed_entry_rows(&self, entry: &Entry, terminal_width: u16) -> IndexResult<u64> {
    if entry.child_ref == SPINE_CHILD {
      return Err(IndexError::Corruption(
        "spine sentinel inside a sealed node".to_string(),
      ));
    }
    if entry.hist.exact_for(terminal_width) {
      Ok(entry.hist.rows(terminal_width))
    } else {
      self.sealed_rows(entry.child_ref, terminal_width)
    }
  }

  fn locate_sealed(
    &self,
    node_ref: u32,
    terminal_width: u16,
    mut remaining: u64,
    mut line_base: u64,
  ) -> IndexResult<(u64, u64)> {
    let mut node = self.read_node(node_ref)?;
    loop {
      match node {
        Node::Leaf { widths } => {
          for (i, w) in widths.iter().enumerate() {
            let rows = wrap::rows(*w, terminal_width);
            if remaining < rows {
              return Ok((line_base + i as u64, remaining));
            }
            remaining -= rows;
          }
          return Err(IndexError::Corruption(
            "row accounting overran a sealed leaf".to_string(),
          ));
        }
        Node::Internal { ref entries } => {
          let mut next: Option<u32> = None;
          for e in entries {
            let rows = self.sealed_entry_rows(e, terminal_width)?;
            if remaining < rows {
              next = Some(e.child_ref);
              break;
            }
            remaining -= rows;
            line_base += e.child_lines;
          }
          match next {
            Some(child_ref) => node = self.read_node(child_ref)?,
            None => {
              return Err(IndexError::Corruption(
                "row accounting overran a sealed internal node".to_string(),
              ));
            }
          }
        }
      }
    }
  }

  fn row_of_sealed(
    &self,
    node_ref: u32,
    terminal_width: u16,
    mut line_rem: u64,
    mut rows: u64,
  ) -> IndexResult<u64> {
    let mut node = self.read_node(node_ref)?;
    loop {
      match node {
        Node::Leaf { widths } => {
          debug_assert!((line_rem as usize) < widths.len());
          for w in &widths[..line_rem as usize] {
            rows += wrap::rows(*w, terminal_width);
          }
          return Ok(rows);
        }
        Node::Internal { ref entries } => {
          let mut next: Option<u32> = None;
          for e in entries {
            if line_rem < e.child_lines {
              next = Some(e.child_ref);
              break;
            }
            line_rem -= e.child_lines;
            rows += self.sealed_entry_rows(e, terminal_width)?;
          }
          match next {
            Some(child_ref) => node = self.read_node(child_ref)?,
            None => {
              return Err(IndexError::Corruption(
                "line accounting overran a sealed internal node".to_string(),
              ));
            }
          }
        }
      }
    }
  }

  fn read_node(&self, node_ref: u32) -> IndexResult<Node> {
    Node::decode(self.store.read(node_ref)?)
  }

  // Queries }

  #[cfg(not(debug_assertions))]
  fn _internal_check(&self) {}

  #[cfg(debug_assertions)]
  fn _internal_check(&self) {
    // Mirror entries stay in lockstep with the level below.
    let mut below = self.spine[0].lines();
    for node in self.spine.iter().skip(1) {
      match node {
        Node::Internal { entries } => {
          let last = entries.last().unwrap();
          assert_eq!(last.child_ref, SPINE_CHILD);
          assert_eq!(last.child_lines, below);
          assert_eq!(last.hist.lines(), below);
          below = node.lines();
        }
        Node::Leaf { .. } => panic!("leaf above level 0"),
      }
    }
  }
}
