//! Width histogram summarizing a multiset of line widths.
//!
//! The histogram is a fixed array of buckets: the first [`EXACT`] buckets
//! hold single widths `0..EXACT` exactly, the rest are half-octave ranges
//! covering `[EXACT, 65536)`. Bucket boundaries are chosen so that whenever
//! the query width exceeds a bucket's maximum width, the bucket's row count
//! is exact. That is the only property the tree descent relies on: a query
//! that is not exact at some level refines by descending into the subtree.
//!
//! Histograms form a commutative monoid under [`Histogram::add_hist`], so an
//! internal tree entry can summarize its whole subtree by merging leaf
//! histograms.

use crate::error::{IndexError, IndexResult};
use crate::wrap;

/// Number of exact single-width buckets, covering widths `0..EXACT`.
pub const EXACT: usize = 32;

/// Total bucket count: [`EXACT`] singles plus two half-octave ranges per
/// power of two from `2^5` through `2^15`.
pub const BUCKETS: usize = EXACT + 2 * 11;

/// Encoded size: one `(u32 count, u64 sum)` pair per bucket, little-endian.
pub const HIST_BYTES: usize = BUCKETS * 12;

/// Bucket index for a line width.
pub fn bucket_of(width: u16) -> usize {
  if (width as usize) < EXACT {
    width as usize
  } else {
    // Octave k holds [2^k, 2^(k+1)), split at 3 * 2^(k-1).
    let k = 15 - width.leading_zeros() as usize;
    let upper_half = (width as u32) >= (3u32 << (k - 1));
    EXACT + 2 * (k - 5) + upper_half as usize
  }
}

/// Inclusive `(lo, hi)` width bounds of a bucket.
pub fn bucket_bounds(bucket: usize) -> (u16, u16) {
  debug_assert!(bucket < BUCKETS);
  if bucket < EXACT {
    (bucket as u16, bucket as u16)
  } else {
    let r = bucket - EXACT;
    let k = 5 + r / 2;
    let (lo, hi) = if r % 2 == 0 {
      (1u32 << k, (3u32 << (k - 1)) - 1)
    } else {
      (3u32 << (k - 1), (1u32 << (k + 1)) - 1)
    };
    (lo as u16, hi.min(u16::MAX as u32) as u16)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fixed-size summary of the display-width distribution of a set of lines.
///
/// Counts and sums are kept as `u64` in memory; the on-disk form narrows
/// counts to `u32` and reports [`IndexError::Corruption`] on overflow.
pub struct Histogram {
  counts: [u64; BUCKETS],
  sums: [u64; BUCKETS],
}

impl Default for Histogram {
  fn default() -> Self {
    Histogram::new()
  }
}

impl Histogram {
  /// Create an empty histogram.
  pub fn new() -> Self {
    Histogram {
      counts: [0; BUCKETS],
      sums: [0; BUCKETS],
    }
  }

  /// Record one line of display width `width`.
  pub fn add(&mut self, width: u16) {
    let b = bucket_of(width);
    self.counts[b] += 1;
    self.sums[b] += width as u64;
  }

  /// Merge another histogram into this one.
  pub fn add_hist(&mut self, other: &Histogram) {
    for b in 0..BUCKETS {
      self.counts[b] += other.counts[b];
      self.sums[b] += other.sums[b];
    }
  }

  /// Remove a previously merged histogram.
  ///
  /// # Panics
  ///
  /// Debug builds panic if `other` was never merged into this histogram,
  /// i.e. some bucket would underflow.
  pub fn sub_hist(&mut self, other: &Histogram) {
    for b in 0..BUCKETS {
      debug_assert!(self.counts[b] >= other.counts[b]);
      debug_assert!(self.sums[b] >= other.sums[b]);
      self.counts[b] -= other.counts[b];
      self.sums[b] -= other.sums[b];
    }
  }

  /// Total number of recorded lines.
  pub fn lines(&self) -> u64 {
    self.counts.iter().sum()
  }

  /// Whether this histogram is empty.
  pub fn is_empty(&self) -> bool {
    self.counts.iter().all(|c| *c == 0)
  }

  /// Whether [`Histogram::rows`] is exact at `terminal_width`.
  ///
  /// Exact single-width buckets always are. A range bucket is exact only
  /// when every line in it wraps to one row, i.e. its maximum width is below
  /// the terminal width.
  pub fn exact_for(&self, terminal_width: u16) -> bool {
    for b in EXACT..BUCKETS {
      if self.counts[b] == 0 {
        continue;
      }
      let (_, hi) = bucket_bounds(b);
      if hi >= terminal_width {
        return false;
      }
    }
    true
  }

  /// Total display rows at `terminal_width` across all recorded lines.
  ///
  /// Exact when [`Histogram::exact_for`] holds; otherwise an estimate that
  /// never undercounts, with error below each affected bucket's count.
  pub fn rows(&self, terminal_width: u16) -> u64 {
    let t = (terminal_width as u64).max(1);
    let mut total: u64 = 0;
    for b in 0..BUCKETS {
      let c = self.counts[b];
      if c == 0 {
        continue;
      }
      let (_, hi) = bucket_bounds(b);
      if b < EXACT {
        total += c * wrap::rows(b as u16, terminal_width);
      } else if hi < terminal_width {
        // Every line in the bucket fits in one row.
        total += c;
      } else {
        // ceil(w/W) summed over the bucket, via sum and count:
        // sum(ceil(w/W)) = c + floor((sum - c) / W) + eps, eps in [0, c).
        total += c + (self.sums[b] - c) / t;
      }
    }
    total
  }

  /// Encode as `BUCKETS` little-endian `(u32 count, u64 sum)` pairs.
  pub fn encode_into(&self, buf: &mut [u8]) -> IndexResult<()> {
    debug_assert!(buf.len() >= HIST_BYTES);
    for b in 0..BUCKETS {
      let count = u32::try_from(self.counts[b]).map_err(|_| {
        IndexError::Corruption(format!("histogram bucket {b} count overflows u32"))
      })?;
      let at = b * 12;
      buf[at..at + 4].copy_from_slice(&count.to_le_bytes());
      buf[at + 4..at + 12].copy_from_slice(&self.sums[b].to_le_bytes());
    }
    Ok(())
  }

  /// Decode from the layout written by [`Histogram::encode_into`].
  pub fn decode_from(buf: &[u8]) -> IndexResult<Histogram> {
    if buf.len() < HIST_BYTES {
      return Err(IndexError::Corruption(
        "histogram record too short".to_string(),
      ));
    }
    let mut hist = Histogram::new();
    for b in 0..BUCKETS {
      let at = b * 12;
      let count = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
      let sum = u64::from_le_bytes(buf[at + 4..at + 12].try_into().unwrap());
      hist.counts[b] = count as u64;
      hist.sums[b] = sum;
    }
    Ok(hist)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bucket_of1() {
    // Exact singles.
    for w in 0..EXACT as u16 {
      assert_eq!(bucket_of(w), w as usize);
      assert_eq!(bucket_bounds(w as usize), (w, w));
    }
    // Half-octave boundaries.
    assert_eq!(bucket_of(32), EXACT);
    assert_eq!(bucket_of(47), EXACT);
    assert_eq!(bucket_of(48), EXACT + 1);
    assert_eq!(bucket_of(63), EXACT + 1);
    assert_eq!(bucket_of(64), EXACT + 2);
    assert_eq!(bucket_of(u16::MAX), BUCKETS - 1);
  }

  #[test]
  fn bucket_of2() {
    // Every width lands in a bucket whose bounds contain it.
    for w in 0..=u16::MAX {
      let b = bucket_of(w);
      assert!(b < BUCKETS);
      let (lo, hi) = bucket_bounds(b);
      assert!(lo <= w && w <= hi, "width {w} outside bucket {b} [{lo},{hi}]");
    }
  }

  #[test]
  fn rows_exact1() {
    let mut hist = Histogram::new();
    for w in [0u16, 5, 10, 31] {
      hist.add(w);
    }
    // All exact buckets: exact at any width.
    for t in [1u16, 2, 31, 80] {
      assert!(hist.exact_for(t));
      let expect: u64 = [0u16, 5, 10, 31].iter().map(|w| wrap::rows(*w, t)).sum();
      assert_eq!(hist.rows(t), expect);
    }
  }

  #[test]
  fn rows_exact2() {
    let mut hist = Histogram::new();
    hist.add(100);
    hist.add(120);
    // Bucket [96, 127]: exact once the terminal is wider than 127.
    assert!(!hist.exact_for(100));
    assert!(!hist.exact_for(127));
    assert!(hist.exact_for(128));
    assert_eq!(hist.rows(128), 2);
    assert_eq!(hist.rows(200), 2);
  }

  #[test]
  fn rows_estimate1() {
    let mut hist = Histogram::new();
    hist.add(100);
    hist.add(120);
    // Inexact range: the estimate never undercounts and the error stays
    // below the bucket count.
    for t in [1u16, 40, 64, 100, 120, 127] {
      let truth = wrap::rows(100, t) + wrap::rows(120, t);
      assert!(hist.rows(t) >= truth);
      assert!(hist.rows(t) < truth + 2);
    }
  }

  #[test]
  fn merge1() {
    let mut a = Histogram::new();
    let mut b = Histogram::new();
    let mut both = Histogram::new();
    for w in [0u16, 1, 33, 500, 65535] {
      a.add(w);
      both.add(w);
    }
    for w in [2u16, 40, 40, 9000] {
      b.add(w);
      both.add(w);
    }
    let mut merged = a.clone();
    merged.add_hist(&b);
    assert_eq!(merged, both);
    assert_eq!(merged.lines(), 9);

    merged.sub_hist(&b);
    assert_eq!(merged, a);
  }

  #[test]
  fn codec1() {
    let mut hist = Histogram::new();
    for w in [0u16, 31, 32, 47, 48, 1000, 65535] {
      hist.add(w);
    }
    let mut buf = vec![0u8; HIST_BYTES];
    hist.encode_into(&mut buf).unwrap();
    let back = Histogram::decode_from(&buf).unwrap();
    assert_eq!(hist, back);
  }
}
