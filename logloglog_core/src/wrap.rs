//! Pure display-wrapping math shared by the tree and the row view.
//!
//! A logical line of display width `w` wraps into `max(1, ceil(w / W))` rows
//! at terminal width `W`. Every logical line occupies at least one display
//! row, even when empty. Slicing walks grapheme clusters left to right and
//! accumulates cells with the same width measure the index was built with,
//! so the two sides agree on where rows break.

use unicode_segmentation::UnicodeSegmentation;

/// Number of display rows a line of display width `line_width` occupies at
/// terminal width `terminal_width`.
///
/// Every line occupies at least 1 row, an empty line (`line_width == 0`)
/// included.
pub fn rows(line_width: u16, terminal_width: u16) -> u64 {
  debug_assert!(terminal_width >= 1);
  let w = line_width as u64;
  let t = (terminal_width as u64).max(1);
  ((w + t - 1) / t).max(1)
}

/// Get the `row`-th display row of `line` wrapped at `terminal_width`.
///
/// Wrapping is cell-based: grapheme clusters accumulate left to right until
/// the next cluster would exceed the terminal width, then the row breaks.
/// Zero-width clusters (combining marks) attach to the preceding cell and
/// never start a new row. The last row is whatever remains; rows are not
/// padded.
///
/// # Return
///
/// It returns the row content as a subslice of `line`.
/// It returns `""` when `row` is past the last produced row (a custom width
/// measure can report more rows than cluster-greedy wrapping produces).
pub fn slice<'a, F>(line: &'a str, terminal_width: u16, row: u64, width_of: F) -> &'a str
where
  F: Fn(&str) -> u16,
{
  let limit = (terminal_width as u32).max(1);
  let mut current: u64 = 0;
  let mut used: u32 = 0;
  let mut start: usize = 0;

  for (offset, cluster) in line.grapheme_indices(true) {
    let w = width_of(cluster) as u32;
    if w > 0 && used > 0 && used + w > limit {
      if current == row {
        return &line[start..offset];
      }
      current += 1;
      start = offset;
      used = 0;
    }
    used += w;
  }

  if current == row {
    &line[start..]
  } else {
    ""
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ascii_width(s: &str) -> u16 {
    s.chars().count() as u16
  }

  #[test]
  fn rows1() {
    assert_eq!(rows(0, 80), 1);
    assert_eq!(rows(1, 80), 1);
    assert_eq!(rows(80, 80), 1);
    assert_eq!(rows(81, 80), 2);
    assert_eq!(rows(160, 80), 2);
    assert_eq!(rows(161, 80), 3);
  }

  #[test]
  fn rows2() {
    // Narrowest terminal: one cell per row.
    assert_eq!(rows(0, 1), 1);
    assert_eq!(rows(7, 1), 7);
    assert_eq!(rows(u16::MAX, 1), u16::MAX as u64);
  }

  #[test]
  fn slice1() {
    let line = "abcdefghij";
    assert_eq!(slice(line, 4, 0, ascii_width), "abcd");
    assert_eq!(slice(line, 4, 1, ascii_width), "efgh");
    assert_eq!(slice(line, 4, 2, ascii_width), "ij");
    assert_eq!(slice(line, 4, 3, ascii_width), "");
  }

  #[test]
  fn slice2() {
    // Whole line fits, row 0 is everything.
    assert_eq!(slice("abc", 80, 0, ascii_width), "abc");
    assert_eq!(slice("abc", 80, 1, ascii_width), "");
    assert_eq!(slice("", 80, 0, ascii_width), "");
  }

  #[test]
  fn slice3() {
    // Wide cells never straddle a row boundary.
    let wide = |s: &str| -> u16 {
      if s == "宽" {
        2
      } else {
        s.chars().count() as u16
      }
    };
    let line = "a宽宽b";
    assert_eq!(slice(line, 3, 0, wide), "a宽");
    assert_eq!(slice(line, 3, 1, wide), "宽b");
  }

  #[test]
  fn slice4() {
    // Zero-width clusters attach to the row that is already full.
    let measure = |s: &str| -> u16 {
      match s {
        "\u{200b}" => 0,
        _ => s.chars().count() as u16,
      }
    };
    let line = "ab\u{200b}cd";
    assert_eq!(slice(line, 2, 0, measure), "ab\u{200b}");
    assert_eq!(slice(line, 2, 1, measure), "cd");
  }
}
