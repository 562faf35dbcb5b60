//! Index-local options: the pluggable width/split callbacks and the cache
//! directory.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

/// Display width measure: text of one logical line (or one grapheme cluster
/// during slicing) to terminal cells. Values overflowing `u16` saturate.
pub type WidthFn = Arc<dyn Fn(&str) -> u16 + Send + Sync>;

/// Outcome of one splitter pass over a byte window.
#[derive(Debug, Clone, Default)]
pub struct LineSplit {
  /// Byte ranges of line content inside the window, terminators excluded,
  /// in order. All ranges lie below `consumed`.
  pub lines: Vec<Range<usize>>,

  /// Bytes consumed through the last line terminator. A trailing partial
  /// line is not consumed and is retried on the next pass.
  pub consumed: usize,
}

/// Line splitter: raw source bytes to completed logical lines.
pub type SplitFn = Arc<dyn Fn(&[u8]) -> LineSplit + Send + Sync>;

#[derive(Clone)]
/// Local options for one [`Index`](crate::idx::Index).
///
/// The recognized options are:
/// - `width_fn`: display width measure, default is the terminal cell width
///   (East-Asian wide characters count 2, combining marks 0).
/// - `split_fn`: logical line splitter, default splits on `\n` and strips a
///   preceding `\r`, dropping a trailing partial line.
/// - `cache_dir`: where index files live, default is the platform per-user
///   cache root under `logloglog`.
pub struct IndexOptions {
  width_fn: WidthFn,
  split_fn: SplitFn,
  cache_dir: Option<PathBuf>,
}

impl std::fmt::Debug for IndexOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IndexOptions")
      .field("cache_dir", &self.cache_dir)
      .finish_non_exhaustive()
  }
}

impl Default for IndexOptions {
  fn default() -> Self {
    IndexOptions {
      width_fn: Arc::new(default_width),
      split_fn: Arc::new(default_split),
      cache_dir: None,
    }
  }
}

impl IndexOptions {
  pub fn width_fn(&self) -> &WidthFn {
    &self.width_fn
  }

  pub fn set_width_fn(&mut self, value: WidthFn) {
    self.width_fn = value;
  }

  pub fn split_fn(&self) -> &SplitFn {
    &self.split_fn
  }

  pub fn set_split_fn(&mut self, value: SplitFn) {
    self.split_fn = value;
  }

  /// Configured cache root, or the platform default.
  pub fn cache_dir(&self) -> PathBuf {
    match &self.cache_dir {
      Some(dir) => dir.clone(),
      None => default_cache_dir(),
    }
  }

  pub fn set_cache_dir(&mut self, value: PathBuf) {
    self.cache_dir = Some(value);
  }
}

/// Default width measure: terminal cell width, saturating at `u16::MAX`.
pub fn default_width(text: &str) -> u16 {
  UnicodeWidthStr::width(text).min(u16::MAX as usize) as u16
}

/// Default splitter: split on `\n`, strip a `\r` preceding it, drop the
/// trailing partial line.
pub fn default_split(bytes: &[u8]) -> LineSplit {
  let mut split = LineSplit::default();
  let mut start = 0usize;
  for nl in memchr::memchr_iter(b'\n', bytes) {
    let end = if nl > start && bytes[nl - 1] == b'\r' {
      nl - 1
    } else {
      nl
    };
    split.lines.push(start..end);
    start = nl + 1;
  }
  split.consumed = start;
  split
}

/// Platform per-user cache root for index files.
pub fn default_cache_dir() -> PathBuf {
  match directories::ProjectDirs::from("", "", "logloglog") {
    Some(dirs) => dirs.cache_dir().to_path_buf(),
    None => std::env::temp_dir().join("logloglog"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_width1() {
    assert_eq!(default_width(""), 0);
    assert_eq!(default_width("hello"), 5);
    assert_eq!(default_width("你好"), 4);
  }

  #[test]
  fn default_split1() {
    let split = default_split(b"one\ntwo\r\npartial");
    assert_eq!(split.lines, vec![0..3, 4..7]);
    assert_eq!(split.consumed, 9);
  }

  #[test]
  fn default_split2() {
    // Empty lines and no trailing terminator.
    let split = default_split(b"\n\nx");
    assert_eq!(split.lines, vec![0..0, 1..1]);
    assert_eq!(split.consumed, 2);

    let split = default_split(b"no terminator");
    assert!(split.lines.is_empty());
    assert_eq!(split.consumed, 0);
  }
}
