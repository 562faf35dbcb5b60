//! Helpers building scratch source logs and index options for unit tests.

use crate::opt::IndexOptions;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `lines` to `dir/name`, each terminated by `\n`.
pub fn make_source_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
  let path = dir.join(name);
  let mut content = String::new();
  for line in lines {
    content.push_str(line);
    content.push('\n');
  }
  fs::write(&path, content).unwrap();
  path
}

/// Append raw bytes to an existing source file.
pub fn append_to_source(path: &Path, bytes: &[u8]) {
  let mut file = OpenOptions::new().append(true).open(path).unwrap();
  file.write_all(bytes).unwrap();
}

/// An ASCII line of exactly `width` display cells.
pub fn ascii_line(width: usize) -> String {
  "x".repeat(width)
}

/// Options with the cache rooted inside `dir`.
pub fn cache_options(dir: &Path) -> IndexOptions {
  let mut options = IndexOptions::default();
  options.set_cache_dir(dir.join("cache"));
  options
}
