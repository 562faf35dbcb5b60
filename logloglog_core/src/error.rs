//! Error kinds for the index core.

/// Result type alias with [`IndexError`].
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
/// Error kinds surfaced by the index core.
///
/// Rotation is never surfaced to callers, it triggers an automatic rebuild.
/// A width function overflowing `u16` is not an error either, the width
/// saturates at `u16::MAX`.
pub enum IndexError {
  /// Underlying file read/write/mmap failure. Fatal to the in-flight
  /// operation. On-disk state is left at the last completed line boundary,
  /// so callers may retry `update()`.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Metadata magic mismatch, node geometry mismatch, or an internal
  /// invariant violation. Policy: log and rebuild from scratch on the next
  /// open, never mid-operation.
  #[error("corrupt index: {0}")]
  Corruption(String),

  /// Query index outside `[0, len)` for lines, or `[0, rows_at_width(W))`
  /// for display rows. Non-fatal, reported to the caller.
  #[error("out of range: {0}")]
  OutOfRange(String),
}

impl IndexError {
  /// Whether this error should trigger a rebuild of the cache files.
  pub fn is_corruption(&self) -> bool {
    matches!(self, IndexError::Corruption(_))
  }
}
