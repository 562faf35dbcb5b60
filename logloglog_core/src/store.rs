//! Memory-mapped cache files backing one index.
//!
//! All files live under `cache_dir/<basename>.<fingerprint>/` and grow
//! monotonically between rebuilds:
//!
//! - `widths.dat`: packed `u16` display widths, one per logical line.
//! - `offsets.dat`: packed `u64` byte offsets of line starts in the source.
//! - `nodes.dat`: fixed-size sealed tree nodes, appended in seal order.
//! - `metadata`: binary sidecar with geometry, source identity, counters and
//!   the live right-spine snapshot.

pub mod meta;
pub mod mmap;
pub mod nodes;
pub mod offsets;
pub mod widths;
