//! The core library for logloglog: random-access reading of arbitrarily
//! large append-only text logs at any terminal width.
//!
//! Wrapping is width-dependent, so instead of re-indexing per width the
//! index keeps one persistent B-tree whose internal entries carry width
//! histograms ([`hist`]). The two dual queries, display row to logical
//! line ([`tree::WrapTree::locate`]) and logical line to display row
//! ([`tree::WrapTree::row_of`]), both run in O(log n) against that one
//! structure.

pub mod error;
pub mod hist;
pub mod idx;
pub mod log;
pub mod opt;
pub mod store;
pub mod tree;
pub mod wrap;

#[cfg(test)]
pub mod test;
