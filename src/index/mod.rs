//! Persistent B-tree index over CFile blocks.
//!
//! The index maps keys to [`BlockPointer`](crate::cfile::BlockPointer)s
//! and is built **bottom-up** while the CFile is written: entries
//! stream into the leaf level, and each time a block fills it is
//! written out and its *first key* is promoted one level up. The
//! result is a balanced tree whose internal blocks hold the minimum
//! key of each child subtree, rooted at a single block pointer recorded
//! in the footer.
//!
//! ```text
//!                    [root: aaa | ddd]
//!                    /               \
//!        [leaf: aaa bbb ccc]   [leaf: ddd eee]
//! ```
//!
//! Three layers:
//!
//! - [`block`] — the single-block codec: [`IndexBlockBuilder`] packs
//!   sorted entries and a trailer, [`IndexBlockReader`] /
//!   [`IndexBlockIter`] decode and position within one block.
//! - [`builder`] — [`IndexTreeBuilder`] drives the multi-level build
//!   and emits the tree root on `finish`.
//! - [`iterator`] — [`IndexTreeIterator`] navigates the written tree
//!   with a per-depth cursor stack, answering `seek_to_first`,
//!   `seek_at_or_before`, and `next` at the leaf level.
//!
//! The tree is immutable once finished. `seek_at_or_before` semantics
//! follow from the promoted-key policy: at every internal level the
//! rightmost entry whose key is ≤ the search key selects the child
//! subtree.

pub mod block;
pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use block::{IndexBlockBuilder, IndexBlockIter, IndexBlockReader, IndexEntry};
pub use builder::IndexTreeBuilder;
pub use iterator::IndexTreeIterator;
