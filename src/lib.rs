//! # Tabulet
//!
//! Storage-engine core for a columnar tablet server: a persistent,
//! write-once **B-tree block index** for column files (CFiles) and an
//! in-memory **MVCC coordinator** for transaction timestamps and
//! consistent snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     CFile (write path)                  │
//! │  append(key, block) ──► value blocks ──► bloom filter   │
//! │          │                                              │
//! │          └──► IndexTreeBuilder (leaf-first, bottom-up)  │
//! │                  level 0 [leaf] ─ level 1 ─ ... ─ root  │
//! │                  finish() ──► footer {root, depth}      │
//! ├─────────────────────────────────────────────────────────┤
//! │                     CFile (read path)                   │
//! │  mmap + CRC32 verify ──► BlockCache (Arc handles)       │
//! │          │                                              │
//! │          └──► IndexTreeIterator (per-depth cursors)     │
//! │                  seek_to_first / seek_at_or_before /    │
//! │                  next ──► (key, block pointer)          │
//! ├─────────────────────────────────────────────────────────┤
//! │                     MVCC coordination                   │
//! │  Clock ──► MvccManager {snapshot, in-flight, waiters}   │
//! │  ScopedTransaction (commit on scope exit)               │
//! │  MvccSnapshot (committed-set value object)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cfile`] | Column file plumbing — checksummed block framing, writer/reader, block cache, key comparators |
//! | [`index`] | Persistent B-tree index — block codec, bottom-up tree builder, cursor-stack iterator |
//! | [`mvcc`] | Transaction timestamps, committed-state snapshots, clean-snapshot barriers |
//! | [`encoding`] | Deterministic little-endian wire format for on-disk structures |
//!
//! ## Key Features
//!
//! - **Write-once, balanced index trees** — entries stream into the
//!   leaf level; full blocks promote their first key upward, producing
//!   a tree whose internal keys are child-subtree minimums.
//! - **`seek_at_or_before` lookups** — the promoted-key policy makes
//!   "greatest key ≤ search key" a single root-to-leaf descent.
//! - **Block-level CRC32 integrity** — every block, the header, and
//!   the footer are checksummed; corruption is reported before bytes
//!   are interpreted.
//! - **Refcounted block loans** — iterators pin their root-to-leaf
//!   path through cache handles, so many readers share one immutable
//!   tree without copying.
//! - **Strictly monotone timestamps** — issued under the coordinator
//!   lock, so snapshot barriers see every transaction started before
//!   them.
//! - **Clean-snapshot waits** — one-shot parked waiters are woken by
//!   the first commit that satisfies their cutoff.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabulet::cfile::{CFileReader, CFileWriter, CFileWriterOptions};
//! use tabulet::mvcc::{LogicalClock, MvccManager};
//!
//! # fn main() -> Result<(), tabulet::cfile::CFileError> {
//! // Build a column file with an embedded B-tree index.
//! let mut writer = CFileWriter::create("/tmp/col.cf", CFileWriterOptions::default())?;
//! writer.append(b"aaa", b"data-block-1")?;
//! writer.append(b"bbb", b"data-block-2")?;
//! let info = writer.finish()?;
//! assert_eq!(info.depth, 1);
//!
//! // Look up blocks by key.
//! let reader = CFileReader::open("/tmp/col.cf")?;
//! let mut iter = reader.index_iterator();
//! iter.seek_at_or_before(b"abz")?;
//! assert_eq!(iter.current_key(), b"aaa");
//! let block = reader.read_block(iter.current_block_pointer())?;
//! assert_eq!(block, b"data-block-1");
//!
//! // Coordinate readers and writers with MVCC snapshots.
//! let mvcc = MvccManager::new(Arc::new(LogicalClock::default()));
//! let t1 = mvcc.start_transaction();
//! mvcc.commit_transaction(t1);
//! assert!(mvcc.take_snapshot().is_committed(t1));
//! # Ok(())
//! # }
//! ```

#![allow(dead_code)]

pub mod cfile;
pub mod encoding;
pub mod index;
pub mod mvcc;
