//! Bottom-up index tree construction.
//!
//! [`IndexTreeBuilder`] owns one [`IndexBlockBuilder`] per tree level,
//! leaf first. Entries stream into level 0; whenever a level's block
//! fills, the block is serialized through the caller's [`BlockWrite`]
//! sink and `(first key, new pointer)` is appended one level up,
//! creating that level on demand. `finish` flushes the partial blocks
//! bottom-up and emits the root.
//!
//! The builder lives for one CFile write and is consumed by
//! [`IndexTreeBuilder::finish`].

use tracing::{debug, trace};

use crate::cfile::{BTreeInfo, BlockPointer, BlockWrite, CFileError};

use super::block::IndexBlockBuilder;

/// Builds a balanced, write-once index tree from an ordered entry
/// stream.
///
/// Keys must arrive in non-decreasing order; key bytes are copied into
/// the per-level block builders, so callers may free their buffers
/// after each [`IndexTreeBuilder::append`].
#[derive(Debug)]
pub struct IndexTreeBuilder {
    /// Target encoded size for each index block.
    block_size: usize,

    /// One in-progress block per level; index 0 is the leaf level.
    levels: Vec<IndexBlockBuilder>,
}

impl IndexTreeBuilder {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            levels: vec![IndexBlockBuilder::new(block_size, true)],
        }
    }

    /// Insert one `(key, pointer)` entry at the leaf level.
    ///
    /// Finished blocks are written through `sink`; a sink error leaves
    /// the builder invalid.
    pub fn append(
        &mut self,
        key: &[u8],
        ptr: BlockPointer,
        sink: &mut dyn BlockWrite,
    ) -> Result<(), CFileError> {
        self.append_at(key, ptr, 0, sink)
    }

    /// Flush all partial blocks and return the tree root.
    ///
    /// Levels are finished bottom-up; closing a lower level can push
    /// entries into (or even create) higher levels, so the top is
    /// re-discovered on every step. A top level holding exactly one
    /// promoted entry is not written out — its sole child already is
    /// the root.
    pub fn finish(mut self, sink: &mut dyn BlockWrite) -> Result<BTreeInfo, CFileError> {
        let mut level = 0;
        loop {
            if level == self.levels.len() - 1 {
                if level > 0
                    && let Some(entry) = self.levels[level].single_entry()
                {
                    let info = BTreeInfo {
                        root_block: entry.ptr,
                        depth: level as u32,
                    };
                    debug!(depth = info.depth, "index tree finished");
                    return Ok(info);
                }

                let root_block = self.finish_and_write_block(level, sink)?;
                let info = BTreeInfo {
                    root_block,
                    depth: (level + 1) as u32,
                };
                debug!(depth = info.depth, "index tree finished");
                return Ok(info);
            }

            self.finish_block_and_propagate(level, sink)?;
            level += 1;
        }
    }

    fn append_at(
        &mut self,
        key: &[u8],
        ptr: BlockPointer,
        level: usize,
        sink: &mut dyn BlockWrite,
    ) -> Result<(), CFileError> {
        if self.levels.len() <= level {
            trace!(level, "creating index level");
            self.levels
                .push(IndexBlockBuilder::new(self.block_size, false));
        }

        let block = &mut self.levels[level];
        block.add(key, ptr);

        if block.is_full() {
            self.finish_block_and_propagate(level, sink)?;
        }
        Ok(())
    }

    /// Close the current block at `level`, write it out, and promote
    /// its first key into the next level up.
    fn finish_block_and_propagate(
        &mut self,
        level: usize,
        sink: &mut dyn BlockWrite,
    ) -> Result<(), CFileError> {
        // A lower block that filled exactly on its last entry leaves
        // this level with nothing pending.
        if self.levels[level].count() == 0 {
            return Ok(());
        }

        let first_key = match self.levels[level].first_key() {
            Some(key) => key.to_vec(),
            None => {
                return Err(CFileError::Internal(
                    "non-empty index block without a first key".into(),
                ));
            }
        };

        let ptr = self.finish_and_write_block(level, sink)?;
        self.append_at(&first_key, ptr, level + 1, sink)
    }

    /// Serialize and write the current block at `level`, resetting the
    /// level's builder for reuse.
    fn finish_and_write_block(
        &mut self,
        level: usize,
        sink: &mut dyn BlockWrite,
    ) -> Result<BlockPointer, CFileError> {
        let bytes = self.levels[level].finish()?;
        let ptr = sink.write_block(&bytes)?;
        trace!(
            level,
            entries = self.levels[level].count(),
            offset = ptr.offset,
            "wrote index block"
        );
        self.levels[level].reset();
        Ok(ptr)
    }
}
