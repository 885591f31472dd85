//! Index tree navigation.
//!
//! [`IndexTreeIterator`] walks a finished index tree from its root
//! pointer, maintaining one [`SeekedIndex`] cursor frame per depth.
//! Each frame owns a refcounted handle on its block's bytes, a parsed
//! reader view, and an intra-block iterator positioned at the selected
//! entry — so the whole root-to-leaf path stays pinned while the
//! iterator is seeked.
//!
//! Seeks descend from the root, choosing at every internal level the
//! rightmost entry whose key is ≤ the search key. `next` advances the
//! leaf cursor and, when a block is exhausted, climbs to the nearest
//! ancestor that can advance and re-descends leftmost into the new
//! subtree.
//!
//! An iterator is single-threaded; concurrent readers each create
//! their own, sharing verified block bytes through the reader's cache.

use crate::cfile::{BlockHandle, BlockPointer, CFileError, CFileReader, KeyType};

use super::block::{IndexBlockIter, IndexBlockReader};

/// One level of the iterator's cursor stack.
struct SeekedIndex {
    /// Where this block was loaded from; used to skip reloads.
    block_ptr: BlockPointer,

    /// Keeps the block bytes alive for the frame's lifetime. The
    /// reader and iterator hold their own handles on the same bytes.
    #[allow(dead_code)]
    data: BlockHandle,

    reader: IndexBlockReader,
    iter: IndexBlockIter,
}

/// Cursor over the leaf entries of a persistent index tree.
///
/// Created via [`CFileReader::index_iterator`] or directly from a root
/// pointer and key type. Re-seekable; not shareable across threads.
pub struct IndexTreeIterator<'a> {
    reader: &'a CFileReader,
    root_block: BlockPointer,
    key_type: KeyType,
    seeked: Vec<SeekedIndex>,
}

impl<'a> IndexTreeIterator<'a> {
    /// Bind an iterator to a tree root and the comparator for the
    /// column's key type.
    pub fn new(reader: &'a CFileReader, root_block: BlockPointer, key_type: KeyType) -> Self {
        Self {
            reader,
            root_block,
            key_type,
            seeked: Vec::new(),
        }
    }

    /// Position on the first leaf entry.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] if the tree is empty.
    pub fn seek_to_first(&mut self) -> Result<(), CFileError> {
        let result = self.seek_to_first_downward(self.root_block, 0);
        if result.is_err() {
            self.seeked.clear();
        }
        result
    }

    /// Position on the leaf entry with the greatest key ≤
    /// `search_key`.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] if `search_key` precedes the first key
    /// in the tree.
    pub fn seek_at_or_before(&mut self, search_key: &[u8]) -> Result<(), CFileError> {
        let result = self.seek_downward(search_key, self.root_block, 0);
        if result.is_err() {
            self.seeked.clear();
        }
        result
    }

    /// Whether a leaf entry follows the current position.
    pub fn has_next(&self) -> bool {
        self.seeked.iter().any(|frame| frame.iter.has_next())
    }

    /// Whether the iterator is positioned on a leaf entry.
    pub fn is_seeked(&self) -> bool {
        self.seeked
            .last()
            .is_some_and(|frame| frame.reader.is_leaf())
    }

    /// Advance to the next leaf entry.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] past the last entry (the position is
    /// left unchanged); I/O or corruption errors unseek the iterator.
    ///
    /// # Panics
    ///
    /// Panics if called before a successful seek.
    pub fn next(&mut self) -> Result<(), CFileError> {
        assert!(self.is_seeked(), "next() called before a successful seek");

        // Deepest level able to advance; NotFound leaves the current
        // position intact.
        let Some(start_depth) = (0..self.seeked.len())
            .rev()
            .find(|&depth| self.seeked[depth].iter.has_next())
        else {
            return Err(CFileError::NotFound);
        };

        let result = self.advance_from(start_depth);
        if result.is_err() {
            self.seeked.clear();
        }
        result
    }

    /// Key of the current leaf entry.
    ///
    /// # Panics
    ///
    /// Panics unless the iterator is seeked.
    pub fn current_key(&self) -> &[u8] {
        let frame = self.bottom_leaf_frame();
        match frame.iter.current() {
            Some(entry) => &entry.key,
            None => unreachable!("seeked frame always has a current entry"),
        }
    }

    /// Data-block pointer of the current leaf entry.
    ///
    /// # Panics
    ///
    /// Panics unless the iterator is seeked.
    pub fn current_block_pointer(&self) -> BlockPointer {
        let frame = self.bottom_leaf_frame();
        match frame.iter.current() {
            Some(entry) => entry.ptr,
            None => unreachable!("seeked frame always has a current entry"),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn bottom_leaf_frame(&self) -> &SeekedIndex {
        assert!(self.is_seeked(), "iterator is not seeked");
        match self.seeked.last() {
            Some(frame) => frame,
            None => unreachable!("is_seeked() implies a non-empty stack"),
        }
    }

    /// Advance the frame at `depth` and re-descend leftmost to the
    /// leaf level.
    fn advance_from(&mut self, depth: usize) -> Result<(), CFileError> {
        self.seeked[depth].iter.next()?;

        let mut depth = depth;
        while !self.seeked[depth].reader.is_leaf() {
            let child = self.selected_child(depth)?;
            depth += 1;
            self.load_block(child, depth)?;
            self.seeked[depth].iter.seek_to_first()?;
        }
        Ok(())
    }

    /// Descend from `ptr` at `depth`, choosing at each level the
    /// greatest entry ≤ `search_key`.
    fn seek_downward(
        &mut self,
        search_key: &[u8],
        ptr: BlockPointer,
        depth: usize,
    ) -> Result<(), CFileError> {
        let mut ptr = ptr;
        let mut depth = depth;
        loop {
            self.load_block(ptr, depth)?;

            let key_type = self.key_type;
            let frame = &mut self.seeked[depth];
            frame.iter.seek_at_or_before(search_key, key_type)?;

            if frame.reader.is_leaf() {
                return Ok(());
            }
            ptr = self.selected_child(depth)?;
            depth += 1;
        }
    }

    /// Descend from `ptr` at `depth`, selecting the first entry at
    /// every level.
    fn seek_to_first_downward(
        &mut self,
        ptr: BlockPointer,
        depth: usize,
    ) -> Result<(), CFileError> {
        let mut ptr = ptr;
        let mut depth = depth;
        loop {
            self.load_block(ptr, depth)?;

            let frame = &mut self.seeked[depth];
            frame.iter.seek_to_first()?;

            if frame.reader.is_leaf() {
                return Ok(());
            }
            ptr = self.selected_child(depth)?;
            depth += 1;
        }
    }

    /// Child pointer selected by the positioned frame at `depth`.
    fn selected_child(&self, depth: usize) -> Result<BlockPointer, CFileError> {
        match self.seeked[depth].iter.current() {
            Some(entry) => Ok(entry.ptr),
            None => Err(CFileError::Internal(
                "internal index frame lost its position".into(),
            )),
        }
    }

    /// Load the block at `ptr` into the cursor frame at `depth`.
    ///
    /// Extends the stack when it is shorter than `depth + 1` and
    /// truncates it when longer; truncation drops the deeper frames'
    /// cache handles. Reload is skipped when the same block is already
    /// resident at this depth.
    fn load_block(&mut self, ptr: BlockPointer, depth: usize) -> Result<(), CFileError> {
        if let Some(frame) = self.seeked.get(depth)
            && frame.block_ptr == ptr
        {
            self.seeked.truncate(depth + 1);
            return Ok(());
        }

        let data = self.reader.read_index_block(ptr)?;
        let block_reader = IndexBlockReader::parse(data.clone())?;
        let iter = block_reader.new_iterator();

        debug_assert!(self.seeked.len() >= depth);
        self.seeked.truncate(depth);
        self.seeked.push(SeekedIndex {
            block_ptr: ptr,
            data,
            reader: block_reader,
            iter,
        });
        Ok(())
    }
}
