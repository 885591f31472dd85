//! Index block codec — builder, reader, and intra-block iterator.
//!
//! One index block is a sorted run of `(key, block pointer)` entries
//! followed by a fixed-size trailer:
//!
//! ```text
//! [entry]* [num_entries u32][is_leaf u8]
//! entry = [key: u32-length-prefixed bytes][offset u64][size u64]
//! ```
//!
//! Seeking within a block is a **linear scan**. Blocks are closed once
//! they reach the configured target size (4 KiB by default), so the
//! scan touches a bounded, cache-friendly byte range.

use tracing::warn;

use crate::cfile::{BlockHandle, BlockPointer, CFileError, KeyType};
use crate::encoding::{Decode, Encode};

/// Trailer bytes: entry count (4) + leaf flag (1).
pub(crate) const BLOCK_TRAILER_SIZE: usize = 5;

/// Smallest possible encoded entry: empty key (4) + pointer (16).
const MIN_ENTRY_SIZE: usize = 4 + BlockPointer::ENCODED_SIZE;

// ------------------------------------------------------------------------------------------------
// Index Entry
// ------------------------------------------------------------------------------------------------

/// One decoded `(key, pointer)` pair.
///
/// In a leaf block the pointer locates a data block; in an internal
/// block it locates the child index block whose subtree starts at
/// `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The entry's key bytes.
    pub key: Vec<u8>,

    /// Location of the data block or child index block.
    pub ptr: BlockPointer,
}

// ------------------------------------------------------------------------------------------------
// Index Block Builder
// ------------------------------------------------------------------------------------------------

/// Accumulates sorted entries for one index block.
///
/// The tree builder keeps one of these per level and reuses it
/// (via [`IndexBlockBuilder::reset`]) after each block is written out.
/// Key bytes are copied on [`IndexBlockBuilder::add`], so callers may
/// reuse their buffers.
#[derive(Debug)]
pub struct IndexBlockBuilder {
    entries: Vec<IndexEntry>,

    /// Running encoded size of `entries`, excluding the trailer.
    encoded_size: usize,

    target_size: usize,
    is_leaf: bool,
}

impl IndexBlockBuilder {
    pub fn new(target_size: usize, is_leaf: bool) -> Self {
        Self {
            entries: Vec::new(),
            encoded_size: 0,
            target_size,
            is_leaf,
        }
    }

    /// Append one entry. Keys must be added in non-decreasing order;
    /// the builder does not re-sort.
    pub fn add(&mut self, key: &[u8], ptr: BlockPointer) {
        self.encoded_size += 4 + key.len() + BlockPointer::ENCODED_SIZE;
        self.entries.push(IndexEntry {
            key: key.to_vec(),
            ptr,
        });
    }

    /// Number of buffered entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the block has reached its target size and should be
    /// closed and promoted.
    pub fn is_full(&self) -> bool {
        !self.entries.is_empty() && self.encoded_size + BLOCK_TRAILER_SIZE >= self.target_size
    }

    /// First (minimum) key of the buffered block, if any. This is the
    /// key promoted to the parent level when the block is closed.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.entries.first().map(|e| e.key.as_slice())
    }

    /// The sole buffered entry, if the block holds exactly one.
    pub(crate) fn single_entry(&self) -> Option<&IndexEntry> {
        if self.entries.len() == 1 {
            self.entries.first()
        } else {
            None
        }
    }

    /// Serialize the buffered entries and trailer.
    pub fn finish(&self) -> Result<Vec<u8>, CFileError> {
        let mut buf = Vec::with_capacity(self.encoded_size + BLOCK_TRAILER_SIZE);
        for entry in &self.entries {
            entry.key.as_slice().encode_to(&mut buf)?;
            entry.ptr.encode_to(&mut buf)?;
        }
        (self.entries.len() as u32).encode_to(&mut buf)?;
        self.is_leaf.encode_to(&mut buf)?;
        Ok(buf)
    }

    /// Clear the builder for the next block at the same level.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.encoded_size = 0;
    }
}

// ------------------------------------------------------------------------------------------------
// Index Block Reader
// ------------------------------------------------------------------------------------------------

/// Parsed view over one index block.
///
/// Holds a refcounted handle on the block bytes, so the view (and any
/// iterator created from it) stays valid independent of the cache or
/// the caller's buffers.
#[derive(Clone, Debug)]
pub struct IndexBlockReader {
    data: BlockHandle,
    entries_len: usize,
    num_entries: usize,
    is_leaf: bool,
}

impl IndexBlockReader {
    /// Validate the trailer and construct a view.
    pub fn parse(data: BlockHandle) -> Result<Self, CFileError> {
        if data.len() < BLOCK_TRAILER_SIZE {
            warn!(len = data.len(), "index block shorter than its trailer");
            return Err(CFileError::Corruption(
                "index block shorter than its trailer".into(),
            ));
        }

        let trailer_start = data.len() - BLOCK_TRAILER_SIZE;
        let (num_entries, n) = u32::decode_from(&data[trailer_start..])?;
        let (is_leaf, _) = bool::decode_from(&data[trailer_start + n..])?;

        let num_entries = num_entries as usize;
        let entries_len = trailer_start;
        if num_entries * MIN_ENTRY_SIZE > entries_len {
            return Err(CFileError::Corruption(format!(
                "index block claims {num_entries} entries in {entries_len} bytes"
            )));
        }

        Ok(Self {
            data,
            entries_len,
            num_entries,
            is_leaf,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Create an unpositioned iterator over this block.
    pub fn new_iterator(&self) -> IndexBlockIter {
        IndexBlockIter {
            reader: self.clone(),
            current: None,
        }
    }

    /// Decode the entry starting at byte `offset` within the entry
    /// region. Returns the entry and the offset just past it.
    fn decode_entry_at(&self, offset: usize) -> Result<(IndexEntry, usize), CFileError> {
        if offset >= self.entries_len {
            return Err(CFileError::Corruption(
                "index block entry region exhausted before declared count".into(),
            ));
        }

        let region = &self.data[..self.entries_len];
        let mut off = offset;
        let (key, n) = Vec::<u8>::decode_from(&region[off..])?;
        off += n;
        let (ptr, n) = BlockPointer::decode_from(&region[off..])?;
        off += n;
        Ok((IndexEntry { key, ptr }, off))
    }
}

// ------------------------------------------------------------------------------------------------
// Index Block Iterator
// ------------------------------------------------------------------------------------------------

/// Cursor over the entries of a single index block.
///
/// Positioning (`seek_to_first`, `seek_at_or_before`) and stepping
/// (`next`) decode entries on the fly; `current` exposes the selected
/// entry. Failing with [`CFileError::NotFound`] distinguishes logical
/// absence from decode errors.
pub struct IndexBlockIter {
    reader: IndexBlockReader,
    current: Option<Positioned>,
}

/// A decoded entry plus the cursor state needed to step past it.
struct Positioned {
    entry: IndexEntry,
    index: usize,
    end_offset: usize,
}

impl IndexBlockIter {
    /// Position on the first entry.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] if the block is empty.
    pub fn seek_to_first(&mut self) -> Result<(), CFileError> {
        if self.reader.num_entries == 0 {
            return Err(CFileError::NotFound);
        }
        let (entry, end) = self.reader.decode_entry_at(0)?;
        self.current = Some(Positioned {
            entry,
            index: 0,
            end_offset: end,
        });
        Ok(())
    }

    /// Position on the entry with the greatest key ≤ `search_key`
    /// under `key_type`'s ordering.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] if every key in the block is greater
    /// than `search_key` (or the block is empty).
    pub fn seek_at_or_before(
        &mut self,
        search_key: &[u8],
        key_type: KeyType,
    ) -> Result<(), CFileError> {
        let mut best: Option<Positioned> = None;
        let mut offset = 0;

        for index in 0..self.reader.num_entries {
            let (entry, end) = self.reader.decode_entry_at(offset)?;
            if key_type.compare(&entry.key, search_key) == std::cmp::Ordering::Greater {
                break;
            }
            offset = end;
            best = Some(Positioned {
                entry,
                index,
                end_offset: end,
            });
        }

        match best {
            Some(pos) => {
                self.current = Some(pos);
                Ok(())
            }
            None => Err(CFileError::NotFound),
        }
    }

    /// Whether an entry follows the current one.
    pub fn has_next(&self) -> bool {
        match &self.current {
            Some(pos) => pos.index + 1 < self.reader.num_entries,
            None => false,
        }
    }

    /// Advance to the next entry.
    ///
    /// # Errors
    ///
    /// [`CFileError::NotFound`] at the end of the block or when the
    /// iterator was never positioned.
    pub fn next(&mut self) -> Result<(), CFileError> {
        let (index, end_offset) = match &self.current {
            Some(pos) => (pos.index, pos.end_offset),
            None => return Err(CFileError::NotFound),
        };
        if index + 1 >= self.reader.num_entries {
            return Err(CFileError::NotFound);
        }

        let (entry, end) = self.reader.decode_entry_at(end_offset)?;
        self.current = Some(Positioned {
            entry,
            index: index + 1,
            end_offset: end,
        });
        Ok(())
    }

    /// The currently selected entry, if positioned.
    pub fn current(&self) -> Option<&IndexEntry> {
        self.current.as_ref().map(|p| &p.entry)
    }
}
