//! CFile writer — streams checksummed blocks and builds the index tree.
//!
//! Two layers:
//!
//! - [`BlockFileWriter`] — the raw block sink: frames every block as
//!   `[len u32][data][crc32 u32]`, tracks the file position, and writes
//!   the header and footer.
//! - [`CFileWriter`] — the column-level writer: for each
//!   `append(key, data)` it writes the value block, feeds the bloom
//!   filter, and hands `(key, block pointer)` to the
//!   [`IndexTreeBuilder`]; `finish()` flushes the index, writes the
//!   bloom block and footer, syncs, and renames the file into place.
//!
//! # Input Requirements
//!
//! Keys **must arrive in non-decreasing order** under the configured
//! [`KeyType`]; appending an out-of-order key is a caller bug and
//! panics.
//!
//! # Atomicity
//!
//! 1. Write everything to `path.tmp`.
//! 2. Flush and sync the file.
//! 3. Rename `path.tmp` → `path` atomically.
//!
//! A crash cannot produce a partially-written CFile under the final
//! name.

use std::{
    fs::{File, OpenOptions, rename},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use bloomfilter::Bloom;
use crc32fast::Hasher as Crc32;
use tracing::{debug, info};

use crate::encoding::{self, Encode};
use crate::index::IndexTreeBuilder;

use super::{
    BLOCK_CHECKSUM_SIZE, BLOCK_LEN_SIZE, BTreeInfo, BlockPointer, BlockWrite, CFILE_MAGIC,
    CFILE_VERSION, CFileError, CFileFooter, CFileHeader, DEFAULT_BLOOM_FP_RATE,
    DEFAULT_INDEX_BLOCK_SIZE, KeyType,
};

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`CFileWriter`] instance.
pub struct CFileWriterOptions {
    /// Target encoded size for one index block before it is closed and
    /// its first key promoted to the parent level.
    pub index_block_size: usize,

    /// Key comparator tag recorded in the footer.
    pub key_type: KeyType,

    /// Bloom filter false-positive rate.
    pub bloom_fp_rate: f64,

    /// Expected number of appended entries; sizes the bloom filter.
    pub expected_entry_count: usize,
}

impl Default for CFileWriterOptions {
    fn default() -> Self {
        Self {
            index_block_size: DEFAULT_INDEX_BLOCK_SIZE,
            key_type: KeyType::Binary,
            bloom_fp_rate: DEFAULT_BLOOM_FP_RATE,
            expected_entry_count: 4096,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// BlockFileWriter — raw framed-block sink
// ------------------------------------------------------------------------------------------------

/// Appends `[len][data][crc32]` frames to a file and tracks positions.
#[derive(Debug)]
pub struct BlockFileWriter {
    writer: BufWriter<File>,
    pos: u64,
}

impl BlockFileWriter {
    /// Create the file and write the CFile header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CFileError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        // Header CRC covers magic and version.
        let mut prefix = Vec::new();
        CFILE_MAGIC.encode_to(&mut prefix)?;
        CFILE_VERSION.encode_to(&mut prefix)?;
        let mut hasher = Crc32::new();
        hasher.update(&prefix);
        let header = CFileHeader {
            magic: CFILE_MAGIC,
            version: CFILE_VERSION,
            header_crc: hasher.finalize(),
        };
        let header_bytes = encoding::encode_to_vec(&header)?;
        writer.write_all(&header_bytes)?;

        Ok(Self {
            writer,
            pos: header_bytes.len() as u64,
        })
    }

    /// Write the footer (computing its CRC), flush, and sync.
    pub(crate) fn finish_with_footer(
        &mut self,
        root: BlockPointer,
        bloom: BlockPointer,
        depth: u32,
        key_type: KeyType,
    ) -> Result<(), CFileError> {
        let zeroed = CFileFooter {
            root,
            bloom,
            depth,
            key_type: key_type.as_u8(),
            footer_crc32: 0,
        };
        let zeroed_bytes = encoding::encode_to_vec(&zeroed)?;
        let mut hasher = Crc32::new();
        hasher.update(&zeroed_bytes);

        let footer = CFileFooter {
            footer_crc32: hasher.finalize(),
            ..zeroed
        };
        let footer_bytes = encoding::encode_to_vec(&footer)?;
        self.writer.write_all(&footer_bytes)?;
        self.pos += footer_bytes.len() as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl BlockWrite for BlockFileWriter {
    /// Writes a checksummed frame: `[len_le (4 B)][data][crc32_le (4 B)]`.
    fn write_block(&mut self, data: &[u8]) -> Result<BlockPointer, CFileError> {
        let offset = self.pos;
        let len = data.len() as u32;

        let mut hasher = Crc32::new();
        hasher.update(data);
        let checksum = hasher.finalize();

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(data)?;
        self.writer.write_all(&checksum.to_le_bytes())?;

        let size = (BLOCK_LEN_SIZE + data.len() + BLOCK_CHECKSUM_SIZE) as u64;
        self.pos += size;
        Ok(BlockPointer { offset, size })
    }
}

// ------------------------------------------------------------------------------------------------
// CFileWriter — public entry point
// ------------------------------------------------------------------------------------------------

/// Builds a complete CFile on disk.
///
/// # Example
///
/// ```rust,ignore
/// let mut writer = CFileWriter::create(&path, CFileWriterOptions::default())?;
/// writer.append(b"key", b"value block bytes")?;
/// let info = writer.finish()?;
/// ```
#[derive(Debug)]
pub struct CFileWriter {
    blocks: BlockFileWriter,
    index: IndexTreeBuilder,
    bloom: Bloom<Vec<u8>>,
    key_type: KeyType,
    last_key: Option<Vec<u8>>,
    entry_count: u64,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl CFileWriter {
    /// Create a writer targeting the given output path.
    ///
    /// # Errors
    ///
    /// - [`CFileError::Internal`] for invalid options.
    /// - I/O errors from creating the temporary file.
    pub fn create(
        path: impl AsRef<Path>,
        options: CFileWriterOptions,
    ) -> Result<Self, CFileError> {
        if options.index_block_size == 0 {
            return Err(CFileError::Internal(
                "index_block_size must be non-zero".into(),
            ));
        }
        if !(options.bloom_fp_rate > 0.0 && options.bloom_fp_rate < 1.0) {
            return Err(CFileError::Internal(
                "bloom_fp_rate must be in (0, 1)".into(),
            ));
        }

        let final_path = path.as_ref().to_path_buf();
        let tmp_path = final_path.with_extension("tmp");
        let blocks = BlockFileWriter::create(&tmp_path)?;

        let bloom = Bloom::new_for_fp_rate(
            options.expected_entry_count.max(1),
            options.bloom_fp_rate,
        )
        .map_err(|e| CFileError::Internal(e.to_string()))?;

        debug!(path = %final_path.display(), index_block_size = options.index_block_size, "creating cfile");

        Ok(Self {
            blocks,
            index: IndexTreeBuilder::new(options.index_block_size),
            bloom,
            key_type: options.key_type,
            last_key: None,
            entry_count: 0,
            tmp_path,
            final_path,
        })
    }

    /// Write one value block and index it under `key`.
    ///
    /// Returns the location of the value block.
    ///
    /// # Panics
    ///
    /// Panics if `key` sorts below the previously appended key under
    /// the configured [`KeyType`].
    pub fn append(&mut self, key: &[u8], data: &[u8]) -> Result<BlockPointer, CFileError> {
        if let Some(last) = &self.last_key {
            assert!(
                self.key_type.compare(key, last) != std::cmp::Ordering::Less,
                "keys must be appended in non-decreasing order"
            );
        }

        let ptr = self.blocks.write_block(data)?;
        self.bloom.set(&key.to_vec());
        self.index.append(key, ptr, &mut self.blocks)?;
        self.last_key = Some(key.to_vec());
        self.entry_count += 1;
        Ok(ptr)
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Flush the index tree, write the bloom block and footer, sync,
    /// and atomically rename the file into place.
    ///
    /// Consumes the writer; the resulting [`BTreeInfo`] is also
    /// recorded in the footer.
    pub fn finish(self) -> Result<BTreeInfo, CFileError> {
        let Self {
            mut blocks,
            index,
            bloom,
            key_type,
            entry_count,
            tmp_path,
            final_path,
            ..
        } = self;

        let info = index.finish(&mut blocks)?;

        let bloom_ptr = blocks.write_block(bloom.as_slice())?;
        blocks.finish_with_footer(info.root_block, bloom_ptr, info.depth, key_type)?;

        rename(&tmp_path, &final_path)?;

        info!(
            path = %final_path.display(),
            entries = entry_count,
            depth = info.depth,
            "finished cfile"
        );
        Ok(info)
    }
}
