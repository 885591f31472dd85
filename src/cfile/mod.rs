//! Column File (CFile) Module
//!
//! A CFile stores one column's data as a sequence of **checksummed
//! blocks** plus a persistent **B-tree index** that maps keys to block
//! locations. This module owns the file plumbing: block framing, the
//! writer and reader, the per-reader block cache, and the typed key
//! comparators. The index tree itself lives in [`crate::index`].
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER_BYTES]
//! [BLOCK_LEN_LE][BLOCK_BYTES][BLOCK_CRC32_LE]      <- value blocks and
//! [BLOCK_LEN_LE][BLOCK_BYTES][BLOCK_CRC32_LE]         index blocks,
//! ...                                                  interleaved
//! [BLOOM_LEN_LE][BLOOM_BYTES][BLOOM_CRC32_LE]
//! [FOOTER_BYTES]
//! ```
//!
//! - **Header** — magic, version, CRC32.
//! - **Blocks** — every block (value, index, bloom) is framed as
//!   `[len u32][data][crc32 u32]`; a [`BlockPointer`] spans the whole
//!   frame.
//! - **Bloom filter block** — built over every appended key; lets
//!   readers skip files that cannot contain a key.
//! - **Footer** — fixed size, at the very end: root index block
//!   pointer, bloom block pointer, tree depth, key type, CRC32.
//!
//! # Concurrency model
//!
//! - A written CFile is **immutable**; readers never lock.
//! - [`BlockCache`] hands out refcounted [`BlockHandle`] loans, so many
//!   index iterators can walk the same tree concurrently while each
//!   frame of their cursor stacks keeps its block bytes alive.
//!
//! # Guarantees
//!
//! - **Integrity:** every block, the header, and the footer carry CRC32
//!   checksums; corruption is detected before bytes are interpreted.
//! - **Atomicity:** files are written to a `.tmp` path and renamed into
//!   place on [`CFileWriter::finish`]; a crash cannot leave a partial
//!   CFile under the final name.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod writer;


// ------------------------------------------------------------------------------------------------
// Re-exports — public API surface
// ------------------------------------------------------------------------------------------------

pub use writer::{BlockFileWriter, CFileWriter, CFileWriterOptions};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    cmp::Ordering,
    collections::HashMap,
    fs::File,
    io,
    ops::Deref,
    path::Path,
    sync::{Arc, Mutex},
};

use bloomfilter::Bloom;
use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::index::IndexTreeIterator;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

pub(crate) const CFILE_MAGIC: [u8; 4] = *b"CFIL";
pub(crate) const CFILE_VERSION: u32 = 1;

/// Header bytes: magic (4) + version (4) + crc32 (4).
pub(crate) const CFILE_HDR_SIZE: usize = 12;

/// Footer bytes: root pointer (16) + bloom pointer (16) + depth (4) +
/// key type (1) + crc32 (4).
pub(crate) const CFILE_FOOTER_SIZE: usize = 41;

pub(crate) const BLOCK_LEN_SIZE: usize = 4;
pub(crate) const BLOCK_CHECKSUM_SIZE: usize = 4;

/// Default target size for one index block before it is closed and
/// promoted.
pub const DEFAULT_INDEX_BLOCK_SIZE: usize = 4096;

pub(crate) const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by CFile operations (read, write, seek).
#[derive(Debug, Error)]
pub enum CFileError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Block or footer bytes failed CRC32 verification.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// Structurally malformed file or block.
    #[error("Corrupt CFile: {0}")]
    Corruption(String),

    /// Logical absence: a seek before the first key, or an iterator
    /// advanced past its last entry. Never covers I/O failures.
    #[error("Not found")]
    NotFound,

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Core value types
// ------------------------------------------------------------------------------------------------

/// Location of one framed block inside a CFile.
///
/// `offset` is the position of the frame's length prefix; `size` covers
/// the whole frame including length prefix and trailing checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPointer {
    /// Offset of the block frame in the file.
    pub offset: u64,

    /// Size of the block frame in bytes, including length prefix and
    /// checksum.
    pub size: u64,
}

impl BlockPointer {
    /// Encoded width of a block pointer: two little-endian `u64`s.
    pub(crate) const ENCODED_SIZE: usize = 16;
}

/// Root of a finished index tree, recorded in the CFile footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeInfo {
    /// Pointer to the root index block.
    pub root_block: BlockPointer,

    /// Number of index levels, counting the leaf level. An empty or
    /// single-block tree has depth 1.
    pub depth: u32,
}

/// Comparator tag for the keys of one column, recorded in the footer.
///
/// Every key comparison inside the index iterator goes through the
/// column's key type, so typed columns can order keys differently from
/// plain byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Byte-lexicographic ordering.
    #[default]
    Binary,

    /// Keys are 8-byte little-endian unsigned integers, compared
    /// numerically. Malformed lengths fall back to byte order.
    UInt64,
}

impl KeyType {
    /// Compare two keys under this type's ordering.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyType::Binary => a.cmp(b),
            KeyType::UInt64 => match (<[u8; 8]>::try_from(a), <[u8; 8]>::try_from(b)) {
                (Ok(a8), Ok(b8)) => u64::from_le_bytes(a8).cmp(&u64::from_le_bytes(b8)),
                _ => a.cmp(b),
            },
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            KeyType::Binary => 0,
            KeyType::UInt64 => 1,
        }
    }

    pub(crate) fn from_u8(tag: u8) -> Result<Self, CFileError> {
        match tag {
            0 => Ok(KeyType::Binary),
            1 => Ok(KeyType::UInt64),
            other => Err(CFileError::Corruption(format!(
                "unknown key type tag {other}"
            ))),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// On-disk format structures
// ------------------------------------------------------------------------------------------------

/// CFile header, written at the beginning of the file.
#[derive(Debug)]
pub(crate) struct CFileHeader {
    /// Magic bytes identifying the CFile format (`b"CFIL"`).
    pub(crate) magic: [u8; 4],

    /// CFile format version.
    pub(crate) version: u32,

    /// CRC32 over magic and version.
    pub(crate) header_crc: u32,
}

/// CFile footer, stored at the very end of the file.
#[derive(Debug)]
pub(crate) struct CFileFooter {
    /// Pointer to the root index block.
    pub(crate) root: BlockPointer,

    /// Pointer to the serialized bloom filter block.
    pub(crate) bloom: BlockPointer,

    /// Index tree depth, counting the leaf level.
    pub(crate) depth: u32,

    /// Key comparator tag (see [`KeyType`]).
    pub(crate) key_type: u8,

    /// CRC32 over the footer fields with this field zeroed.
    pub(crate) footer_crc32: u32,
}

// ------------------------------------------------------------------------------------------------
// Encoding implementations
// ------------------------------------------------------------------------------------------------

impl Encode for BlockPointer {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        self.size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockPointer {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { offset, size }, off))
    }
}

impl Encode for CFileHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.header_crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for CFileHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[off..])?;
        off += n;
        let (version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (header_crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                version,
                header_crc,
            },
            off,
        ))
    }
}

impl Encode for CFileFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.root.encode_to(buf)?;
        self.bloom.encode_to(buf)?;
        self.depth.encode_to(buf)?;
        self.key_type.encode_to(buf)?;
        self.footer_crc32.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for CFileFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (root, n) = BlockPointer::decode_from(&buf[off..])?;
        off += n;
        let (bloom, n) = BlockPointer::decode_from(&buf[off..])?;
        off += n;
        let (depth, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (key_type, n) = u8::decode_from(&buf[off..])?;
        off += n;
        let (footer_crc32, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                root,
                bloom,
                depth,
                key_type,
                footer_crc32,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Block sink seam
// ------------------------------------------------------------------------------------------------

/// Destination for serialized blocks.
///
/// The index tree builder writes its finished blocks through this seam,
/// so it can target a real file ([`BlockFileWriter`]) without knowing
/// anything about framing or checksums.
pub trait BlockWrite {
    /// Write one block and return its location.
    fn write_block(&mut self, data: &[u8]) -> Result<BlockPointer, CFileError>;
}

// ------------------------------------------------------------------------------------------------
// Block cache
// ------------------------------------------------------------------------------------------------

/// Refcounted loan of one verified, decoded block.
///
/// Clones share the same underlying bytes; the bytes are freed when the
/// last handle and the owning cache entry are gone. Index iterators
/// hold one handle per cursor-stack frame so their block views stay
/// valid regardless of what the caller does.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    data: Arc<Vec<u8>>,
}

impl BlockHandle {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

impl Deref for BlockHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for BlockHandle {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Per-reader cache of verified index blocks, keyed by file offset.
///
/// The cache is bounded by the reader's lifetime: a CFile's index is a
/// small fraction of the file, and entries die with the reader.
#[derive(Debug)]
pub struct BlockCache {
    blocks: Mutex<HashMap<u64, BlockHandle>>,
}

impl BlockCache {
    pub(crate) fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `ptr`, loading and inserting it via
    /// `load` on a miss.
    pub fn get_or_load(
        &self,
        ptr: BlockPointer,
        load: impl FnOnce() -> Result<Vec<u8>, CFileError>,
    ) -> Result<BlockHandle, CFileError> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| CFileError::Internal("block cache lock poisoned".into()))?;

        if let Some(handle) = blocks.get(&ptr.offset) {
            return Ok(handle.clone());
        }

        let handle = BlockHandle::new(load()?);
        blocks.insert(ptr.offset, handle.clone());
        Ok(handle)
    }

    /// Number of resident blocks.
    pub(crate) fn resident_blocks(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }
}

// ------------------------------------------------------------------------------------------------
// CFileReader
// ------------------------------------------------------------------------------------------------

/// Read-side handle to an immutable CFile.
///
/// Opening validates the header and footer checksums and eagerly loads
/// the bloom filter; block reads are served from a memory map and
/// verified against their per-block CRC32.
#[derive(Debug)]
pub struct CFileReader {
    mmap: Mmap,
    footer: CFileFooter,
    key_type: KeyType,
    bloom: Bloom<Vec<u8>>,
    cache: BlockCache,
}

impl CFileReader {
    /// Open and validate a CFile.
    ///
    /// # Errors
    ///
    /// - [`CFileError::Corruption`] for truncated files, bad magic, or
    ///   unknown key types.
    /// - [`CFileError::ChecksumMismatch`] for header/footer CRC
    ///   failures.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CFileError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: the mapped file is never written through this
        // mapping; CFiles are immutable once renamed into place.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < CFILE_HDR_SIZE + CFILE_FOOTER_SIZE {
            return Err(CFileError::Corruption(format!(
                "file too small to be a CFile ({} bytes)",
                mmap.len()
            )));
        }

        // Header.
        let (header, _) = encoding::decode_from_slice::<CFileHeader>(&mmap[..CFILE_HDR_SIZE])?;
        if header.magic != CFILE_MAGIC {
            return Err(CFileError::Corruption(format!(
                "bad magic {:02X?}",
                header.magic
            )));
        }
        if header.version != CFILE_VERSION {
            return Err(CFileError::Corruption(format!(
                "unsupported CFile version {}",
                header.version
            )));
        }
        let mut hasher = Crc32::new();
        hasher.update(&mmap[..CFILE_HDR_SIZE - BLOCK_CHECKSUM_SIZE]);
        if hasher.finalize() != header.header_crc {
            return Err(CFileError::ChecksumMismatch);
        }

        // Footer.
        let footer_start = mmap.len() - CFILE_FOOTER_SIZE;
        let (footer, _) = encoding::decode_from_slice::<CFileFooter>(&mmap[footer_start..])?;
        let zeroed = CFileFooter {
            root: footer.root,
            bloom: footer.bloom,
            depth: footer.depth,
            key_type: footer.key_type,
            footer_crc32: 0,
        };
        let zeroed_bytes = encoding::encode_to_vec(&zeroed)?;
        let mut hasher = Crc32::new();
        hasher.update(&zeroed_bytes);
        if hasher.finalize() != footer.footer_crc32 {
            return Err(CFileError::ChecksumMismatch);
        }

        let key_type = KeyType::from_u8(footer.key_type)?;

        // Bloom filter block.
        let bloom_bytes = read_verified_block(&mmap, footer.bloom)?;
        let bloom =
            Bloom::from_slice(&bloom_bytes).map_err(|e| CFileError::Corruption(e.to_string()))?;

        debug!(
            path = %path.display(),
            depth = footer.depth,
            ?key_type,
            "opened cfile"
        );

        Ok(Self {
            mmap,
            footer,
            key_type,
            bloom,
            cache: BlockCache::new(),
        })
    }

    /// Root pointer and depth of the index tree.
    pub fn btree_info(&self) -> BTreeInfo {
        BTreeInfo {
            root_block: self.footer.root,
            depth: self.footer.depth,
        }
    }

    /// The column's key comparator tag.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Bloom filter membership probe. `false` means the key is
    /// definitely absent; `true` means it may be present.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.bloom.check(&key.to_vec())
    }

    /// Read and verify one block frame, returning a copy of its
    /// payload.
    pub fn read_block(&self, ptr: BlockPointer) -> Result<Vec<u8>, CFileError> {
        read_verified_block(&self.mmap, ptr)
    }

    /// Read one index block through the block cache.
    pub fn read_index_block(&self, ptr: BlockPointer) -> Result<BlockHandle, CFileError> {
        self.cache
            .get_or_load(ptr, || read_verified_block(&self.mmap, ptr))
    }

    /// Create an index tree iterator over this file, bound to the
    /// footer's root pointer and key type.
    pub fn index_iterator(&self) -> IndexTreeIterator<'_> {
        IndexTreeIterator::new(self, self.footer.root, self.key_type)
    }

    pub(crate) fn cached_index_blocks(&self) -> usize {
        self.cache.resident_blocks()
    }
}

// ------------------------------------------------------------------------------------------------
// Shared frame verification
// ------------------------------------------------------------------------------------------------

/// Slice one `[len][data][crc32]` frame out of the mapped file, verify
/// it, and return a copy of `data`.
fn read_verified_block(mmap: &Mmap, ptr: BlockPointer) -> Result<Vec<u8>, CFileError> {
    let start = ptr.offset as usize;
    let size = ptr.size as usize;

    let end = start
        .checked_add(size)
        .ok_or_else(|| CFileError::Corruption("block pointer overflows file".into()))?;
    if end > mmap.len() || size < BLOCK_LEN_SIZE + BLOCK_CHECKSUM_SIZE {
        return Err(CFileError::Corruption(format!(
            "block pointer out of bounds (offset {start}, size {size}, file {})",
            mmap.len()
        )));
    }

    let frame = &mmap[start..end];
    let (data_len, _) = encoding::decode_from_slice::<u32>(&frame[..BLOCK_LEN_SIZE])?;
    let data_len = data_len as usize;
    if BLOCK_LEN_SIZE + data_len + BLOCK_CHECKSUM_SIZE != size {
        return Err(CFileError::Corruption(format!(
            "block length prefix {data_len} disagrees with pointer size {size}"
        )));
    }

    let data = &frame[BLOCK_LEN_SIZE..BLOCK_LEN_SIZE + data_len];
    let (stored_crc, _) =
        encoding::decode_from_slice::<u32>(&frame[BLOCK_LEN_SIZE + data_len..])?;

    let mut hasher = Crc32::new();
    hasher.update(data);
    if hasher.finalize() != stored_crc {
        warn!(offset = ptr.offset, "block failed checksum verification");
        return Err(CFileError::ChecksumMismatch);
    }

    Ok(data.to_vec())
}
