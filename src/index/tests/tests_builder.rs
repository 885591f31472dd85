#[cfg(test)]
mod tree_builder_tests {
    use crate::cfile::{BlockPointer, BlockWrite, CFileError};
    use crate::index::IndexTreeBuilder;

    /// Block sink that keeps every written block in memory, so tests
    /// can count and inspect the builder's output without a file.
    struct MemoryBlockSink {
        blocks: Vec<Vec<u8>>,
        pos: u64,
    }

    impl MemoryBlockSink {
        fn new() -> Self {
            Self {
                blocks: Vec::new(),
                pos: 0,
            }
        }
    }

    impl BlockWrite for MemoryBlockSink {
        fn write_block(&mut self, data: &[u8]) -> Result<BlockPointer, CFileError> {
            let ptr = BlockPointer {
                offset: self.pos,
                size: data.len() as u64,
            };
            self.pos += data.len() as u64;
            self.blocks.push(data.to_vec());
            Ok(ptr)
        }
    }

    /// Sink that fails every write, for error propagation tests.
    struct FailingSink;

    impl BlockWrite for FailingSink {
        fn write_block(&mut self, _data: &[u8]) -> Result<BlockPointer, CFileError> {
            Err(CFileError::Io(std::io::Error::other("disk gone")))
        }
    }

    fn ptr(offset: u64) -> BlockPointer {
        BlockPointer { offset, size: 8 }
    }

    // Entry cost for a 3-byte key: 4 + 3 + 16 = 23 bytes; trailer 5.
    // With a 60-byte target, a block closes after its third entry.
    const SMALL_BLOCK: usize = 60;

    #[test]
    fn test_empty_build_writes_one_empty_leaf() {
        let mut sink = MemoryBlockSink::new();
        let builder = IndexTreeBuilder::new(SMALL_BLOCK);
        let info = builder.finish(&mut sink).unwrap();

        assert_eq!(info.depth, 1);
        assert_eq!(sink.blocks.len(), 1);
        // Just the trailer: zero entries, leaf flag set.
        assert_eq!(sink.blocks[0], vec![0, 0, 0, 0, 1]);
        assert_eq!(info.root_block.offset, 0);
    }

    #[test]
    fn test_single_entry_build() {
        let mut sink = MemoryBlockSink::new();
        let mut builder = IndexTreeBuilder::new(SMALL_BLOCK);
        builder.append(b"key", ptr(42), &mut sink).unwrap();
        let info = builder.finish(&mut sink).unwrap();

        assert_eq!(info.depth, 1);
        assert_eq!(sink.blocks.len(), 1);
    }

    #[test]
    fn test_two_level_build() {
        let mut sink = MemoryBlockSink::new();
        let mut builder = IndexTreeBuilder::new(SMALL_BLOCK);
        for (i, key) in [b"aaa", b"bbb", b"ccc", b"ddd", b"eee"].iter().enumerate() {
            builder.append(*key, ptr(i as u64), &mut sink).unwrap();
        }
        let info = builder.finish(&mut sink).unwrap();

        // Leaves {aaa,bbb,ccc} and {ddd,eee}, one internal root.
        assert_eq!(info.depth, 2);
        assert_eq!(sink.blocks.len(), 3);
        // The root is written last.
        assert_eq!(info.root_block.offset, sink.pos - sink.blocks[2].len() as u64);
    }

    #[test]
    fn test_exact_fill_promotes_leaf_to_root() {
        // Three entries fill the leaf exactly, leaving level 1 with a
        // single promoted entry; that entry's pointer must become the
        // root instead of a one-entry internal block.
        let mut sink = MemoryBlockSink::new();
        let mut builder = IndexTreeBuilder::new(SMALL_BLOCK);
        builder.append(b"aaa", ptr(1), &mut sink).unwrap();
        builder.append(b"bbb", ptr(2), &mut sink).unwrap();
        builder.append(b"ccc", ptr(3), &mut sink).unwrap();
        let info = builder.finish(&mut sink).unwrap();

        assert_eq!(sink.blocks.len(), 1, "only the leaf block is written");
        assert_eq!(info.depth, 1);
        assert_eq!(info.root_block.offset, 0);
    }

    #[test]
    fn test_three_level_build() {
        // 5-byte keys cost 25 bytes each; a 40-byte target closes
        // every block at two entries, so 8 keys produce 4 leaves,
        // 2 internal blocks, and a 2-entry root one level up.
        let mut sink = MemoryBlockSink::new();
        let mut builder = IndexTreeBuilder::new(40);
        for i in 0..8u64 {
            let key = format!("key-{i}").into_bytes();
            builder.append(&key, ptr(i), &mut sink).unwrap();
        }
        let info = builder.finish(&mut sink).unwrap();

        assert_eq!(info.depth, 3);
        assert_eq!(sink.blocks.len(), 7);
    }

    #[test]
    fn test_write_error_propagates() {
        let mut sink = FailingSink;
        let mut builder = IndexTreeBuilder::new(SMALL_BLOCK);
        builder.append(b"aaa", ptr(1), &mut sink).unwrap();
        builder.append(b"bbb", ptr(2), &mut sink).unwrap();
        // Third entry fills the block and triggers the failing write.
        let err = builder.append(b"ccc", ptr(3), &mut sink).unwrap_err();
        assert!(matches!(err, CFileError::Io(_)));
    }

    #[test]
    fn test_finish_write_error_propagates() {
        let mut sink = MemoryBlockSink::new();
        let mut builder = IndexTreeBuilder::new(SMALL_BLOCK);
        builder.append(b"aaa", ptr(1), &mut sink).unwrap();

        let mut failing = FailingSink;
        let err = builder.finish(&mut failing).unwrap_err();
        assert!(matches!(err, CFileError::Io(_)));
    }
}
