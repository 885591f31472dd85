#[cfg(test)]
mod tree_iterator_tests {
    use crate::cfile::{
        BlockPointer, CFileError, CFileReader, CFileWriter, CFileWriterOptions,
    };
    use tempfile::TempDir;

    /// Entry cost for 3-byte keys is 23 bytes, so a 60-byte target
    /// closes leaf blocks after three entries.
    fn small_options() -> CFileWriterOptions {
        CFileWriterOptions {
            index_block_size: 60,
            ..CFileWriterOptions::default()
        }
    }

    /// Build `{aaa..eee}` into two leaves plus one internal root and
    /// return the value-block pointers in append order.
    fn build_five(path: &std::path::Path) -> Vec<BlockPointer> {
        let mut writer = CFileWriter::create(path, small_options()).unwrap();
        let mut ptrs = Vec::new();
        for key in [b"aaa", b"bbb", b"ccc", b"ddd", b"eee"] {
            ptrs.push(writer.append(key, b"v").unwrap());
        }
        let info = writer.finish().unwrap();
        assert_eq!(info.depth, 2);
        ptrs
    }

    #[test]
    fn test_seek_at_or_before_descends_to_leaf() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("col.cf");
        let ptrs = build_five(&path);

        let reader = CFileReader::open(&path).unwrap();
        let mut iter = reader.index_iterator();

        // Between keys: greatest key ≤ "ccx" is "ccc".
        iter.seek_at_or_before(b"ccx").unwrap();
        assert_eq!(iter.current_key(), b"ccc");
        assert_eq!(iter.current_block_pointer(), ptrs[2]);

        // Exact hit on a block boundary key.
        iter.seek_at_or_before(b"ddd").unwrap();
        assert_eq!(iter.current_key(), b"ddd");
        assert_eq!(iter.current_block_pointer(), ptrs[3]);

        // Past the last key lands on the last entry.
        iter.seek_at_or_before(b"zzz").unwrap();
        assert_eq!(iter.current_key(), b"eee");
        assert_eq!(iter.current_block_pointer(), ptrs[4]);

        // Before the first key is a logical miss.
        let err = iter.seek_at_or_before(b"a").unwrap_err();
        assert!(matches!(err, CFileError::NotFound));
        assert!(!iter.is_seeked());
    }

    #[test]
    fn test_full_scan_crosses_leaf_boundary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("col.cf");
        let ptrs = build_five(&path);

        let reader = CFileReader::open(&path).unwrap();
        let mut iter = reader.index_iterator();

        iter.seek_to_first().unwrap();
        let expected: [&[u8]; 5] = [b"aaa", b"bbb", b"ccc", b"ddd", b"eee"];
        for (i, key) in expected.iter().enumerate() {
            assert_eq!(iter.current_key(), *key);
            assert_eq!(iter.current_block_pointer(), ptrs[i]);
            if i + 1 < expected.len() {
                assert!(iter.has_next());
                iter.next().unwrap();
            }
        }

        assert!(!iter.has_next());
        assert!(matches!(iter.next().unwrap_err(), CFileError::NotFound));
        // Still positioned on the last entry.
        assert_eq!(iter.current_key(), b"eee");
    }

    #[test]
    fn test_reseek_after_exhaustion() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("col.cf");
        build_five(&path);

        let reader = CFileReader::open(&path).unwrap();
        let mut iter = reader.index_iterator();

        iter.seek_to_first().unwrap();
        while iter.has_next() {
            iter.next().unwrap();
        }

        // The iterator is re-seekable after running off the end.
        iter.seek_at_or_before(b"bbb").unwrap();
        assert_eq!(iter.current_key(), b"bbb");
        iter.seek_to_first().unwrap();
        assert_eq!(iter.current_key(), b"aaa");
    }

    #[test]
    fn test_three_level_tree_navigation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep.cf");

        // 5-byte keys and a 40-byte target close every index block at
        // two entries, giving a depth-3 tree for eight keys.
        let options = CFileWriterOptions {
            index_block_size: 40,
            ..CFileWriterOptions::default()
        };
        let mut writer = CFileWriter::create(&path, options).unwrap();
        for i in 0..8u32 {
            let key = format!("key-{i}").into_bytes();
            writer.append(&key, format!("v{i}").as_bytes()).unwrap();
        }
        let info = writer.finish().unwrap();
        assert_eq!(info.depth, 3);

        let reader = CFileReader::open(&path).unwrap();
        let mut iter = reader.index_iterator();

        // Full in-order walk.
        iter.seek_to_first().unwrap();
        for i in 0..8u32 {
            let expected = format!("key-{i}").into_bytes();
            assert_eq!(iter.current_key(), expected.as_slice());
            if i < 7 {
                iter.next().unwrap();
            }
        }
        assert!(!iter.has_next());

        // Point seeks across subtree boundaries.
        iter.seek_at_or_before(b"key-3x").unwrap();
        assert_eq!(iter.current_key(), b"key-3");
        iter.seek_at_or_before(b"key-4").unwrap();
        assert_eq!(iter.current_key(), b"key-4");

        // Stepping from key-3 to key-4 climbs two levels and descends
        // into a fresh subtree.
        iter.seek_at_or_before(b"key-3").unwrap();
        iter.next().unwrap();
        assert_eq!(iter.current_key(), b"key-4");
    }

    #[test]
    fn test_multiple_iterators_share_one_reader() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("col.cf");
        build_five(&path);

        let reader = CFileReader::open(&path).unwrap();
        let mut a = reader.index_iterator();
        let mut b = reader.index_iterator();

        a.seek_to_first().unwrap();
        b.seek_at_or_before(b"eee").unwrap();

        // Independent positions over shared cached blocks.
        assert_eq!(a.current_key(), b"aaa");
        assert_eq!(b.current_key(), b"eee");
        a.next().unwrap();
        assert_eq!(a.current_key(), b"bbb");
        assert_eq!(b.current_key(), b"eee");
    }

    #[test]
    #[should_panic(expected = "before a successful seek")]
    fn test_next_before_seek_panics() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("col.cf");
        build_five(&path);

        let reader = CFileReader::open(&path).unwrap();
        let mut iter = reader.index_iterator();
        let _ = iter.next();
    }
}
