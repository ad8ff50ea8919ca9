//! Random-access equivalence and offset-monotonicity properties (spec.md
//! §8), plus the page-cache layer on top of a reader.

use std::io::Cursor;

use ragzip::{CacheMode, PageCache, RagzipReader, RagzipWriter};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 223) as u8).collect()
}

fn build(data: &[u8], page_exp: u32, index_exp: u32) -> Vec<u8> {
    let mut w = RagzipWriter::new(Vec::new(), page_exp, index_exp).unwrap();
    w.write_all(data).unwrap();
    w.finish().unwrap()
}

#[test]
fn random_access_reads_match_the_original_at_every_probed_offset() {
    let data = pattern(300_000);
    let bytes = build(&data, 12, 4);
    let mut reader = RagzipReader::open(Cursor::new(bytes)).unwrap();

    for &pos in &[0u64, 1, 4095, 4096, 150_000, 299_999] {
        let mut buf = vec![0u8; 37];
        let n = reader.read_at(pos, &mut buf).unwrap();
        assert_eq!(&buf[..n], &data[pos as usize..pos as usize + n]);
    }
}

#[test]
fn all_three_descent_modes_agree() {
    let data = pattern(400_000);
    let bytes = build(&data, 11, 3);

    let modes = [CacheMode::Direct, CacheMode::Loaded, CacheMode::Cached(8)];
    let mut results = Vec::new();
    for mode in modes {
        let mut reader = RagzipReader::open(Cursor::new(bytes.clone())).unwrap();
        reader.set_cache_mode(mode);
        let mut buf = vec![0u8; 200];
        reader.read_at(250_000, &mut buf).unwrap();
        results.push(buf);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
    assert_eq!(results[0], data[250_000..250_200]);
}

#[test]
fn index_entries_are_strictly_increasing_offsets() {
    let data = pattern(0x10000);
    let bytes = build(&data, 10, 3);
    let mut reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.levels() >= 1);

    let entries = reader.read_index_entries_at(reader.top_index_offset()).unwrap();
    for window in entries.windows(2) {
        assert!(window[0] < window[1], "index entries must be strictly increasing");
    }
    for &e in &entries {
        assert!(e < reader.top_index_offset());
    }
}

#[test]
fn page_cache_over_the_raw_container_bytes_serves_repeated_reads_identically() {
    let data = pattern(100_000);
    let bytes = build(&data, 10, 4);
    let total = bytes.len();
    let mut cache = PageCache::new(Cursor::new(bytes), 8192, 4).unwrap();

    let mut buf = vec![0u8; 50];
    let n1 = cache.read_at(0, &mut buf).unwrap();
    let first = buf[..n1].to_vec();
    let n2 = cache.read_at(0, &mut buf).unwrap();
    assert_eq!(first, buf[..n2]);
    assert!(n1 as u64 <= total as u64);
}
