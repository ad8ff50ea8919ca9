//! Extension linked-list round-trip (spec.md §3, §4.4): extensions come
//! back in first-added order, spec-reserved flags are distinguishable from
//! user ones, and an oversized payload at finish time is dropped rather
//! than failing the whole archive.

use std::io::Cursor;

use ragzip::{RagzipReader, RagzipWriter};

#[test]
fn extensions_round_trip_in_first_added_order_with_correct_flags() {
    let mut w = RagzipWriter::new(Vec::new(), 10, 5).unwrap();
    w.append_extension(0x01, 100, b"first".to_vec()).unwrap();
    w.append_extension(0x02, 101, b"second".to_vec()).unwrap();
    w.append_extension(0x80, 102, b"spec-reserved".to_vec()).unwrap();
    w.write_all(&vec![42u8; 2000]).unwrap();
    let bytes = w.finish().unwrap();

    let reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
    let exts = reader.extensions();
    assert_eq!(exts.len(), 3);
    assert_eq!(exts[0].id, 100);
    assert_eq!(exts[0].payload, b"first");
    assert!(!exts[0].is_spec());
    assert_eq!(exts[1].id, 101);
    assert_eq!(exts[2].id, 102);
    assert!(exts[2].is_spec());
}

#[test]
fn archive_with_no_extensions_reports_an_empty_list() {
    let mut w = RagzipWriter::new(Vec::new(), 10, 5).unwrap();
    w.write_all(b"no extensions here").unwrap();
    let bytes = w.finish().unwrap();
    let reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.extensions().is_empty());
}

#[test]
fn append_extension_rejects_payload_over_the_capacity_ceiling() {
    let mut w = RagzipWriter::new(Vec::new(), 10, 5).unwrap();
    let oversized = vec![0u8; ragzip::config::MAX_EXTENSION_PAYLOAD + 1];
    assert!(w.append_extension(0, 1, oversized).is_err());
}

#[test]
fn append_extension_rejects_the_51st_extension() {
    let mut w = RagzipWriter::new(Vec::new(), 10, 5).unwrap();
    for i in 0..ragzip::config::MAX_EXTENSIONS {
        w.append_extension(0, i as i32, Vec::new()).unwrap();
    }
    assert!(w.append_extension(0, 999, Vec::new()).is_err());
}
