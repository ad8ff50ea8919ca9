//! Resumable append (spec.md §4.4 Resume-append): all three resume cases —
//! levels >= 2 (ladder-descend), levels == 1 (keep-and-promote), and
//! levels == 0 (seed the first level) — exercised against real files, since
//! `resume` needs a truncatable random-access sink.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};

use ragzip::{resume, RagzipReader, RagzipWriter};

fn pattern(start: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| start.wrapping_add(i as u8)).collect()
}

fn write_fresh(path: &std::path::Path, data: &[u8], page_exp: u32, index_exp: u32) {
    let file = File::create(path).unwrap();
    let mut w = RagzipWriter::new(file, page_exp, index_exp).unwrap();
    w.write_all(data).unwrap();
    let mut out = w.finish().unwrap();
    use std::io::Write as _;
    out.flush().unwrap();
}

fn reopen_rw(path: &std::path::Path) -> File {
    OpenOptions::new().read(true).write(true).open(path).unwrap()
}

fn read_whole(path: &std::path::Path) -> Vec<u8> {
    let mut f = File::open(path).unwrap();
    f.seek(SeekFrom::Start(0)).unwrap();
    let mut reader = RagzipReader::open(f).unwrap();
    let mut got = Vec::new();
    reader.read_to_end(&mut got).unwrap();
    got
}

#[test]
fn resume_with_zero_levels_seeds_the_first_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels0.rgz");
    // One full page at P=10 (1024 bytes) -> no index yet, just page 0.
    let first = pattern(1, 1024);
    write_fresh(&path, &first, 10, 5);

    let file = reopen_rw(&path);
    let mut w = resume(file, 10, 5).unwrap();
    let second = pattern(2, 700);
    w.write_all(&second).unwrap();
    let mut out = w.finish().unwrap();
    use std::io::Write as _;
    out.flush().unwrap();

    let mut expected = first;
    expected.extend(second);
    assert_eq!(read_whole(&path), expected);
}

#[test]
fn resume_rejects_a_partial_tail_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.rgz");
    // 500 of 1024 bytes: the sole page is short, so resuming would turn it
    // into a mis-sized interior page the moment a new page follows it.
    write_fresh(&path, &pattern(9, 500), 10, 5);

    let file = reopen_rw(&path);
    assert!(resume(file, 10, 5).is_err());
}

#[test]
fn resume_with_one_level_keeps_and_promotes_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels1.rgz");
    // Two full pages at P=10 (1024 bytes each) -> exactly one level-1 index.
    let first = pattern(3, 2048);
    write_fresh(&path, &first, 10, 5);

    let file = reopen_rw(&path);
    let mut w = resume(file, 10, 5).unwrap();
    let second = pattern(4, 1024);
    w.write_all(&second).unwrap();
    let mut out = w.finish().unwrap();
    use std::io::Write as _;
    out.flush().unwrap();

    let mut expected = first;
    expected.extend(second);
    assert_eq!(read_whole(&path), expected);
}

#[test]
fn resume_with_two_levels_ladder_descends_to_the_tail_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels2.rgz");
    // Index exponent 2 => fanout 4; 5 pages forces a level-2 index.
    let first = pattern(5, 5 * 1024);
    write_fresh(&path, &first, 10, 2);

    let file = reopen_rw(&path);
    let mut w = resume(file, 10, 2).unwrap();
    let second = pattern(6, 4096);
    w.write_all(&second).unwrap();
    let mut out = w.finish().unwrap();
    use std::io::Write as _;
    out.flush().unwrap();

    let mut expected = first;
    expected.extend(second);
    assert_eq!(read_whole(&path), expected);
}

#[test]
fn resume_rejects_mismatched_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch.rgz");
    write_fresh(&path, &pattern(0, 1000), 10, 5);

    let file = reopen_rw(&path);
    assert!(resume(file, 11, 5).is_err());
}

#[test]
fn resume_on_an_empty_archive_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.rgz");
    write_fresh(&path, b"", 10, 5);

    let file = reopen_rw(&path);
    let mut w = resume(file, 10, 5).unwrap();
    w.write_all(b"now it has data").unwrap();
    let mut out = w.finish().unwrap();
    use std::io::Write as _;
    out.flush().unwrap();

    assert_eq!(read_whole(&path), b"now it has data");
}
