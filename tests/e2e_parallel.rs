//! Parallel encoder/decoder pipelines (spec.md §4.7, §4.8): both must
//! produce results equivalent to the streaming writer/reader, including the
//! single-page elision and the empty-input case.

#![cfg(feature = "multithread")]

use std::fs;
use std::io::{Cursor, Read};

use ragzip::parallel::{decode_parallel, encode_parallel, ParallelEncodeOptions};
use ragzip::{RagzipReader, RagzipWriter};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 241) as u8).collect()
}

fn opts(page_exp: u32, index_exp: u32, nb_workers: usize) -> ParallelEncodeOptions {
    ParallelEncodeOptions { page_exp, index_exp, nb_workers, max_buffered_pages: nb_workers * 2 }
}

#[test]
fn parallel_encoder_output_decodes_through_the_streaming_reader() {
    let data = pattern(600_000);
    let encoded = encode_parallel(Cursor::new(data.clone()), Vec::new(), opts(12, 4, 4), Vec::new()).unwrap();

    let mut reader = RagzipReader::open(Cursor::new(encoded)).unwrap();
    let mut got = Vec::new();
    reader.read_to_end(&mut got).unwrap();
    assert_eq!(got, data);
}

#[test]
fn parallel_encoder_single_page_output_matches_streaming_writer_bit_for_bit() {
    let data = pattern(500);

    let mut streaming = RagzipWriter::new(Vec::new(), 12, 4).unwrap();
    streaming.write_all(&data).unwrap();
    let streamed = streaming.finish().unwrap();

    let parallel = encode_parallel(Cursor::new(data), Vec::new(), opts(12, 4, 4), Vec::new()).unwrap();
    assert_eq!(parallel, streamed);
}

#[test]
fn parallel_encoder_on_empty_input_produces_a_footer_only_file() {
    let out = encode_parallel(Cursor::new(Vec::new()), Vec::new(), opts(12, 4, 2), Vec::new()).unwrap();
    assert_eq!(out.len() as u64, ragzip::config::FOOTER_MEMBER_SIZE);
}

#[test]
fn parallel_decoder_matches_the_streaming_reader_for_the_same_archive() {
    let data = pattern(400_000);
    let mut w = RagzipWriter::new(Vec::new(), 11, 3).unwrap();
    w.write_all(&data).unwrap();
    let bytes = w.finish().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.rgz");
    fs::write(&path, &bytes).unwrap();

    let path_for_open = path.clone();
    let open = move || fs::File::open(&path_for_open);
    let decoded = decode_parallel(open, Cursor::new(Vec::new()), 4).unwrap();
    assert_eq!(decoded.into_inner(), data);
}

#[test]
fn round_trip_through_both_parallel_stages_matches_the_original() {
    let data = pattern(800_000);
    let encoded = encode_parallel(Cursor::new(data.clone()), Vec::new(), opts(13, 5, 6), Vec::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.rgz");
    fs::write(&path, &encoded).unwrap();

    let path_for_open = path.clone();
    let open = move || fs::File::open(&path_for_open);
    let decoded = decode_parallel(open, Cursor::new(Vec::new()), 6).unwrap();
    assert_eq!(decoded.into_inner(), data);
}
