//! Tests for the `std::io::Read` adapter.

use std::io::{self, Read};

use crate::config::ResourceDescriptor;
use crate::io::{InMemoryReader, ReaderStream, RemoteReader};

#[test]
fn io_copy_drains_the_declared_range() {
    let data: Vec<u8> = (0..=255).collect();
    let reader = InMemoryReader::new(data.clone()).with_max_chunk(7);
    reader
        .open(
            &ResourceDescriptor::parse("memory://bytes")
                .expect("uri")
                .with_start(16)
                .with_length(100),
        )
        .expect("open");

    let mut stream = ReaderStream::new(Box::new(reader));
    let mut out = Vec::new();
    let copied = io::copy(&mut stream, &mut out).expect("copy");

    assert_eq!(copied, 100);
    assert_eq!(stream.delivered(), 100);
    assert_eq!(out, &data[16..116]);

    let report = stream.finish().expect("teardown report");
    assert!(report.is_clean());
}

#[test]
fn read_errors_surface_as_io_errors() {
    // Never opened, so the first read is rejected.
    let reader = InMemoryReader::new(vec![1, 2, 3]);
    let mut stream = ReaderStream::new(Box::new(reader));
    let mut buf = [0u8; 3];
    let err = stream.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
    assert!(err.to_string().contains("cannot read while reader is closed"));
}

#[test]
fn empty_buffer_reads_nothing() {
    let reader = InMemoryReader::new(vec![1, 2, 3]);
    let mut stream = ReaderStream::new(Box::new(reader));
    assert_eq!(stream.read(&mut []).expect("read"), 0);
}
