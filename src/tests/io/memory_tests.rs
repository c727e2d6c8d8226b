//! Tests for the in-memory reader and factory.

use crate::config::ResourceDescriptor;
use crate::io::{InMemoryReader, InMemoryReaderFactory, ReadOutcome, ReaderFactory, RemoteReader};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn drain(reader: &dyn RemoteReader, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        match reader.read(&mut buf, 0, chunk).expect("read") {
            ReadOutcome::BytesRead(n) => {
                assert!(n > 0);
                out.extend_from_slice(&buf[..n]);
            }
            ReadOutcome::EndOfStream => return out,
        }
    }
}

#[test]
fn delivers_exactly_the_requested_range() {
    let data = payload(1000);
    let reader = InMemoryReader::new(data.clone());
    let descriptor = ResourceDescriptor::parse("memory://track")
        .expect("uri")
        .with_start(100)
        .with_length(400);

    assert_eq!(reader.open(&descriptor).expect("open"), Some(400));
    let got = drain(&reader, 100);
    assert_eq!(got, &data[100..500]);
    reader.close();
}

#[test]
fn max_chunk_limits_each_read() {
    let reader = InMemoryReader::new(payload(64)).with_max_chunk(10);
    reader
        .open(&ResourceDescriptor::parse("memory://x").expect("uri"))
        .expect("open");

    let mut buf = [0u8; 64];
    assert_eq!(
        reader.read(&mut buf, 0, 64).expect("read"),
        ReadOutcome::BytesRead(10)
    );
    assert_eq!(drain(&reader, 64).len(), 54);
}

#[test]
fn factory_creates_independent_closed_readers() {
    let factory = InMemoryReaderFactory::new(payload(32));
    assert_eq!(factory.schemes(), &["memory"]);

    let a = factory.create_reader();
    let b = factory.create_reader();
    let descriptor = ResourceDescriptor::parse("memory://x").expect("uri");
    a.open(&descriptor).expect("open a");
    b.open(&descriptor.clone().with_start(16)).expect("open b");

    assert_eq!(drain(a.as_ref(), 8).len(), 32);
    assert_eq!(drain(b.as_ref(), 8).len(), 16);
}
