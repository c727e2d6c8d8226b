//! NFS reader tests against `InMemoryNfsServer`.

use std::sync::Arc;

use crate::config::{ReaderConfig, ResourceDescriptor};
use crate::error::ErrorKind;
use crate::io::{ReadOutcome, ReaderFactory, RemoteReader};
use crate::protocol::nfs::{InMemoryNfsServer, NfsReaderFactory};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn factory(server: &InMemoryNfsServer, buffer_size: usize) -> NfsReaderFactory {
    let mut config = ReaderConfig::default();
    config.nfs.buffer_size = buffer_size;
    NfsReaderFactory::with_connector(Arc::new(config), Arc::new(server.clone()))
}

fn read_all(reader: &dyn RemoteReader, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        match reader.read(&mut buf, 0, chunk).expect("read") {
            ReadOutcome::BytesRead(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::EndOfStream => return out,
        }
    }
}

#[test]
fn open_at_offset_never_fetches_earlier_bytes() {
    let data = payload(1000);
    let server = InMemoryNfsServer::new().with_file("/export", "/movies/a.mkv", data.clone());
    let reader = factory(&server, 4096).create_reader();

    let declared = reader
        .open(&ResourceDescriptor::parse("nfs://nas:/export:/movies/a.mkv").expect("uri").with_start(600))
        .expect("open");
    assert_eq!(declared, Some(400));
    assert_eq!(read_all(reader.as_ref(), 128), &data[600..]);
    assert!(server.reads().iter().all(|(offset, _)| *offset >= 600));
    assert_eq!(server.reads()[0].0, 600);
    reader.close();
}

#[test]
fn refills_are_contiguous_and_stop_at_the_declared_end() {
    let data = payload(1000);
    let server = InMemoryNfsServer::new().with_file("/export", "a.mkv", data.clone());
    let reader = factory(&server, 256).create_reader();

    reader
        .open(&ResourceDescriptor::parse("nfs://nas:/export:/a.mkv").expect("uri"))
        .expect("open");
    assert_eq!(read_all(reader.as_ref(), 100), data);
    assert_eq!(
        server.reads(),
        vec![(0, 256), (256, 256), (512, 256), (768, 232)]
    );
}

#[test]
fn bounded_range_fits_one_request() {
    let data = payload(1000);
    let server = InMemoryNfsServer::new().with_file("/export", "a.mkv", data.clone());
    let reader = factory(&server, 4 * 1024 * 1024).create_reader();

    let declared = reader
        .open(
            &ResourceDescriptor::parse("nfs://nas:/export:/a.mkv")
                .expect("uri")
                .with_start(100)
                .with_length(400),
        )
        .expect("open");
    assert_eq!(declared, Some(400));
    assert_eq!(read_all(reader.as_ref(), 100), &data[100..500]);
    assert_eq!(server.reads(), vec![(100, 400)]);
}

#[test]
fn short_server_reads_still_deliver_everything() {
    let data = payload(3000);
    let server = InMemoryNfsServer::new()
        .with_file("/export", "a.mkv", data.clone())
        .with_max_read(64);
    let reader = factory(&server, 1024).create_reader();

    reader
        .open(&ResourceDescriptor::parse("nfs://nas:/export:/a.mkv").expect("uri"))
        .expect("open");
    assert_eq!(read_all(reader.as_ref(), 500), data);
}

#[test]
fn start_at_end_of_file_is_immediately_exhausted() {
    let server = InMemoryNfsServer::new().with_file("/export", "a.mkv", payload(10));
    let reader = factory(&server, 1024).create_reader();
    let declared = reader
        .open(&ResourceDescriptor::parse("nfs://nas:/export:/a.mkv").expect("uri").with_start(10))
        .expect("open");
    assert_eq!(declared, Some(0));
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf, 0, 8).expect("read"), ReadOutcome::EndOfStream);
    assert!(server.reads().is_empty());
}

#[test]
fn lookup_failures_map_to_the_taxonomy() {
    let server = InMemoryNfsServer::new().with_file("/export", "movies/a.mkv", payload(10));
    let factory = factory(&server, 1024);

    let open = |uri: &str| {
        factory
            .create_reader()
            .open(&ResourceDescriptor::parse(uri).expect("uri"))
            .unwrap_err()
            .kind()
    };
    assert_eq!(open("nfs://nas:/export:/movies/b.mkv"), ErrorKind::NotFound);
    assert_eq!(open("nfs://nas:/other:/movies/a.mkv"), ErrorKind::NotFound);
    assert_eq!(open("nfs://nas:/export:/movies"), ErrorKind::Protocol);
    assert_eq!(open("nfs://nas:/export:/movies/a.mkv/x"), ErrorKind::NotFound);
}

#[test]
fn start_past_end_is_a_range_error() {
    let server = InMemoryNfsServer::new().with_file("/export", "a.mkv", payload(10));
    let reader = factory(&server, 1024).create_reader();
    let err = reader
        .open(&ResourceDescriptor::parse("nfs://nas:/export:/a.mkv").expect("uri").with_start(11))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
}
