//! Tests for the reader state machine shared by every protocol.

use std::io::Read;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ResourceDescriptor, ResourceUri};
use crate::error::{ErrorKind, ReaderError, ReaderResult, TeardownReport};
use crate::io::{
    InMemoryReader, InMemoryReaderFactory, ReadOutcome, ReaderFactory, ReaderState,
    RecordingObserver, RemoteReader, Session, SessionCell, Teardown, TransferEvent,
};

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::parse("memory://clip").expect("uri")
}

#[test]
fn second_open_fails_with_already_open() {
    let reader = InMemoryReader::new(vec![1; 16]);
    reader.open(&descriptor()).expect("first open");
    let err = reader.open(&descriptor()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyOpen);

    // The first session is untouched.
    let mut buf = [0u8; 16];
    assert_eq!(
        reader.read(&mut buf, 0, 16).expect("read"),
        ReadOutcome::BytesRead(16)
    );
}

#[test]
fn read_requires_an_open_reader() {
    let reader = InMemoryReader::new(vec![1; 16]);
    let mut buf = [0u8; 4];
    let err = reader.read(&mut buf, 0, 4).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::InvalidState {
            state: ReaderState::Closed,
            ..
        }
    ));
}

#[test]
fn failed_open_only_allows_close() {
    let reader = InMemoryReader::new(vec![0; 10]);
    let err = reader.open(&descriptor().with_start(11)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);

    let err = reader.open(&descriptor()).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::InvalidState {
            operation: "open",
            state: ReaderState::Failed,
        }
    ));
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf, 0, 4).unwrap_err().kind(), ErrorKind::InvalidState);

    reader.close();
    assert_eq!(reader.open(&descriptor()).expect("reopen"), Some(10));
}

#[test]
fn zero_length_read_returns_zero_bytes() {
    let reader = InMemoryReader::new(vec![7; 8]);
    reader.open(&descriptor()).expect("open");
    let mut buf = [0u8; 8];
    assert_eq!(
        reader.read(&mut buf, 8, 0).expect("read"),
        ReadOutcome::BytesRead(0)
    );
    assert_eq!(
        reader.read(&mut buf, 0, 8).expect("read"),
        ReadOutcome::BytesRead(8)
    );
}

#[test]
fn buffer_bounds_are_checked() {
    let reader = InMemoryReader::new(vec![7; 8]);
    reader.open(&descriptor()).expect("open");
    let mut buf = [0u8; 8];
    let err = reader.read(&mut buf, 4, 5).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::InvalidBuffer {
            buffer_len: 8,
            offset: 4,
            max_length: 5,
        }
    ));
    let err = reader.read(&mut buf, usize::MAX, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBuffer);
}

#[test]
fn read_writes_at_the_caller_offset() {
    let reader = InMemoryReader::new(vec![9; 4]);
    reader.open(&descriptor()).expect("open");
    let mut buf = [0u8; 8];
    reader.read(&mut buf, 2, 4).expect("read");
    assert_eq!(buf, [0, 0, 9, 9, 9, 9, 0, 0]);
}

#[test]
fn end_of_stream_repeats() {
    let reader = InMemoryReader::new(vec![1; 4]);
    assert_eq!(reader.open(&descriptor().with_start(4)).expect("open"), Some(0));
    let mut buf = [0u8; 4];
    for _ in 0..3 {
        assert_eq!(reader.read(&mut buf, 0, 4).expect("read"), ReadOutcome::EndOfStream);
    }
}

#[test]
fn close_is_idempotent_and_allows_reopening() {
    let reader = InMemoryReader::new(vec![1; 4]);
    reader.close();
    reader.open(&descriptor()).expect("open");
    assert_eq!(reader.uri().map(|u| u.to_string()), Some("memory://clip".to_string()));

    reader.close();
    reader.close();
    assert!(reader.uri().is_none());
    assert!(reader.last_teardown_report().is_some_and(|r| r.is_clean()));

    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf, 0, 4).unwrap_err().kind(), ErrorKind::InvalidState);
    reader.open(&descriptor()).expect("reopen");
}

#[test]
fn observer_sees_the_whole_lifecycle() {
    let observer = Arc::new(RecordingObserver::new());
    let factory = InMemoryReaderFactory::new(vec![3; 10])
        .with_max_chunk(4)
        .with_observer(observer.clone());
    let reader = factory.create_reader();

    reader.open(&descriptor()).expect("open");
    let mut buf = [0u8; 10];
    while reader.read(&mut buf, 0, 10).expect("read") != ReadOutcome::EndOfStream {}
    reader.close();
    reader.close();

    assert_eq!(
        observer.events(),
        vec![
            TransferEvent::Initializing("memory://clip".into()),
            TransferEvent::Started("memory://clip".into(), Some(10)),
            TransferEvent::Bytes(4),
            TransferEvent::Bytes(4),
            TransferEvent::Bytes(2),
            TransferEvent::Ended("memory://clip".into()),
        ]
    );
    assert_eq!(observer.total_bytes(), 10);
}

/// Session blocked on a socket that never sends anything.
#[derive(Debug)]
struct StalledSession {
    stream: TcpStream,
}

impl Session for StalledSession {
    fn declared_length(&self) -> Option<u64> {
        None
    }

    fn position(&self) -> u64 {
        0
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome> {
        match self.stream.read(buf) {
            Ok(0) => Err(ReaderError::connection("socket shut down")),
            Ok(n) => Ok(ReadOutcome::BytesRead(n)),
            Err(e) => Err(ReaderError::from_io("stalled socket", e)),
        }
    }

    fn interrupt_handles(&self) -> Vec<TcpStream> {
        self.stream.try_clone().into_iter().collect()
    }

    fn teardown(self) -> TeardownReport {
        let stream = self.stream;
        let mut teardown = Teardown::new("stalled");
        teardown.step("close socket", || {
            let _ = stream.shutdown(Shutdown::Both);
            Ok(())
        });
        teardown.finish()
    }
}

#[test]
fn close_from_another_thread_unblocks_a_read() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (_server_side, _) = listener.accept().expect("accept");
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("timeout");

    let cell = Arc::new(SessionCell::<StalledSession>::new(None));
    let uri = ResourceUri::parse("test://stalled").expect("uri");
    cell.open_with(&uri, || Ok(StalledSession { stream: client }))
        .expect("open");

    let reading = Arc::clone(&cell);
    let started = Instant::now();
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 64];
        reading.read(&mut buf, 0, 64)
    });

    thread::sleep(Duration::from_millis(100));
    cell.close();

    let result = handle.join().expect("reader thread");
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(cell.state(), ReaderState::Closed);
    assert!(cell.take_last_report().is_some());
}

/// Session that writes its tag byte, optionally after waiting on a gate.
struct GatedSession {
    tag: u8,
    gate: Option<(Sender<()>, Receiver<()>)>,
    fail: bool,
    teardowns: Arc<AtomicUsize>,
}

impl GatedSession {
    fn new(tag: u8, teardowns: &Arc<AtomicUsize>) -> Self {
        Self {
            tag,
            gate: None,
            fail: false,
            teardowns: Arc::clone(teardowns),
        }
    }
}

impl Session for GatedSession {
    fn declared_length(&self) -> Option<u64> {
        None
    }

    fn position(&self) -> u64 {
        0
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome> {
        if let Some((entered, release)) = self.gate.take() {
            entered.send(()).expect("entered");
            release.recv().expect("release");
        }
        if self.fail {
            return Err(ReaderError::connection("stale read failed"));
        }
        buf[0] = self.tag;
        Ok(ReadOutcome::BytesRead(1))
    }

    fn teardown(self) -> TeardownReport {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Teardown::new(format!("gated {}", self.tag)).finish()
    }
}

/// Open a cell on a gated session and park a read inside it.
fn park_read(
    cell: &Arc<SessionCell<GatedSession>>,
    teardowns: &Arc<AtomicUsize>,
    fail: bool,
) -> (Sender<()>, thread::JoinHandle<ReaderResult<ReadOutcome>>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut first = GatedSession::new(1, teardowns);
    first.gate = Some((entered_tx, release_rx));
    first.fail = fail;

    let uri = ResourceUri::parse("test://gated").expect("uri");
    cell.open_with(&uri, || Ok(first)).expect("first open");

    let reading = Arc::clone(cell);
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 4];
        reading.read(&mut buf, 0, 4)
    });
    entered_rx.recv().expect("read entered the session");
    (release_tx, handle)
}

#[test]
fn late_check_in_after_reopen_tears_down_the_stale_session() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(SessionCell::<GatedSession>::new(None));
    let (release, handle) = park_read(&cell, &teardowns, false);

    cell.close();
    let uri = ResourceUri::parse("test://gated").expect("uri");
    cell.open_with(&uri, || Ok(GatedSession::new(2, &teardowns)))
        .expect("reopen");

    release.send(()).expect("release");
    assert_eq!(
        handle.join().expect("reader thread").expect("stale read"),
        ReadOutcome::BytesRead(1)
    );
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);

    let mut buf = [0u8; 4];
    assert_eq!(cell.read(&mut buf, 0, 4).expect("read"), ReadOutcome::BytesRead(1));
    assert_eq!(buf[0], 2);

    cell.close();
    assert_eq!(teardowns.load(Ordering::SeqCst), 2);
}

#[test]
fn stale_read_error_does_not_fail_the_reopened_reader() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(SessionCell::<GatedSession>::new(None));
    let (release, handle) = park_read(&cell, &teardowns, true);

    cell.close();
    let uri = ResourceUri::parse("test://gated").expect("uri");
    cell.open_with(&uri, || Ok(GatedSession::new(2, &teardowns)))
        .expect("reopen");

    release.send(()).expect("release");
    assert!(handle.join().expect("reader thread").is_err());
    assert_eq!(cell.state(), ReaderState::Open);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);

    let mut buf = [0u8; 4];
    cell.read(&mut buf, 0, 4).expect("read");
    assert_eq!(buf[0], 2);
    cell.close();
    assert_eq!(teardowns.load(Ordering::SeqCst), 2);
}
