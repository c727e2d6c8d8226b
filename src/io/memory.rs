//! In-memory reader implementation for testing hosts.

use std::sync::Arc;

use super::accounting::{ByteAccounting, declared_length};
use super::cleanup::Teardown;
use super::state::{Session, SessionCell};
use super::{ReadOutcome, ReaderFactory, RemoteReader, TransferObserver};
use crate::config::{ResourceDescriptor, ResourceUri};
use crate::error::{ReaderResult, TeardownReport};

/// In-memory reader serving the same bytes for any URI.
#[derive(Debug)]
pub struct InMemoryReader {
    data: Arc<Vec<u8>>,
    max_chunk: usize,
    cell: SessionCell<MemorySession>,
}

impl InMemoryReader {
    /// Create a new in-memory reader over the given data.
    pub fn new(data: Vec<u8>) -> Self {
        Self::from_shared(Arc::new(data), usize::MAX, None)
    }

    fn from_shared(
        data: Arc<Vec<u8>>,
        max_chunk: usize,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Self {
        Self {
            data,
            max_chunk,
            cell: SessionCell::new(observer),
        }
    }

    /// Deliver at most `max_chunk` bytes per read, like a slow transport.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }
}

impl RemoteReader for InMemoryReader {
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>> {
        self.cell.open_with(&descriptor.uri, || {
            let size = self.data.len() as u64;
            let declared = declared_length(descriptor.start_offset, descriptor.length, Some(size))?;
            Ok(MemorySession {
                data: Arc::clone(&self.data),
                uri: descriptor.uri.to_string(),
                position: descriptor.start_offset,
                max_chunk: self.max_chunk,
                accounting: ByteAccounting::new(declared),
            })
        })
    }

    fn read(&self, buffer: &mut [u8], offset: usize, max_length: usize) -> ReaderResult<ReadOutcome> {
        self.cell.read(buffer, offset, max_length)
    }

    fn close(&self) {
        self.cell.close();
    }

    fn uri(&self) -> Option<ResourceUri> {
        self.cell.uri()
    }

    fn last_teardown_report(&self) -> Option<TeardownReport> {
        self.cell.take_last_report()
    }
}

#[derive(Debug)]
struct MemorySession {
    data: Arc<Vec<u8>>,
    uri: String,
    position: u64,
    max_chunk: usize,
    accounting: ByteAccounting,
}

impl Session for MemorySession {
    fn declared_length(&self) -> Option<u64> {
        self.accounting.declared()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome> {
        let want = self.accounting.clamp(buf.len().min(self.max_chunk));
        if want == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        let start = self.position as usize;
        let n = want.min(self.data.len().saturating_sub(start));
        if n == 0 {
            return Err(self.accounting.premature_end());
        }
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        self.accounting.record(n);
        Ok(ReadOutcome::BytesRead(n))
    }

    fn teardown(self) -> TeardownReport {
        Teardown::new(self.uri).finish()
    }
}

/// Factory producing `InMemoryReader`s over shared data.
#[derive(Debug, Clone)]
pub struct InMemoryReaderFactory {
    data: Arc<Vec<u8>>,
    max_chunk: usize,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl InMemoryReaderFactory {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            max_chunk: usize::MAX,
            observer: None,
        }
    }

    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl ReaderFactory for InMemoryReaderFactory {
    fn schemes(&self) -> &'static [&'static str] {
        &["memory"]
    }

    fn create_reader(&self) -> Box<dyn RemoteReader> {
        Box::new(InMemoryReader::from_shared(
            Arc::clone(&self.data),
            self.max_chunk,
            self.observer.clone(),
        ))
    }
}
