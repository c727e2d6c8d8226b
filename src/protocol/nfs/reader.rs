//! NFS reader: offset-addressed reads through a fixed-size refill buffer.

use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, trace};

use super::client::RpcNfsConnector;
use super::transport::{FileHandle, FileKind, NfsConnector, NfsTransport};
use crate::config::{NfsLocation, ReaderConfig, ResourceDescriptor, ResourceUri};
use crate::error::{ReaderError, ReaderResult, TeardownReport};
use crate::io::{
    ByteAccounting, ReadOutcome, ReaderFactory, RemoteReader, Session, SessionCell, Teardown,
    ThroughputMeter, TransferObserver, declared_length,
};

/// Reader for `nfs://host:/export:/path` URIs.
#[derive(Debug)]
pub struct NfsReader {
    config: Arc<ReaderConfig>,
    connector: Arc<dyn NfsConnector>,
    cell: SessionCell<NfsSession>,
}

impl NfsReader {
    pub fn new(
        config: Arc<ReaderConfig>,
        connector: Arc<dyn NfsConnector>,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Self {
        Self {
            config,
            connector,
            cell: SessionCell::new(observer),
        }
    }
}

impl RemoteReader for NfsReader {
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>> {
        self.cell.open_with(&descriptor.uri, || {
            NfsSession::establish(&self.config, self.connector.as_ref(), descriptor)
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

/// Buffered window `[start, end)` of `data`, holding file bytes that follow
/// everything delivered so far.
#[derive(Debug)]
struct RefillBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl RefillBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            start: 0,
            end: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn drain(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.end - self.start);
        out[..n].copy_from_slice(&self.data[self.start..self.start + n]);
        self.start += n;
        n
    }
}

struct NfsSession {
    uri: String,
    transport: Box<dyn NfsTransport>,
    handle: FileHandle,
    /// File offset of the next byte to fetch from the server.
    file_offset: u64,
    /// File offset of the next byte to deliver.
    position: u64,
    buffer: RefillBuffer,
    eof: bool,
    accounting: ByteAccounting,
    meter: ThroughputMeter,
}

impl std::fmt::Debug for NfsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfsSession")
            .field("uri", &self.uri)
            .field("handle", &self.handle)
            .field("file_offset", &self.file_offset)
            .field("position", &self.position)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl NfsSession {
    fn establish(
        config: &ReaderConfig,
        connector: &dyn NfsConnector,
        descriptor: &ResourceDescriptor,
    ) -> ReaderResult<Self> {
        let location = NfsLocation::parse(&descriptor.uri)?;
        let mut transport = connector.connect(&location.host, config)?;

        let mut handle = transport.mount(&location.export)?;
        let mut attrs = None;
        for component in location.components() {
            let (next, next_attrs) = transport.lookup(&handle, component)?;
            handle = next;
            attrs = next_attrs;
        }
        let attrs = match attrs {
            Some(attrs) => attrs,
            None => transport.getattr(&handle)?,
        };
        if attrs.kind == FileKind::Directory {
            return Err(ReaderError::protocol(format!(
                "{} is a directory",
                location.path
            )));
        }

        let declared = declared_length(descriptor.start_offset, descriptor.length, Some(attrs.size))?;
        debug!(
            export = %location.export,
            path = %location.path,
            size = attrs.size,
            ?declared,
            "NFS file opened"
        );

        // No point holding a buffer larger than the range itself.
        let capacity = declared
            .and_then(|d| usize::try_from(d).ok())
            .map_or(config.nfs.buffer_size, |d| d.min(config.nfs.buffer_size))
            .max(1);

        Ok(Self {
            uri: descriptor.uri.to_string(),
            transport,
            handle,
            file_offset: descriptor.start_offset,
            position: descriptor.start_offset,
            buffer: RefillBuffer::with_capacity(capacity),
            eof: false,
            accounting: ByteAccounting::new(declared),
            meter: ThroughputMeter::new(config.throughput_log_interval()),
        })
    }

    /// One offset-addressed read of up to a buffer's worth, never past the
    /// declared range. A zero-byte result marks end of file without moving
    /// the file offset.
    fn refill(&mut self, outstanding: Option<u64>) -> ReaderResult<()> {
        let capacity = self.buffer.data.len();
        let request = outstanding
            .and_then(|o| usize::try_from(o).ok())
            .map_or(capacity, |o| o.min(capacity));
        let n = self
            .transport
            .read_at(&self.handle, self.file_offset, &mut self.buffer.data[..request])?;
        trace!(offset = self.file_offset, request, n, "NFS refill");
        self.buffer.start = 0;
        self.buffer.end = n;
        if n == 0 {
            self.eof = true;
        } else {
            self.file_offset += n as u64;
        }
        Ok(())
    }

    fn finish(&mut self) -> ReaderResult<ReadOutcome> {
        self.meter.finish(&self.uri);
        if self.accounting.remaining().is_some_and(|r| r > 0) {
            return Err(self.accounting.premature_end());
        }
        Ok(ReadOutcome::EndOfStream)
    }
}

impl Session for NfsSession {
    fn declared_length(&self) -> Option<u64> {
        self.accounting.declared()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome> {
        if self.accounting.is_complete() {
            return Ok(ReadOutcome::EndOfStream);
        }

        let want = self.accounting.clamp(buf.len());
        let mut copied = self.buffer.drain(&mut buf[..want]);
        if copied < want && self.buffer.is_empty() && !self.eof {
            let outstanding = self.accounting.remaining().map(|r| r - copied as u64);
            self.refill(outstanding)?;
            copied += self.buffer.drain(&mut buf[copied..want]);
        }

        if copied == 0 {
            return self.finish();
        }
        self.position += copied as u64;
        self.accounting.record(copied);
        self.meter.record(copied, &self.uri);
        if self.accounting.is_complete() {
            self.meter.finish(&self.uri);
        }
        Ok(ReadOutcome::BytesRead(copied))
    }

    fn interrupt_handles(&self) -> Vec<TcpStream> {
        self.transport.interrupt_handle().into_iter().collect()
    }

    fn teardown(self) -> TeardownReport {
        let NfsSession { uri, transport, .. } = self;
        let mut teardown = Teardown::new(uri);
        // NFSv3 has no close; releasing the handle is dropping the session.
        teardown.step("release file handle", || {
            drop(transport);
            Ok(())
        });
        teardown.finish()
    }
}

/// Builds `NfsReader`s sharing one configuration and connector.
#[derive(Debug, Clone)]
pub struct NfsReaderFactory {
    config: Arc<ReaderConfig>,
    connector: Arc<dyn NfsConnector>,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl NfsReaderFactory {
    /// Factory talking to real servers over ONC-RPC.
    pub fn new(config: Arc<ReaderConfig>) -> Self {
        Self::with_connector(config, Arc::new(RpcNfsConnector))
    }

    pub fn with_connector(config: Arc<ReaderConfig>, connector: Arc<dyn NfsConnector>) -> Self {
        Self {
            config,
            connector,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl ReaderFactory for NfsReaderFactory {
    fn schemes(&self) -> &'static [&'static str] {
        &["nfs"]
    }

    fn create_reader(&self) -> Box<dyn RemoteReader> {
        Box::new(NfsReader::new(
            Arc::clone(&self.config),
            Arc::clone(&self.connector),
            self.observer.clone(),
        ))
    }
}
