//! SMB reader: walks the session stack down to one open file and streams it.

use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, trace};

use super::session::{SmbConnection, SmbFile, SmbSession, SmbShare, SmbTransport};
use crate::config::{ReaderConfig, ResourceDescriptor, ResourceUri, SmbLocation};
use crate::error::{ReaderError, ReaderResult, TeardownReport};
use crate::io::{
    ByteAccounting, ReadOutcome, ReaderFactory, RemoteReader, Session, SessionCell, Teardown,
    ThroughputMeter, TransferObserver, declared_length,
};

/// Reader for `smb://` URIs.
#[derive(Debug)]
pub struct SmbReader {
    config: Arc<ReaderConfig>,
    transport: Arc<dyn SmbTransport>,
    cell: SessionCell<SmbReadSession>,
}

impl SmbReader {
    pub fn new(
        config: Arc<ReaderConfig>,
        transport: Arc<dyn SmbTransport>,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Self {
        Self {
            config,
            transport,
            cell: SessionCell::new(observer),
        }
    }
}

impl RemoteReader for SmbReader {
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>> {
        self.cell.open_with(&descriptor.uri, || {
            SmbReadSession::establish(&self.config, self.transport.as_ref(), descriptor)
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

/// Every layer of the stack built so far.
#[derive(Default)]
struct SmbHandles {
    connection: Option<Box<dyn SmbConnection>>,
    session: Option<Box<dyn SmbSession>>,
    share: Option<Box<dyn SmbShare>>,
    file: Option<Box<dyn SmbFile>>,
}

impl SmbHandles {
    /// Release file, share, session and connection in that order.
    fn release(self, target: &str) -> TeardownReport {
        let SmbHandles {
            connection,
            session,
            share,
            file,
        } = self;
        let mut teardown = Teardown::new(target);
        if let Some(file) = file {
            teardown.step("close file", || file.close());
        }
        if let Some(share) = share {
            teardown.step("disconnect share", || share.disconnect());
        }
        if let Some(session) = session {
            teardown.step("logoff", || session.logoff());
        }
        if let Some(connection) = connection {
            teardown.step("close connection", || connection.close());
        }
        teardown.finish()
    }
}

struct SmbReadSession {
    uri: String,
    handles: SmbHandles,
    interrupt: Option<TcpStream>,
    position: u64,
    accounting: ByteAccounting,
    meter: ThroughputMeter,
}

impl std::fmt::Debug for SmbReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbReadSession")
            .field("uri", &self.uri)
            .field("position", &self.position)
            .field("accounting", &self.accounting)
            .finish_non_exhaustive()
    }
}

impl SmbReadSession {
    fn establish(
        config: &ReaderConfig,
        transport: &dyn SmbTransport,
        descriptor: &ResourceDescriptor,
    ) -> ReaderResult<Self> {
        let location = SmbLocation::parse(&descriptor.uri)?;
        let mut handles = SmbHandles::default();
        match open_stack(&mut handles, config, transport, &location, descriptor) {
            Ok(declared) => Ok(Self {
                uri: descriptor.uri.to_string(),
                interrupt: handles.connection.as_ref().and_then(|c| c.interrupt_handle()),
                handles,
                position: descriptor.start_offset,
                accounting: ByteAccounting::new(declared),
                meter: ThroughputMeter::new(config.throughput_log_interval()),
            }),
            Err(e) => {
                let report = handles.release(descriptor.uri.as_str());
                if !report.is_clean() {
                    debug!(failures = report.len(), "cleanup after failed SMB open");
                }
                Err(e)
            }
        }
    }
}

/// connect → authenticate → tree connect → size → open → skip to start.
fn open_stack(
    handles: &mut SmbHandles,
    config: &ReaderConfig,
    transport: &dyn SmbTransport,
    location: &SmbLocation,
    descriptor: &ResourceDescriptor,
) -> ReaderResult<Option<u64>> {
    let mut credentials = location.credentials.clone();
    if credentials.domain.is_none() && !config.smb.domain.is_empty() {
        credentials.domain = Some(config.smb.domain.clone());
    }
    let port = location.port.unwrap_or(config.smb.port);

    let connection = handles
        .connection
        .insert(transport.connect(&location.host, port, config)?);
    let session = handles.session.insert(connection.authenticate(&credentials)?);
    let share = handles.share.insert(session.connect_share(&location.share)?);

    let size = share.file_size(&location.path)?;
    let declared = declared_length(descriptor.start_offset, descriptor.length, Some(size))?;
    debug!(share = %location.share, path = %location.path, size, ?declared, "SMB file sized");

    let file = handles.file.insert(share.open_file(&location.path)?);
    skip_to(file.as_mut(), descriptor.start_offset)?;
    Ok(declared)
}

/// Reach `target` with forward skips only. This costs O(target); the file
/// stream offers no positioned read.
fn skip_to(file: &mut dyn SmbFile, target: u64) -> ReaderResult<()> {
    let mut skipped = 0u64;
    while skipped < target {
        let n = file.skip(target - skipped)?;
        if n == 0 {
            return Err(ReaderError::connection(format!(
                "skip stalled after {skipped} of {target} bytes"
            )));
        }
        skipped += n.min(target - skipped);
        trace!(skipped, target, "SMB skip");
    }
    Ok(())
}

impl Session for SmbReadSession {
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
        let Some(file) = self.handles.file.as_mut() else {
            return Err(ReaderError::connection("SMB file handle already released"));
        };

        let want = self.accounting.clamp(buf.len());
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            self.meter.finish(&self.uri);
            return match self.accounting.remaining() {
                Some(r) if r > 0 => Err(self.accounting.premature_end()),
                _ => Ok(ReadOutcome::EndOfStream),
            };
        }
        self.position += n as u64;
        self.accounting.record(n);
        self.meter.record(n, &self.uri);
        if self.accounting.is_complete() {
            self.meter.finish(&self.uri);
        }
        Ok(ReadOutcome::BytesRead(n))
    }

    fn interrupt_handles(&self) -> Vec<TcpStream> {
        self.interrupt
            .as_ref()
            .and_then(|s| s.try_clone().ok())
            .into_iter()
            .collect()
    }

    fn teardown(self) -> TeardownReport {
        self.handles.release(&self.uri)
    }
}

/// Builds `SmbReader`s over one transport.
#[derive(Debug, Clone)]
pub struct SmbReaderFactory {
    config: Arc<ReaderConfig>,
    transport: Arc<dyn SmbTransport>,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl SmbReaderFactory {
    pub fn new(config: Arc<ReaderConfig>, transport: Arc<dyn SmbTransport>) -> Self {
        Self {
            config,
            transport,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl ReaderFactory for SmbReaderFactory {
    fn schemes(&self) -> &'static [&'static str] {
        &["smb"]
    }

    fn create_reader(&self) -> Box<dyn RemoteReader> {
        Box::new(SmbReader::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            self.observer.clone(),
        ))
    }
}
