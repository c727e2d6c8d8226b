//! FTP reader: one control connection plus one passive `RETR` data connection per open.

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use tracing::debug;

use super::control::FtpControl;
use super::listing::find_file;
use crate::config::{FtpLocation, ReaderConfig, ResourceDescriptor, ResourceUri};
use crate::error::{ReaderError, ReaderResult, TeardownReport};
use crate::io::{
    ByteAccounting, ReadOutcome, ReaderFactory, RemoteReader, Session, SessionCell, Teardown,
    ThroughputMeter, TransferObserver, declared_length,
};

/// Reader for `ftp://` URIs.
#[derive(Debug)]
pub struct FtpReader {
    config: Arc<ReaderConfig>,
    cell: SessionCell<FtpSession>,
}

impl FtpReader {
    pub fn new(config: Arc<ReaderConfig>, observer: Option<Arc<dyn TransferObserver>>) -> Self {
        Self {
            config,
            cell: SessionCell::new(observer),
        }
    }
}

impl RemoteReader for FtpReader {
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>> {
        self.cell
            .open_with(&descriptor.uri, || FtpSession::establish(&self.config, descriptor))
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
struct FtpSession {
    uri: String,
    control: FtpControl,
    data: TcpStream,
    position: u64,
    accounting: ByteAccounting,
    meter: ThroughputMeter,
    finished: bool,
}

impl FtpSession {
    fn establish(config: &ReaderConfig, descriptor: &ResourceDescriptor) -> ReaderResult<Self> {
        let location = FtpLocation::parse(&descriptor.uri)?;
        let mut control = FtpControl::connect(
            &location.host,
            location.port,
            config.connect_timeout(),
            config.socket_timeout(),
        )?;

        match start_transfer(&mut control, &location, descriptor, config) {
            Ok((declared, data)) => Ok(Self {
                uri: descriptor.uri.to_string(),
                control,
                data,
                position: descriptor.start_offset,
                accounting: ByteAccounting::new(declared),
                meter: ThroughputMeter::new(config.throughput_log_interval()),
                finished: false,
            }),
            Err(e) => {
                let _ = control.quit();
                let _ = control.disconnect();
                Err(e)
            }
        }
    }
}

/// Log in, size the file from its listing, seek and start `RETR`.
fn start_transfer(
    control: &mut FtpControl,
    location: &FtpLocation,
    descriptor: &ResourceDescriptor,
    config: &ReaderConfig,
) -> ReaderResult<(Option<u64>, TcpStream)> {
    let (user, password) = match &location.credentials {
        Some(c) => (c.username.as_str(), c.password.as_deref().unwrap_or("")),
        None => (
            config.ftp.anonymous_user.as_str(),
            config.ftp.anonymous_password.as_str(),
        ),
    };
    control.login(user, password)?;
    if config.ftp.utf8 {
        control.enable_utf8()?;
    }
    control.set_binary()?;

    // The listing is the authoritative size; SIZE is unreliable on some
    // servers in passive mode.
    let entries = control.list(&location.path)?;
    let entry = find_file(&entries, &location.path, location.file_name())
        .ok_or_else(|| ReaderError::not_found(descriptor.uri.to_string()))?;
    let declared = declared_length(descriptor.start_offset, descriptor.length, Some(entry.size))?;
    debug!(path = %location.path, size = entry.size, ?declared, "FTP file sized from listing");

    if descriptor.start_offset > 0 {
        control.restart_at(descriptor.start_offset)?;
    }
    let data = control.retrieve(&location.path)?;
    Ok((declared, data))
}

impl Session for FtpSession {
    fn declared_length(&self) -> Option<u64> {
        self.accounting.declared()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome> {
        if self.accounting.is_complete() {
            if !self.finished {
                self.finished = true;
                self.meter.finish(&self.uri);
            }
            return Ok(ReadOutcome::EndOfStream);
        }

        let want = self.accounting.clamp(buf.len());
        loop {
            match self.data.read(&mut buf[..want]) {
                Ok(0) => {
                    if self.accounting.remaining().is_some() {
                        return Err(self.accounting.premature_end());
                    }
                    self.finished = true;
                    self.meter.finish(&self.uri);
                    return Ok(ReadOutcome::EndOfStream);
                }
                Ok(n) => {
                    self.position += n as u64;
                    self.accounting.record(n);
                    self.meter.record(n, &self.uri);
                    return Ok(ReadOutcome::BytesRead(n));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ReaderError::connection_with("reading FTP data stream", e));
                }
            }
        }
    }

    fn interrupt_handles(&self) -> Vec<TcpStream> {
        // Only the data socket: the control connection is still needed for an
        // orderly logout once the interrupted read returns.
        self.data.try_clone().into_iter().collect()
    }

    fn teardown(self) -> TeardownReport {
        let FtpSession {
            uri,
            mut control,
            data,
            ..
        } = self;
        let mut teardown = Teardown::new(uri);
        teardown
            .step("close data stream", || {
                let result = data.shutdown(Shutdown::Both);
                drop(data);
                result.map_err(|e| ReaderError::from_io("FTP data stream", e))
            })
            .step("complete transfer", || control.complete_pending())
            .step("logout", || control.quit())
            .step("disconnect", || control.disconnect());
        teardown.finish()
    }
}

/// Builds `FtpReader`s sharing one configuration.
#[derive(Debug, Clone)]
pub struct FtpReaderFactory {
    config: Arc<ReaderConfig>,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl FtpReaderFactory {
    pub fn new(config: Arc<ReaderConfig>) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl ReaderFactory for FtpReaderFactory {
    fn schemes(&self) -> &'static [&'static str] {
        &["ftp"]
    }

    fn create_reader(&self) -> Box<dyn RemoteReader> {
        Box::new(FtpReader::new(
            Arc::clone(&self.config),
            self.observer.clone(),
        ))
    }
}
