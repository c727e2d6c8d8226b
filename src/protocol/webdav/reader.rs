//! WebDAV reader: one `PROPFIND` for metadata, then one ranged `GET` per open.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, RANGE};
use tracing::{debug, trace};

use super::propfind::{PROPFIND_BODY, parse_multistatus, select_entry};
use super::trust::{build_client, check_endpoint};
use crate::config::{ReaderConfig, ResourceDescriptor, ResourceUri, WebDavLocation};
use crate::error::{ReaderError, ReaderResult, TeardownReport};
use crate::io::{
    ByteAccounting, ReadOutcome, ReaderFactory, RemoteReader, Session, SessionCell, Teardown,
    ThroughputMeter, TransferObserver, declared_length,
};

/// Reader for `http://` and `https://` WebDAV URIs.
#[derive(Debug)]
pub struct WebDavReader {
    config: Arc<ReaderConfig>,
    client: Client,
    cell: SessionCell<WebDavSession>,
}

impl WebDavReader {
    /// `client` is shared; closing the reader never closes it.
    pub fn new(
        config: Arc<ReaderConfig>,
        client: Client,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Self {
        Self {
            config,
            client,
            cell: SessionCell::new(observer),
        }
    }
}

impl RemoteReader for WebDavReader {
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>> {
        self.cell.open_with(&descriptor.uri, || {
            WebDavSession::establish(&self.config, &self.client, descriptor)
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

fn with_auth(request: RequestBuilder, location: &WebDavLocation) -> RequestBuilder {
    match &location.credentials {
        Some(c) => request.basic_auth(&c.username, c.password.as_deref()),
        None => request,
    }
}

fn send(request: RequestBuilder, what: &str, location: &WebDavLocation) -> ReaderResult<Response> {
    request.send().map_err(|e| {
        ReaderError::connection_with(format!("{what} {} failed", location.url), e)
    })
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, what: &str, uri: &ResourceUri) -> ReaderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ReaderError::auth(format!("{what} of {uri} returned {status}"))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => ReaderError::not_found(uri.to_string()),
        _ => ReaderError::protocol(format!("{what} of {uri} returned {status}")),
    }
}

/// `Range` header value for `declared` bytes from `start`; open-ended when
/// the length is unknown.
pub fn range_header(start: u64, declared: Option<u64>) -> String {
    match declared {
        Some(len) if len > 0 => format!("bytes={start}-{}", start + len - 1),
        _ => format!("bytes={start}-"),
    }
}

/// Size and kind from a `PROPFIND Depth: 1`; `None` size when the server
/// does not report `getcontentlength`.
fn query_size(client: &Client, location: &WebDavLocation, uri: &ResourceUri) -> ReaderResult<Option<u64>> {
    let method = Method::from_bytes(b"PROPFIND")
        .map_err(|e| ReaderError::protocol(format!("invalid method: {e}")))?;
    let request = client
        .request(method, location.url.clone())
        .header("Depth", "1")
        .header(CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(PROPFIND_BODY);
    let response = send(with_auth(request, location), "PROPFIND", location)?;

    let status = response.status();
    if status != StatusCode::MULTI_STATUS && !status.is_success() {
        return Err(status_error(status, "PROPFIND", uri));
    }
    let body = response
        .text()
        .map_err(|e| ReaderError::connection_with("reading PROPFIND response", e))?;
    let entries = parse_multistatus(&body)?;
    trace!(entries = entries.len(), "PROPFIND multistatus");

    let entry = select_entry(&entries, location.url.path())
        .ok_or_else(|| ReaderError::not_found(uri.to_string()))?;
    if entry.is_collection {
        return Err(ReaderError::protocol(format!("{uri} is a collection")));
    }
    Ok(entry.content_length)
}

struct WebDavSession {
    uri: String,
    body: Option<Response>,
    position: u64,
    accounting: ByteAccounting,
    meter: ThroughputMeter,
}

impl std::fmt::Debug for WebDavSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavSession")
            .field("uri", &self.uri)
            .field("streaming", &self.body.is_some())
            .field("position", &self.position)
            .field("accounting", &self.accounting)
            .finish_non_exhaustive()
    }
}

impl WebDavSession {
    fn establish(
        config: &ReaderConfig,
        client: &Client,
        descriptor: &ResourceDescriptor,
    ) -> ReaderResult<Self> {
        let uri = &descriptor.uri;
        let location = WebDavLocation::parse(uri)?;
        check_endpoint(&location, config.webdav.trust_policy)?;

        let start = descriptor.start_offset;
        let size = query_size(client, &location, uri)?;
        let mut declared = declared_length(start, descriptor.length, size)?;
        debug!(url = %location.url, ?size, ?declared, "WebDAV resource sized");

        let session = |body: Option<Response>, declared: Option<u64>| Self {
            uri: uri.to_string(),
            body,
            position: start,
            accounting: ByteAccounting::new(declared),
            meter: ThroughputMeter::new(config.throughput_log_interval()),
        };
        if declared == Some(0) {
            return Ok(session(None, declared));
        }

        let range = range_header(start, declared);
        trace!(range = %range, "WebDAV GET");
        let request = client.get(location.url.clone()).header(RANGE, &range);
        let response = send(with_auth(request, &location), "GET", &location)?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // A server ignoring Range is only usable when reading from the start.
            StatusCode::OK if start == 0 => {}
            StatusCode::OK => {
                return Err(ReaderError::protocol(format!(
                    "server ignored range {range} for {uri}"
                )));
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Err(ReaderError::Range {
                    start,
                    length: descriptor.length,
                    size: size.unwrap_or(0),
                });
            }
            status => return Err(status_error(status, "GET", uri)),
        }

        if declared.is_none() {
            declared = response.content_length();
        }
        Ok(session(Some(response), declared))
    }
}

impl Session for WebDavSession {
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
        let Some(body) = self.body.as_mut() else {
            return Ok(ReadOutcome::EndOfStream);
        };

        let want = self.accounting.clamp(buf.len());
        let n = loop {
            match body.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // A body cut short of its declared length is not a transport stall.
                Err(e) if !matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
                    && self.accounting.remaining().is_some_and(|r| r > 0) =>
                {
                    debug!(uri = %self.uri, error = %e, "WebDAV body ended early");
                    return Err(self.accounting.premature_end());
                }
                Err(e) => return Err(ReaderError::from_io("reading WebDAV response body", e)),
            }
        };
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

    fn teardown(self) -> TeardownReport {
        let WebDavSession { uri, body, .. } = self;
        let mut teardown = Teardown::new(uri);
        if let Some(body) = body {
            teardown.step("close response body", || {
                drop(body);
                Ok(())
            });
        }
        teardown.finish()
    }
}

/// Builds `WebDavReader`s sharing one configuration and one HTTP client.
#[derive(Debug, Clone)]
pub struct WebDavReaderFactory {
    config: Arc<ReaderConfig>,
    client: Client,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl WebDavReaderFactory {
    pub fn new(config: Arc<ReaderConfig>) -> ReaderResult<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl ReaderFactory for WebDavReaderFactory {
    fn schemes(&self) -> &'static [&'static str] {
        &["http", "https"]
    }

    fn create_reader(&self) -> Box<dyn RemoteReader> {
        Box::new(WebDavReader::new(
            Arc::clone(&self.config),
            self.client.clone(),
            self.observer.clone(),
        ))
    }
}
