//! Reader lifecycle state and exclusive session ownership.

use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{ReadOutcome, TransferObserver};
use crate::config::ResourceUri;
use crate::error::{ReaderError, ReaderResult, TeardownReport};

/// Lifecycle state of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Closed,
    Opening,
    Open,
    /// An `open` or `read` failed; only `close` is valid.
    Failed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderState::Closed => write!(f, "closed"),
            ReaderState::Opening => write!(f, "opening"),
            ReaderState::Open => write!(f, "open"),
            ReaderState::Failed => write!(f, "failed"),
        }
    }
}

/// A protocol session created by `open` and destroyed by `close`.
pub trait Session: Send + 'static {
    /// Declared readable length computed at open time.
    fn declared_length(&self) -> Option<u64>;

    /// Absolute offset in the remote resource of the next byte to deliver.
    fn position(&self) -> u64;

    /// Read into `buf`, which is never empty.
    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<ReadOutcome>;

    /// Sockets that `close` may shut down to unblock an in-flight read.
    fn interrupt_handles(&self) -> Vec<TcpStream> {
        Vec::new()
    }

    /// Release every resource the session owns, best-effort.
    fn teardown(self) -> TeardownReport;
}

struct CellInner<S> {
    state: ReaderState,
    uri: Option<ResourceUri>,
    session: Option<S>,
    interrupts: Vec<TcpStream>,
    /// Bumped by every `open` and `close`; a checked-out session belongs to
    /// the generation it was taken in.
    generation: u64,
}

/// Guards the `Closed → Opening → Open → Closed` transitions of one reader and
/// owns its session.
///
/// A `read` checks the session out for the duration of the I/O call, so a
/// concurrent `close` never waits on it. When the read checks the session back
/// in and finds the reader closed, the reading thread tears it down.
pub struct SessionCell<S> {
    inner: Mutex<CellInner<S>>,
    last_report: Mutex<Option<TeardownReport>>,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl<S> fmt::Debug for SessionCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionCell")
            .field("state", &inner.state)
            .field("uri", &inner.uri)
            .field("has_session", &inner.session.is_some())
            .finish()
    }
}

impl<S> Default for SessionCell<S> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<S> SessionCell<S> {
    /// Create a closed cell reporting to `observer`.
    pub fn new(observer: Option<Arc<dyn TransferObserver>>) -> Self {
        Self {
            inner: Mutex::new(CellInner {
                state: ReaderState::Closed,
                uri: None,
                session: None,
                interrupts: Vec::new(),
                generation: 0,
            }),
            last_report: Mutex::new(None),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ReaderState {
        self.lock().state
    }

    pub fn uri(&self) -> Option<ResourceUri> {
        self.lock().uri.clone()
    }

    /// Takes the report recorded by the most recent teardown.
    pub fn take_last_report(&self) -> Option<TeardownReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn store_report(&self, report: TeardownReport) {
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
    }
}

impl<S: Session> SessionCell<S> {
    /// Run `establish` between the `Opening` and `Open` transitions.
    ///
    /// Fails with `AlreadyOpen` if another open has begun. If `establish` fails
    /// the reader moves to `Failed`; it is expected to have released anything
    /// it built. If `close` ran while establishing, the fresh session is torn
    /// down and the open fails.
    pub fn open_with<F>(&self, uri: &ResourceUri, establish: F) -> ReaderResult<Option<u64>>
    where
        F: FnOnce() -> ReaderResult<S>,
    {
        let generation = {
            let mut inner = self.lock();
            match inner.state {
                ReaderState::Closed => {
                    inner.state = ReaderState::Opening;
                    inner.uri = Some(uri.clone());
                    inner.generation += 1;
                    inner.generation
                }
                ReaderState::Opening | ReaderState::Open => {
                    return Err(ReaderError::AlreadyOpen {
                        uri: inner
                            .uri
                            .as_ref()
                            .map_or_else(|| uri.to_string(), ResourceUri::to_string),
                    });
                }
                state @ ReaderState::Failed => {
                    return Err(ReaderError::InvalidState {
                        operation: "open",
                        state,
                    });
                }
            }
        };

        debug!(uri = %uri, "opening reader");
        if let Some(observer) = &self.observer {
            observer.on_transfer_initializing(uri);
        }

        let session = match establish() {
            Ok(session) => session,
            Err(e) => {
                let e = e.into_failure();
                let mut inner = self.lock();
                if inner.state == ReaderState::Opening && inner.generation == generation {
                    inner.state = ReaderState::Failed;
                }
                debug!(uri = %uri, error = %e, "open failed");
                return Err(e);
            }
        };

        let declared = session.declared_length();
        let interrupts = session.interrupt_handles();
        let orphan = {
            let mut inner = self.lock();
            if inner.state == ReaderState::Opening && inner.generation == generation {
                inner.state = ReaderState::Open;
                inner.session = Some(session);
                inner.interrupts = interrupts;
                None
            } else {
                Some(session)
            }
        };

        if let Some(session) = orphan {
            self.store_report(session.teardown());
            return Err(ReaderError::connection(format!(
                "reader for {uri} was closed while opening"
            )));
        }

        debug!(uri = %uri, declared = ?declared, "reader open");
        if let Some(observer) = &self.observer {
            observer.on_transfer_start(uri, declared);
        }
        Ok(declared)
    }

    /// Read through the session into `buffer[offset..offset + max_length]`.
    pub fn read(
        &self,
        buffer: &mut [u8],
        offset: usize,
        max_length: usize,
    ) -> ReaderResult<ReadOutcome> {
        super::reader::check_buffer(buffer, offset, max_length)?;

        let (mut session, uri, generation) = {
            let mut inner = self.lock();
            if inner.state != ReaderState::Open {
                return Err(ReaderError::InvalidState {
                    operation: "read",
                    state: inner.state,
                });
            }
            let Some(session) = inner.session.take() else {
                return Err(ReaderError::InvalidState {
                    operation: "read concurrently",
                    state: inner.state,
                });
            };
            (session, inner.uri.clone(), inner.generation)
        };

        if max_length == 0 {
            self.check_in(session, generation, false);
            return Ok(ReadOutcome::BytesRead(0));
        }

        let position = session.position();
        let result = session
            .read(&mut buffer[offset..offset + max_length])
            .map_err(|e| {
                e.into_failure()
                    .at_read(uri.as_ref().map_or("", ResourceUri::as_str), position)
            });

        if let (Ok(ReadOutcome::BytesRead(n)), Some(observer), Some(uri)) =
            (&result, &self.observer, &uri)
        {
            observer.on_bytes_transferred(uri, *n);
        }

        self.check_in(session, generation, result.is_err());
        result
    }

    /// Return a session taken by `read` in `generation`. If the reader was
    /// closed since, possibly followed by a fresh open, the session is stale
    /// and is torn down here instead.
    fn check_in(&self, session: S, generation: u64, failed: bool) {
        let orphan = {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state == ReaderState::Closed {
                Some(session)
            } else {
                if failed {
                    inner.state = ReaderState::Failed;
                }
                inner.session = Some(session);
                None
            }
        };
        if let Some(session) = orphan {
            debug!("reader closed during read; tearing down on reading thread");
            self.store_report(session.teardown());
        }
    }

    /// Move to `Closed` and release the session. Never fails; idempotent.
    pub fn close(&self) {
        let (session, uri, was_active) = {
            let mut inner = self.lock();
            let was_active = matches!(inner.state, ReaderState::Open | ReaderState::Failed);
            inner.state = ReaderState::Closed;
            inner.generation += 1;
            let session = inner.session.take();
            if session.is_none() {
                // A read holds the session; unblock it.
                for handle in inner.interrupts.drain(..) {
                    let _ = handle.shutdown(Shutdown::Both);
                }
            }
            inner.interrupts.clear();
            (session, inner.uri.take(), was_active)
        };

        if let Some(session) = session {
            let report = session.teardown();
            if !report.is_clean() {
                debug!(failures = report.len(), "teardown recorded failures");
            }
            self.store_report(report);
        }

        if let (Some(uri), Some(observer), true) = (&uri, &self.observer, was_active) {
            observer.on_transfer_end(uri);
        }
    }
}
