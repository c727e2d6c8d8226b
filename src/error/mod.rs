//! Error types and classification for remote reader operations.
//!
//! This module provides:
//! - `ReaderError`: The error taxonomy shared by every protocol reader
//! - `ErrorKind`: A flat classification that looks through context wrappers
//! - `Stage`: Indicates which part of the reader lifecycle failed
//! - `PlaybackFailure`: The user-facing meaning of a failure
//! - `TeardownFailure` / `TeardownReport`: Errors recorded (never raised) by `close`

use std::fmt;
use std::io;

use thiserror::Error;

use crate::io::ReaderState;

/// Result type for reader operations.
pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

/// Boxed error used for transport-level sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Establishing the session and positioning at the start offset
    Open,
    /// Delivering bytes to the caller
    Read,
    /// Releasing the session
    Close,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Open => write!(f, "Open"),
            Stage::Read => write!(f, "Read"),
            Stage::Close => write!(f, "Close"),
        }
    }
}

/// Errors produced by remote readers.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// `open` was called on a reader that is already opening or open.
    #[error("reader for {uri} is already open")]
    AlreadyOpen { uri: String },

    /// The operation is not valid in the reader's current state.
    #[error("cannot {operation} while reader is {state}")]
    InvalidState {
        operation: &'static str,
        state: ReaderState,
    },

    /// The URI could not be parsed for its protocol.
    #[error("invalid uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// `offset`/`max_length` do not fit inside the caller's buffer.
    #[error("buffer of {buffer_len} bytes cannot hold {max_length} bytes at offset {offset}")]
    InvalidBuffer {
        buffer_len: usize,
        offset: usize,
        max_length: usize,
    },

    /// The requested range does not fit the remote object.
    #[error("range start={start} length={length:?} is invalid for a resource of {size} bytes")]
    Range {
        start: u64,
        length: Option<u64>,
        size: u64,
    },

    /// Transport failure establishing or maintaining a session.
    #[error("connection error: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The server rejected the credentials.
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// The resource does not exist on the server.
    #[error("resource not found: {uri}")]
    NotFound { uri: String },

    /// The server sent an unexpected reply or status.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The peer closed a channel as the expected end of a completed transfer.
    #[error("peer closed {context}")]
    PeerClosedBenignly { context: String },

    /// Fewer bytes were available than the declared length promised.
    #[error("unexpected end of stream: expected {expected} bytes, delivered {delivered}")]
    UnexpectedEndOfStream { expected: u64, delivered: u64 },

    /// No reader is available for the requested scheme or feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A read failure, with the position it happened at.
    #[error("read of {uri} failed at offset {offset}: {source}")]
    Read {
        uri: String,
        offset: u64,
        #[source]
        source: Box<ReaderError>,
    },
}

/// Flat classification of a `ReaderError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyOpen,
    InvalidState,
    InvalidUri,
    InvalidBuffer,
    Range,
    Connection,
    Auth,
    NotFound,
    Protocol,
    PeerClosedBenignly,
    UnexpectedEndOfStream,
    Unsupported,
    Config,
}

impl ReaderError {
    /// Create a connection error without an underlying source.
    pub fn connection(context: impl Into<String>) -> Self {
        ReaderError::Connection {
            context: context.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping a transport error.
    pub fn connection_with(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ReaderError::Connection {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        ReaderError::Protocol {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ReaderError::Auth {
            message: message.into(),
        }
    }

    pub fn not_found(uri: impl Into<String>) -> Self {
        ReaderError::NotFound { uri: uri.into() }
    }

    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        ReaderError::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>, source: Option<BoxError>) -> Self {
        ReaderError::Config {
            message: message.into(),
            source,
        }
    }

    /// Wrap a read failure with the uri and absolute offset it happened at.
    pub fn at_read(self, uri: &str, offset: u64) -> Self {
        match self {
            already @ ReaderError::Read { .. } => already,
            other => ReaderError::Read {
                uri: uri.to_string(),
                offset,
                source: Box::new(other),
            },
        }
    }

    /// Classify a transport error raised while a session is being established or used.
    ///
    /// Closure-style errors become `PeerClosedBenignly`; everything else is a
    /// `Connection` error carrying `context`.
    pub fn from_io(context: impl Into<String>, err: io::Error) -> Self {
        let context = context.into();
        if is_peer_closed(&err) {
            ReaderError::PeerClosedBenignly { context }
        } else {
            ReaderError::connection_with(context, err)
        }
    }

    /// A peer closure is only benign during teardown; elsewhere it is a
    /// connection failure.
    pub fn into_failure(self) -> Self {
        match self {
            ReaderError::PeerClosedBenignly { context } => ReaderError::Connection {
                context: format!("peer closed {context}"),
                source: None,
            },
            other => other,
        }
    }

    /// The flat kind of this error, looking through `Read` wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::AlreadyOpen { .. } => ErrorKind::AlreadyOpen,
            ReaderError::InvalidState { .. } => ErrorKind::InvalidState,
            ReaderError::InvalidUri { .. } => ErrorKind::InvalidUri,
            ReaderError::InvalidBuffer { .. } => ErrorKind::InvalidBuffer,
            ReaderError::Range { .. } => ErrorKind::Range,
            ReaderError::Connection { .. } => ErrorKind::Connection,
            ReaderError::Auth { .. } => ErrorKind::Auth,
            ReaderError::NotFound { .. } => ErrorKind::NotFound,
            ReaderError::Protocol { .. } => ErrorKind::Protocol,
            ReaderError::PeerClosedBenignly { .. } => ErrorKind::PeerClosedBenignly,
            ReaderError::UnexpectedEndOfStream { .. } => ErrorKind::UnexpectedEndOfStream,
            ReaderError::Unsupported(_) => ErrorKind::Unsupported,
            ReaderError::Config { .. } => ErrorKind::Config,
            ReaderError::Read { source, .. } => source.kind(),
        }
    }

    /// Whether this error only signals that the peer finished and hung up.
    pub fn is_peer_closed(&self) -> bool {
        self.kind() == ErrorKind::PeerClosedBenignly
    }
}

/// Whether an I/O error means the remote end closed the channel.
pub fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// What a failure means to the person pressing play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackFailure {
    /// Nothing was delivered; the item never started.
    CouldNotStart,
    /// Some data was delivered before the failure.
    Interrupted,
}

impl PlaybackFailure {
    /// Classify a failure by where it happened and how much had been delivered.
    pub fn classify(stage: Stage, bytes_delivered: u64) -> Self {
        match stage {
            Stage::Open => PlaybackFailure::CouldNotStart,
            Stage::Read | Stage::Close if bytes_delivered == 0 => PlaybackFailure::CouldNotStart,
            Stage::Read | Stage::Close => PlaybackFailure::Interrupted,
        }
    }
}

impl fmt::Display for PlaybackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackFailure::CouldNotStart => write!(f, "could not start playback of this item"),
            PlaybackFailure::Interrupted => write!(f, "playback interrupted"),
        }
    }
}

/// A single teardown step that failed during `close`.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Name of the teardown step
    pub step: &'static str,
    /// The underlying error
    pub error: ReaderError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.error)
    }
}

/// Failures recorded while tearing a session down.
///
/// Produced by `close`; inspected for diagnostics only.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Identifier of the resource that was being released
    pub target: String,
    /// Every step that ran, in execution order
    pub steps: Vec<&'static str>,
    /// Steps that failed, in execution order
    pub failures: Vec<TeardownFailure>,
    /// Steps that ended with a benign peer closure
    pub benign: Vec<&'static str>,
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "teardown of {} recorded {} failure(s):",
            self.target,
            self.failures.len()
        )?;
        for (i, e) in self.failures.iter().enumerate() {
            writeln!(f, "  #{}: {}", i + 1, e)?;
        }
        Ok(())
    }
}

impl TeardownReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            steps: Vec::new(),
            failures: Vec::new(),
            benign: Vec::new(),
        }
    }

    /// Check if every step succeeded or ended benignly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Get the number of failed steps.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(feature = "miette")]
mod miette_impl;

#[cfg(feature = "miette")]
pub use miette_impl::*;
