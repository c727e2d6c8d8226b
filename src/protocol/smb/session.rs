//! The SMB session stack a reader walks through.
//!
//! Each layer is produced by the one above it and released on its own:
//! transport → connection → session → share → file. A file only supports
//! sequential reads and forward skips.

use std::fmt::Debug;
use std::net::TcpStream;

use crate::config::{Credentials, ReaderConfig};
use crate::error::ReaderResult;

/// Entry point: opens connections to SMB servers.
pub trait SmbTransport: Send + Sync + Debug {
    fn connect(&self, host: &str, port: u16, config: &ReaderConfig) -> ReaderResult<Box<dyn SmbConnection>>;
}

/// A transport connection to one server.
pub trait SmbConnection: Send {
    /// Authenticate and set up a session; rejected credentials are an `Auth` error.
    fn authenticate(&mut self, credentials: &Credentials) -> ReaderResult<Box<dyn SmbSession>>;

    fn close(self: Box<Self>) -> ReaderResult<()>;

    /// Socket a concurrent `close` may shut down to unblock a read.
    fn interrupt_handle(&self) -> Option<TcpStream> {
        None
    }
}

/// An authenticated session.
pub trait SmbSession: Send {
    /// Tree connect to `share`.
    fn connect_share(&mut self, share: &str) -> ReaderResult<Box<dyn SmbShare>>;

    fn logoff(self: Box<Self>) -> ReaderResult<()>;
}

/// A connected share.
pub trait SmbShare: Send {
    /// Size of the file at `path`; a missing file is `NotFound`.
    fn file_size(&mut self, path: &str) -> ReaderResult<u64>;

    /// Open `path` for reading, positioned at its first byte.
    fn open_file(&mut self, path: &str) -> ReaderResult<Box<dyn SmbFile>>;

    fn disconnect(self: Box<Self>) -> ReaderResult<()>;
}

/// An open file exposing a forward-only byte stream.
pub trait SmbFile: Send {
    /// Skip up to `n` bytes forward, returning how many were skipped.
    fn skip(&mut self, n: u64) -> ReaderResult<u64>;

    /// Read into `buf`; zero at end of file.
    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<usize>;

    fn close(self: Box<Self>) -> ReaderResult<()>;
}
