//! The NFS operations a reader needs, behind a connector seam.

use std::fmt;
use std::net::TcpStream;

use crate::config::ReaderConfig;
use crate::error::ReaderResult;

/// Opaque NFSv3 file handle.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(pub Vec<u8>);

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHandle(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub kind: FileKind,
    pub size: u64,
}

/// A mounted NFS session.
pub trait NfsTransport: Send {
    /// Mount `export` and return the handle of its root directory.
    fn mount(&mut self, export: &str) -> ReaderResult<FileHandle>;

    /// Resolve one path component, returning its attributes when the server sent them.
    fn lookup(
        &mut self,
        dir: &FileHandle,
        name: &str,
    ) -> ReaderResult<(FileHandle, Option<FileAttributes>)>;

    fn getattr(&mut self, handle: &FileHandle) -> ReaderResult<FileAttributes>;

    /// Read at an absolute `offset` into `buf`. Zero means end of file.
    fn read_at(&mut self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> ReaderResult<usize>;

    /// Socket a concurrent `close` may shut down to unblock `read_at`.
    fn interrupt_handle(&self) -> Option<TcpStream> {
        None
    }
}

/// Opens NFS sessions to a host.
pub trait NfsConnector: Send + Sync + fmt::Debug {
    fn connect(&self, host: &str, config: &ReaderConfig) -> ReaderResult<Box<dyn NfsTransport>>;
}
