//! `std::io::Read` adapter over a remote reader.

use std::io::{self, Read};

use super::{ReadOutcome, RemoteReader};
use crate::error::{ErrorKind, ReaderError, TeardownReport};

/// Adapts an open `RemoteReader` to `std::io::Read` so hosts can use
/// `io::copy` and friends. Closes the reader when dropped.
#[derive(Debug)]
pub struct ReaderStream<R: RemoteReader + ?Sized> {
    reader: Box<R>,
    delivered: u64,
}

impl<R: RemoteReader + ?Sized> ReaderStream<R> {
    /// Wrap a reader that has already been opened.
    pub fn new(reader: Box<R>) -> Self {
        Self {
            reader,
            delivered: 0,
        }
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Close the reader now and return what its teardown recorded.
    pub fn finish(self) -> Option<TeardownReport> {
        self.reader.close();
        self.reader.last_teardown_report()
    }
}

impl<R: RemoteReader + ?Sized> Read for ReaderStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len();
        match self.reader.read(buf, 0, len) {
            Ok(ReadOutcome::BytesRead(n)) => {
                self.delivered += n as u64;
                Ok(n)
            }
            Ok(ReadOutcome::EndOfStream) => Ok(0),
            Err(e) => Err(into_io_error(e)),
        }
    }
}

impl<R: RemoteReader + ?Sized> Drop for ReaderStream<R> {
    fn drop(&mut self) {
        self.reader.close();
    }
}

fn into_io_error(e: ReaderError) -> io::Error {
    let kind = match e.kind() {
        ErrorKind::NotFound => io::ErrorKind::NotFound,
        ErrorKind::Auth => io::ErrorKind::PermissionDenied,
        ErrorKind::UnexpectedEndOfStream => io::ErrorKind::UnexpectedEof,
        ErrorKind::Connection => io::ErrorKind::ConnectionAborted,
        ErrorKind::InvalidBuffer | ErrorKind::Range => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}
