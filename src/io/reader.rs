//! Reader contract shared by every protocol.

use std::fmt::Debug;

use crate::config::{ResourceDescriptor, ResourceUri};
use crate::error::{ReaderResult, TeardownReport};

/// Outcome of a single `read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were written into the caller's buffer.
    BytesRead(usize),
    /// The declared range has been fully delivered, or the transport ended an
    /// unbounded stream.
    EndOfStream,
}

impl ReadOutcome {
    /// Bytes delivered by this call, zero at end of stream.
    pub fn len(&self) -> usize {
        match self {
            ReadOutcome::BytesRead(n) => *n,
            ReadOutcome::EndOfStream => 0,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ReadOutcome::EndOfStream)
    }
}

/// A seekable, byte-range-readable stream over one remote resource.
///
/// Lifecycle: `open` → `read`* → `close`. Every `open` creates a new protocol
/// session which is owned exclusively by the reader and released by `close`.
/// Seeking is done by closing and opening again at a new offset.
///
/// All operations block on network I/O and must be called from a thread the
/// host dedicates to loading. `close` may be called from another thread while
/// a `read` is in flight.
pub trait RemoteReader: Send + Sync + Debug {
    /// Establish the session and position it at `descriptor.start_offset`.
    ///
    /// Returns the declared readable length: `min(length, size - start)` when
    /// a length was requested, else `size - start`. `None` when the remote size
    /// is unknown and no length was requested.
    fn open(&self, descriptor: &ResourceDescriptor) -> ReaderResult<Option<u64>>;

    /// Read up to `max_length` bytes into `buffer[offset..]`.
    ///
    /// Never returns `BytesRead(0)` for a non-zero `max_length`: the call
    /// blocks until at least one byte is available or the stream ends.
    fn read(&self, buffer: &mut [u8], offset: usize, max_length: usize)
    -> ReaderResult<ReadOutcome>;

    /// Release the session. Idempotent; teardown failures are recorded, never returned.
    fn close(&self);

    /// URI of the resource this reader was opened for.
    fn uri(&self) -> Option<ResourceUri>;

    /// Failures recorded by the most recent `close`, if any.
    fn last_teardown_report(&self) -> Option<TeardownReport> {
        None
    }
}

/// Stateless constructor of fresh readers, invoked once per playback request.
pub trait ReaderFactory: Send + Sync + Debug {
    /// Schemes this factory serves, lowercase.
    fn schemes(&self) -> &'static [&'static str];

    /// Create a new reader in the `Closed` state.
    fn create_reader(&self) -> Box<dyn RemoteReader>;
}

/// Check the `(buffer, offset, max_length)` triple passed to `read`.
pub(crate) fn check_buffer(
    buffer: &[u8],
    offset: usize,
    max_length: usize,
) -> ReaderResult<()> {
    let fits = offset
        .checked_add(max_length)
        .is_some_and(|end| end <= buffer.len());
    if fits {
        Ok(())
    } else {
        Err(crate::error::ReaderError::InvalidBuffer {
            buffer_len: buffer.len(),
            offset,
            max_length,
        })
    }
}
