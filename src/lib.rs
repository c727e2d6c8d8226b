//! # remoteio
//!
//! Seekable, byte-range-readable streams over FTP, NFS, SMB and WebDAV for
//! media playback engines.
//!
//! ## Overview
//!
//! remoteio provides:
//! - **One reader contract**: `open` a byte range, `read` into a caller buffer,
//!   `close` from any thread; every protocol behaves the same to the caller
//! - **Protocol readers**: native FTP and NFSv3 clients, WebDAV over a shared
//!   HTTP client, and an SMB2 client behind a pluggable session stack
//! - **Honest byte accounting**: the length declared by `open` is exactly what
//!   `read` delivers, or a typed error says why not
//! - **Best-effort teardown**: `close` never fails and never leaks; step
//!   failures are recorded in a `TeardownReport`
//! - **Configuration**: timeouts and per-protocol settings from JSON/YAML/TOML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use remoteio::{ReadOutcome, ReaderConfig, ResourceDescriptor, default_registry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = default_registry(ReaderConfig::default())?;
//!     let descriptor = ResourceDescriptor::parse("ftp://nas.local/music/track.flac")?
//!         .with_start(4096);
//!
//!     let reader = registry.create_reader(&descriptor.uri)?;
//!     let declared = reader.open(&descriptor)?;
//!
//!     let mut buf = vec![0u8; 64 * 1024];
//!     let len = buf.len();
//!     loop {
//!         match reader.read(&mut buf, 0, len)? {
//!             ReadOutcome::BytesRead(n) => { /* hand n bytes to the decoder */ }
//!             ReadOutcome::EndOfStream => break,
//!         }
//!     }
//!     reader.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `webdav` - WebDAV reader over `reqwest` (enabled by default)
//! - `smb` - Native SMB2 client with NTLMv2 authentication (enabled by default)
//! - `json` - JSON config files (enabled by default)
//! - `yaml` - YAML config files
//! - `toml` - TOML config files
//! - `miette` - Pretty error reporting with miette
//! - `sarge` - Argument types for `sarge` and the `remoteio_fetch` binary
//!
//! ## Threading
//!
//! All I/O is blocking and meant for the host's loading thread. A reader is
//! driven by one thread at a time, except that `close` may be called from
//! another thread to cancel an in-flight `read`.

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod protocol;
pub mod registry;

// Re-exports for convenience
pub use config::{ReaderConfig, ResourceDescriptor, ResourceUri, Scheme, TrustPolicy};
pub use error::{
    ErrorKind, PlaybackFailure, ReaderError, ReaderResult, Stage, TeardownFailure, TeardownReport,
};
pub use io::{
    InMemoryReader, InMemoryReaderFactory, ReadOutcome, ReaderFactory, ReaderState, ReaderStream,
    RemoteReader, TransferObserver,
};
pub use protocol::ftp::{FtpReader, FtpReaderFactory};
pub use protocol::nfs::{InMemoryNfsServer, NfsReader, NfsReaderFactory};
pub use protocol::smb::{InMemorySmbServer, SmbReader, SmbReaderFactory};
#[cfg(feature = "smb")]
pub use protocol::smb::NativeSmbTransport;
#[cfg(feature = "webdav")]
pub use protocol::webdav::{WebDavReader, WebDavReaderFactory};
pub use registry::{ReaderRegistry, RegistryOptions, build_registry, default_registry};

// Miette re-exports
#[cfg(feature = "miette")]
pub use error::ReaderDiagnostic;

// Internal test modules (see src/tests)
#[cfg(test)]
mod tests;
