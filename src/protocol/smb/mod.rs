//! SMB support.
//!
//! The reader drives an `SmbTransport` through connect, authenticate, tree
//! connect and open, then streams the file. The file stream can only skip
//! forward, so a non-zero start offset is reached by repeated skips before
//! `open` returns; a skip that makes no progress fails the open.
//!
//! `NativeSmbTransport` (feature `smb`) speaks SMB2 2.0.2/2.1 with NTLMv2
//! authentication. Hosts may plug in another stack by implementing the
//! traits in this module; `InMemorySmbServer` implements them for tests.

#[cfg(feature = "smb")]
mod client;
mod memory;
#[cfg(feature = "smb")]
mod ntlm;
mod reader;
mod session;
#[cfg(feature = "smb")]
mod wire;

#[cfg(feature = "smb")]
pub use client::NativeSmbTransport;
pub use memory::{InMemorySmbServer, SmbEvent};
pub use reader::{SmbReader, SmbReaderFactory};
pub use session::{SmbConnection, SmbFile, SmbSession, SmbShare, SmbTransport};
