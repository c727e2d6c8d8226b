//! NFS support.
//!
//! The reader mounts the export, resolves the in-export path one `LOOKUP` at
//! a time and reads with offset-addressed NFSv3 `READ` calls, so seeking never
//! discards bytes. Reads go through a refill buffer of `nfs.buffer_size`
//! bytes (4 MiB unless configured).
//!
//! The wire client is reached through `NfsConnector`; `InMemoryNfsServer`
//! stands in for a server in tests.

mod client;
mod memory;
mod reader;
mod rpc;
mod transport;
mod xdr;

pub use client::{RpcNfsConnector, RpcNfsTransport};
pub use memory::InMemoryNfsServer;
pub use reader::{NfsReader, NfsReaderFactory};
pub use transport::{FileAttributes, FileHandle, FileKind, NfsConnector, NfsTransport};
