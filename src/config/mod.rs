//! Configuration types for readers and the resources they read.
//!
//! This module provides:
//! - `ResourceDescriptor` / `ResourceUri`: What to read
//! - `FtpLocation`, `NfsLocation`, `SmbLocation`, `WebDavLocation`: Where it lives
//! - `ReaderConfig`: Timeouts and per-protocol settings

mod descriptor;
mod locator;
mod settings;

pub use descriptor::{ResourceDescriptor, ResourceUri, Scheme};
pub use locator::{Credentials, FtpLocation, NfsLocation, SmbLocation, WebDavLocation};
pub use settings::{
    DEFAULT_NFS_BUFFER_SIZE, FtpConfig, NfsConfig, ReaderConfig, SmbConfig, TrustPolicy,
    WebDavConfig,
};
