//! WebDAV support (feature `webdav`).
//!
//! `open` validates the endpoint against the trust policy, sizes the resource
//! with `PROPFIND Depth: 1` and issues exactly one ranged `GET`, whose body is
//! then read as one stream until `close`. Seeking means opening a new reader.
//! The HTTP client belongs to the factory and outlives every reader.

mod propfind;
mod reader;
mod trust;

pub use propfind::{PropEntry, parse_multistatus, select_entry};
pub use reader::{WebDavReader, WebDavReaderFactory, range_header};
pub use trust::{build_client, check_endpoint};
