//! FTP support.
//!
//! Each open logs in on a fresh control connection, sizes the file from a
//! `LIST` of its path, issues `REST` for non-zero offsets and streams the
//! passive-mode `RETR` data connection until the declared length is reached.

mod control;
mod listing;
mod reader;

pub use control::{FtpControl, Reply};
pub use listing::{EntryKind, ListEntry, find_file, parse_listing};
pub use reader::{FtpReader, FtpReaderFactory};
