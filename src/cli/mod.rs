//! Argument types for command-line front ends.
//!
//! `UriArg` and `ByteRange` parse the values a fetch tool takes; with the
//! `sarge` feature they plug straight into a `sarge::ArgumentReader`.
//!
//! ```rust,ignore
//! use remoteio::cli::{ByteRange, UriArg};
//!
//! let uri: UriArg = "ftp://nas.local/music/track.flac".parse()?;
//! let range: ByteRange = "1024-".parse()?;
//! let descriptor = range.to_descriptor(uri.into_inner());
//! ```

use std::str::FromStr;

use thiserror::Error;

use crate::config::{ResourceDescriptor, ResourceUri};
use crate::error::ReaderError;

/// A resource URI given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriArg(pub ResourceUri);

impl UriArg {
    pub fn into_inner(self) -> ResourceUri {
        self.0
    }
}

impl FromStr for UriArg {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceUri::parse(s.trim()).map(UriArg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("invalid range '{0}': expected <start>-[<end>]")]
    Syntax(String),
    #[error("range end {end} is before start {start}")]
    Reversed { start: u64, end: u64 },
}

/// Inclusive byte range `start-end`, or `start-` for everything from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte to read, inclusive
    pub end: Option<u64>,
}

impl ByteRange {
    /// Number of bytes covered, `None` when open-ended.
    pub fn length(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    /// Describe this range of `uri`.
    pub fn to_descriptor(&self, uri: ResourceUri) -> ResourceDescriptor {
        let descriptor = ResourceDescriptor::new(uri).with_start(self.start);
        match self.length() {
            Some(length) => descriptor.with_length(length),
            None => descriptor,
        }
    }
}

impl FromStr for ByteRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || RangeParseError::Syntax(s.to_string());
        let trimmed = s.trim();
        let (start, end) = match trimmed.split_once('-') {
            Some((start, end)) => (start.trim(), Some(end.trim()).filter(|e| !e.is_empty())),
            None => (trimmed, None),
        };
        let start = start.parse::<u64>().map_err(|_| syntax())?;
        let end = end.map(|e| e.parse::<u64>().map_err(|_| syntax())).transpose()?;
        if let Some(end) = end {
            if end < start {
                return Err(RangeParseError::Reversed { start, end });
            }
        }
        Ok(ByteRange { start, end })
    }
}

#[cfg(feature = "sarge")]
mod sarge;
