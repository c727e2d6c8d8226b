//! Resource URIs and descriptors.

use std::fmt;
use std::str::FromStr;

use crate::error::{ReaderError, ReaderResult};

/// URI schemes with a built-in reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ftp,
    Nfs,
    Smb,
    Http,
    Https,
}

impl Scheme {
    /// Parse a scheme name, case-insensitively.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ftp" => Some(Scheme::Ftp),
            "nfs" => Some(Scheme::Nfs),
            "smb" => Some(Scheme::Smb),
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ftp => "ftp",
            Scheme::Nfs => "nfs",
            Scheme::Smb => "smb",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote resource locator of the form `scheme://...`.
///
/// `Display` hides any password in the authority; `as_str` returns the raw text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    raw: String,
    scheme_len: usize,
}

impl ResourceUri {
    /// Parse a URI, checking only that it carries a `scheme://` prefix.
    pub fn parse(raw: impl Into<String>) -> ReaderResult<Self> {
        let raw = raw.into();
        let scheme_len = match raw.find("://") {
            Some(idx)
                if idx > 0
                    && raw[..idx]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
            {
                idx
            }
            _ => return Err(ReaderError::invalid_uri(raw, "missing scheme")),
        };
        Ok(Self { raw, scheme_len })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Scheme name, as written.
    pub fn scheme_name(&self) -> &str {
        &self.raw[..self.scheme_len]
    }

    /// Built-in scheme, if this is one.
    pub fn scheme(&self) -> Option<Scheme> {
        Scheme::from_name(self.scheme_name())
    }

    /// Everything after `scheme://`.
    pub fn rest(&self) -> &str {
        &self.raw[self.scheme_len + 3..]
    }

    fn redacted(&self) -> String {
        let rest = self.rest();
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        match authority.rfind('@') {
            Some(at) => {
                let userinfo = &authority[..at];
                match userinfo.find(':') {
                    Some(colon) => format!(
                        "{}://{}:***{}",
                        self.scheme_name(),
                        &userinfo[..colon],
                        &rest[at..]
                    ),
                    None => self.raw.clone(),
                }
            }
            None => self.raw.clone(),
        }
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceUri({})", self.redacted())
    }
}

impl FromStr for ResourceUri {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An immutable request for a byte range of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// The resource to read
    pub uri: ResourceUri,
    /// First byte to deliver
    pub start_offset: u64,
    /// Number of bytes to deliver; `None` reads to the end
    pub length: Option<u64>,
}

impl ResourceDescriptor {
    /// Describe the whole resource.
    pub fn new(uri: ResourceUri) -> Self {
        Self {
            uri,
            start_offset: 0,
            length: None,
        }
    }

    /// Parse `uri` and describe the whole resource.
    pub fn parse(uri: &str) -> ReaderResult<Self> {
        Ok(Self::new(ResourceUri::parse(uri)?))
    }

    /// Set the start offset.
    pub fn with_start(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    /// Set the requested length.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }
}
