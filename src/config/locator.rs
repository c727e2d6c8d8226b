//! Per-protocol resource locators parsed from URIs.

use percent_encoding::percent_decode_str;
use url::Url;

use super::ResourceUri;
use crate::error::{ReaderError, ReaderResult};

/// User identity for a remote session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    /// Windows domain / workgroup, SMB only
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
            domain: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("domain", &self.domain)
            .finish()
    }
}

fn decode(uri: &ResourceUri, s: &str) -> ReaderResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|_| ReaderError::invalid_uri(uri.as_str(), "invalid percent-encoding"))
}

fn parse_url(uri: &ResourceUri) -> ReaderResult<Url> {
    Url::parse(uri.as_str()).map_err(|e| ReaderError::invalid_uri(uri.as_str(), e.to_string()))
}

fn require_host(uri: &ResourceUri, url: &Url) -> ReaderResult<String> {
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(h.trim_start_matches('[').trim_end_matches(']').to_string()),
        _ => Err(ReaderError::invalid_uri(uri.as_str(), "missing host")),
    }
}

fn userinfo(uri: &ResourceUri, url: &Url) -> ReaderResult<Option<Credentials>> {
    if url.username().is_empty() {
        return Ok(None);
    }
    let username = decode(uri, url.username())?;
    let password = url.password().map(|p| decode(uri, p)).transpose()?;
    Ok(Some(Credentials::new(username, password)))
}

/// `ftp://[user[:pass]@]host[:port]/path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpLocation {
    pub host: String,
    pub port: u16,
    /// `None` means log in with the configured anonymous identity.
    pub credentials: Option<Credentials>,
    /// Decoded absolute path of the file.
    pub path: String,
}

impl FtpLocation {
    pub const DEFAULT_PORT: u16 = 21;

    pub fn parse(uri: &ResourceUri) -> ReaderResult<Self> {
        let url = parse_url(uri)?;
        if url.scheme() != "ftp" {
            return Err(ReaderError::invalid_uri(uri.as_str(), "expected ftp scheme"));
        }
        let path = decode(uri, url.path())?;
        if path.is_empty() || path == "/" {
            return Err(ReaderError::invalid_uri(uri.as_str(), "missing file path"));
        }
        Ok(Self {
            host: require_host(uri, &url)?,
            port: url.port().unwrap_or(Self::DEFAULT_PORT),
            credentials: userinfo(uri, &url)?,
            path,
        })
    }

    /// Final path component, as it appears in a directory listing.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// `nfs://host:/exportPath:/pathWithinExport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsLocation {
    pub host: String,
    /// Export path handed to MOUNT, with its leading `/`.
    pub export: String,
    /// Path within the export, with its leading `/`.
    pub path: String,
}

impl NfsLocation {
    pub fn parse(uri: &ResourceUri) -> ReaderResult<Self> {
        let invalid = |reason: &str| ReaderError::invalid_uri(uri.as_str(), reason);
        if !uri.scheme_name().eq_ignore_ascii_case("nfs") {
            return Err(invalid("expected nfs scheme"));
        }

        let rest = uri.rest();
        let (host, compound) = if let Some(bracketed) = rest.strip_prefix('[') {
            let end = bracketed.find(']').ok_or_else(|| invalid("unterminated IPv6 host"))?;
            (&bracketed[..end], &bracketed[end + 1..])
        } else {
            let end = rest.find(':').ok_or_else(|| invalid("missing ':' after host"))?;
            (&rest[..end], &rest[end..])
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let compound = compound
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing ':' after host"))?;
        if !compound.starts_with('/') {
            return Err(invalid("export path must start with '/'"));
        }

        // The export ends at the first ':' after its leading slash.
        let split = compound[1..]
            .find(':')
            .map(|i| i + 1)
            .ok_or_else(|| invalid("missing ':' between export and path"))?;
        let export = &compound[..split];
        let path = &compound[split + 1..];
        if export.len() < 2 {
            return Err(invalid("empty export path"));
        }
        if path.is_empty() {
            return Err(invalid("missing path within export"));
        }

        Ok(Self {
            host: host.to_string(),
            export: decode(uri, export)?,
            path: decode(uri, path)?,
        })
    }

    /// Non-empty components of the in-export path.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|c| !c.is_empty() && *c != ".")
    }
}

/// `smb://[[domain;]user[:pass]@]host[:port]/share/path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbLocation {
    pub host: String,
    pub port: Option<u16>,
    pub credentials: Credentials,
    pub share: String,
    /// Path within the share, `\`-free and without a leading slash.
    pub path: String,
}

impl SmbLocation {
    pub fn parse(uri: &ResourceUri) -> ReaderResult<Self> {
        let url = parse_url(uri)?;
        if url.scheme() != "smb" {
            return Err(ReaderError::invalid_uri(uri.as_str(), "expected smb scheme"));
        }

        let mut credentials = userinfo(uri, &url)?.unwrap_or_default();
        if let Some((domain, user)) = credentials.username.split_once(';') {
            credentials.domain = Some(domain.to_string());
            credentials.username = user.to_string();
        }

        let mut segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty());
        let share = segments
            .next()
            .ok_or_else(|| ReaderError::invalid_uri(uri.as_str(), "missing share name"))?;
        let share = decode(uri, share)?;
        let path = segments
            .map(|s| decode(uri, s))
            .collect::<ReaderResult<Vec<_>>>()?
            .join("/");
        if path.is_empty() {
            return Err(ReaderError::invalid_uri(uri.as_str(), "missing file path"));
        }

        Ok(Self {
            host: require_host(uri, &url)?,
            port: url.port(),
            credentials,
            share,
            path,
        })
    }
}

/// `http(s)://[user[:pass]@]host[:port]/path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDavLocation {
    /// URL with credentials removed
    pub url: Url,
    pub host: String,
    pub credentials: Option<Credentials>,
}

impl WebDavLocation {
    pub fn parse(uri: &ResourceUri) -> ReaderResult<Self> {
        let mut url = parse_url(uri)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReaderError::invalid_uri(uri.as_str(), "expected http or https scheme"));
        }
        let host = require_host(uri, &url)?;
        let credentials = userinfo(uri, &url)?;
        let _ = url.set_username("");
        let _ = url.set_password(None);
        Ok(Self {
            url,
            host,
            credentials,
        })
    }

    /// Decoded final path component.
    pub fn file_name(&self) -> String {
        let last = self
            .url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default();
        percent_decode_str(last).decode_utf8_lossy().into_owned()
    }
}
