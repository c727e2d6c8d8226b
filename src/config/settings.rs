//! Reader configuration: timeouts and per-protocol settings.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ReaderError, ReaderResult};

/// Default NFS refill buffer: 4 MiB.
pub const DEFAULT_NFS_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Top-level configuration shared by all reader factories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Transport connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout in milliseconds.
    pub socket_timeout_ms: u64,
    /// Cadence of diagnostic throughput samples in milliseconds.
    pub throughput_log_interval_ms: u64,
    pub ftp: FtpConfig,
    pub nfs: NfsConfig,
    pub smb: SmbConfig,
    pub webdav: WebDavConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            socket_timeout_ms: 30_000,
            throughput_log_interval_ms: 1_000,
            ftp: FtpConfig::default(),
            nfs: NfsConfig::default(),
            smb: SmbConfig::default(),
            webdav: WebDavConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    /// Send `OPTS UTF8 ON` after login.
    pub utf8: bool,
    pub anonymous_user: String,
    pub anonymous_password: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            utf8: true,
            anonymous_user: "anonymous".into(),
            anonymous_password: "anonymous@".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    /// Size of the offset-addressed refill buffer in bytes.
    pub buffer_size: usize,
    /// AUTH_UNIX uid.
    pub uid: u32,
    /// AUTH_UNIX gid.
    pub gid: u32,
    /// AUTH_UNIX machine name.
    pub machine_name: String,
    pub portmapper_port: u16,
    /// Skip the portmapper lookup for MOUNT.
    pub mount_port: Option<u16>,
    /// Skip the portmapper lookup for NFS.
    pub nfs_port: Option<u16>,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_NFS_BUFFER_SIZE,
            uid: 0,
            gid: 0,
            machine_name: "remoteio".into(),
            portmapper_port: 111,
            mount_port: None,
            nfs_port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmbConfig {
    pub port: u16,
    /// Domain used when the URI names none.
    pub domain: String,
}

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            port: 445,
            domain: String::new(),
        }
    }
}

/// Which WebDAV endpoints are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Only private, link-local and loopback addresses; their self-signed
    /// certificates are accepted.
    #[default]
    PrivateNetworkOnly,
    /// Any address, with normal certificate validation.
    System,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebDavConfig {
    pub trust_policy: TrustPolicy,
    pub user_agent: Option<String>,
}

impl ReaderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn throughput_log_interval(&self) -> Duration {
        Duration::from_millis(self.throughput_log_interval_ms)
    }

    /// Load a config file, choosing the format from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> ReaderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::config(format!("cannot read {}", path.display()), Some(Box::new(e)))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self::parse(&text, &ext)
    }

    /// Parse config text in the named format (`json`, `yaml`/`yml`, `toml`).
    pub fn parse(text: &str, format: &str) -> ReaderResult<Self> {
        let config: Self = match format {
            #[cfg(feature = "json")]
            "json" => serde_json::from_str(text)
                .map_err(|e| ReaderError::config("invalid JSON config", Some(Box::new(e))))?,
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => serde_yaml::from_str(text)
                .map_err(|e| ReaderError::config("invalid YAML config", Some(Box::new(e))))?,
            #[cfg(feature = "toml")]
            "toml" => toml::from_str(text)
                .map_err(|e| ReaderError::config("invalid TOML config", Some(Box::new(e))))?,
            other => {
                let _ = text;
                return Err(ReaderError::config(
                    format!("unsupported config format '{other}'"),
                    None,
                ));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no reader can work with.
    pub fn validate(&self) -> ReaderResult<()> {
        if self.nfs.buffer_size == 0 {
            return Err(ReaderError::config("nfs.buffer_size must be positive", None));
        }
        if self.connect_timeout_ms == 0 || self.socket_timeout_ms == 0 {
            return Err(ReaderError::config("timeouts must be positive", None));
        }
        Ok(())
    }
}
