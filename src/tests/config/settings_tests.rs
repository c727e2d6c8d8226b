//! Tests for reader configuration defaults, parsing and validation.

use std::time::Duration;

use crate::config::{DEFAULT_NFS_BUFFER_SIZE, ReaderConfig, TrustPolicy};
use crate::error::ErrorKind;

#[test]
fn defaults() {
    let config = ReaderConfig::default();
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.socket_timeout(), Duration::from_secs(30));
    assert_eq!(config.nfs.buffer_size, DEFAULT_NFS_BUFFER_SIZE);
    assert_eq!(config.smb.port, 445);
    assert_eq!(config.webdav.trust_policy, TrustPolicy::PrivateNetworkOnly);
    assert!(config.ftp.utf8);
    config.validate().expect("defaults are valid");
}

#[test]
fn zero_buffer_or_timeout_is_rejected() {
    let mut config = ReaderConfig::default();
    config.nfs.buffer_size = 0;
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

    let mut config = ReaderConfig::default();
    config.socket_timeout_ms = 0;
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn unknown_format_is_a_config_error() {
    let err = ReaderConfig::parse("connect_timeout_ms = 5", "ini").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("unsupported config format 'ini'"));
}

#[cfg(feature = "json")]
#[test]
fn json_overrides_only_what_it_names() {
    let config = ReaderConfig::parse(
        r#"{
            "socket_timeout_ms": 5000,
            "nfs": { "buffer_size": 1048576, "nfs_port": 2049 },
            "webdav": { "trust_policy": "system" }
        }"#,
        "json",
    )
    .expect("parse");

    assert_eq!(config.socket_timeout(), Duration::from_secs(5));
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.nfs.buffer_size, 1 << 20);
    assert_eq!(config.nfs.nfs_port, Some(2049));
    assert_eq!(config.nfs.portmapper_port, 111);
    assert_eq!(config.webdav.trust_policy, TrustPolicy::System);
}

#[cfg(feature = "json")]
#[test]
fn json_with_invalid_values_is_rejected() {
    let err = ReaderConfig::parse(r#"{ "nfs": { "buffer_size": 0 } }"#, "json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = ReaderConfig::parse("{ not json", "json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[cfg(feature = "toml")]
#[test]
fn toml_sections() {
    let config = ReaderConfig::parse(
        "connect_timeout_ms = 2500\n\n[smb]\nport = 1445\ndomain = \"WORK\"\n",
        "toml",
    )
    .expect("parse");
    assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
    assert_eq!(config.smb.port, 1445);
    assert_eq!(config.smb.domain, "WORK");
}

#[cfg(feature = "yaml")]
#[test]
fn yaml_sections() {
    let config = ReaderConfig::parse(
        "ftp:\n  utf8: false\n  anonymous_user: guest\n",
        "yml",
    )
    .expect("parse");
    assert!(!config.ftp.utf8);
    assert_eq!(config.ftp.anonymous_user, "guest");
    assert_eq!(config.ftp.anonymous_password, "anonymous@");
}
