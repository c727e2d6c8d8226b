//! Tests for scheme dispatch and registry construction.

use std::sync::Arc;

use crate::config::{ReaderConfig, ResourceDescriptor, ResourceUri};
use crate::error::ErrorKind;
use crate::io::{InMemoryReaderFactory, ReadOutcome};
use crate::protocol::nfs::InMemoryNfsServer;
use crate::protocol::smb::InMemorySmbServer;
use crate::registry::{ReaderRegistry, RegistryOptions, build_registry, default_registry};

#[test]
fn default_registry_serves_builtin_schemes() {
    let registry = default_registry(ReaderConfig::default()).expect("registry");
    assert!(registry.has_scheme("ftp"));
    assert!(registry.has_scheme("NFS"));
    assert_eq!(registry.has_scheme("smb"), cfg!(feature = "smb"));
    #[cfg(feature = "webdav")]
    {
        assert!(registry.has_scheme("http"));
        assert!(registry.has_scheme("https"));
    }
}

#[test]
fn unknown_scheme_is_unsupported() {
    let registry = default_registry(ReaderConfig::default()).expect("registry");
    let err = registry
        .create_reader(&ResourceUri::parse("gopher://host/a").expect("uri"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn supplied_smb_transport_replaces_the_native_client() {
    let server = InMemorySmbServer::new().with_file("share", "a.bin", vec![5; 8]);
    let registry = build_registry(
        ReaderConfig::default(),
        RegistryOptions::new().with_smb_transport(Arc::new(server)),
    )
    .expect("registry");

    let descriptor = ResourceDescriptor::parse("smb://nas/share/a.bin").expect("uri");
    let reader = registry.create_reader(&descriptor.uri).expect("reader");
    assert_eq!(reader.open(&descriptor).expect("open"), Some(8));
}

#[test]
fn nfs_connector_can_be_replaced() {
    let server = InMemoryNfsServer::new().with_file("/e", "a.bin", vec![9; 32]);
    let registry = build_registry(
        ReaderConfig::default(),
        RegistryOptions::new().with_nfs_connector(Arc::new(server.clone())),
    )
    .expect("registry");

    let descriptor = ResourceDescriptor::parse("nfs://nas:/e:/a.bin").expect("uri");
    let reader = registry.create_reader(&descriptor.uri).expect("reader");
    reader.open(&descriptor).expect("open");
    let mut buf = [0u8; 32];
    assert_eq!(reader.read(&mut buf, 0, 32).expect("read"), ReadOutcome::BytesRead(32));
    assert_eq!(server.reads(), vec![(0, 32)]);
}

#[test]
fn later_registration_replaces_earlier_for_the_same_scheme() {
    let mut registry = ReaderRegistry::new();
    registry.register(Arc::new(InMemoryReaderFactory::new(vec![1; 4])));
    registry.register(Arc::new(InMemoryReaderFactory::new(vec![2; 8])));
    assert_eq!(registry.schemes(), vec!["memory"]);

    let descriptor = ResourceDescriptor::parse("memory://x").expect("uri");
    let reader = registry.create_reader(&descriptor.uri).expect("reader");
    assert_eq!(reader.open(&descriptor).expect("open"), Some(8));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = ReaderConfig::default();
    config.connect_timeout_ms = 0;
    let err = build_registry(config, RegistryOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
