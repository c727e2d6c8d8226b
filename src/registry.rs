//! Scheme-based dispatch from a resource URI to the factory that reads it.

use std::sync::Arc;

use tracing::debug;

use crate::config::{ReaderConfig, ResourceUri};
use crate::error::{ReaderError, ReaderResult};
use crate::io::{ReaderFactory, RemoteReader, TransferObserver};
use crate::protocol::ftp::FtpReaderFactory;
use crate::protocol::nfs::{NfsConnector, NfsReaderFactory};
use crate::protocol::smb::{SmbReaderFactory, SmbTransport};

/// Registry of reader factories, keyed by the schemes they serve.
#[derive(Debug, Clone, Default)]
pub struct ReaderRegistry {
    factories: Vec<Arc<dyn ReaderFactory>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. It replaces earlier factories for the same schemes.
    pub fn register(&mut self, factory: Arc<dyn ReaderFactory>) {
        let schemes = factory.schemes();
        self.factories
            .retain(|f| !f.schemes().iter().any(|s| schemes.contains(s)));
        self.factories.push(factory);
    }

    /// Register a factory (builder pattern).
    pub fn with_factory(mut self, factory: Arc<dyn ReaderFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.factory_for(scheme).is_some()
    }

    /// Factory serving `scheme`, compared case-insensitively.
    pub fn factory_for(&self, scheme: &str) -> Option<&Arc<dyn ReaderFactory>> {
        let scheme = scheme.to_ascii_lowercase();
        self.factories
            .iter()
            .find(|f| f.schemes().contains(&scheme.as_str()))
    }

    /// All registered schemes, in registration order.
    pub fn schemes(&self) -> Vec<&'static str> {
        self.factories.iter().flat_map(|f| f.schemes()).copied().collect()
    }

    /// Create a fresh, closed reader for `uri`.
    pub fn create_reader(&self, uri: &ResourceUri) -> ReaderResult<Box<dyn RemoteReader>> {
        let factory = self.factory_for(uri.scheme_name()).ok_or_else(|| {
            ReaderError::Unsupported(format!("no reader registered for scheme '{}'", uri.scheme_name()))
        })?;
        debug!(uri = %uri, "creating reader");
        Ok(factory.create_reader())
    }
}

/// Optional collaborators for `build_registry`.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub observer: Option<Arc<dyn TransferObserver>>,
    /// Replaces the SMB2 client for `smb://`; required for SMB when the
    /// `smb` feature is off.
    pub smb_transport: Option<Arc<dyn SmbTransport>>,
    /// Replaces the ONC-RPC client for `nfs://`.
    pub nfs_connector: Option<Arc<dyn NfsConnector>>,
}

impl RegistryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_smb_transport(mut self, transport: Arc<dyn SmbTransport>) -> Self {
        self.smb_transport = Some(transport);
        self
    }

    pub fn with_nfs_connector(mut self, connector: Arc<dyn NfsConnector>) -> Self {
        self.nfs_connector = Some(connector);
        self
    }
}

/// Registry with every built-in reader: `ftp`, `nfs`, plus `smb` and
/// `http`/`https` when the `smb` and `webdav` features are enabled.
pub fn default_registry(config: ReaderConfig) -> ReaderResult<ReaderRegistry> {
    build_registry(config, RegistryOptions::default())
}

/// Registry with the built-in readers plus whatever `options` supplies.
pub fn build_registry(config: ReaderConfig, options: RegistryOptions) -> ReaderResult<ReaderRegistry> {
    config.validate()?;
    let config = Arc::new(config);
    let RegistryOptions {
        observer,
        smb_transport,
        nfs_connector,
    } = options;
    let mut registry = ReaderRegistry::new();

    let mut ftp = FtpReaderFactory::new(Arc::clone(&config));
    if let Some(observer) = &observer {
        ftp = ftp.with_observer(Arc::clone(observer));
    }
    registry.register(Arc::new(ftp));

    let mut nfs = match nfs_connector {
        Some(connector) => NfsReaderFactory::with_connector(Arc::clone(&config), connector),
        None => NfsReaderFactory::new(Arc::clone(&config)),
    };
    if let Some(observer) = &observer {
        nfs = nfs.with_observer(Arc::clone(observer));
    }
    registry.register(Arc::new(nfs));

    if let Some(transport) = smb_transport.or_else(native_smb_transport) {
        let mut smb = SmbReaderFactory::new(Arc::clone(&config), transport);
        if let Some(observer) = &observer {
            smb = smb.with_observer(Arc::clone(observer));
        }
        registry.register(Arc::new(smb));
    }

    #[cfg(feature = "webdav")]
    {
        let mut webdav = crate::protocol::webdav::WebDavReaderFactory::new(Arc::clone(&config))?;
        if let Some(observer) = &observer {
            webdav = webdav.with_observer(Arc::clone(observer));
        }
        registry.register(Arc::new(webdav));
    }

    Ok(registry)
}

#[cfg(feature = "smb")]
fn native_smb_transport() -> Option<Arc<dyn SmbTransport>> {
    Some(Arc::new(crate::protocol::smb::NativeSmbTransport))
}

#[cfg(not(feature = "smb"))]
fn native_smb_transport() -> Option<Arc<dyn SmbTransport>> {
    None
}
