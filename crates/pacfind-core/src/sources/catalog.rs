use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::models::{SourceFailure, SourceTag};
use crate::sources::{
    AurRpcSource, LocalReader, LocalSource, PacmanLocalDb, PacmanSyncDb, RemoteReader,
    RemoteSource, SourceReader, SyncReader, SyncSource,
};

/// The set of sources one engine instance reads from. Opened once and shared
/// by `Arc`; dropping the last handle releases every backend.
pub struct Catalog {
    local: Arc<dyn LocalSource>,
    sync: Vec<Arc<dyn SyncSource>>,
    remote: Option<Arc<dyn RemoteSource>>,
    registration_failures: Vec<SourceFailure>,
}

impl Catalog {
    pub fn new(local: Arc<dyn LocalSource>) -> Self {
        Self {
            local,
            sync: Vec::new(),
            remote: None,
            registration_failures: Vec::new(),
        }
    }

    /// Appends a sync repository; call order is priority order.
    pub fn with_sync(mut self, source: Arc<dyn SyncSource>) -> Self {
        self.sync.push(source);
        self
    }

    pub fn with_remote(mut self, source: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(source);
        self
    }

    pub fn with_registration_failure(mut self, failure: SourceFailure) -> Self {
        self.registration_failures.push(failure);
        self
    }

    /// Opens the pacman databases and the AUR client described by `config`.
    /// Repositories that cannot be registered are kept as failures instead
    /// of failing the whole catalog.
    pub fn open(config: &DiscoveryConfig) -> Self {
        let mut catalog = Self::new(Arc::new(PacmanLocalDb::new(&config.dbpath)));

        for repository in &config.repositories {
            match PacmanSyncDb::register(&config.dbpath, repository.as_str()) {
                Ok(source) => {
                    debug!(repository = %repository, "registered sync database");
                    catalog = catalog.with_sync(Arc::new(source));
                }
                Err(error) => {
                    warn!(
                        repository = %repository,
                        error = %error.message,
                        "sync database unavailable"
                    );
                    catalog = catalog.with_registration_failure(SourceFailure {
                        source: SourceTag::sync(repository.as_str()),
                        error,
                    });
                }
            }
        }

        if let Some(remote) = &config.remote {
            catalog = catalog.with_remote(Arc::new(AurRpcSource::new(remote)));
        }

        catalog
    }

    pub fn local(&self) -> &Arc<dyn LocalSource> {
        &self.local
    }

    pub fn sync_sources(&self) -> &[Arc<dyn SyncSource>] {
        &self.sync
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteSource>> {
        self.remote.as_ref()
    }

    pub fn registration_failures(&self) -> &[SourceFailure] {
        &self.registration_failures
    }

    /// Names of the registered sync repositories in priority order.
    pub fn repositories(&self) -> Vec<String> {
        self.sync
            .iter()
            .map(|source| source.repository_name().to_string())
            .collect()
    }

    /// Every configured source, including those that failed to register.
    pub fn source_count(&self) -> usize {
        1 + self.sync.len() + usize::from(self.remote.is_some()) + self.registration_failures.len()
    }

    /// One reader per registered source: local, each sync in order, remote.
    pub fn readers(&self) -> Vec<Arc<dyn SourceReader>> {
        let mut readers: Vec<Arc<dyn SourceReader>> =
            vec![Arc::new(LocalReader::new(self.local.clone()))];
        readers.extend(
            self.sync
                .iter()
                .map(|source| Arc::new(SyncReader::new(source.clone())) as Arc<dyn SourceReader>),
        );
        if let Some(remote) = &self.remote {
            readers.push(Arc::new(RemoteReader::new(remote.clone())));
        }
        readers
    }
}
