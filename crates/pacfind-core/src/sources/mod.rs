pub mod aur;
pub mod catalog;
pub(crate) mod desc;
pub mod in_memory;
pub mod pacman;
pub mod reader;

pub use aur::AurRpcSource;
pub use catalog::Catalog;
pub use in_memory::{InMemoryLocalSource, InMemoryRemoteSource, InMemorySyncSource};
pub use pacman::{PacmanLocalDb, PacmanSyncDb};
pub use reader::{LocalReader, RemoteReader, SourceReader, SyncReader};

use crate::models::{CoreError, PackageRecord};

pub type SourceResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visit {
    Continue,
    Stop,
}

/// The installed-package database.
pub trait LocalSource: Send + Sync {
    fn for_each_installed(
        &self,
        visit: &mut dyn FnMut(&PackageRecord) -> Visit,
    ) -> SourceResult<()>;

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>>;
}

/// One synchronized repository mirror.
pub trait SyncSource: Send + Sync {
    fn repository_name(&self) -> &str;

    fn for_each_package(&self, visit: &mut dyn FnMut(&PackageRecord) -> Visit)
    -> SourceResult<()>;

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>>;
}

/// The community repository reachable over RPC.
pub trait RemoteSource: Send + Sync {
    fn search_by_term(&self, term: &str) -> SourceResult<Vec<PackageRecord>>;

    fn lookup_exact_version(&self, name: &str) -> SourceResult<Option<String>>;
}
