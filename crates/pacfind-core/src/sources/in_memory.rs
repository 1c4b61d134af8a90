//! In-memory sources for tests and offline embedding.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind, PackageRecord, SourceTag, fold_name, names_match};
use crate::sources::{LocalSource, RemoteSource, SourceResult, SyncSource, Visit};

fn records_from_versions(source: &SourceTag, versions: &[(&str, &str)]) -> Vec<PackageRecord> {
    versions
        .iter()
        .map(|(name, version)| PackageRecord::new(*name, *version, source.clone()))
        .collect()
}

fn unavailable(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::SourceUnavailable, message)
}

fn find_exact(records: &[PackageRecord], name: &str) -> Option<PackageRecord> {
    records
        .iter()
        .find(|record| names_match(&record.name, name))
        .cloned()
}

#[derive(Default)]
pub struct InMemoryLocalSource {
    records: Vec<PackageRecord>,
    failure: Option<String>,
}

impl InMemoryLocalSource {
    pub fn new(records: Vec<PackageRecord>) -> Self {
        Self {
            records,
            failure: None,
        }
    }

    pub fn from_versions(versions: &[(&str, &str)]) -> Self {
        Self::new(records_from_versions(&SourceTag::Local, versions))
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(message.to_string()),
        }
    }

    fn check(&self) -> SourceResult<()> {
        match &self.failure {
            Some(message) => Err(unavailable(message)),
            None => Ok(()),
        }
    }
}

impl LocalSource for InMemoryLocalSource {
    fn for_each_installed(
        &self,
        visit: &mut dyn FnMut(&PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        self.check()?;
        for record in &self.records {
            if visit(record) == Visit::Stop {
                break;
            }
        }
        Ok(())
    }

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>> {
        self.check()?;
        Ok(find_exact(&self.records, name))
    }
}

pub struct InMemorySyncSource {
    repository: String,
    records: Vec<PackageRecord>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl InMemorySyncSource {
    pub fn new(repository: &str, records: Vec<PackageRecord>) -> Self {
        Self {
            repository: repository.to_string(),
            records,
            failure: None,
            delay: None,
        }
    }

    pub fn from_versions(repository: &str, versions: &[(&str, &str)]) -> Self {
        let records = records_from_versions(&SourceTag::sync(repository), versions);
        Self::new(repository, records)
    }

    pub fn unavailable(repository: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(repository, Vec::new())
        }
    }

    /// Every call blocks for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn prepare(&self) -> SourceResult<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        match &self.failure {
            Some(message) => Err(unavailable(message)),
            None => Ok(()),
        }
    }
}

impl SyncSource for InMemorySyncSource {
    fn repository_name(&self) -> &str {
        &self.repository
    }

    fn for_each_package(
        &self,
        visit: &mut dyn FnMut(&PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        self.prepare()?;
        for record in &self.records {
            if visit(record) == Visit::Stop {
                break;
            }
        }
        Ok(())
    }

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>> {
        self.prepare()?;
        Ok(find_exact(&self.records, name))
    }
}

/// Remote fake. Searches match by case-insensitive substring like the AUR
/// name search does.
#[derive(Default)]
pub struct InMemoryRemoteSource {
    records: Vec<PackageRecord>,
    failure: Option<CoreError>,
    delay: Option<Duration>,
    term_delays: HashMap<String, Duration>,
    failing_lookups: HashSet<String>,
    search_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl InMemoryRemoteSource {
    pub fn new(records: Vec<PackageRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn from_versions(versions: &[(&str, &str)]) -> Self {
        Self::new(records_from_versions(&SourceTag::Remote, versions))
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            failure: Some(unavailable(message)),
            ..Self::default()
        }
    }

    /// Every call fails as if the response body could not be decoded.
    pub fn malformed(message: &str) -> Self {
        Self {
            failure: Some(CoreError::new(CoreErrorKind::ParseFailure, message)),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delays only searches for `term`, to control completion order.
    pub fn with_term_delay(mut self, term: &str, delay: Duration) -> Self {
        self.term_delays.insert(fold_name(term), delay);
        self
    }

    pub fn with_failing_lookup(mut self, name: &str) -> Self {
        self.failing_lookups.insert(name.to_string());
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    fn prepare(&self, term: &str) -> SourceResult<()> {
        let delay = self
            .term_delays
            .get(&fold_name(term))
            .copied()
            .or(self.delay);
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl RemoteSource for InMemoryRemoteSource {
    fn search_by_term(&self, term: &str) -> SourceResult<Vec<PackageRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.prepare(term)?;
        let needle = fold_name(term);
        Ok(self
            .records
            .iter()
            .filter(|record| fold_name(&record.name).contains(&needle))
            .cloned()
            .collect())
    }

    fn lookup_exact_version(&self, name: &str) -> SourceResult<Option<String>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.prepare(name)?;
        if self.failing_lookups.contains(name) {
            return Err(unavailable("lookup failed"));
        }
        Ok(find_exact(&self.records, name).map(|record| record.version))
    }
}
