use std::sync::Arc;

use crate::models::{PackageRecord, Query, QueryMode, SourceTag};
use crate::orchestration::CancellationToken;
use crate::sources::{LocalSource, RemoteSource, SourceResult, SyncSource, Visit};

/// Uniform search capability over one source. Matches are streamed through
/// `emit`; returning `Visit::Stop` ends the scan early.
pub trait SourceReader: Send + Sync {
    fn tag(&self) -> SourceTag;

    fn search(
        &self,
        query: &Query,
        cancellation: &CancellationToken,
        emit: &mut dyn FnMut(PackageRecord) -> Visit,
    ) -> SourceResult<()>;
}

pub struct LocalReader {
    source: Arc<dyn LocalSource>,
}

impl LocalReader {
    pub fn new(source: Arc<dyn LocalSource>) -> Self {
        Self { source }
    }
}

impl SourceReader for LocalReader {
    fn tag(&self) -> SourceTag {
        SourceTag::Local
    }

    fn search(
        &self,
        query: &Query,
        cancellation: &CancellationToken,
        emit: &mut dyn FnMut(PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        let outcome = match query.mode() {
            QueryMode::Exact => emit_exact(self.source.lookup_exact(query.text()), emit),
            QueryMode::Substring => self
                .source
                .for_each_installed(&mut |record| scan(query, cancellation, record, emit)),
        };
        outcome.map_err(|error| error.with_origin(SourceTag::Local))?;
        cancellation.check()
    }
}

pub struct SyncReader {
    source: Arc<dyn SyncSource>,
}

impl SyncReader {
    pub fn new(source: Arc<dyn SyncSource>) -> Self {
        Self { source }
    }
}

impl SourceReader for SyncReader {
    fn tag(&self) -> SourceTag {
        SourceTag::sync(self.source.repository_name())
    }

    fn search(
        &self,
        query: &Query,
        cancellation: &CancellationToken,
        emit: &mut dyn FnMut(PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        let outcome = match query.mode() {
            QueryMode::Exact => emit_exact(self.source.lookup_exact(query.text()), emit),
            QueryMode::Substring => self
                .source
                .for_each_package(&mut |record| scan(query, cancellation, record, emit)),
        };
        outcome.map_err(|error| error.with_origin(self.tag()))?;
        cancellation.check()
    }
}

pub struct RemoteReader {
    source: Arc<dyn RemoteSource>,
}

impl RemoteReader {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }
}

impl SourceReader for RemoteReader {
    fn tag(&self) -> SourceTag {
        SourceTag::Remote
    }

    fn search(
        &self,
        query: &Query,
        cancellation: &CancellationToken,
        emit: &mut dyn FnMut(PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        cancellation.check()?;
        let records = self
            .source
            .search_by_term(query.text())
            .map_err(|error| error.with_origin(SourceTag::Remote))?;

        // The response may arrive after cancellation; drop it rather than emit.
        cancellation.check()?;

        for record in records {
            if query.matches(&record.name) && emit(record) == Visit::Stop {
                break;
            }
        }
        Ok(())
    }
}

fn scan(
    query: &Query,
    cancellation: &CancellationToken,
    record: &PackageRecord,
    emit: &mut dyn FnMut(PackageRecord) -> Visit,
) -> Visit {
    if cancellation.is_cancelled() {
        return Visit::Stop;
    }
    if query.matches(&record.name) {
        emit(record.clone())
    } else {
        Visit::Continue
    }
}

fn emit_exact(
    lookup: SourceResult<Option<PackageRecord>>,
    emit: &mut dyn FnMut(PackageRecord) -> Visit,
) -> SourceResult<()> {
    if let Some(record) = lookup? {
        emit(record);
    }
    Ok(())
}
