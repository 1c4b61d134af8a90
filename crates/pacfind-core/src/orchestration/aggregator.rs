use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{
    AggregationResult, CoreError, CoreErrorKind, PackageRecord, Query, SourceFailure, SourceTag,
};
use crate::orchestration::{CancellationToken, OrchestrationResult, run_blocking};
use crate::sources::{Catalog, SourceReader, Visit};

/// Bound on records buffered between the source workers and the collector.
const EVENT_QUEUE_CAPACITY: usize = 256;

enum SourceEvent {
    Record(PackageRecord),
    Failed(SourceFailure),
}

/// Fans one query out to every source of a catalog and collects whatever
/// arrives into a single result.
#[derive(Clone)]
pub struct Aggregator {
    catalog: Arc<Catalog>,
}

impl Aggregator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Runs `query` against every source concurrently.
    ///
    /// Never fails as a whole: a source that errors contributes zero records
    /// and one entry in `failures`. Records are in arrival order. When the
    /// token fires, whatever has arrived so far is returned with
    /// `cancelled = true`.
    pub async fn search_all(
        &self,
        query: &Query,
        cancellation: &CancellationToken,
    ) -> AggregationResult {
        let mut result = AggregationResult {
            failures: self.catalog.registration_failures().to_vec(),
            sources: self.catalog.source_count(),
            ..AggregationResult::default()
        };

        if cancellation.is_cancelled() {
            result.cancelled = true;
            return result;
        }

        let (sender, mut receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let mut workers: Vec<(SourceTag, JoinHandle<()>)> = Vec::new();
        for reader in self.catalog.readers() {
            let sender = sender.clone();
            let query = query.clone();
            let token = cancellation.clone();
            let tag = reader.tag();
            let handle = tokio::task::spawn_blocking(move || {
                run_reader(reader.as_ref(), &query, &token, &sender)
            });
            workers.push((tag, handle));
        }
        // The queue closes once every worker has dropped its sender.
        drop(sender);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!(query = %query.text(), "aggregation cancelled; returning partial result");
                    result.cancelled = true;
                    return result;
                }
                event = receiver.recv() => match event {
                    Some(SourceEvent::Record(record)) => result.records.push(record),
                    Some(SourceEvent::Failed(failure)) => result.failures.push(failure),
                    None => break,
                },
            }
        }

        // All senders are gone, so every worker has returned or panicked.
        for (tag, handle) in workers {
            if let Err(join_error) = handle.await {
                result.failures.push(SourceFailure {
                    error: CoreError::new(
                        CoreErrorKind::Internal,
                        format!("source worker failed: {join_error}"),
                    )
                    .with_origin(tag.clone()),
                    source: tag,
                });
            }
        }

        debug!(
            query = %query.text(),
            records = result.records.len(),
            failures = result.failures.len(),
            "aggregation finished"
        );
        result
    }

    /// Exact lookup in the installed database.
    pub async fn installed_package(&self, name: &str) -> OrchestrationResult<Option<PackageRecord>> {
        let local = self.catalog.local().clone();
        let name = name.to_string();
        run_blocking("installed lookup", move || {
            local
                .lookup_exact(&name)
                .map_err(|error| error.with_origin(SourceTag::Local))
        })
        .await
    }

    /// Every installed package, sorted by name.
    pub async fn list_installed(&self) -> OrchestrationResult<Vec<PackageRecord>> {
        let local = self.catalog.local().clone();
        run_blocking("installed listing", move || {
            let mut installed = Vec::new();
            local
                .for_each_installed(&mut |record| {
                    installed.push(record.clone());
                    Visit::Continue
                })
                .map_err(|error| error.with_origin(SourceTag::Local))?;
            installed.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(installed)
        })
        .await
    }
}

fn run_reader(
    reader: &dyn SourceReader,
    query: &Query,
    cancellation: &CancellationToken,
    sender: &mpsc::Sender<SourceEvent>,
) {
    let tag = reader.tag();
    let outcome = reader.search(query, cancellation, &mut |record| {
        // A closed queue means the collector gave up; stop scanning.
        match sender.blocking_send(SourceEvent::Record(record)) {
            Ok(()) => Visit::Continue,
            Err(_) => Visit::Stop,
        }
    });

    match outcome {
        Ok(()) => debug!(source = %tag, query = %query.text(), "source finished"),
        Err(error) if error.is_cancelled() => {
            debug!(source = %tag, "source stopped by cancellation")
        }
        Err(error) => {
            warn!(
                source = %tag,
                kind = ?error.kind,
                error = %error.message,
                "source failed; continuing without it"
            );
            let _ = sender.blocking_send(SourceEvent::Failed(SourceFailure { source: tag, error }));
        }
    }
}
