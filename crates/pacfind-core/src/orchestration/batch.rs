use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::DEFAULT_BATCH_CONCURRENCY;
use crate::models::{CoreError, CoreErrorKind, PackageRecord, Query};
use crate::orchestration::{Aggregator, CancellationToken, MergePolicy, OrchestrationResult};

/// Resolves many names at once, one aggregation per name.
pub struct BatchResolver {
    aggregator: Arc<Aggregator>,
    policy: Arc<dyn MergePolicy>,
    concurrency: usize,
}

impl BatchResolver {
    pub fn new(aggregator: Arc<Aggregator>, policy: Arc<dyn MergePolicy>) -> Self {
        Self {
            aggregator,
            policy,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    /// Caps how many names are searched at the same time (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns one record per input name, in input order. Names with no
    /// eligible match get a placeholder record. Cancellation discards all
    /// partial work.
    pub async fn resolve_many(
        &self,
        names: &[String],
        cancellation: &CancellationToken,
    ) -> OrchestrationResult<Vec<PackageRecord>> {
        if let Some(index) = names.iter().position(|name| name.trim().is_empty()) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("package name at position {index} is empty"),
            ));
        }
        cancellation.check()?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (index, name) in names.iter().cloned().enumerate() {
            let aggregator = self.aggregator.clone();
            let policy = self.policy.clone();
            let semaphore = semaphore.clone();
            let token = cancellation.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    CoreError::new(CoreErrorKind::Internal, "batch semaphore closed")
                })?;
                token.check()?;

                let result = aggregator
                    .search_all(&Query::substring(name.as_str()), &token)
                    .await;
                if result.cancelled {
                    return Err(CoreError::cancelled());
                }

                let record = policy
                    .select(&name, &result.records)
                    .unwrap_or_else(|| PackageRecord::placeholder(name.as_str()));
                debug!(name = %name, source = %record.source, "resolved batch entry");
                Ok::<_, CoreError>((index, record))
            });
        }

        let mut slots: Vec<Option<PackageRecord>> = vec![None; names.len()];
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    tasks.abort_all();
                    return Err(CoreError::cancelled());
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(Ok((index, record))) => slots[index] = Some(record),
                Ok(Err(error)) => {
                    tasks.abort_all();
                    return Err(error);
                }
                Err(join_error) => {
                    tasks.abort_all();
                    return Err(CoreError::new(
                        CoreErrorKind::Internal,
                        format!("batch task join failure: {join_error}"),
                    ));
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    CoreError::new(
                        CoreErrorKind::Internal,
                        format!("batch entry {index} produced no result"),
                    )
                })
            })
            .collect()
    }
}
