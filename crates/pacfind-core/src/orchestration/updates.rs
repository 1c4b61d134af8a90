use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::models::{CoreError, CoreErrorKind, PackageRecord, SourceTag, UpdateRecord, is_newer};
use crate::orchestration::{Aggregator, CancellationToken, OrchestrationResult, run_blocking};
use crate::sources::{RemoteSource, SyncSource};

type UpdateSink = Arc<Mutex<Vec<UpdateRecord>>>;

/// An installed package no sync repository carries.
struct ForeignPackage {
    name: String,
    installed_version: String,
}

/// Compares the installed set against the sync repositories and the remote
/// source.
pub struct UpdateDiffer {
    aggregator: Arc<Aggregator>,
}

impl UpdateDiffer {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    /// Lists available updates sorted by package name.
    ///
    /// The sync branch walks the installed set, compares each package with
    /// the newest version any sync repository offers, and hands packages
    /// missing from every sync repository to the remote branch as it finds
    /// them, so the two branches overlap and never look at the same package.
    pub async fn compute_updates(
        &self,
        cancellation: &CancellationToken,
    ) -> OrchestrationResult<Vec<UpdateRecord>> {
        cancellation.check()?;
        let installed = self.aggregator.list_installed().await?;
        cancellation.check()?;

        let catalog = self.aggregator.catalog();
        let sync_sources = catalog.sync_sources().to_vec();
        // A repository that never registered could carry any package.
        let all_registered = !catalog
            .registration_failures()
            .iter()
            .any(|failure| failure.source.is_sync());
        let remote = catalog.remote().cloned();
        let updates: UpdateSink = Arc::new(Mutex::new(Vec::new()));
        let (foreign_tx, foreign_rx) = std_mpsc::channel::<ForeignPackage>();

        let sync_branch = {
            let updates = updates.clone();
            let token = cancellation.clone();
            run_blocking("sync update branch", move || {
                diff_against_sync(
                    &installed,
                    &sync_sources,
                    all_registered,
                    &token,
                    &updates,
                    foreign_tx,
                )
            })
        };
        let remote_branch = {
            let updates = updates.clone();
            let token = cancellation.clone();
            run_blocking("remote update branch", move || {
                diff_against_remote(remote.as_deref(), foreign_rx, &token, &updates)
            })
        };

        let branches = async {
            let (sync_outcome, remote_outcome) = tokio::join!(sync_branch, remote_branch);
            sync_outcome.and(remote_outcome)
        };
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(CoreError::cancelled()),
            outcome = branches => outcome?,
        }
        cancellation.check()?;

        let mut updates = std::mem::take(&mut *lock(&updates)?);
        updates.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = updates.len(), "update computation finished");
        Ok(updates)
    }
}

fn lock(updates: &UpdateSink) -> OrchestrationResult<std::sync::MutexGuard<'_, Vec<UpdateRecord>>> {
    updates
        .lock()
        .map_err(|_| CoreError::new(CoreErrorKind::Internal, "update accumulator poisoned"))
}

fn push(updates: &UpdateSink, update: UpdateRecord) -> OrchestrationResult<()> {
    lock(updates)?.push(update);
    Ok(())
}

fn diff_against_sync(
    installed: &[PackageRecord],
    sync_sources: &[Arc<dyn SyncSource>],
    all_registered: bool,
    cancellation: &CancellationToken,
    updates: &UpdateSink,
    foreign: std_mpsc::Sender<ForeignPackage>,
) -> OrchestrationResult<()> {
    // Repositories that fail to load are skipped for the rest of the run.
    let mut enabled = vec![true; sync_sources.len()];

    for package in installed {
        cancellation.check()?;

        // Newest version across every repository; ties keep the earlier one.
        let mut candidate: Option<PackageRecord> = None;
        let mut fully_consulted = all_registered;
        for (index, source) in sync_sources.iter().enumerate() {
            if !enabled[index] {
                fully_consulted = false;
                continue;
            }
            match source.lookup_exact(&package.name) {
                Ok(Some(record)) => {
                    let newer = candidate
                        .as_ref()
                        .is_none_or(|best| is_newer(&record.version, &best.version));
                    if newer {
                        candidate = Some(record);
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        repository = source.repository_name(),
                        error = %error.message,
                        "sync repository unavailable; skipping it for this run"
                    );
                    enabled[index] = false;
                    fully_consulted = false;
                }
            }
        }

        match candidate {
            Some(record) => {
                if is_newer(&record.version, &package.version) {
                    push(
                        updates,
                        UpdateRecord {
                            name: package.name.clone(),
                            installed_version: package.version.clone(),
                            available_version: record.version,
                            download_size: record.download_size.unwrap_or(0),
                            source: record.source,
                        },
                    )?;
                }
            }
            // Only a package every repository was asked about counts as foreign.
            None if fully_consulted => {
                // The receiver only hangs up when the remote branch stops early.
                let _ = foreign.send(ForeignPackage {
                    name: package.name.clone(),
                    installed_version: package.version.clone(),
                });
            }
            None => debug!(
                package = %package.name,
                "not classified; a sync repository was unavailable"
            ),
        }
    }
    Ok(())
}

fn diff_against_remote(
    remote: Option<&dyn RemoteSource>,
    foreign: std_mpsc::Receiver<ForeignPackage>,
    cancellation: &CancellationToken,
    updates: &UpdateSink,
) -> OrchestrationResult<()> {
    for package in foreign {
        cancellation.check()?;
        let Some(remote) = remote else {
            continue;
        };

        match remote.lookup_exact_version(&package.name) {
            Ok(Some(version)) if version != package.installed_version => push(
                updates,
                UpdateRecord {
                    name: package.name,
                    installed_version: package.installed_version,
                    available_version: version,
                    source: SourceTag::Remote,
                    download_size: 0,
                },
            )?,
            Ok(Some(_)) => {}
            Ok(None) => debug!(package = %package.name, "foreign package unknown to the AUR"),
            Err(error) => warn!(
                package = %package.name,
                error = %error.message,
                "remote version lookup failed; skipping package"
            ),
        }
    }
    Ok(())
}
