pub mod aggregator;
pub mod batch;
pub mod cancellation;
pub mod merge_policy;
pub mod updates;

pub use aggregator::Aggregator;
pub use batch::BatchResolver;
pub use cancellation::CancellationToken;
pub use merge_policy::{LatestMetadataPolicy, MergePolicy, SourcePriorityPolicy};
pub use updates::UpdateDiffer;

use crate::models::{CoreError, CoreErrorKind};

pub type OrchestrationResult<T> = Result<T, CoreError>;

/// Runs blocking source work on the blocking pool, turning a panicked or
/// aborted worker into an `Internal` error.
pub(crate) async fn run_blocking<T, F>(what: &'static str, work: F) -> OrchestrationResult<T>
where
    F: FnOnce() -> OrchestrationResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|join_error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("{what} join failure: {join_error}"),
        )
    })?
}
