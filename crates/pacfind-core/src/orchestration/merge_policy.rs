use std::cmp::Reverse;

use crate::models::{PackageRecord, SourceTag, names_match};
use crate::sources::Catalog;

/// Chooses the single record that answers a lookup for `requested` out of
/// everything one aggregation returned.
pub trait MergePolicy: Send + Sync {
    fn select(&self, requested: &str, candidates: &[PackageRecord]) -> Option<PackageRecord>;
}

/// Default policy.
///
/// Only sync and remote records are eligible. Candidates rank by:
/// exact (case-insensitive) name match first, then source priority (sync
/// repositories in configured order, unlisted sync repositories next, remote
/// last), then arrival order. The winner is renamed to the requested name.
#[derive(Clone, Debug, Default)]
pub struct SourcePriorityPolicy {
    repositories: Vec<String>,
}

impl SourcePriorityPolicy {
    pub fn new(repositories: Vec<String>) -> Self {
        Self { repositories }
    }

    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.repositories())
    }

    fn source_rank(&self, source: &SourceTag) -> Option<usize> {
        let listed = self.repositories.len();
        match source {
            SourceTag::Sync(name) => Some(
                self.repositories
                    .iter()
                    .position(|repository| repository == name)
                    .unwrap_or(listed),
            ),
            SourceTag::Remote => Some(listed + 1),
            SourceTag::Local | SourceTag::Unknown => None,
        }
    }
}

impl MergePolicy for SourcePriorityPolicy {
    fn select(&self, requested: &str, candidates: &[PackageRecord]) -> Option<PackageRecord> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(arrival, candidate)| {
                let rank = self.source_rank(&candidate.source)?;
                let exact = names_match(&candidate.name, requested);
                Some(((!exact, rank, arrival), candidate))
            })
            .min_by_key(|(key, _)| *key)
            .map(|(_, candidate)| normalized(candidate, requested))
    }
}

/// Among exact-name sync and remote matches, prefers the most recently
/// modified record; a missing timestamp sorts oldest. Ties go to arrival
/// order. Substring-only matches never win under this policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestMetadataPolicy;

impl MergePolicy for LatestMetadataPolicy {
    fn select(&self, requested: &str, candidates: &[PackageRecord]) -> Option<PackageRecord> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                matches!(candidate.source, SourceTag::Sync(_) | SourceTag::Remote)
                    && names_match(&candidate.name, requested)
            })
            .min_by_key(|(arrival, candidate)| (Reverse(candidate.last_modified), *arrival))
            .map(|(_, candidate)| normalized(candidate, requested))
    }
}

fn normalized(candidate: &PackageRecord, requested: &str) -> PackageRecord {
    PackageRecord {
        name: requested.to_string(),
        ..candidate.clone()
    }
}
