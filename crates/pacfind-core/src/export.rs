//! Stable JSON shapes for package and update listings.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::models::{CoreError, CoreErrorKind, CoreResult, PackageRecord, UpdateRecord};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PackageExport {
    pub name: String,
    pub version: String,
    pub description: String,
    pub repository: String,
    pub maintainer: String,
    #[serde(rename = "upstreamurl")]
    pub upstream_url: String,
    #[serde(rename = "dependlist")]
    pub depend_list: Vec<String>,
    /// RFC 3339 in UTC; empty when the source publishes no timestamp.
    #[serde(rename = "lastupdated")]
    pub last_updated: String,
}

impl From<&PackageRecord> for PackageExport {
    fn from(record: &PackageRecord) -> Self {
        Self {
            name: record.name.clone(),
            version: record.version.clone(),
            description: record.description.clone(),
            repository: record.source.repository().to_string(),
            maintainer: record.maintainer.clone().unwrap_or_default(),
            upstream_url: record.upstream_url.clone().unwrap_or_default(),
            depend_list: record.depends.clone(),
            last_updated: record.last_modified.map(format_timestamp).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExport {
    pub name: String,
    pub old_version: String,
    pub new_version: String,
    pub repository: String,
    pub download_size: u64,
}

impl From<&UpdateRecord> for UpdateExport {
    fn from(update: &UpdateRecord) -> Self {
        Self {
            name: update.name.clone(),
            old_version: update.installed_version.clone(),
            new_version: update.available_version.clone(),
            repository: update.source.repository().to_string(),
            download_size: update.download_size,
        }
    }
}

pub fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub fn packages_to_json(records: &[PackageRecord]) -> CoreResult<String> {
    let exports: Vec<PackageExport> = records.iter().map(PackageExport::from).collect();
    to_pretty_json(&exports)
}

pub fn updates_to_json(updates: &[UpdateRecord]) -> CoreResult<String> {
    let exports: Vec<UpdateExport> = updates.iter().map(UpdateExport::from).collect();
    to_pretty_json(&exports)
}

/// Writes `records` to `path` as a pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[PackageRecord]) -> CoreResult<()> {
    let json = packages_to_json(records)?;
    fs::write(path, json).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to write '{}': {error}", path.display()),
        )
    })?;
    info!(path = %path.display(), count = records.len(), "exported package records");
    Ok(())
}

fn to_pretty_json<T: Serialize>(value: &T) -> CoreResult<String> {
    serde_json::to_string_pretty(value).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to serialize export: {error}"),
        )
    })
}
