//! Readers for the on-disk pacman databases.
//!
//! `<dbpath>/local/<pkg>-<ver>/desc` holds the installed set; every
//! `<dbpath>/sync/<repo>.db` is a tar archive (gzip, xz, zstd or plain) with
//! one `<pkg>-<ver>/desc` entry per package, plus `depends` on older mirrors.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

use crate::config::sync_db_path;
use crate::models::{CoreError, CoreErrorKind, PackageRecord, SourceTag, fold_name};
use crate::sources::desc::{DescFields, merge_fields, parse_desc, record_from_desc};
use crate::sources::{LocalSource, SourceResult, SyncSource, Visit};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a];

/// Records of one database, sorted by name.
#[derive(Debug, Default)]
struct PackageCache {
    records: Vec<PackageRecord>,
    by_name: HashMap<String, usize>,
}

impl PackageCache {
    fn new(mut records: Vec<PackageRecord>) -> Self {
        records.sort_by(|a, b| a.name.cmp(&b.name));
        let by_name = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (fold_name(&record.name), idx))
            .collect();
        Self { records, by_name }
    }

    fn for_each(&self, visit: &mut dyn FnMut(&PackageRecord) -> Visit) {
        for record in &self.records {
            if visit(record) == Visit::Stop {
                break;
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<PackageRecord> {
        self.by_name
            .get(&fold_name(name))
            .map(|idx| self.records[*idx].clone())
    }
}

type CacheCell = OnceLock<Result<Arc<PackageCache>, CoreError>>;

fn cached<'a>(
    cell: &'a CacheCell,
    load: impl FnOnce() -> SourceResult<PackageCache>,
) -> SourceResult<&'a PackageCache> {
    match cell.get_or_init(|| load().map(Arc::new)) {
        Ok(cache) => Ok(cache.as_ref()),
        Err(error) => Err(error.clone()),
    }
}

pub struct PacmanLocalDb {
    directory: PathBuf,
    cache: CacheCell,
}

impl PacmanLocalDb {
    pub fn new(dbpath: impl AsRef<Path>) -> Self {
        Self {
            directory: dbpath.as_ref().join("local"),
            cache: OnceLock::new(),
        }
    }

    fn load(&self) -> SourceResult<PackageCache> {
        let entries = fs::read_dir(&self.directory).map_err(|error| {
            CoreError::new(
                CoreErrorKind::SourceUnavailable,
                format!(
                    "failed to open local database '{}': {error}",
                    self.directory.display()
                ),
            )
            .with_origin(SourceTag::Local)
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let desc_path = entry.path().join("desc");
            let Ok(content) = fs::read_to_string(&desc_path) else {
                // ALPM_DB_VERSION and other stray files have no desc.
                continue;
            };
            match record_from_desc(&parse_desc(&content), SourceTag::Local) {
                Ok(record) => records.push(record),
                Err(error) => warn!(
                    path = %desc_path.display(),
                    error = %error.message,
                    "skipping unreadable installed package entry"
                ),
            }
        }

        debug!(count = records.len(), "loaded local package database");
        Ok(PackageCache::new(records))
    }
}

impl LocalSource for PacmanLocalDb {
    fn for_each_installed(
        &self,
        visit: &mut dyn FnMut(&PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        cached(&self.cache, || self.load())?.for_each(visit);
        Ok(())
    }

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>> {
        Ok(cached(&self.cache, || self.load())?.lookup(name))
    }
}

pub struct PacmanSyncDb {
    repository: String,
    path: PathBuf,
    cache: CacheCell,
}

impl PacmanSyncDb {
    /// Registers a sync repository. Fails when the database file is absent;
    /// the archive itself is read on first use.
    pub fn register(dbpath: impl AsRef<Path>, repository: impl Into<String>) -> SourceResult<Self> {
        let repository = repository.into();
        let path = sync_db_path(dbpath.as_ref(), &repository);

        if !path.is_file() {
            return Err(CoreError::new(
                CoreErrorKind::SourceUnavailable,
                format!(
                    "sync database '{}' not found; run a database refresh first",
                    path.display()
                ),
            )
            .with_origin(SourceTag::sync(repository.as_str())));
        }

        Ok(Self {
            repository,
            path,
            cache: OnceLock::new(),
        })
    }

    fn load(&self) -> SourceResult<PackageCache> {
        let tag = SourceTag::sync(self.repository.as_str());
        let bytes = fs::read(&self.path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::SourceUnavailable,
                format!("failed to read '{}': {error}", self.path.display()),
            )
            .with_origin(tag.clone())
        })?;

        let records = parse_sync_archive(&self.repository, &bytes)?;
        debug!(
            repository = %self.repository,
            count = records.len(),
            "loaded sync database"
        );
        Ok(PackageCache::new(records))
    }
}

impl SyncSource for PacmanSyncDb {
    fn repository_name(&self) -> &str {
        &self.repository
    }

    fn for_each_package(
        &self,
        visit: &mut dyn FnMut(&PackageRecord) -> Visit,
    ) -> SourceResult<()> {
        cached(&self.cache, || self.load())?.for_each(visit);
        Ok(())
    }

    fn lookup_exact(&self, name: &str) -> SourceResult<Option<PackageRecord>> {
        Ok(cached(&self.cache, || self.load())?.lookup(name))
    }
}

/// Inflates gzip, xz or zstd by magic bytes; anything else is taken as a
/// plain tar archive.
fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    if bytes.starts_with(GZIP_MAGIC) {
        GzDecoder::new(bytes).read_to_end(&mut decompressed)?;
        debug!("decompressed gzip sync database");
    } else if bytes.starts_with(XZ_MAGIC) {
        XzDecoder::new(bytes).read_to_end(&mut decompressed)?;
        debug!("decompressed xz sync database");
    } else if bytes.starts_with(ZSTD_MAGIC) {
        decompressed = zstd::decode_all(bytes)?;
        debug!("decompressed zstd sync database");
    } else {
        decompressed.extend_from_slice(bytes);
    }
    Ok(decompressed)
}

/// Decodes a sync database archive into records tagged with `repository`.
pub fn parse_sync_archive(repository: &str, bytes: &[u8]) -> SourceResult<Vec<PackageRecord>> {
    let tag = SourceTag::sync(repository);
    let parse_error = |message: String| {
        CoreError::new(CoreErrorKind::ParseFailure, message).with_origin(tag.clone())
    };

    let tarball = decompress(bytes).map_err(|error| {
        parse_error(format!("failed to decompress sync database: {error}"))
    })?;

    let mut by_directory: BTreeMap<String, DescFields> = BTreeMap::new();
    let mut archive = Archive::new(tarball.as_slice());
    let entries = archive
        .entries()
        .map_err(|error| parse_error(format!("invalid sync database archive: {error}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|error| parse_error(format!("failed to read archive entry: {error}")))?;
        let path = entry
            .path()
            .map_err(|error| parse_error(format!("invalid path in archive: {error}")))?
            .to_string_lossy()
            .into_owned();

        let Some((directory, file)) = path.rsplit_once('/') else {
            continue;
        };
        if file != "desc" && file != "depends" {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|error| parse_error(format!("failed to read '{path}': {error}")))?;
        merge_fields(
            by_directory.entry(directory.to_string()).or_default(),
            parse_desc(&content),
        );
    }

    let mut records = Vec::with_capacity(by_directory.len());
    for (directory, fields) in by_directory {
        match record_from_desc(&fields, tag.clone()) {
            Ok(record) => records.push(record),
            Err(error) => warn!(
                repository,
                entry = %directory,
                error = %error.message,
                "skipping malformed sync database entry"
            ),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::parse_sync_archive;
    use crate::models::{CoreErrorKind, SourceTag};

    fn tar_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn reads_plain_tar_and_merges_depends_files() {
        let bytes = tar_with(&[
            ("zlib-1.3.1-1/desc", "%NAME%\nzlib\n%VERSION%\n1:1.3.1-1\n"),
            ("zlib-1.3.1-1/depends", "%DEPENDS%\nglibc\n"),
            ("bash-5.2.026-2/desc", "%NAME%\nbash\n%VERSION%\n5.2.026-2\n%CSIZE%\n1800000\n"),
        ]);

        let records = parse_sync_archive("core", &bytes).unwrap();
        assert_eq!(records.len(), 2);
        let zlib = records.iter().find(|r| r.name == "zlib").unwrap();
        assert_eq!(zlib.depends, vec!["glibc"]);
        assert_eq!(zlib.source.repository(), "core");
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let bytes = tar_with(&[
            ("broken/desc", "%DESC%\nno name here\n"),
            ("ok-1-1/desc", "%NAME%\nok\n%VERSION%\n1-1\n"),
        ]);
        let records = parse_sync_archive("extra", &bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
    }

    #[test]
    fn reads_xz_and_zstd_compressed_archives() {
        let tarball = tar_with(&[("pacman-7.0.0-1/desc", "%NAME%\npacman\n%VERSION%\n7.0.0-1\n")]);

        let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
        xz.write_all(&tarball).unwrap();
        let xz = xz.finish().unwrap();
        let zst = zstd::encode_all(tarball.as_slice(), 3).unwrap();

        for bytes in [xz, zst] {
            let records = parse_sync_archive("core", &bytes).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].name, "pacman");
            assert_eq!(records[0].version, "7.0.0-1");
        }
    }

    #[test]
    fn truncated_compressed_archive_is_a_parse_failure() {
        let error = parse_sync_archive("extra", &[0x28, 0xb5, 0x2f, 0xfd, 0, 0]).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
        assert_eq!(error.origin, Some(SourceTag::sync("extra")));
    }
}
