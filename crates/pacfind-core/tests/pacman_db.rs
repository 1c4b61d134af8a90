use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::write::GzEncoder;

use pacfind_core::config::DiscoveryConfig;
use pacfind_core::models::{CoreErrorKind, Query, SourceTag};
use pacfind_core::orchestration::{Aggregator, CancellationToken, UpdateDiffer};
use pacfind_core::sources::{Catalog, LocalSource, PacmanLocalDb, PacmanSyncDb, SyncSource};

fn test_db_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("pacfind-{test_name}-{nanos}"));
    fs::create_dir_all(dir.join("local")).unwrap();
    fs::create_dir_all(dir.join("sync")).unwrap();
    dir
}

fn desc(name: &str, version: &str, extra: &str) -> String {
    format!("%NAME%\n{name}\n\n%VERSION%\n{version}\n\n%DESC%\n{name} package\n\n{extra}")
}

fn install(dbpath: &Path, name: &str, version: &str) {
    let entry = dbpath.join("local").join(format!("{name}-{version}"));
    fs::create_dir_all(&entry).unwrap();
    fs::write(entry.join("desc"), desc(name, version, "%DEPENDS%\nglibc\n")).unwrap();
}

fn write_sync_db(dbpath: &Path, repository: &str, packages: &[(&str, &str, u64)]) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, version, csize) in packages {
        let content = desc(name, version, &format!("%CSIZE%\n{csize}\n"));
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{name}-{version}/desc"),
                content.as_bytes(),
            )
            .unwrap();
    }
    let tarball = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tarball).unwrap();
    fs::write(
        dbpath.join("sync").join(format!("{repository}.db")),
        encoder.finish().unwrap(),
    )
    .unwrap();
}

fn config_for(dbpath: &Path, repositories: &[&str]) -> DiscoveryConfig {
    DiscoveryConfig {
        dbpath: dbpath.to_path_buf(),
        repositories: repositories.iter().map(|r| r.to_string()).collect(),
        remote: None,
        ..DiscoveryConfig::default()
    }
}

#[test]
fn local_database_reads_desc_entries() {
    let dbpath = test_db_dir("local-desc");
    install(&dbpath, "bash", "5.2.026-2");
    install(&dbpath, "readline", "8.2.010-1");
    fs::write(dbpath.join("local").join("ALPM_DB_VERSION"), "9\n").unwrap();

    let local = PacmanLocalDb::new(&dbpath);
    let bash = local.lookup_exact("bash").unwrap().unwrap();
    assert_eq!(bash.version, "5.2.026-2");
    assert_eq!(bash.depends, vec!["glibc"]);
    assert_eq!(bash.source, SourceTag::Local);
    assert!(local.lookup_exact("zsh").unwrap().is_none());

    fs::remove_dir_all(dbpath).unwrap();
}

#[test]
fn missing_local_database_is_unavailable() {
    let local = PacmanLocalDb::new("/nonexistent/pacfind-test");
    let error = local.lookup_exact("bash").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::SourceUnavailable);
}

#[test]
fn sync_database_reads_gzip_archive() {
    let dbpath = test_db_dir("sync-gzip");
    write_sync_db(&dbpath, "core", &[("bash", "5.2.032-1", 1_900_000)]);

    let core = PacmanSyncDb::register(&dbpath, "core").unwrap();
    assert_eq!(core.repository_name(), "core");
    let bash = core.lookup_exact("bash").unwrap().unwrap();
    assert_eq!(bash.download_size, Some(1_900_000));
    assert_eq!(bash.source, SourceTag::sync("core"));

    fs::remove_dir_all(dbpath).unwrap();
}

#[test]
fn registering_a_missing_repository_fails() {
    let dbpath = test_db_dir("sync-missing");
    let error = PacmanSyncDb::register(&dbpath, "multilib").err().unwrap();
    assert_eq!(error.kind, CoreErrorKind::SourceUnavailable);
    assert_eq!(error.origin, Some(SourceTag::sync("multilib")));
    fs::remove_dir_all(dbpath).unwrap();
}

#[tokio::test]
async fn opened_catalog_searches_and_diffs_on_disk_databases() {
    let dbpath = test_db_dir("catalog-e2e");
    install(&dbpath, "bash", "5.2.026-2");
    install(&dbpath, "vim", "9.1.0-1");
    write_sync_db(&dbpath, "core", &[("bash", "5.2.032-1", 1_900_000)]);
    write_sync_db(
        &dbpath,
        "extra",
        &[("vim", "9.1.0-1", 2_000_000), ("neovim", "0.10.0-1", 7_000_000)],
    );

    let catalog = Arc::new(Catalog::open(&config_for(&dbpath, &["core", "extra", "multilib"])));
    assert_eq!(catalog.registration_failures().len(), 1);
    let aggregator = Arc::new(Aggregator::new(catalog));

    let result = aggregator
        .search_all(&Query::substring("vim"), &CancellationToken::new())
        .await;
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].source, SourceTag::sync("multilib"));

    let updates = UpdateDiffer::new(aggregator)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].name, "bash");
    assert_eq!(updates[0].available_version, "5.2.032-1");
    assert_eq!(updates[0].download_size, 1_900_000);

    fs::remove_dir_all(dbpath).unwrap();
}
