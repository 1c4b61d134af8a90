use std::sync::Arc;
use std::time::Duration;

use pacfind_core::models::{
    CoreError, CoreErrorKind, PackageRecord, SourceFailure, SourceTag, UpdateRecord,
};
use pacfind_core::orchestration::{Aggregator, CancellationToken, UpdateDiffer};
use pacfind_core::sources::{
    Catalog, InMemoryLocalSource, InMemoryRemoteSource, InMemorySyncSource,
};

fn differ(catalog: Catalog) -> UpdateDiffer {
    UpdateDiffer::new(Arc::new(Aggregator::new(Arc::new(catalog))))
}

#[tokio::test]
async fn newer_sync_version_is_reported_with_its_repository() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[("foo", "1.0")])))
        .with_sync(Arc::new(InMemorySyncSource::new(
            "core",
            vec![PackageRecord::new("foo", "1.2", SourceTag::sync("core")).with_download_size(4096)],
        )));

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        updates,
        vec![UpdateRecord {
            name: "foo".to_string(),
            installed_version: "1.0".to_string(),
            available_version: "1.2".to_string(),
            source: SourceTag::sync("core"),
            download_size: 4096,
        }]
    );
}

#[tokio::test]
async fn identical_or_older_versions_are_not_updates() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[
        ("bash", "5.2.026-2"),
        ("linux", "6.10.1.arch1-1"),
    ])))
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "core",
        &[("bash", "5.2.026-2"), ("linux", "6.9.7.arch1-1")],
    )));

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert!(updates.is_empty());
}

#[tokio::test]
async fn epoch_bump_counts_as_newer() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[(
        "zlib", "1.3.1-1",
    )])))
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "core",
        &[("zlib", "1:1.3.1-2")],
    )));

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].available_version, "1:1.3.1-2");
}

#[tokio::test]
async fn output_is_sorted_and_combines_both_branches() {
    let remote = Arc::new(
        InMemoryRemoteSource::from_versions(&[
            ("yay", "12.4.2-1"),
            ("paru", "2.0.3-1"),
            ("broken-aur", "1.0-1"),
        ])
        .with_failing_lookup("broken-aur"),
    );
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[
        ("zsh", "5.9-4"),
        ("yay", "12.3.5-1"),
        ("paru", "2.0.3-1"),
        ("broken-aur", "0.9-1"),
        ("acl", "2.3.1-3"),
    ])))
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "core",
        &[("acl", "2.3.2-1")],
    )))
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "extra",
        &[("zsh", "5.9-5")],
    )))
    .with_remote(remote.clone());

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    let summary: Vec<(&str, &SourceTag)> = updates
        .iter()
        .map(|update| (update.name.as_str(), &update.source))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("acl", &SourceTag::sync("core")),
            ("yay", &SourceTag::Remote),
            ("zsh", &SourceTag::sync("extra")),
        ]
    );
    assert_eq!(updates[1].download_size, 0);
    // Only the three foreign packages were looked up remotely.
    assert_eq!(remote.lookup_calls(), 3);
}

#[tokio::test]
async fn unavailable_local_database_fails_the_operation() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::unavailable("local db missing")));

    let error = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::SourceUnavailable);
    assert_eq!(error.origin, Some(SourceTag::Local));
}

#[tokio::test]
async fn unavailable_repository_does_not_turn_packages_foreign() {
    let remote = Arc::new(InMemoryRemoteSource::from_versions(&[("glibc", "99.0-1")]));
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[(
        "glibc", "2.39-4",
    )])))
    .with_sync(Arc::new(InMemorySyncSource::unavailable("core", "corrupt")))
    .with_remote(remote.clone());

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert_eq!(remote.lookup_calls(), 0);
}

#[tokio::test]
async fn unregistered_repository_does_not_turn_packages_foreign() {
    let remote = Arc::new(InMemoryRemoteSource::from_versions(&[("glibc", "99.0-1")]));
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[(
        "glibc", "2.39-4",
    )])))
    .with_registration_failure(SourceFailure {
        source: SourceTag::sync("core"),
        error: CoreError::new(CoreErrorKind::SourceUnavailable, "core.db not found"),
    })
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "extra",
        &[("firefox", "127.0.2-1")],
    )))
    .with_remote(remote.clone());

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert_eq!(remote.lookup_calls(), 0);
}

#[tokio::test]
async fn newest_sync_version_wins_across_repositories() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[(
        "foo", "1.0-1",
    )])))
    .with_sync(Arc::new(InMemorySyncSource::from_versions(
        "core",
        &[("foo", "1.0-1")],
    )))
    .with_sync(Arc::new(
        InMemorySyncSource::new(
            "extra",
            vec![PackageRecord::new("foo", "2.0-1", SourceTag::sync("extra")).with_download_size(512)],
        ),
    ));

    let updates = differ(catalog)
        .compute_updates(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        updates,
        vec![UpdateRecord {
            name: "foo".to_string(),
            installed_version: "1.0-1".to_string(),
            available_version: "2.0-1".to_string(),
            source: SourceTag::sync("extra"),
            download_size: 512,
        }]
    );
}

#[tokio::test]
async fn cancellation_yields_cancelled_error() {
    let catalog = Catalog::new(Arc::new(InMemoryLocalSource::from_versions(&[
        ("a", "1"),
        ("b", "1"),
    ])))
    .with_sync(Arc::new(
        InMemorySyncSource::from_versions("core", &[("a", "2"), ("b", "2")])
            .with_delay(Duration::from_millis(500)),
    ));
    let differ = differ(catalog);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let error = differ.compute_updates(&token).await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Cancelled);
}
