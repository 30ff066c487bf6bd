// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios from spec §8, driven through
//! `Coordinator::run_from_monitor_output` so no live upstream API is
//! needed -- only the asset/source-archive URLs are served, by a local
//! `wiremock` server.

use std::sync::Arc;

use chrono::Utc;
use release_tracker::config::{Config, DownloadConfig, RepositoryConfig, S3StorageConfig, Settings};
use release_tracker::model::{Asset, DecisionStatus, Release, RepoKey};
use release_tracker::version_db::local::LocalFileBackend;
use release_tracker::version_db::VersionDatabase;
use release_tracker::Coordinator;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_config(download_dir: &std::path::Path, version_db_path: &std::path::Path) -> Config {
    Config {
        repositories: vec![RepositoryConfig {
            owner: "kubernetes".to_string(),
            repo: "kubernetes".to_string(),
            description: None,
        }],
        settings: Settings::default(),
        download: DownloadConfig {
            directory: download_dir.display().to_string(),
            version_db: Some(version_db_path.display().to_string()),
            ..DownloadConfig::default()
        },
    }
}

fn release_with_asset(tag: &str, prerelease: bool, url: String, digest: Option<String>) -> Release {
    Release {
        repo: RepoKey::new("kubernetes", "kubernetes"),
        tag: tag.to_string(),
        name: tag.to_string(),
        published_at: Utc::now(),
        draft: false,
        prerelease,
        html_url: "https://example.test/releases/1".to_string(),
        tarball_url: Some("https://example.test/tarball".to_string()),
        zipball_url: Some("https://example.test/zipball".to_string()),
        assets: vec![Asset {
            name: "kubernetes-server-linux-amd64.tar.gz".to_string(),
            download_url: url,
            size: 100,
            content_type: Some("application/gzip".to_string()),
            digest,
        }],
    }
}

async fn make_coordinator(config: Config) -> (Coordinator, Arc<LocalFileBackend>) {
    let db_path = config.download.version_db.clone().unwrap();
    let db = Arc::new(LocalFileBackend::new(db_path));
    let coordinator = Coordinator::new(config, None, db.clone() as Arc<dyn VersionDatabase>).unwrap();
    (coordinator, db)
}

#[tokio::test]
async fn scenario_1_first_discovery_downloads_and_records_version() {
    let server = MockServer::start().await;
    let payload = vec![0u8; 100];

    Mock::given(method("GET"))
        .and(path("/asset.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];

    let (coordinator, db) = make_coordinator(config).await;

    let release = release_with_asset(
        "v1.2.3",
        false,
        format!("{}/asset.tar.gz", server.uri()),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, DecisionStatus::Downloaded);

    let expected_path = download_dir
        .path()
        .join("kubernetes_kubernetes/v1.2.3/kubernetes-server-linux-amd64.tar.gz");
    assert!(expected_path.exists());
    let sidecar = format!("{}.sha256", expected_path.display());
    assert!(std::path::Path::new(&sidecar).exists());

    let repo = RepoKey::new("kubernetes", "kubernetes");
    assert_eq!(
        db.get_current_version(&repo).await.unwrap(),
        Some("v1.2.3".to_string())
    );
}

#[tokio::test]
async fn scenario_2_no_new_release_is_skipped_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asset.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];

    let (coordinator, db) = make_coordinator(config).await;
    let repo = RepoKey::new("kubernetes", "kubernetes");
    db.update_version(&repo, "v1.2.3", 1, 100, 5).await.unwrap();

    let release = release_with_asset(
        "v1.2.3",
        false,
        format!("{}/asset.tar.gz", server.uri()),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::SkippedVersion);
    assert_eq!(report.downloaded_count(), 0);
    assert_eq!(
        db.get_current_version(&repo).await.unwrap(),
        Some("v1.2.3".to_string())
    );
}

#[tokio::test]
async fn scenario_3_prerelease_excluded_by_default() {
    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];
    config.download.include_prereleases = false;

    let (coordinator, db) = make_coordinator(config).await;

    let release = release_with_asset(
        "v1.3.0-rc.1",
        true,
        "https://example.test/unreachable.tar.gz".to_string(),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::SkippedPrerelease);
    let repo = RepoKey::new("kubernetes", "kubernetes");
    assert_eq!(db.get_current_version(&repo).await.unwrap(), None);
}

#[tokio::test]
async fn scenario_4_strict_filter_catches_mislabeled_prerelease_tag() {
    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];
    config.download.include_prereleases = false;
    config.download.strict_prerelease_filtering = true;

    let (coordinator, _db) = make_coordinator(config).await;

    // prerelease flag is false but the tag itself carries "beta".
    let release = release_with_asset(
        "v3.21.0-beta.0",
        false,
        "https://example.test/unreachable.tar.gz".to_string(),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::SkippedPrerelease);
}

#[tokio::test]
async fn scenario_5_pinned_target_version_rejects_other_tags() {
    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];

    let mut overrides = std::collections::HashMap::new();
    overrides.insert(
        "kubernetes/kubernetes".to_string(),
        release_tracker::config::RepositoryOverride {
            target_version: Some("v3.19.1".to_string()),
            ..Default::default()
        },
    );
    config.download.repository_overrides = overrides;

    let (coordinator, _db) = make_coordinator(config).await;

    let release = release_with_asset(
        "v3.20.0",
        false,
        "https://example.test/unreachable.tar.gz".to_string(),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::SkippedPattern);
}

#[tokio::test]
async fn scenario_6_falls_back_to_source_archive_when_no_asset_matches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tarball"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 50]))
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    // Asset pattern that will never match the fixture asset name below.
    config.download.asset_patterns = vec!["*.msi".to_string()];
    config.download.source_archives = release_tracker::config::SourceArchivePolicy {
        enabled: true,
        prefer: "tarball".to_string(),
        fallback_only: true,
    };

    let (coordinator, db) = make_coordinator(config).await;

    let mut release = release_with_asset(
        "v1.0.0",
        false,
        "https://example.test/unreachable.tar.gz".to_string(),
        None,
    );
    release.tarball_url = Some(format!("{}/tarball", server.uri()));

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::Downloaded);

    let expected_path = download_dir
        .path()
        .join("kubernetes_kubernetes/v1.0.0/kubernetes_kubernetes-v1.0.0.tar.gz");
    assert!(expected_path.exists());

    let repo = RepoKey::new("kubernetes", "kubernetes");
    assert_eq!(
        db.get_current_version(&repo).await.unwrap(),
        Some("v1.0.0".to_string())
    );
}

#[tokio::test]
async fn empty_plan_with_source_archives_disabled_is_skipped_pattern() {
    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.msi".to_string()];
    config.download.source_archives.enabled = false;

    let (coordinator, _db) = make_coordinator(config).await;

    let release = release_with_asset(
        "v1.0.0",
        false,
        "https://example.test/unreachable.tar.gz".to_string(),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::SkippedPattern);
}

#[tokio::test]
async fn re_running_after_deleting_a_downloaded_file_redownloads_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asset.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];

    let (coordinator, db) = make_coordinator(config).await;
    let repo = RepoKey::new("kubernetes", "kubernetes");

    let release = release_with_asset(
        "v1.2.3",
        false,
        format!("{}/asset.tar.gz", server.uri()),
        None,
    );

    // First run downloads and commits v1.2.3.
    coordinator
        .run_from_monitor_output(vec![release.clone()], CancellationToken::new())
        .await
        .unwrap();

    let asset_path = download_dir
        .path()
        .join("kubernetes_kubernetes/v1.2.3/kubernetes-server-linux-amd64.tar.gz");
    assert!(asset_path.exists());
    std::fs::remove_file(&asset_path).unwrap();

    // Re-running after bumping the target pin to force newness is out
    // of scope here; instead directly exercise the downloader's
    // "re-download a missing file" path by re-invoking with the same
    // release against a fresh, unrecorded baseline.
    let fresh_db_dir = tempfile::tempdir().unwrap();
    let mut fresh_config = base_config(download_dir.path(), &fresh_db_dir.path().join("db.json"));
    fresh_config.download.asset_patterns = vec!["*.tar.gz".to_string()];
    let (fresh_coordinator, fresh_db) = make_coordinator(fresh_config).await;

    fresh_coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert!(asset_path.exists());
    assert_eq!(
        fresh_db.get_current_version(&repo).await.unwrap(),
        Some("v1.2.3".to_string())
    );
}

#[tokio::test]
async fn sync_uploads_downloaded_files_when_s3_storage_is_enabled() {
    // Safe: this test runs single-threaded with respect to these two
    // variables and always restores process state via `tempfile`'s
    // drop-based cleanup of everything else.
    unsafe {
        std::env::set_var("AWS_ACCESS_KEY_ID", "test-key");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "test-secret");
    }

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/asset.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let db_dir = tempfile::tempdir().unwrap();
    let mut config = base_config(download_dir.path(), &db_dir.path().join("db.json"));
    config.download.asset_patterns = vec!["*.tar.gz".to_string()];
    config.download.s3_storage = S3StorageConfig {
        enabled: true,
        bucket: Some("test-bucket".to_string()),
        prefix: Some("artifacts".to_string()),
        region: Some("us-east-1".to_string()),
        endpoint: Some(server.uri()),
        verify_ssl: true,
    };

    let (coordinator, _db) = make_coordinator(config).await;

    let release = release_with_asset(
        "v1.2.3",
        false,
        format!("{}/asset.tar.gz", server.uri()),
        None,
    );

    let report = coordinator
        .run_from_monitor_output(vec![release], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, DecisionStatus::Downloaded);

    // Dropping `server` here runs wiremock's expectation check, proving
    // the uploader actually issued the PUT.
    drop(server);
}
