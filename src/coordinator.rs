// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Download Coordinator (spec §4.7): applies the decision
//! procedure to each discovered release, dispatches to the asset and
//! source-archive downloaders, and commits to the Version Database
//! only once every planned item has succeeded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::api_client::ApiClient;
use crate::config::Config;
use crate::download_asset;
use crate::download_source::{self, ArchiveKind};
use crate::error::CoreError;
use crate::model::{DecisionStatus, DownloadOutcome, Release, RepoKey, RunReport, StoredFile};
use crate::pattern;
use crate::uploader;
use crate::version;
use crate::version_db::{self, VersionDatabase};

/// One planned item for a release: either a named asset or the
/// repository's source archive.
enum PlanItem<'a> {
    Asset(&'a crate::model::Asset),
    SourceArchive { url: String, kind: ArchiveKind },
}

pub struct Coordinator {
    config: Config,
    client: Client,
    token: Option<String>,
    db: Arc<dyn VersionDatabase>,
}

impl Coordinator {
    pub fn new(config: Config, token: Option<String>, db: Arc<dyn VersionDatabase>) -> Result<Self, CoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| CoreError::ConfigInvalid(format!("building HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            token,
            db,
        })
    }

    /// Run the coordinator against a monitor-output document produced
    /// by an earlier discovery job, rather than calling the upstream
    /// API directly.
    pub async fn run_from_monitor_output(
        &self,
        releases: Vec<Release>,
        cancel: CancellationToken,
    ) -> Result<RunReport, CoreError> {
        self.run_inner(releases, cancel).await
    }

    /// Discover the latest release for every configured repository,
    /// without running the decision procedure or touching the
    /// downloaders (spec §4.7 step 2, "obtain a Release descriptor...
    /// by live call"). This is what a discovery-only job runs to
    /// produce the monitor-output document.
    #[instrument(skip(self, cancel))]
    pub async fn discover_live(&self, cancel: CancellationToken) -> Result<Vec<Release>, CoreError> {
        let rate_limit_delay =
            Duration::from_secs_f64(self.config.settings.rate_limit_delay.max(0.0));
        let request_timeout = Duration::from_secs(self.config.settings.request_timeout);
        let api = ApiClient::new(self.token.clone(), rate_limit_delay, request_timeout)?;

        let mut releases = Vec::new();
        for repo_config in &self.config.repositories {
            if cancel.is_cancelled() {
                break;
            }
            let key = RepoKey::new(&repo_config.owner, &repo_config.repo);
            let include_prereleases = self.config.effective_include_prereleases(&key.to_string());

            match api.latest_release(&key, include_prereleases).await {
                Ok(Some(release)) => releases.push(release),
                Ok(None) => info!(repo = %key, "no releases found upstream"),
                Err(err) => warn!(repo = %key, "discovery failed: {}", err),
            }
        }

        Ok(releases)
    }

    /// Discover the latest release for every configured repository
    /// live, then run the full decision-procedure-and-download pipeline.
    pub async fn run_live(&self, cancel: CancellationToken) -> Result<RunReport, CoreError> {
        let releases = self.discover_live(cancel.clone()).await?;
        self.run_inner(releases, cancel).await
    }

    async fn run_inner(
        &self,
        releases: Vec<Release>,
        cancel: CancellationToken,
    ) -> Result<RunReport, CoreError> {
        let started_at = Utc::now();

        // Version-database load failure is fatal (spec §4.7,
        // "Failure semantics"): without a baseline the coordinator
        // cannot distinguish new from old.
        self.db.load().await?;

        let repo_semaphore = Arc::new(Semaphore::new(
            self.config.download.max_concurrent_repositories.max(1) as usize,
        ));
        let asset_semaphore = Arc::new(Semaphore::new(
            self.config.download.max_concurrent_assets.max(1) as usize,
        ));

        let mut joins = JoinSet::new();

        for release in releases {
            if cancel.is_cancelled() {
                break;
            }

            let config = self.config.clone();
            let client = self.client.clone();
            let token = self.token.clone();
            let db = Arc::clone(&self.db);
            let repo_semaphore = Arc::clone(&repo_semaphore);
            let asset_semaphore = Arc::clone(&asset_semaphore);
            let cancel = cancel.clone();

            joins.spawn(async move {
                let _permit = repo_semaphore.acquire_owned().await.ok();
                process_release(&config, &client, token.as_deref(), db, &asset_semaphore, release, cancel)
                    .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = joins.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => warn!("repository task panicked: {}", join_err),
            }
        }

        if self.config.download.s3_storage.enabled {
            self.upload_artifacts(&outcomes).await;
        }

        if self.config.download.cleanup_old_versions {
            for outcome in outcomes.iter().filter(|o| o.status == DecisionStatus::Downloaded) {
                self.cleanup_old_versions(&outcome.repo).await;
            }
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        })
    }

    /// Mirror each successfully downloaded release's files to the
    /// configured object store (spec §4.8). Best-effort: a failure here
    /// never fails the run, since the files already landed on disk.
    async fn upload_artifacts(&self, outcomes: &[DownloadOutcome]) {
        let settings = &self.config.download.s3_storage;
        let Some(bucket) = settings.bucket.clone() else {
            warn!("s3_storage.enabled is true but no bucket is configured; skipping upload");
            return;
        };

        let client = version_db::s3::build_client(settings);
        let prefix = settings.prefix.clone().unwrap_or_default();
        let allowlist: Vec<String> = uploader::DEFAULT_EXTENSION_ALLOWLIST
            .iter()
            .map(|s| s.to_string())
            .collect();

        for outcome in outcomes.iter().filter(|o| o.status == DecisionStatus::Downloaded) {
            let Some(tag) = &outcome.tag else { continue };
            let release_dir = PathBuf::from(&self.config.download.directory)
                .join(outcome.repo.path_segment())
                .join(tag);
            let key_prefix = format!(
                "{}/{}/{}",
                prefix.trim_end_matches('/'),
                outcome.repo.path_segment(),
                tag
            );

            let report = uploader::upload_tree(&client, &bucket, &key_prefix, &release_dir, &allowlist).await;
            info!(
                repo = %outcome.repo,
                tag,
                succeeded = report.succeeded,
                failed = report.failed,
                "artifact upload finished"
            );
        }
    }

    async fn cleanup_old_versions(&self, repo: &RepoKey) {
        let keep_versions = self.config.effective_keep_versions(&repo.to_string());
        let repo_dir = PathBuf::from(&self.config.download.directory).join(repo.path_segment());

        let Ok(document) = self.db.load().await else {
            return;
        };
        let Some(record) = document.get(repo).cloned() else {
            return;
        };

        let keep: std::collections::HashSet<&str> = record
            .download_history
            .iter()
            .rev()
            .take(keep_versions.max(1) as usize)
            .map(|h| h.version.as_str())
            .collect();

        let Ok(mut entries) = tokio::fs::read_dir(&repo_dir).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if keep.contains(name) {
                continue;
            }
            // Best-effort: pruning failures log but never fail the run
            // (spec §4.7, "Cleanup").
            if let Err(err) = tokio::fs::remove_dir_all(entry.path()).await {
                warn!(repo = %repo, version = name, "cleanup failed: {}", err);
            }
        }
    }
}

#[instrument(skip(config, client, db, asset_semaphore, cancel), fields(repo = %release.repo, tag = %release.tag))]
async fn process_release(
    config: &Config,
    client: &Client,
    token: Option<&str>,
    db: Arc<dyn VersionDatabase>,
    asset_semaphore: &Semaphore,
    release: Release,
    cancel: CancellationToken,
) -> DownloadOutcome {
    let key = release.repo.to_string();

    macro_rules! skip {
        ($status:expr, $reason:expr) => {
            return DownloadOutcome {
                repo: release.repo.clone(),
                tag: Some(release.tag.clone()),
                status: $status,
                reason: $reason,
                files: vec![],
            }
        };
    }

    // Step 0: drafts are always ineligible (spec §9, open question 2).
    if release.draft {
        skip!(DecisionStatus::SkippedPattern, "release is a draft".to_string());
    }

    // Step 1: target-version pin.
    if let Some(target) = config.target_version(&key) {
        let normalize = |s: &str| s.strip_prefix(['v', 'V']).unwrap_or(s).to_string();
        if normalize(&release.tag) != normalize(&target) {
            skip!(
                DecisionStatus::SkippedPattern,
                format!("pinned to {target}, discovered {}", release.tag)
            );
        }
    }

    // Step 2: prerelease exclusion.
    let include_prereleases = config.effective_include_prereleases(&key);
    if release.prerelease && !include_prereleases {
        skip!(
            DecisionStatus::SkippedPrerelease,
            "release is flagged prerelease".to_string()
        );
    }

    // Step 3: strict prerelease filter against the tag itself.
    if config.effective_strict_prerelease_filtering(&key) && version::is_prerelease(&release.tag) {
        skip!(
            DecisionStatus::SkippedPrerelease,
            format!("tag {} matches a prerelease marker", release.tag)
        );
    }

    // Step 4: version newness.
    let stored = match db.get_current_version(&release.repo).await {
        Ok(v) => v,
        Err(err) => {
            skip!(
                DecisionStatus::Failed,
                format!("loading stored version: {err}")
            )
        }
    };
    if let Some(stored) = &stored {
        if !version::is_newer(&release.tag, stored) {
            skip!(
                DecisionStatus::SkippedVersion,
                format!("{} is not newer than stored {stored}", release.tag)
            );
        }
    }

    // Step 5: downloadable content determination.
    let patterns = config.effective_asset_patterns(&key);
    let matching_assets: Vec<&crate::model::Asset> = release
        .assets
        .iter()
        .filter(|a| pattern::matches(&a.name, &patterns))
        .collect();

    let source_policy = config.effective_source_archives(&key);
    let mut plan: Vec<PlanItem> = matching_assets.iter().map(|a| PlanItem::Asset(a)).collect();

    if plan.is_empty() && source_policy.enabled {
        if let Some(item) = source_plan_item(&release, &source_policy) {
            plan.push(item);
        }
    } else if !plan.is_empty() && source_policy.enabled && !source_policy.fallback_only {
        if let Some(item) = source_plan_item(&release, &source_policy) {
            plan.push(item);
        }
    }

    if plan.is_empty() {
        skip!(
            DecisionStatus::SkippedPattern,
            "no assets matched and no source archive configured".to_string()
        );
    }

    // Step 6: execute plan.
    let timeout = Duration::from_secs(config.download.timeout);
    let destination_dir = PathBuf::from(&config.download.directory);
    let mut stored_files = Vec::new();
    let mut failures = Vec::new();

    for item in plan {
        if cancel.is_cancelled() {
            failures.push("cancelled before plan finished".to_string());
            break;
        }

        let _permit = asset_semaphore.acquire().await.ok();

        let result: Result<StoredFile, CoreError> = match item {
            PlanItem::Asset(asset) => {
                download_asset::download_asset(
                    client,
                    token,
                    asset,
                    &release.repo,
                    &release.tag,
                    &destination_dir,
                    timeout,
                )
                .await
            }
            PlanItem::SourceArchive { url, kind } => {
                download_source::download_source_archive(
                    client,
                    token,
                    &url,
                    &release.repo,
                    &release.tag,
                    kind,
                    &destination_dir,
                    timeout,
                )
                .await
            }
        };

        match result {
            Ok(stored) => stored_files.push(stored),
            Err(err) => failures.push(err.to_string()),
        }
    }

    // Step 7: commit, only if every planned item succeeded.
    if !failures.is_empty() {
        skip!(DecisionStatus::Failed, failures.join("; "));
    }

    let keep_versions = config.effective_keep_versions(&key);
    let total_bytes: u64 = stored_files.iter().map(|f| f.size).sum();
    if let Err(err) = db
        .update_version(
            &release.repo,
            &release.tag,
            stored_files.len() as u32,
            total_bytes,
            keep_versions,
        )
        .await
    {
        // Partial-progress fault (spec §4.7): files remain on disk but
        // the database wasn't updated, so the release is re-detected
        // as new on the next run.
        return DownloadOutcome {
            repo: release.repo.clone(),
            tag: Some(release.tag.clone()),
            status: DecisionStatus::Failed,
            reason: format!("downloaded but failed to commit: {err}"),
            files: stored_files,
        };
    }

    DownloadOutcome {
        repo: release.repo,
        tag: Some(release.tag),
        status: DecisionStatus::Downloaded,
        reason: "downloaded".to_string(),
        files: stored_files,
    }
}

fn source_plan_item<'a>(
    release: &Release,
    policy: &crate::config::SourceArchivePolicy,
) -> Option<PlanItem<'a>> {
    let kind = ArchiveKind::parse(&policy.prefer);
    let url = match kind {
        ArchiveKind::Tarball => release.tarball_url.clone(),
        ArchiveKind::Zipball => release.zipball_url.clone(),
    }?;
    Some(PlanItem::SourceArchive { url, kind })
}
