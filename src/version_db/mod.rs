// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Version Database: a durable mapping repo -> current version and
//! history, polymorphic over three backends (spec §4.3).
//!
//! The Python original expresses this through duck-typing; here it is
//! an interface with three concrete implementations selected at
//! construction by an enum tag derived from configuration precedence
//! (spec §9, "Polymorphism over storage").

pub mod artifactory;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::Config;
use crate::error::CoreError;
use crate::model::{HistoryEntry, RepoKey, VersionDbDocument, VersionRecord};

/// Which concrete backend produced a given document; recorded in
/// `DbMetadata::storage` and used to pick the active backend (spec §6,
/// "Backend selection precedence").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    S3,
    Artifactory,
}

impl BackendKind {
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::S3 => "s3",
            BackendKind::Artifactory => "artifactory",
        }
    }
}

/// Common contract implemented by every backend (spec §4.3).
#[async_trait]
pub trait VersionDatabase: Send + Sync {
    async fn load(&self) -> Result<VersionDbDocument, CoreError>;
    async fn save(&self, document: &VersionDbDocument) -> Result<(), CoreError>;

    async fn get_current_version(&self, repo: &RepoKey) -> Result<Option<String>, CoreError> {
        let document = self.load().await?;
        Ok(document.get(repo).map(|r| r.current_version.clone()))
    }

    /// Append to history (trimmed to `keep_versions`), set
    /// `current_version`, update timestamps. Atomic with respect to
    /// other callers within this process.
    async fn update_version(
        &self,
        repo: &RepoKey,
        version: &str,
        asset_count: u32,
        total_bytes: u64,
        keep_versions: u32,
    ) -> Result<(), CoreError> {
        let mut document = self.load().await?;
        let now = Utc::now();
        let key = repo.to_string();

        let entry = HistoryEntry {
            version: version.to_string(),
            timestamp: now,
            asset_count,
            total_bytes,
        };

        let record = document
            .repositories
            .entry(key)
            .or_insert_with(|| VersionRecord {
                repo: repo.clone(),
                current_version: version.to_string(),
                created_at: now,
                last_updated: now,
                download_history: vec![],
            });

        record.download_history.push(entry);
        let keep = keep_versions.max(1) as usize;
        if record.download_history.len() > keep {
            let drop = record.download_history.len() - keep;
            record.download_history.drain(0..drop);
        }
        record.current_version = version.to_string();
        record.last_updated = now;

        document.metadata.last_updated = now;

        self.save(&document).await
    }
}

/// Select the single active backend per the precedence rule in spec
/// §6: env-indicated object-store/artifact-repo credentials first,
/// then `artifactory_storage.enabled`, then `s3_storage.enabled`,
/// then local file.
pub fn resolve_backend(config: &Config) -> Result<Box<dyn VersionDatabase>, CoreError> {
    let env_indicates_s3 =
        std::env::var("AWS_ACCESS_KEY_ID").is_ok() || std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();
    let env_indicates_artifactory =
        std::env::var("ARTIFACTORY_API_KEY").is_ok() || std::env::var("ARTIFACTORY_USERNAME").is_ok();

    if env_indicates_artifactory || config.download.artifactory_storage.enabled {
        return artifactory::ArtifactoryBackend::from_config(config).map(|b| Box::new(b) as _);
    }

    if env_indicates_s3 || config.download.s3_storage.enabled {
        return s3::S3Backend::from_config(config).map(|b| Box::new(b) as _);
    }

    let path = config
        .download
        .version_db
        .clone()
        .unwrap_or_else(|| "version_db.json".to_string());
    Ok(Box::new(local::LocalFileBackend::new(path)))
}
