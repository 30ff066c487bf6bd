// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The structured configuration object (spec §1, §6). Loaded from a
//! TOML file; credential values come from the environment, never from
//! the file itself, so they never land in version control.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

fn default_rate_limit_delay() -> f64 {
    1.0
}

fn default_max_releases_per_repo() -> u32 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_keep_versions() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,
    #[serde(default = "default_max_releases_per_repo")]
    pub max_releases_per_repo: u32,
    #[serde(default)]
    pub include_prereleases: bool,
    /// Per-request timeout for calls to the upstream hosting API,
    /// distinct from `download.timeout`'s per-asset-download timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate_limit_delay: default_rate_limit_delay(),
            max_releases_per_repo: default_max_releases_per_repo(),
            include_prereleases: false,
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArchivePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// "tarball" or "zipball"
    #[serde(default = "default_prefer")]
    pub prefer: String,
    #[serde(default)]
    pub fallback_only: bool,
}

fn default_prefer() -> String {
    "tarball".to_string()
}

impl Default for SourceArchivePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            prefer: default_prefer(),
            fallback_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactoryStorageConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: Option<String>,
    pub repository: Option<String>,
    pub path_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

/// Per-repository override of any download setting, plus the
/// target-version pin (spec §4.7, decision step 1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepositoryOverride {
    pub target_version: Option<String>,
    pub include_prereleases: Option<bool>,
    pub strict_prerelease_filtering: Option<bool>,
    pub asset_patterns: Option<Vec<String>>,
    pub source_archives: Option<SourceArchivePolicy>,
    pub keep_versions: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub enabled: bool,
    pub directory: String,
    #[serde(default)]
    pub version_db: Option<String>,
    #[serde(default)]
    pub asset_patterns: Vec<String>,
    #[serde(default)]
    pub include_prereleases: bool,
    #[serde(default)]
    pub strict_prerelease_filtering: bool,
    #[serde(default)]
    pub source_archives: SourceArchivePolicy,
    #[serde(default = "default_true")]
    pub verify_downloads: bool,
    #[serde(default)]
    pub cleanup_old_versions: bool,
    #[serde(default = "default_keep_versions")]
    pub keep_versions: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_repositories: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_assets: u32,
    #[serde(default)]
    pub repository_overrides: HashMap<String, RepositoryOverride>,
    #[serde(default)]
    pub s3_storage: S3StorageConfig,
    #[serde(default)]
    pub artifactory_storage: ArtifactoryStorageConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "downloads".to_string(),
            version_db: None,
            asset_patterns: vec![],
            include_prereleases: false,
            strict_prerelease_filtering: false,
            source_archives: SourceArchivePolicy::default(),
            verify_downloads: true,
            cleanup_old_versions: false,
            keep_versions: default_keep_versions(),
            timeout: default_timeout_secs(),
            max_concurrent_repositories: default_max_concurrent(),
            max_concurrent_assets: default_max_concurrent(),
            repository_overrides: HashMap::new(),
            s3_storage: S3StorageConfig::default(),
            artifactory_storage: ArtifactoryStorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        toml::from_str(raw).map_err(|e| CoreError::ConfigInvalid(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::ConfigInvalid(format!("reading {:?}: {}", path.as_ref(), e)))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.repositories.is_empty() {
            return Err(CoreError::ConfigInvalid(
                "repositories[] must not be empty".to_string(),
            ));
        }
        for r in &self.repositories {
            if r.owner.is_empty() || r.repo.is_empty() {
                return Err(CoreError::ConfigInvalid(format!(
                    "repository entry {:?}/{:?} has an empty owner or repo",
                    r.owner, r.repo
                )));
            }
        }
        Ok(())
    }

    /// Effective `include_prereleases` for a given repository: the
    /// per-repo override, else `download.include_prereleases`.
    pub fn effective_include_prereleases(&self, key: &str) -> bool {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.include_prereleases)
            .unwrap_or(self.download.include_prereleases)
    }

    pub fn effective_strict_prerelease_filtering(&self, key: &str) -> bool {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.strict_prerelease_filtering)
            .unwrap_or(self.download.strict_prerelease_filtering)
    }

    pub fn effective_asset_patterns(&self, key: &str) -> Vec<String> {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.asset_patterns.clone())
            .unwrap_or_else(|| self.download.asset_patterns.clone())
    }

    pub fn effective_source_archives(&self, key: &str) -> SourceArchivePolicy {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.source_archives.clone())
            .unwrap_or_else(|| self.download.source_archives.clone())
    }

    pub fn effective_keep_versions(&self, key: &str) -> u32 {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.keep_versions)
            .unwrap_or(self.download.keep_versions)
    }

    pub fn target_version(&self, key: &str) -> Option<String> {
        self.download
            .repository_overrides
            .get(key)
            .and_then(|o| o.target_version.clone())
    }
}

/// Read an upstream hosting credential from the environment. Never
/// logged or echoed back; the spec requires secrets never appear in
/// reports (spec §5, §7).
pub fn read_credential(env_var: &str) -> Result<String, CoreError> {
    std::env::var(env_var)
        .map_err(|_| CoreError::CredentialMissing(format!("environment variable {env_var} is not set")))
}
