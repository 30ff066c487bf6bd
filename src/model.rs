// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Domain types shared by every component: repository identity,
//! release descriptors, and the version database document (spec §3).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(owner, repo)`, the key under which every domain entity is tracked.
/// Canonical string form is `"owner/repo"`; comparison is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Directory-safe form used for the on-disk layout: `<owner>_<repo>`.
    pub fn path_segment(&self) -> String {
        format!("{}_{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("repository key {:?} is not \"owner/repo\"", s))?;

        if owner.is_empty() || repo.is_empty() {
            anyhow::bail!("repository key {:?} has an empty owner or repo", s);
        }

        Ok(Self::new(owner, repo))
    }
}

impl Serialize for RepoKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RepoKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RepoKey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A single file attached to a release by its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// Provider-reported digest, when the hosting API supplies one.
    pub digest: Option<String>,
}

/// Immutable snapshot of an upstream tagged release, as produced by
/// the Upstream API Client (spec §4.4) and consumed by the Download
/// Coordinator (spec §4.7). Release descriptors are never mutated
/// within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub repo: RepoKey,
    pub tag: String,
    pub name: String,
    pub published_at: DateTime<Utc>,
    pub draft: bool,
    pub prerelease: bool,
    pub html_url: String,
    pub tarball_url: Option<String>,
    pub zipball_url: Option<String>,
    pub assets: Vec<Asset>,
}

/// One entry in a Version record's bounded download history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub asset_count: u32,
    pub total_bytes: u64,
}

/// The per-repository row in the Version Database: the last
/// successfully downloaded release and a bounded trail of prior ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub repo: RepoKey,
    pub current_version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub download_history: Vec<HistoryEntry>,
}

/// Schema version written by every backend; never changes unless the
/// on-disk document shape changes.
pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMetadata {
    #[serde(rename = "version")]
    pub schema_version: String,
    pub storage: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// The full persisted document of the Version Database (spec §3, §6).
/// `repositories` is a `HashMap`: the spec states the mapping
/// "preserves no ordering", so an ordered map would be a false promise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDbDocument {
    pub metadata: DbMetadata,
    pub repositories: HashMap<String, VersionRecord>,
}

impl VersionDbDocument {
    pub fn empty(storage_tag: &str) -> Self {
        let now = Utc::now();
        Self {
            metadata: DbMetadata {
                schema_version: SCHEMA_VERSION.to_string(),
                storage: storage_tag.to_string(),
                created_at: now,
                last_updated: now,
            },
            repositories: HashMap::new(),
        }
    }

    pub fn get(&self, key: &RepoKey) -> Option<&VersionRecord> {
        self.repositories.get(&key.to_string())
    }
}

/// The artifact passed between discovery and download when they run
/// as separate jobs (spec §3, "Monitor output document").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorOutput {
    pub timestamp: DateTime<Utc>,
    pub total_repositories_checked: u32,
    pub new_releases_found: u32,
    pub releases: Vec<Release>,
}

/// The outcome of applying the decision procedure (spec §4.7) to one
/// release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Downloaded,
    SkippedVersion,
    SkippedPrerelease,
    SkippedPattern,
    Failed,
}

/// A file written to the download directory and, when applicable, the
/// durable artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

/// Per-release result recorded in the run report (spec §3, §4.7 "Reporting").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub repo: RepoKey,
    pub tag: Option<String>,
    pub status: DecisionStatus,
    pub reason: String,
    pub files: Vec<StoredFile>,
}

/// The full result of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<DownloadOutcome>,
}

impl RunReport {
    pub fn downloaded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DecisionStatus::Downloaded)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DecisionStatus::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_key_round_trips_through_display_and_parse() {
        let key = RepoKey::new("kubernetes", "kubernetes");
        assert_eq!(key.to_string(), "kubernetes/kubernetes");
        assert_eq!(RepoKey::from_str("kubernetes/kubernetes").unwrap(), key);
    }

    #[test]
    fn repo_key_path_segment_uses_underscore() {
        let key = RepoKey::new("kubernetes", "kubernetes");
        assert_eq!(key.path_segment(), "kubernetes_kubernetes");
    }

    #[test]
    fn repo_key_rejects_missing_slash() {
        assert!(RepoKey::from_str("kubernetes").is_err());
    }

    #[test]
    fn repo_key_rejects_empty_components() {
        assert!(RepoKey::from_str("/kubernetes").is_err());
        assert!(RepoKey::from_str("kubernetes/").is_err());
    }

    #[test]
    fn empty_document_carries_schema_version_two() {
        let doc = VersionDbDocument::empty("local");
        assert_eq!(doc.metadata.schema_version, "2.0");
        assert!(doc.repositories.is_empty());
    }
}
