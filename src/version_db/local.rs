// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local file backend (spec §4.3.1): a single JSON file, written via a
//! sibling temporary file and renamed over the target so readers never
//! observe a partial write.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{BackendKind, VersionDatabase};
use crate::error::CoreError;
use crate::model::VersionDbDocument;

pub struct LocalFileBackend {
    path: PathBuf,
}

impl LocalFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VersionDatabase for LocalFileBackend {
    async fn load(&self) -> Result<VersionDbDocument, CoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::StorageCorrupt(format!("{:?}: {}", self.path, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(VersionDbDocument::empty(BackendKind::Local.tag()))
            }
            Err(e) => Err(CoreError::StorageUnavailable(format!(
                "{:?}: {}",
                self.path, e
            ))),
        }
    }

    async fn save(&self, document: &VersionDbDocument) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
            }
        }

        let serialized = serde_json::to_vec_pretty(document)
            .map_err(|e| CoreError::StorageCorrupt(e.to_string()))?;

        let mut temp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, &serialized)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoKey;

    #[tokio::test]
    async fn load_on_fresh_store_returns_empty_document_with_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFileBackend::new(dir.path().join("version_db.json"));
        let document = backend.load().await.unwrap();
        assert_eq!(document.metadata.schema_version, "2.0");
        assert_eq!(document.metadata.storage, "local");
        assert!(document.repositories.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFileBackend::new(dir.path().join("version_db.json"));
        let repo = RepoKey::new("kubernetes", "kubernetes");

        backend
            .update_version(&repo, "v1.2.3", 1, 100, 5)
            .await
            .unwrap();

        let reloaded = backend.load().await.unwrap();
        assert_eq!(
            reloaded.get(&repo).unwrap().current_version,
            "v1.2.3".to_string()
        );
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_as_storage_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version_db.json");
        fs::write(&path, b"not json").await.unwrap();
        let backend = LocalFileBackend::new(path);

        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, CoreError::StorageCorrupt(_)));
    }
}
