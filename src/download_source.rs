// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Source tarball/zipball fallback download (spec §4.6). Same retry
//! and destination-path shape as the Asset Downloader, but no
//! provider-reported digest exists, so verification is limited to
//! comparing declared Content-Length against bytes written.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::CoreError;
use crate::model::{RepoKey, StoredFile};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tarball,
    Zipball,
}

impl ArchiveKind {
    fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Tarball => "tar.gz",
            ArchiveKind::Zipball => "zip",
        }
    }

    pub fn parse(prefer: &str) -> Self {
        match prefer {
            "zipball" | "zip" => ArchiveKind::Zipball,
            _ => ArchiveKind::Tarball,
        }
    }
}

/// Synthesized name: `<owner>_<repo>-<tag>.tar.gz` / `.zip` (spec §4.6).
pub fn archive_file_name(repo: &RepoKey, tag: &str, kind: ArchiveKind) -> String {
    format!("{}-{}.{}", repo.path_segment(), tag, kind.extension())
}

pub fn destination_path(
    destination_dir: &Path,
    repo: &RepoKey,
    tag: &str,
    kind: ArchiveKind,
) -> PathBuf {
    destination_dir
        .join(repo.path_segment())
        .join(tag)
        .join(archive_file_name(repo, tag, kind))
}

pub async fn download_source_archive(
    client: &Client,
    token: Option<&str>,
    url: &str,
    repo: &RepoKey,
    tag: &str,
    kind: ArchiveKind,
    destination_dir: &Path,
    timeout: Duration,
) -> Result<StoredFile, CoreError> {
    let final_path = destination_path(destination_dir, repo, tag, kind);

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::StorageUnavailable(format!("creating {parent:?}: {e}")))?;
    }

    let mut attempt = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        attempt += 1;
        match try_once(client, token, url, &final_path, timeout).await {
            Ok(stored) => return Ok(stored),
            Err(err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                warn!(attempt, %url, "source archive download failed: {}", err);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

async fn try_once(
    client: &Client,
    token: Option<&str>,
    url: &str,
    final_path: &Path,
    timeout: Duration,
) -> Result<StoredFile, CoreError> {
    let mut temp_name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(".part");
    let temp_path = final_path.with_file_name(temp_name);

    let result = async {
        let mut request = client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!(
                "source archive download returned {}",
                response.status()
            )));
        }

        let declared_len = response.content_length();

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let mut hasher = sha2::Sha256::new();
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::Transient(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
            sha2::Digest::update(&mut hasher, &chunk);
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        if let Some(declared) = declared_len {
            if declared != written {
                return Err(CoreError::VerificationMismatch(format!(
                    "source archive: declared Content-Length {declared}, wrote {written}"
                )));
            }
        }

        let digest = hex::encode(sha2::Digest::finalize(hasher));

        fs::rename(&temp_path, final_path)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let sidecar_path = format!("{}.sha256", final_path.display());
        fs::write(&sidecar_path, format!("{digest}\n"))
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        Ok(StoredFile {
            path: final_path.display().to_string(),
            size: written,
            sha256: digest,
        })
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_name_uses_owner_underscore_repo_dash_tag() {
        let repo = RepoKey::new("kubernetes", "kubernetes");
        assert_eq!(
            archive_file_name(&repo, "v1.2.3", ArchiveKind::Tarball),
            "kubernetes_kubernetes-v1.2.3.tar.gz"
        );
        assert_eq!(
            archive_file_name(&repo, "v1.2.3", ArchiveKind::Zipball),
            "kubernetes_kubernetes-v1.2.3.zip"
        );
    }
}
