// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming asset download with checksum verification and retry
//! (spec §4.5).

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::model::{Asset, RepoKey, StoredFile};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Construct `<destination_dir>/<owner>_<repo>/<tag>/<asset_name>`
/// (spec §4.5 step 1, on-disk layout in spec §6).
pub fn destination_path(destination_dir: &Path, repo: &RepoKey, tag: &str, asset_name: &str) -> PathBuf {
    destination_dir
        .join(repo.path_segment())
        .join(tag)
        .join(asset_name)
}

async fn existing_file_matches(path: &Path, asset: &Asset) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };
    if metadata.len() != asset.size {
        return false;
    }
    match &asset.digest {
        Some(expected) => crate::checksum::hash_file(path)
            .await
            .map(|actual| actual.eq_ignore_ascii_case(expected))
            .unwrap_or(false),
        None => true,
    }
}

/// Download one asset, verifying size (and digest, when the provider
/// supplied one) and writing a `.sha256` sidecar next to the file.
#[instrument(skip(client, asset), fields(asset = %asset.name))]
pub async fn download_asset(
    client: &Client,
    token: Option<&str>,
    asset: &Asset,
    repo: &RepoKey,
    tag: &str,
    destination_dir: &Path,
    timeout: Duration,
) -> Result<StoredFile, CoreError> {
    let final_path = destination_path(destination_dir, repo, tag, &asset.name);

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::StorageUnavailable(format!("creating {parent:?}: {e}")))?;
    }

    if existing_file_matches(&final_path, asset).await {
        let digest = crate::checksum::hash_file(&final_path)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        return Ok(StoredFile {
            path: final_path.display().to_string(),
            size: asset.size,
            sha256: digest,
        });
    }

    let mut attempt = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        attempt += 1;

        match try_download_once(client, token, asset, &final_path, timeout).await {
            Ok(stored) => return Ok(stored),
            Err(err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                warn!(attempt, asset = %asset.name, "download attempt failed: {}", err);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

async fn try_download_once(
    client: &Client,
    token: Option<&str>,
    asset: &Asset,
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
        let mut request = client.get(&asset.download_url);
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
                "download of {} returned {}",
                asset.name,
                response.status()
            )));
        }

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

        if asset.size != 0 && written != asset.size {
            return Err(CoreError::VerificationMismatch(format!(
                "{}: expected {} bytes, wrote {}",
                asset.name, asset.size, written
            )));
        }

        let digest = hex::encode(sha2::Digest::finalize(hasher));

        if let Some(expected) = &asset.digest {
            if !digest.eq_ignore_ascii_case(expected) {
                return Err(CoreError::VerificationMismatch(format!(
                    "{}: digest mismatch (expected {}, got {})",
                    asset.name, expected, digest
                )));
            }
        }

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
    fn destination_path_follows_owner_underscore_repo_layout() {
        let repo = RepoKey::new("kubernetes", "kubernetes");
        let path = destination_path(Path::new("/tmp/downloads"), &repo, "v1.2.3", "app.tar.gz");
        assert_eq!(
            path,
            Path::new("/tmp/downloads/kubernetes_kubernetes/v1.2.3/app.tar.gz")
        );
    }
}
