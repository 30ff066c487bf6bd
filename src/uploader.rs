// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Artifact Uploader (spec §4.8): an optional trailing stage mirroring
//! downloaded files to the same shared store the Version Database
//! lives in. Individual file failures are logged and skipped; the run
//! is not aborted.

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::warn;
use walkdir::WalkDir;

pub const DEFAULT_EXTENSION_ALLOWLIST: &[&str] = &[
    "tar", "gz", "tgz", "zip", "yaml", "yml", "json", "xml", "toml", "deb", "rpm", "dmg", "exe",
    "msi",
];

pub struct UploadReport {
    pub succeeded: usize,
    pub failed: usize,
}

fn is_allowed(path: &Path, allowlist: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| allowlist.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Upload every file under `root` whose extension is in `allowlist`,
/// preserving the on-disk relative layout under `key_prefix`.
pub async fn upload_tree(
    client: &S3Client,
    bucket: &str,
    key_prefix: &str,
    root: &Path,
    allowlist: &[String],
) -> UploadReport {
    let mut succeeded = 0;
    let mut failed = 0;

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_allowed(path, allowlist) {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let key = format!(
            "{}/{}",
            key_prefix.trim_end_matches('/'),
            relative.to_string_lossy().replace('\\', "/")
        );

        match upload_one(client, bucket, &key, path).await {
            Ok(()) => succeeded += 1,
            Err(err) => {
                warn!(path = %path.display(), "upload failed: {}", err);
                failed += 1;
            }
        }
    }

    UploadReport { succeeded, failed }
}

async fn upload_one(
    client: &S3Client,
    bucket: &str,
    key: &str,
    path: &Path,
) -> Result<(), anyhow::Error> {
    let metadata = tokio::fs::metadata(path).await?;
    let content_length = metadata.len() as i64;
    let body = ByteStream::from_path(path).await?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_length(content_length)
        .body(body)
        .send()
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allowlist_covers_spec_minimum() {
        for ext in [
            "tar", "gz", "tgz", "zip", "yaml", "yml", "json", "xml", "toml", "deb", "rpm", "dmg",
            "exe", "msi",
        ] {
            assert!(DEFAULT_EXTENSION_ALLOWLIST.contains(&ext));
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let allowlist = vec!["tar.gz".to_string(), "json".to_string()];
        assert!(is_allowed(Path::new("/tmp/a.JSON"), &allowlist));
        assert!(!is_allowed(Path::new("/tmp/a.bin"), &allowlist));
    }
}
