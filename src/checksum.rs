// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming SHA-256, shared by the Asset Downloader and by anything
//! re-verifying files already on disk.

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Hex-encoded SHA-256 of an async byte stream, read in bounded chunks
/// so large assets don't need to be buffered in memory.
pub async fn hash_reader<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub async fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    hash_reader(file).await
}
