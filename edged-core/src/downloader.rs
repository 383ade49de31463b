//! Streams a single asset from a peer URL to disk, verifying its SHA-256 digest before
//! making it visible under its final name.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::DownloadError;

const TEMP_SUFFIX: &str = "_temp";

/// Downloads peer content, verifying its hash, grounded in the original `downloadFile`
/// algorithm: stream into a sibling `_temp` file, hash it, rename on match.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: Client,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client with static configuration must build"),
        }
    }

    /// Fetches `url` into `dest`, verifying the downloaded bytes hash to
    /// `expected_hex_hash` (compared case-insensitively). On mismatch the temp file is left
    /// in place for inspection and `dest` is never created or overwritten.
    pub async fn download(
        &self,
        dest: &Path,
        url: &str,
        expected_hex_hash: &str,
    ) -> Result<(), DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(dest);
        self.stream_to_temp(url, &temp_path).await?;

        let actual = hash_file(&temp_path).await?;
        let expected = expected_hex_hash.to_uppercase();

        if actual != expected {
            return Err(DownloadError::HashMismatch { expected, actual });
        }

        tokio::fs::rename(&temp_path, dest).await?;
        Ok(())
    }

    async fn stream_to_temp(&self, url: &str, temp_path: &Path) -> Result<(), DownloadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();

        let mut file = File::create(temp_path).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

fn temp_path_for(dest: &Path) -> std::path::PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}

async fn hash_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode_upper(hasher.finalize()))
}
