use std::io::Read;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::progress::UpdateProgress;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} timed out after {}s", .timeout.as_secs())]
    Timeout {
        context: &'static str,
        timeout: Duration,
    },
    #[error("{context} failed with HTTP {status}")]
    HttpStatus {
        context: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("server returned an empty update artifact")]
    EmptyBody,
    #[error("no checksum entry found for update asset '{asset}'")]
    MissingChecksum { asset: String },
    #[error("checksum mismatch for '{asset}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },
}

impl FetchError {
    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }

    fn http(context: &'static str, source: reqwest::Error, timeout: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout { context, timeout }
        } else {
            Self::Http { context, source }
        }
    }
}

/// Download `url` into `dest`, returning the number of bytes written.
///
/// `dest` must live inside a staging area; a failed download never leaves a
/// partial file behind.
///
/// # Errors
/// Returns an error on request failure, timeout, non-success status, an empty
/// body, or when `dest` cannot be created or written.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
    progress: Option<&mpsc::Sender<UpdateProgress>>,
) -> Result<u64, FetchError> {
    info!("Downloading update from {url}");
    let result = download(client, url, dest, timeout, progress).await;
    if let Err(error) = &result {
        warn!("Download failed, discarding {}: {error}", dest.display());
        discard_partial(dest).await;
    }
    result
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
    progress: Option<&mpsc::Sender<UpdateProgress>>,
) -> Result<u64, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| FetchError::http("download request", error, timeout))?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            context: "download",
            status: response.status(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|error| FetchError::io_with_path("failed to create download file", dest, &error))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| FetchError::http("download stream", error, timeout))?;
        file.write_all(&chunk).await.map_err(|error| {
            FetchError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
        if let Some(progress) = progress {
            // Best effort: a slow consumer must not stall the download.
            let _ = progress.try_send(UpdateProgress::Downloading { downloaded, total });
        }
    }

    file.flush()
        .await
        .map_err(|error| FetchError::io_with_path("failed to flush download file", dest, &error))?;
    file.sync_all()
        .await
        .map_err(|error| FetchError::io_with_path("failed to sync download file", dest, &error))?;

    if downloaded == 0 {
        return Err(FetchError::EmptyBody);
    }

    info!("Download complete: {downloaded} bytes");
    Ok(downloaded)
}

async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!("Removed partial download {}", dest.display()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!("Failed to remove partial download {}: {error}", dest.display()),
    }
}

/// Fetch a `sha256sum`-style manifest and return the digest listed for
/// `asset_name`.
///
/// # Errors
/// Returns an error when the manifest cannot be downloaded or has no entry
/// for the asset.
pub async fn fetch_expected_checksum(
    client: &reqwest::Client,
    checksum_url: &str,
    asset_name: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let response = client
        .get(checksum_url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| FetchError::http("checksum request", error, timeout))?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            context: "checksum download",
            status: response.status(),
        });
    }

    let checksums = response
        .text()
        .await
        .map_err(|error| FetchError::http("checksum body", error, timeout))?;
    parse_expected_checksum(&checksums, asset_name).ok_or_else(|| FetchError::MissingChecksum {
        asset: asset_name.to_string(),
    })
}

/// Compare the SHA-256 of `path` to `expected`. Blocking.
///
/// # Errors
/// Returns an error when the file cannot be read or the digest differs.
pub fn verify_checksum(path: &Path, asset_name: &str, expected: &str) -> Result<(), FetchError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        info!("Update checksum verified for {asset_name}");
        Ok(())
    } else {
        Err(FetchError::ChecksumMismatch {
            asset: asset_name.to_string(),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

fn parse_expected_checksum(checksums: &str, asset_name: &str) -> Option<String> {
    checksums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts
            .next()?
            .trim_start_matches('*')
            .trim_start_matches("./");
        let is_sha256 = hash.len() == 64 && hash.chars().all(|ch| ch.is_ascii_hexdigit());
        (name == asset_name && is_sha256).then(|| hash.to_ascii_lowercase())
    })
}

fn sha256_file(path: &Path) -> Result<String, FetchError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        FetchError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            FetchError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
