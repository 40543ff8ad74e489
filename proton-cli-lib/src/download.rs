//! HTTP access: release listings, conditional checks and streamed downloads

use crate::error::{ProtonCliError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A finished download, still held in a temporary file
pub struct Download {
    /// Removed on drop unless persisted
    pub file: NamedTempFile,

    /// Lower-case hex SHA-256 of the content
    pub sha256: String,

    pub size: u64,
}

impl Download {
    /// Compare the content digest against `expected` (hex, case-insensitive)
    pub fn verify(&self, expected: &str) -> Result<()> {
        let expected = expected.trim().to_lowercase();
        if self.sha256 != expected {
            return Err(ProtonCliError::ChecksumMismatch {
                expected,
                got: self.sha256.clone(),
            });
        }
        Ok(())
    }
}

/// Download manager
pub struct DownloadManager {
    client: Client,
    progress: bool,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new(progress: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("proton-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, progress })
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Fetching {}", url);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET `url` as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    /// `Last-Modified` header of `url`, from a HEAD request
    pub async fn last_modified(&self, url: &str) -> Result<Option<String>> {
        let response = self.client.head(url).send().await?.error_for_status()?;
        let value = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());
        debug!("Last-Modified of {}: {:?}", url, value);
        Ok(value)
    }

    /// Stream `url` into a temporary file inside `dir`.
    ///
    /// The file is deleted if the download fails or the result is dropped.
    pub async fn download_to(&self, url: &str, dir: &Path) -> Result<Download> {
        std::fs::create_dir_all(dir).map_err(|e| ProtonCliError::io_at(dir, e))?;
        info!("Downloading {}", url);

        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let total_size = response.content_length().unwrap_or(0);

        let pb = if self.progress && total_size > 0 {
            let pb = ProgressBar::new(total_size);
            let style = ProgressStyle::default_bar()
                .template("{msg} [{bar:40.green/blue}] {percent}% {bytes}/{total_bytes} {eta}")
                .map_err(|e| ProtonCliError::Download(format!("Progress bar template error: {}", e)))?
                .progress_chars("=>-");
            pb.set_style(style);
            pb.set_message("Downloading");
            Some(pb)
        } else {
            None
        };

        let mut file = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dir)
            .map_err(|e| ProtonCliError::io_at(dir, e))?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
            hasher.update(&chunk);
            size += chunk.len() as u64;

            if let Some(ref pb) = pb {
                pb.inc(chunk.len() as u64);
            }
        }
        file.as_file().sync_all()?;

        if let Some(pb) = pb {
            pb.finish_with_message("Downloaded");
        }

        if total_size > 0 && size != total_size {
            return Err(ProtonCliError::Download(format!(
                "Incomplete download of {}: {} of {} bytes",
                url, size, total_size
            )));
        }

        Ok(Download {
            file,
            sha256: format!("{:x}", hasher.finalize()),
            size,
        })
    }
}

/// Extract the digest from a `sha256sum`-style line (`<hex>  <name>`)
pub fn parse_checksum(content: &str) -> Option<String> {
    let digest = content.split_whitespace().next()?;
    (digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_lowercase())
}
