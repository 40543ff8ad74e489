//! Downloading Proton releases and the Steam Linux Runtime

use crate::archive::{extract_archive, ArchiveFormat};
use crate::config::ConfigStore;
use crate::download::DownloadManager;
use crate::error::{ProtonCliError, Result};
use crate::locator::RUNTIME_NAMES;
use crate::settings::{Paths, Settings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker file holding the `Last-Modified` value of the installed runtime
pub const RUNTIME_MARKER: &str = "sniper_version.txt";

/// A release from a GitHub-style release listing
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,

    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl ReleaseInfo {
    /// First asset whose name ends with `suffix`
    pub fn select_asset(&self, suffix: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name.ends_with(suffix))
    }

    pub fn asset_named(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Find the installed version directory for `tag`.
///
/// A directory named exactly `tag` wins. Otherwise the first directory whose
/// name contains `tag` not followed by another digit (`GE-Proton9-1` does not
/// match `GE-Proton9-10`).
pub fn find_installed_version(dir: &Path, tag: &str) -> Option<PathBuf> {
    let exact = dir.join(tag);
    if !tag.is_empty() && !tag.starts_with('.') && exact.is_dir() {
        return Some(exact);
    }

    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            !name.starts_with('.') && contains_tag(&name, tag)
        })
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn contains_tag(name: &str, tag: &str) -> bool {
    name.match_indices(tag).any(|(at, _)| {
        !name[at + tag.len()..].starts_with(|c: char| c.is_ascii_digit())
    })
}

/// Whether the runtime must be (re-)downloaded.
///
/// Only a present runtime whose local marker equals the remote one is current.
pub fn runtime_needs_download(exists: bool, local: Option<&str>, remote: Option<&str>) -> bool {
    if !exists {
        return true;
    }
    match (local, remote) {
        (Some(local), Some(remote)) => local.trim() != remote.trim(),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The version was already present; nothing was downloaded
    AlreadyInstalled(PathBuf),
    Installed(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOutcome {
    UpToDate(PathBuf),
    Installed(PathBuf),
    /// An outdated runtime was found and the user kept it
    Declined,
}

/// Fetches Proton releases and the runtime into the tool's own directories
pub struct Fetcher {
    downloads: DownloadManager,
    versions_dir: PathBuf,
    runtime_dir: PathBuf,
    asset_suffix: String,
    runtime_url: String,
    progress: bool,
}

impl Fetcher {
    pub fn new(settings: &Settings, paths: &Paths, progress: bool) -> Result<Self> {
        Ok(Self {
            downloads: DownloadManager::new(progress)?,
            versions_dir: paths.versions_dir.clone(),
            runtime_dir: paths.runtime_dir.clone(),
            asset_suffix: settings.proton_asset_suffix.clone(),
            runtime_url: settings.runtime_url.clone(),
            progress,
        })
    }

    /// Query the latest release from `api_url`
    pub async fn fetch_latest(&self, api_url: &str) -> Result<ReleaseInfo> {
        let release: ReleaseInfo = self.downloads.get_json(api_url).await?;
        info!("Latest release: {}", release.tag_name);
        Ok(release)
    }

    /// Install `release` into the versions directory unless a directory for
    /// its tag is already there.
    pub async fn install_release(&self, release: &ReleaseInfo) -> Result<FetchOutcome> {
        if let Some(existing) = find_installed_version(&self.versions_dir, &release.tag_name) {
            info!("{} already installed at {:?}", release.tag_name, existing);
            return Ok(FetchOutcome::AlreadyInstalled(existing));
        }

        let asset = release
            .select_asset(&self.asset_suffix)
            .ok_or_else(|| ProtonCliError::AssetNotFound(self.asset_suffix.clone()))?;
        let format = ArchiveFormat::from_name(&asset.name).ok_or_else(|| {
            ProtonCliError::Archive(format!("Unsupported archive format: {}", asset.name))
        })?;

        let download = self
            .downloads
            .download_to(&asset.browser_download_url, &self.versions_dir)
            .await?;
        debug!("Downloaded {} ({} bytes)", asset.name, download.size);

        let installed = self.install_archive(download.file.path(), format, &release.tag_name)?;
        // Dropping the download removes the archive.
        drop(download);
        Ok(FetchOutcome::Installed(installed))
    }

    /// Extract a downloaded release archive and locate the directory for `tag`
    pub fn install_archive(&self, archive: &Path, format: ArchiveFormat, tag: &str) -> Result<PathBuf> {
        extract_archive(archive, &self.versions_dir, format, self.progress)?;
        find_installed_version(&self.versions_dir, tag).ok_or_else(|| {
            ProtonCliError::Archive(format!("Archive did not contain a directory for {}", tag))
        })
    }

    /// Path of the managed runtime bundle
    pub fn runtime_path(&self) -> PathBuf {
        self.runtime_dir.join(RUNTIME_NAMES[0])
    }

    fn marker_path(&self) -> PathBuf {
        self.runtime_dir.join(RUNTIME_MARKER)
    }

    fn read_marker(&self) -> Option<String> {
        std::fs::read_to_string(self.marker_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Download the Steam Linux Runtime when missing or changed upstream.
    ///
    /// `confirm_replace` is asked before an existing, outdated runtime is replaced.
    pub async fn pull_runtime(
        &self,
        store: &ConfigStore,
        confirm_replace: impl FnOnce() -> bool,
    ) -> Result<RuntimeOutcome> {
        let remote = self.downloads.last_modified(&self.runtime_url).await?;
        let runtime = self.runtime_path();
        let exists = runtime.is_dir();
        let local = self.read_marker();

        if !runtime_needs_download(exists, local.as_deref(), remote.as_deref()) {
            info!("Runtime at {:?} is current", runtime);
            return Ok(RuntimeOutcome::UpToDate(runtime));
        }

        if exists {
            warn!("Runtime at {:?} may be outdated", runtime);
            if !confirm_replace() {
                return Ok(RuntimeOutcome::Declined);
            }
        }

        let format = ArchiveFormat::from_name(&self.runtime_url).unwrap_or(ArchiveFormat::TarXz);
        let download = self
            .downloads
            .download_to(&self.runtime_url, &self.runtime_dir)
            .await?;
        let installed = self.replace_runtime(download.file.path(), format, remote.as_deref(), store)?;
        drop(download);
        Ok(RuntimeOutcome::Installed(installed))
    }

    /// Swap the managed runtime for the contents of `archive`.
    ///
    /// A configuration record pointing at the old bundle is cleared before the
    /// bundle is removed. The marker is written only after a successful extraction.
    pub fn replace_runtime(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        remote: Option<&str>,
        store: &ConfigStore,
    ) -> Result<PathBuf> {
        let runtime = self.runtime_path();
        let marker = self.marker_path();

        if runtime.exists() {
            if store.forget_runtime(&runtime)? {
                info!("Cleared configured runtime {:?}", runtime);
            }
            if marker.exists() {
                std::fs::remove_file(&marker).map_err(|e| ProtonCliError::io_at(&marker, e))?;
            }
            info!("Removing old runtime {:?}", runtime);
            std::fs::remove_dir_all(&runtime).map_err(|e| ProtonCliError::io_at(&runtime, e))?;
        }

        extract_archive(archive, &self.runtime_dir, format, self.progress)?;
        if !runtime.is_dir() {
            return Err(ProtonCliError::Archive(format!(
                "Archive did not contain {}",
                RUNTIME_NAMES[0]
            )));
        }

        if let Some(remote) = remote {
            std::fs::write(&marker, remote).map_err(|e| ProtonCliError::io_at(&marker, e))?;
        }
        Ok(runtime)
    }
}
