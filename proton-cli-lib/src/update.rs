//! Self-update from published release binaries

use crate::download::{parse_checksum, DownloadManager};
use crate::error::{ProtonCliError, Result};
use crate::fetch::{ReleaseAsset, ReleaseInfo};
use semver::Version;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const BINARY_MARKER: &str = "proton-cli";
const CHECKSUM_SUFFIX: &str = ".sha256";

/// Parse a release tag such as `v2.2.0`
pub fn parse_tag(tag: &str) -> Result<Version> {
    let trimmed = tag.trim().trim_start_matches(&['v', 'V'][..]);
    Version::parse(trimmed)
        .map_err(|e| ProtonCliError::Update(format!("Invalid release version {:?}: {}", tag, e)))
}

/// The release binary for `arch` (e.g. `x86_64`)
pub fn select_binary_asset<'a>(release: &'a ReleaseInfo, arch: &str) -> Option<&'a ReleaseAsset> {
    release.assets.iter().find(|a| {
        a.name.contains(BINARY_MARKER) && a.name.contains(arch) && !a.name.ends_with(CHECKSUM_SUFFIX)
    })
}

/// Whether the binary lives inside a source checkout
pub fn is_dev_checkout(exe_dir: &Path) -> bool {
    exe_dir.join("../.git").exists() || exe_dir.join("../../.git").exists()
}

/// Fail with a permission error unless files can be created in `dir`
pub fn ensure_writable(dir: &Path) -> Result<()> {
    NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ProtonCliError::PermissionDenied {
                path: dir.to_path_buf(),
                hint: "try running with sudo".into(),
            },
            _ => ProtonCliError::io_at(dir, e),
        })
}

pub fn backup_path(exe: &Path) -> PathBuf {
    exe.with_extension("bak")
}

/// Replace `exe` with `new_binary`, keeping the previous binary as `.bak`.
///
/// `new_binary` must live in the same directory so the final rename is atomic.
pub fn replace_executable(new_binary: NamedTempFile, exe: &Path) -> Result<PathBuf> {
    let backup = backup_path(exe);
    std::fs::copy(exe, &backup).map_err(|e| ProtonCliError::io_at(&backup, e))?;
    debug!("Backed up {:?} to {:?}", exe, backup);

    std::fs::set_permissions(new_binary.path(), std::fs::Permissions::from_mode(0o755))?;
    new_binary
        .persist(exe)
        .map_err(|e| ProtonCliError::io_at(exe, e.error))?;
    info!("Replaced {:?}", exe);
    Ok(backup)
}

/// Restore the `.bak` copy over `exe`
pub fn rollback(exe: &Path) -> Result<()> {
    let backup = backup_path(exe);
    if !backup.is_file() {
        return Err(ProtonCliError::FileNotFound(backup));
    }
    std::fs::rename(&backup, exe).map_err(|e| ProtonCliError::io_at(exe, e))?;
    info!("Restored {:?} from backup", exe);
    Ok(())
}

/// Result of comparing against the latest release
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    pub current: Version,
    pub latest: Version,
    pub release: ReleaseInfo,
}

impl UpdateCheck {
    pub fn is_newer(&self) -> bool {
        self.latest > self.current
    }
}

pub struct Updater {
    downloads: DownloadManager,
    api_url: String,
}

impl Updater {
    pub fn new(api_url: impl Into<String>, progress: bool) -> Result<Self> {
        Ok(Self {
            downloads: DownloadManager::new(progress)?,
            api_url: api_url.into(),
        })
    }

    pub async fn check(&self) -> Result<UpdateCheck> {
        let release: ReleaseInfo = self.downloads.get_json(&self.api_url).await?;
        Ok(UpdateCheck {
            current: parse_tag(CURRENT_VERSION)?,
            latest: parse_tag(&release.tag_name)?,
            release,
        })
    }

    /// Download, verify and install the release binary over `exe`.
    ///
    /// Without a published `<asset>.sha256` the install is refused unless
    /// `allow_unverified` is set.
    pub async fn install(&self, release: &ReleaseInfo, exe: &Path, allow_unverified: bool) -> Result<PathBuf> {
        let exe_dir = exe
            .parent()
            .ok_or_else(|| ProtonCliError::Update(format!("Invalid executable path {:?}", exe)))?;
        if is_dev_checkout(exe_dir) {
            return Err(ProtonCliError::Update(
                "Running from a development checkout; update disabled".into(),
            ));
        }
        ensure_writable(exe_dir)?;

        let arch = std::env::consts::ARCH;
        let asset = select_binary_asset(release, arch).ok_or_else(|| {
            ProtonCliError::AssetNotFound(format!("{}-{}", BINARY_MARKER, arch))
        })?;

        let expected = match release.asset_named(&format!("{}{}", asset.name, CHECKSUM_SUFFIX)) {
            Some(sum) => {
                let content = self.downloads.get_text(&sum.browser_download_url).await?;
                Some(parse_checksum(&content).ok_or_else(|| {
                    ProtonCliError::Update(format!("Malformed checksum file {}", sum.name))
                })?)
            }
            None if allow_unverified => {
                warn!("No checksum published for {}; installing unverified", asset.name);
                None
            }
            None => {
                return Err(ProtonCliError::Update(format!(
                    "No checksum published for {}; pass --allow-unverified to install anyway",
                    asset.name
                )))
            }
        };

        let download = self
            .downloads
            .download_to(&asset.browser_download_url, exe_dir)
            .await?;
        if let Some(expected) = expected {
            download.verify(&expected)?;
        }

        replace_executable(download.file, exe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.into(),
            browser_download_url: format!("https://example.invalid/{}", name),
        }
    }

    #[test]
    fn versions_compare_semantically() {
        let check = |latest: &str| UpdateCheck {
            current: parse_tag("2.2.0").unwrap(),
            latest: parse_tag(latest).unwrap(),
            release: ReleaseInfo {
                tag_name: latest.into(),
                assets: Vec::new(),
            },
        };
        assert!(check("v2.10.0").is_newer());
        assert!(check("2.2.1").is_newer());
        assert!(!check("v2.2.0").is_newer());
        assert!(!check("2.1.9").is_newer());
        assert!(parse_tag("latest").is_err());
    }

    #[test]
    fn binary_asset_skips_checksums_and_other_arches() {
        let release = ReleaseInfo {
            tag_name: "v2.3.0".into(),
            assets: vec![
                asset("proton-cli-x86_64.sha256"),
                asset("proton-cli-aarch64"),
                asset("proton-cli-x86_64"),
                asset("proton-cli_2.3.0_amd64.deb"),
            ],
        };
        assert_eq!(
            select_binary_asset(&release, "x86_64").map(|a| a.name.as_str()),
            Some("proton-cli-x86_64")
        );
        assert_eq!(
            select_binary_asset(&release, "aarch64").map(|a| a.name.as_str()),
            Some("proton-cli-aarch64")
        );
        assert!(select_binary_asset(&release, "riscv64").is_none());
    }

    #[test]
    fn dev_checkout_is_detected() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("target").join("release");
        std::fs::create_dir_all(&bin).unwrap();
        assert!(!is_dev_checkout(&bin));

        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        assert!(is_dev_checkout(&bin));
    }

    #[test]
    fn replace_keeps_backup_and_rollback_restores_it() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("proton-cli");
        std::fs::write(&exe, "old").unwrap();

        let mut new_binary = NamedTempFile::new_in(dir.path()).unwrap();
        new_binary.write_all(b"new").unwrap();

        let backup = replace_executable(new_binary, &exe).unwrap();
        assert_eq!(backup, dir.path().join("proton-cli.bak"));
        assert_eq!(std::fs::read_to_string(&exe).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old");
        let mode = std::fs::metadata(&exe).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        rollback(&exe).unwrap();
        assert_eq!(std::fs::read_to_string(&exe).unwrap(), "old");
        assert!(matches!(
            rollback(&exe),
            Err(ProtonCliError::FileNotFound(_))
        ));
    }

    #[test]
    fn writable_directory_check() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_writable(dir.path()).is_ok());
        assert!(ensure_writable(&dir.path().join("missing")).is_err());
    }
}
