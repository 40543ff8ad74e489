//! Tool settings and directory layout
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional `settings.toml` in the user's config directory, then `PROTON_CLI_*`
//! environment variables.

use crate::error::{ProtonCliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// GE-Proton latest release listing
pub const DEFAULT_PROTON_API_URL: &str =
    "https://api.github.com/repos/GloriousEggroll/proton-ge-custom/releases/latest";

/// Steam Linux Runtime (sniper) tarball
pub const DEFAULT_RUNTIME_URL: &str = "https://repo.steampowered.com/steamrt-images-sniper/snapshots/latest-public-stable/SteamLinuxRuntime_sniper.tar.xz";

/// Latest release of proton-cli itself
pub const DEFAULT_UPDATE_API_URL: &str =
    "https://api.github.com/repos/hhadi34/proton-cli/releases/latest";

/// proton-cli settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for config, prefixes, versions and runtime (default `~/.proton-cli`)
    pub base_dir: Option<PathBuf>,

    /// Release listing API used by `pull-proton`
    pub proton_api_url: String,

    /// Suffix of the release asset to download
    pub proton_asset_suffix: String,

    /// Runtime archive used by `pull-runtime`
    pub runtime_url: String,

    /// Release listing API used by `update`
    pub update_api_url: String,

    /// Additional directories scanned for Proton installations
    pub extra_search_paths: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: None,
            proton_api_url: DEFAULT_PROTON_API_URL.to_string(),
            proton_asset_suffix: ".tar.gz".to_string(),
            runtime_url: DEFAULT_RUNTIME_URL.to_string(),
            update_api_url: DEFAULT_UPDATE_API_URL.to_string(),
            extra_search_paths: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `~/.config/proton-cli/settings.toml` and the environment
    pub fn load() -> Result<Self> {
        let file = dirs::config_dir().map(|d| d.join("proton-cli").join("settings.toml"));
        Self::load_from(file.as_deref())
    }

    /// Load settings from an explicit (optional) settings file and the environment
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(file) = file {
            debug!("Reading settings from {:?}", file);
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PROTON_CLI")
                .try_parsing(true)
                .list_separator(":")
                .with_list_parse_key("extra_search_paths"),
        );

        let settings = builder.build()?.try_deserialize::<Settings>()?;
        Ok(settings)
    }

    /// Resolve the directory layout for these settings
    pub fn paths(&self) -> Result<Paths> {
        let home = dirs::home_dir()
            .ok_or_else(|| ProtonCliError::Config("Could not determine home directory".into()))?;
        let base_dir = self
            .base_dir
            .clone()
            .unwrap_or_else(|| home.join(".proton-cli"));
        Ok(Paths::new(base_dir, home, self.extra_search_paths.clone()))
    }
}

/// Filesystem layout under the base directory
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub prefixes_dir: PathBuf,
    pub versions_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub home: PathBuf,
    extra_search_paths: Vec<PathBuf>,
}

impl Paths {
    pub fn new(base_dir: PathBuf, home: PathBuf, extra_search_paths: Vec<PathBuf>) -> Self {
        Self {
            config_file: base_dir.join("config.json"),
            prefixes_dir: base_dir.join("prefixes"),
            versions_dir: base_dir.join("versions"),
            runtime_dir: base_dir.join("runtime"),
            base_dir,
            home,
            extra_search_paths,
        }
    }

    /// Ensure directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.base_dir, &self.prefixes_dir, &self.versions_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ProtonCliError::io_at(dir, e))?;
        }
        Ok(())
    }

    /// Directories scanned for Proton installations, in order
    pub fn proton_search_paths(&self) -> Vec<PathBuf> {
        let home = &self.home;
        let mut paths: Vec<PathBuf> = [
            ".steam/steam/steamapps/common",
            ".steam/root/steamapps/common",
            ".local/share/Steam/steamapps/common",
            ".steam/steam/compatibilitytools.d",
            ".steam/root/compatibilitytools.d",
            ".local/share/Steam/compatibilitytools.d",
            ".var/app/com.valvesoftware.Steam/.local/share/Steam/steamapps/common",
            ".var/app/com.valvesoftware.Steam/.local/share/Steam/compatibilitytools.d",
            "snap/steam/common/.local/share/Steam/steamapps/common",
            "snap/steam/common/.local/share/Steam/compatibilitytools.d",
            ".config/heroic/tools/proton",
            ".config/heroic/tools/wine",
            ".var/app/com.heroicgameslauncher.hgl/config/heroic/tools/proton",
            ".var/app/com.heroicgameslauncher.hgl/config/heroic/tools/wine",
            ".local/share/lutris/runners/wine",
            ".local/share/lutris/runners/proton",
            ".var/app/net.lutris.Lutris/data/lutris/runners/wine",
            ".var/app/net.lutris.Lutris/data/lutris/runners/proton",
            ".local/share/bottles/runners/wine",
            ".local/share/bottles/runners/proton",
            ".var/app/com.usebottles.bottles/data/bottles/runners/wine",
            ".var/app/com.usebottles.bottles/data/bottles/runners/proton",
        ]
        .iter()
        .map(|p| home.join(p))
        .collect();

        paths.push(PathBuf::from("/usr/share/steam/compatibilitytools.d"));
        paths.push(PathBuf::from("/usr/local/share/steam/compatibilitytools.d"));
        paths.extend(self.extra_search_paths.iter().cloned());
        paths.push(self.versions_dir.clone());
        paths
    }

    /// Directories scanned for a Steam Linux Runtime, in order
    pub fn runtime_search_paths(&self) -> Vec<PathBuf> {
        let home = &self.home;
        let mut paths: Vec<PathBuf> = [
            ".steam/steam/steamapps/common",
            ".steam/root/steamapps/common",
            ".local/share/Steam/steamapps/common",
            ".var/app/com.valvesoftware.Steam/.local/share/Steam/steamapps/common",
            "snap/steam/common/.local/share/Steam/steamapps/common",
        ]
        .iter()
        .map(|p| home.join(p))
        .collect();

        paths.push(self.runtime_dir.clone());
        paths
    }
}
