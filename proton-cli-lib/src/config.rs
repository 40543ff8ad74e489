//! Persisted configuration record (`config.json`)
//!
//! Holds the active Proton installation and the optional Steam Linux Runtime.
//! Every command loads it first; only `check` and the deletion flows write it.

use crate::error::{ProtonCliError, Result};
use crate::command::PROTON_ENTRY;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Active Proton / runtime selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default)]
    pub proton_path: Option<PathBuf>,

    #[serde(default)]
    pub runtime_path: Option<PathBuf>,
}

impl ConfigRecord {
    pub fn new(proton_path: Option<PathBuf>, runtime_path: Option<PathBuf>) -> Self {
        Self {
            proton_path,
            runtime_path,
        }
    }

    /// Resolve the configured toolchain, failing if no usable Proton is set
    pub fn toolchain(&self) -> Result<Toolchain> {
        let proton = self
            .proton_path
            .as_ref()
            .filter(|p| p.join(PROTON_ENTRY).is_file())
            .ok_or(ProtonCliError::NotConfigured)?;

        let runtime = self.runtime_path.as_ref().filter(|p| p.is_dir());
        if self.runtime_path.is_some() && runtime.is_none() {
            warn!(
                "Configured runtime {:?} is missing, using system libraries",
                self.runtime_path
            );
        }

        Ok(Toolchain {
            proton: proton.clone(),
            runtime: runtime.cloned(),
        })
    }

    /// Whether `proton_path` refers to `install` (directly or through symlinks)
    pub fn uses_proton(&self, install: &Path) -> bool {
        refers_to(self.proton_path.as_deref(), install)
    }

    /// Whether `runtime_path` refers to `runtime`
    pub fn uses_runtime(&self, runtime: &Path) -> bool {
        refers_to(self.runtime_path.as_deref(), runtime)
    }
}

/// A resolved Proton installation plus optional runtime, ready to launch with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub proton: PathBuf,
    pub runtime: Option<PathBuf>,
}

/// Reads and writes the configuration record
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the record. A missing or unreadable file yields an empty record.
    pub fn load(&self) -> ConfigRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No configuration at {:?}: {}", self.path, e);
                return ConfigRecord::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring corrupt configuration {:?}: {}", self.path, e);
                ConfigRecord::default()
            }
        }
    }

    /// Save the record, replacing the file atomically
    pub fn save(&self, record: &ConfigRecord) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ProtonCliError::Config(format!("Invalid config path {:?}", self.path)))?;
        std::fs::create_dir_all(parent).map_err(|e| ProtonCliError::io_at(parent, e))?;

        let json = serde_json::to_string_pretty(record)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| ProtonCliError::io_at(&self.path, e.error))?;

        debug!("Configuration saved to {:?}", self.path);
        Ok(())
    }

    /// Clear `proton_path` if it refers to `install`. Returns whether it was cleared.
    pub fn forget_proton(&self, install: &Path) -> Result<bool> {
        let mut record = self.load();
        if !record.uses_proton(install) {
            return Ok(false);
        }
        record.proton_path = None;
        self.save(&record)?;
        Ok(true)
    }

    /// Clear `runtime_path` if it refers to `runtime`. Returns whether it was cleared.
    pub fn forget_runtime(&self, runtime: &Path) -> Result<bool> {
        let mut record = self.load();
        if !record.uses_runtime(runtime) {
            return Ok(false);
        }
        record.runtime_path = None;
        self.save(&record)?;
        Ok(true)
    }
}

fn refers_to(configured: Option<&Path>, target: &Path) -> bool {
    let Some(configured) = configured else {
        return false;
    };
    if configured == target {
        return true;
    }
    match (configured.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
