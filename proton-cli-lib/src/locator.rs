//! Discovery of installed Proton versions and Steam Linux Runtimes

use crate::command::PROTON_ENTRY;
use crate::config::ConfigStore;
use crate::error::{ProtonCliError, Result};
use std::collections::HashSet;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runtime bundle names in order of preference
pub const RUNTIME_NAMES: [&str; 3] = [
    "SteamLinuxRuntime_sniper",
    "SteamLinuxRuntime_soldier",
    "SteamLinuxRuntime",
];

/// An installed Proton (or Proton-compatible) version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtonInstall {
    /// Installation directory (contains the `proton` entry point)
    pub path: PathBuf,

    /// Display name (directory name)
    pub name: String,

    /// Search path the installation was found under
    pub source: PathBuf,
}

impl ProtonInstall {
    pub fn from_dir(path: PathBuf) -> Self {
        let name = dir_name(&path);
        let source = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { path, name, source }
    }
}

/// An installed Steam Linux Runtime bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBundle {
    pub path: PathBuf,
    pub name: String,
}

/// Whether `path` is a regular file the current user may execute
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

/// Scan `search_paths` for Proton installations, sorted by name.
///
/// Missing directories are skipped; unreadable ones are skipped with a warning.
/// The same installation reached through several (symlinked) roots is reported once.
pub fn find_installations(search_paths: &[PathBuf]) -> Vec<ProtonInstall> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for search_path in search_paths {
        if !search_path.is_dir() {
            continue;
        }

        let entries = match std::fs::read_dir(search_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not access directory {:?}: {}", search_path, e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !is_executable(&path.join(PROTON_ENTRY)) {
                continue;
            }

            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                debug!("Skipping duplicate installation {:?}", path);
                continue;
            }

            info!("Found {} in {:?}", dir_name(&path), search_path);
            found.push(ProtonInstall {
                name: dir_name(&path),
                source: search_path.clone(),
                path,
            });
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    found
}

/// Find the preferred Steam Linux Runtime under `search_paths`.
///
/// Preference follows [`RUNTIME_NAMES`], not search path order.
pub fn find_support_runtime(search_paths: &[PathBuf]) -> Option<RuntimeBundle> {
    for name in RUNTIME_NAMES {
        for search_path in search_paths {
            let candidate = search_path.join(name);
            if candidate.is_dir() {
                info!("Found runtime {} in {:?}", name, search_path);
                return Some(RuntimeBundle {
                    path: candidate,
                    name: name.to_string(),
                });
            }
        }
    }
    None
}

/// Validate a user-supplied Proton location.
///
/// Accepts the installation directory or the `proton` script itself; `~` is expanded.
pub fn resolve_custom_path(input: &str, home: &Path) -> Option<ProtonInstall> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let expanded = match input.strip_prefix("~") {
        Some(rest) => home.join(rest.trim_start_matches('/')),
        None => PathBuf::from(input),
    };
    let resolved = expanded.canonicalize().ok()?;

    let dir = if resolved.is_file() && resolved.file_name() == Some(OsStr::new(PROTON_ENTRY)) {
        resolved.parent()?.to_path_buf()
    } else {
        resolved
    };

    if dir.is_dir() && is_executable(&dir.join(PROTON_ENTRY)) {
        Some(ProtonInstall::from_dir(dir))
    } else {
        None
    }
}

/// Outcome of a destructive operation that needs confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Cancelled,
}

/// Delete a Proton installation after confirmation.
///
/// If the installation is the active one, `proton_path` is cleared in the store.
pub fn delete_installation(
    install: &ProtonInstall,
    store: &ConfigStore,
    confirm: impl FnOnce(&ProtonInstall) -> bool,
) -> Result<(Removal, bool)> {
    if !confirm(install) {
        return Ok((Removal::Cancelled, false));
    }

    // The reference only resolves while the directory still exists.
    let was_active = store.forget_proton(&install.path)?;

    info!("Deleting {:?}", install.path);
    std::fs::remove_dir_all(&install.path).map_err(|e| ProtonCliError::io_at(&install.path, e))?;

    Ok((Removal::Removed, was_active))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRecord;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_proton(root: &Path, name: &str, executable: bool) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let entry = dir.join(PROTON_ENTRY);
        std::fs::write(&entry, "#!/bin/sh\nexit 0\n").unwrap();
        let mode = if executable { 0o755 } else { 0o644 };
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(mode)).unwrap();
        dir
    }

    #[test]
    fn executable_check_uses_access_rights() {
        let dir = TempDir::new().unwrap();
        let runnable = fake_proton(dir.path(), "runnable", true).join(PROTON_ENTRY);
        let plain = fake_proton(dir.path(), "plain", false).join(PROTON_ENTRY);

        assert!(is_executable(&runnable));
        assert!(!is_executable(&plain));
        assert!(!is_executable(dir.path()));
        assert!(!is_executable(&dir.path().join("missing")));
    }

    #[test]
    fn empty_or_missing_search_paths_find_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("does-not-exist"), dir.path().to_path_buf()];
        assert!(find_installations(&paths).is_empty());
        assert!(find_installations(&[]).is_empty());
    }

    #[test]
    fn finds_executable_installations_sorted_by_name() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fake_proton(a.path(), "Proton 8.0", true);
        fake_proton(b.path(), "GE-Proton9-1", true);
        fake_proton(b.path(), "not-executable", false);
        std::fs::create_dir_all(b.path().join("empty")).unwrap();

        let found = find_installations(&[a.path().to_path_buf(), b.path().to_path_buf()]);
        let names: Vec<_> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["GE-Proton9-1", "Proton 8.0"]);
        assert_eq!(found[0].source, b.path());
    }

    #[test]
    fn symlinked_roots_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir_all(&real).unwrap();
        fake_proton(&real, "GE-Proton9-1", true);
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let found = find_installations(&[real.clone(), link]);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn runtime_preference_beats_search_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::create_dir_all(first.path().join("SteamLinuxRuntime_soldier")).unwrap();
        std::fs::create_dir_all(second.path().join("SteamLinuxRuntime_sniper")).unwrap();

        let runtime = find_support_runtime(&[
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ])
        .unwrap();
        assert_eq!(runtime.name, "SteamLinuxRuntime_sniper");
        assert_eq!(runtime.path, second.path().join("SteamLinuxRuntime_sniper"));

        let empty = TempDir::new().unwrap();
        assert_eq!(find_support_runtime(&[empty.path().to_path_buf()]), None);
    }

    #[test]
    fn custom_path_accepts_directory_or_entry_point() {
        let dir = TempDir::new().unwrap();
        let install = fake_proton(dir.path(), "custom", true);
        let canonical = install.canonicalize().unwrap();

        let by_dir = resolve_custom_path(install.to_str().unwrap(), dir.path()).unwrap();
        assert_eq!(by_dir.path, canonical);
        assert_eq!(by_dir.name, "custom");

        let by_file =
            resolve_custom_path(install.join("proton").to_str().unwrap(), dir.path()).unwrap();
        assert_eq!(by_file.path, canonical);

        let by_tilde = resolve_custom_path("~/custom", dir.path()).unwrap();
        assert_eq!(by_tilde.path, canonical);

        assert_eq!(resolve_custom_path("", dir.path()), None);
        assert_eq!(
            resolve_custom_path(dir.path().to_str().unwrap(), dir.path()),
            None
        );
    }

    #[test]
    fn deleting_active_installation_clears_config() {
        let dir = TempDir::new().unwrap();
        let active = fake_proton(dir.path(), "GE-Proton9-1", true);
        let store = ConfigStore::new(dir.path().join("config.json"));
        store
            .save(&ConfigRecord::new(
                Some(active.clone()),
                Some(PathBuf::from("/rt")),
            ))
            .unwrap();

        let install = ProtonInstall::from_dir(active.clone());
        let (removal, cleared) = delete_installation(&install, &store, |_| true).unwrap();
        assert_eq!(removal, Removal::Removed);
        assert!(cleared);
        assert!(!active.exists());
        assert_eq!(
            store.load(),
            ConfigRecord::new(None, Some(PathBuf::from("/rt")))
        );
    }

    #[test]
    fn deleting_other_installation_leaves_config() {
        let dir = TempDir::new().unwrap();
        let active = fake_proton(dir.path(), "GE-Proton9-1", true);
        let other = fake_proton(dir.path(), "Proton 8.0", true);
        let store = ConfigStore::new(dir.path().join("config.json"));
        let record = ConfigRecord::new(Some(active), None);
        store.save(&record).unwrap();

        let (removal, cleared) =
            delete_installation(&ProtonInstall::from_dir(other.clone()), &store, |_| true)
                .unwrap();
        assert_eq!(removal, Removal::Removed);
        assert!(!cleared);
        assert!(!other.exists());
        assert_eq!(store.load(), record);
    }

    #[test]
    fn declined_deletion_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let install = fake_proton(dir.path(), "GE-Proton9-1", true);
        let store = ConfigStore::new(dir.path().join("config.json"));

        let (removal, _) =
            delete_installation(&ProtonInstall::from_dir(install.clone()), &store, |_| false)
                .unwrap();
        assert_eq!(removal, Removal::Cancelled);
        assert!(install.exists());
    }
}
