//! Wine prefix management

use crate::command::{BuiltinTool, LaunchSpec};
use crate::config::ConfigRecord;
use crate::error::{ProtonCliError, Result};
use crate::invoker::{self, ExitOutcome};
use crate::locator::Removal;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Prefix created automatically when `run` finds none
pub const DEFAULT_PREFIX: &str = "default";

/// A named prefix directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub path: PathBuf,
}

impl Prefix {
    /// The prefix's `C:` drive: `pfx/drive_c` for Proton prefixes, else `drive_c`
    pub fn drive_c(&self) -> PathBuf {
        let proton_layout = self.path.join("pfx").join("drive_c");
        if proton_layout.exists() {
            proton_layout
        } else {
            self.path.join("drive_c")
        }
    }

    pub fn system32(&self) -> PathBuf {
        self.drive_c().join("windows").join("system32")
    }
}

/// Check that `name` is usable as a single directory name
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == OsStr::new(name) => Ok(()),
        _ => Err(ProtonCliError::InvalidPrefixName(name.to_string())),
    }
}

/// Prefix manager
pub struct PrefixManager {
    root: PathBuf,
}

impl PrefixManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All prefixes, sorted by name. A missing root means no prefixes.
    pub fn list(&self) -> Result<Vec<Prefix>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProtonCliError::io_at(&self.root, e)),
        };

        let mut prefixes: Vec<Prefix> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| Prefix {
                name: e.file_name().to_string_lossy().into_owned(),
                path: e.path(),
            })
            .collect();
        prefixes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(prefixes)
    }

    /// Look up a prefix by name
    pub fn get(&self, name: &str) -> Result<Prefix> {
        validate_name(name).map_err(|_| ProtonCliError::PrefixNotFound(name.to_string()))?;
        let path = self.root.join(name);
        if path.is_dir() {
            Ok(Prefix {
                name: name.to_string(),
                path,
            })
        } else {
            Err(ProtonCliError::PrefixNotFound(name.to_string()))
        }
    }

    /// Create and initialize a prefix with `proton run wineboot`.
    ///
    /// An existing name is refused before anything is touched. A failed
    /// initialization leaves the directory in place.
    pub async fn create(&self, name: &str, record: &ConfigRecord, base_dir: &Path) -> Result<Prefix> {
        validate_name(name)?;
        let path = self.root.join(name);
        if path.exists() {
            return Err(ProtonCliError::AlreadyExists(format!("Prefix '{}'", name)));
        }

        let toolchain = record.toolchain()?;
        std::fs::create_dir_all(&path).map_err(|e| ProtonCliError::io_at(&path, e))?;
        info!("Initializing prefix {:?} with {:?}", path, toolchain.proton);

        let spec = LaunchSpec::tool(toolchain, &path, BuiltinTool::Wineboot);
        match invoker::launch(&spec, base_dir).await? {
            ExitOutcome::Exited(0) => Ok(Prefix {
                name: name.to_string(),
                path,
            }),
            ExitOutcome::Exited(code) => Err(ProtonCliError::PrefixInit {
                name: name.to_string(),
                code: Some(code),
            }),
            ExitOutcome::Interrupted | ExitOutcome::Signaled(_) => Err(ProtonCliError::PrefixInit {
                name: name.to_string(),
                code: None,
            }),
        }
    }

    /// Recursively delete `prefix` after confirmation
    pub fn delete(&self, prefix: &Prefix, confirm: impl FnOnce(&Prefix) -> bool) -> Result<Removal> {
        if !confirm(prefix) {
            return Ok(Removal::Cancelled);
        }
        info!("Deleting prefix {:?}", prefix.path);
        std::fs::remove_dir_all(&prefix.path).map_err(|e| ProtonCliError::io_at(&prefix.path, e))?;
        Ok(Removal::Removed)
    }
}

/// Copy local `.dll` arguments into the prefix's `system32` and replace them
/// with their file names. Other arguments pass through unchanged.
pub fn stage_dll_args(prefix: &Prefix, args: &[OsString]) -> Result<Vec<OsString>> {
    let mut staged = Vec::with_capacity(args.len());
    for arg in args {
        let path = Path::new(arg);
        let is_dll = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("dll"))
            .unwrap_or(false);

        match path.file_name() {
            Some(file_name) if is_dll && path.is_file() => {
                let system32 = prefix.system32();
                if !system32.is_dir() {
                    return Err(ProtonCliError::FileNotFound(system32));
                }
                let dest = system32.join(file_name);
                debug!("Copying {:?} to {:?}", path, dest);
                std::fs::copy(path, &dest).map_err(|e| ProtonCliError::io_at(&dest, e))?;
                staged.push(file_name.to_os_string());
            }
            _ => staged.push(arg.clone()),
        }
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ENV_COMPAT_DATA_PATH;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A `proton` stand-in that records its arguments and prefix, then exits with `code`
    fn fake_proton(root: &Path, code: i32) -> PathBuf {
        let dir = root.join("FakeProton");
        std::fs::create_dir_all(&dir).unwrap();
        let script = format!(
            "#!/bin/sh\necho \"$@\" > \"${var}/boot.log\"\nexit {code}\n",
            var = ENV_COMPAT_DATA_PATH,
            code = code
        );
        let entry = dir.join("proton");
        std::fs::write(&entry, script).unwrap();
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o755)).unwrap();
        dir
    }

    #[test]
    fn names_must_be_single_components() {
        assert!(validate_name("game").is_ok());
        assert!(validate_name("my game").is_ok());
        for bad in ["", ".", "..", "a/b", "/abs", "a/", "./a"] {
            assert!(
                matches!(validate_name(bad), Err(ProtonCliError::InvalidPrefixName(_))),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn list_is_sorted_and_tolerates_missing_root() {
        let dir = TempDir::new().unwrap();
        let manager = PrefixManager::new(dir.path().join("prefixes"));
        assert!(manager.list().unwrap().is_empty());

        for name in ["zeta", "alpha", "mid"] {
            std::fs::create_dir_all(manager.root().join(name)).unwrap();
        }
        std::fs::write(manager.root().join("stray-file"), "").unwrap();

        let names: Vec<_> = manager.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        assert_eq!(manager.get("mid").unwrap().path, manager.root().join("mid"));
        assert!(matches!(
            manager.get("nope"),
            Err(ProtonCliError::PrefixNotFound(_))
        ));
        assert!(matches!(
            manager.get("../prefixes"),
            Err(ProtonCliError::PrefixNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_runs_wineboot_inside_new_prefix() {
        let dir = TempDir::new().unwrap();
        let proton = fake_proton(dir.path(), 0);
        let record = ConfigRecord::new(Some(proton), None);
        let manager = PrefixManager::new(dir.path().join("prefixes"));

        let prefix = manager.create("game", &record, dir.path()).await.unwrap();
        assert_eq!(prefix.path, dir.path().join("prefixes").join("game"));
        let log = std::fs::read_to_string(prefix.path.join("boot.log")).unwrap();
        assert_eq!(log.trim(), "run wineboot");
    }

    #[tokio::test]
    async fn failed_init_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let record = ConfigRecord::new(Some(fake_proton(dir.path(), 1)), None);
        let manager = PrefixManager::new(dir.path().join("prefixes"));

        let err = manager.create("game", &record, dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            ProtonCliError::PrefixInit { code: Some(1), .. }
        ));
        assert!(manager.root().join("game").is_dir());
    }

    #[tokio::test]
    async fn existing_name_is_refused_without_changes() {
        let dir = TempDir::new().unwrap();
        let manager = PrefixManager::new(dir.path().join("prefixes"));
        let existing = manager.root().join("game");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("marker"), "keep").unwrap();

        let record = ConfigRecord::new(Some(fake_proton(dir.path(), 0)), None);
        let err = manager.create("game", &record, dir.path()).await.unwrap_err();
        assert!(matches!(err, ProtonCliError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(existing.join("marker")).unwrap(), "keep");
        assert!(!existing.join("boot.log").exists());
    }

    #[tokio::test]
    async fn create_requires_configured_proton() {
        let dir = TempDir::new().unwrap();
        let manager = PrefixManager::new(dir.path().join("prefixes"));
        let err = manager
            .create("game", &ConfigRecord::default(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtonCliError::NotConfigured));
        assert!(!manager.root().join("game").exists());
    }

    #[test]
    fn delete_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let manager = PrefixManager::new(dir.path());
        std::fs::create_dir_all(dir.path().join("game/pfx/drive_c")).unwrap();
        let prefix = manager.get("game").unwrap();

        assert_eq!(manager.delete(&prefix, |_| false).unwrap(), Removal::Cancelled);
        assert!(prefix.path.exists());

        assert_eq!(manager.delete(&prefix, |_| true).unwrap(), Removal::Removed);
        assert!(!prefix.path.exists());
    }

    #[test]
    fn drive_c_prefers_proton_layout() {
        let dir = TempDir::new().unwrap();
        let prefix = Prefix {
            name: "game".into(),
            path: dir.path().to_path_buf(),
        };
        assert_eq!(prefix.drive_c(), dir.path().join("drive_c"));

        std::fs::create_dir_all(dir.path().join("pfx/drive_c")).unwrap();
        assert_eq!(prefix.drive_c(), dir.path().join("pfx/drive_c"));
        assert_eq!(
            prefix.system32(),
            dir.path().join("pfx/drive_c/windows/system32")
        );
    }

    #[test]
    fn local_dlls_are_copied_into_system32() {
        let dir = TempDir::new().unwrap();
        let prefix = Prefix {
            name: "game".into(),
            path: dir.path().join("game"),
        };
        std::fs::create_dir_all(prefix.path.join("pfx/drive_c/windows/system32")).unwrap();
        let dll = dir.path().join("d3dx9_43.DLL");
        std::fs::write(&dll, "MZ").unwrap();

        let args = vec![
            OsString::from("/s"),
            dll.clone().into_os_string(),
            OsString::from("missing.dll"),
        ];
        let staged = stage_dll_args(&prefix, &args).unwrap();
        assert_eq!(
            staged,
            vec![
                OsString::from("/s"),
                OsString::from("d3dx9_43.DLL"),
                OsString::from("missing.dll"),
            ]
        );
        assert!(prefix.system32().join("d3dx9_43.DLL").is_file());
    }
}
