//! Installed Windows applications inside a prefix

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Executables whose names contain any of these are never offered
pub const IGNORED_KEYWORDS: &[&str] = &[
    "uninstall",
    "unins",
    "update",
    "helper",
    "crash",
    "report",
    "config",
    "redist",
    "dxsetup",
    "vcredist",
    "dotnet",
    "unitycrashhandler",
    "webview",
    "setup",
    "iexplore",
    "wmplayer",
    "wordpad",
];

const PROGRAM_DIRS: [&str; 2] = ["Program Files", "Program Files (x86)"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub path: PathBuf,
}

impl InstalledApp {
    /// `<parent dir>/<file name>`
    pub fn display_name(&self) -> String {
        let file = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.path.parent().and_then(Path::file_name) {
            Some(parent) => format!("{}/{}", parent.to_string_lossy(), file),
            None => file,
        }
    }
}

fn is_candidate(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(".exe") && !IGNORED_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Scan both Program Files directories under `drive_c`.
///
/// Shallow executables come first; ties are broken by file name.
pub fn scan_installed_apps(drive_c: &Path) -> Vec<InstalledApp> {
    let mut apps: Vec<InstalledApp> = PROGRAM_DIRS
        .iter()
        .map(|dir| drive_c.join(dir))
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.file_type().is_file() && is_candidate(&e.file_name().to_string_lossy()))
        .map(|e| InstalledApp {
            path: e.into_path(),
        })
        .collect();

    apps.sort_by(|a, b| {
        let depth = |p: &Path| p.components().count();
        depth(&a.path)
            .cmp(&depth(&b.path))
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    debug!("Found {} installed applications under {:?}", apps.len(), drive_c);
    apps
}
