//! Desktop entries that re-launch an executable through proton-cli

use crate::error::{ProtonCliError, Result};
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const SHORTCUT_MARKER: &str = "proton-cli";

/// Quote one `Exec` token: wrapped in `"` with `\` and `"` escaped
pub fn desktop_quote(token: &str) -> String {
    format!("\"{}\"", token.replace('\\', "\\\\").replace('"', "\\\""))
}

/// File-name-safe form of a shortcut name
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .replace(' ', "-")
        .to_lowercase()
}

/// Path of the desktop file for a shortcut named `name`
pub fn shortcut_path(applications_dir: &Path, name: &str) -> PathBuf {
    applications_dir.join(format!("{}-{}.desktop", SHORTCUT_MARKER, safe_name(name)))
}

/// Find a proton-cli desktop file that already launches `exe`
pub fn find_existing(applications_dir: &Path, exe: &Path) -> Option<PathBuf> {
    let needle = exe.to_string_lossy();
    let entries = std::fs::read_dir(applications_dir).ok()?;
    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "desktop").unwrap_or(false))
        .filter(|p| {
            std::fs::read(p)
                .map(|bytes| {
                    let content = String::from_utf8_lossy(&bytes);
                    content.contains(needle.as_ref()) && content.contains(SHORTCUT_MARKER)
                })
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

/// The `Name=` value of an existing desktop file
pub fn read_name(desktop_file: &Path) -> Option<String> {
    let bytes = std::fs::read(desktop_file).ok()?;
    String::from_utf8_lossy(&bytes)
        .lines()
        .find_map(|line| line.strip_prefix("Name="))
        .map(|name| name.trim().to_string())
}

/// A desktop entry launching `exe` in `prefix` via `program run`
#[derive(Debug, Clone)]
pub struct DesktopEntry {
    pub name: String,
    pub program: PathBuf,
    pub prefix: String,
    pub options: Option<String>,
    pub exe: PathBuf,
    pub args: Vec<OsString>,
}

impl DesktopEntry {
    /// Unquoted `Exec` tokens
    pub fn exec_tokens(&self) -> Vec<String> {
        let mut tokens = vec![
            self.program.to_string_lossy().into_owned(),
            "run".to_string(),
            "-p".to_string(),
            self.prefix.clone(),
        ];
        if let Some(options) = self.options.as_deref().filter(|o| !o.is_empty()) {
            tokens.push("-o".to_string());
            tokens.push(options.to_string());
        }
        tokens.push(self.exe.to_string_lossy().into_owned());
        tokens.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        tokens
    }

    pub fn render(&self) -> String {
        let exec = self
            .exec_tokens()
            .iter()
            .map(|t| desktop_quote(t))
            .collect::<Vec<_>>()
            .join(" ");
        let working_dir = self
            .exe
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        format!(
            "[Desktop Entry]\n\
             Name={}\n\
             Comment=Launched via Proton-CLI\n\
             Exec={}\n\
             Path={}\n\
             Icon=utilities-terminal\n\
             Terminal=false\n\
             Type=Application\n\
             Categories=Utility;Game;\n",
            self.name, exec, working_dir
        )
    }

    /// Write the entry to `path`, make it executable and refresh the desktop database
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| ProtonCliError::Config(format!("Invalid shortcut path {:?}", path)))?;
        std::fs::create_dir_all(dir).map_err(|e| ProtonCliError::io_at(dir, e))?;
        std::fs::write(path, self.render()).map_err(|e| ProtonCliError::io_at(path, e))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| ProtonCliError::io_at(path, e))?;
        debug!("Wrote desktop entry {:?}", path);

        refresh_database(dir);
        Ok(())
    }
}

fn refresh_database(dir: &Path) {
    let Ok(tool) = which::which("update-desktop-database") else {
        debug!("update-desktop-database not installed");
        return;
    };
    let status = Command::new(tool)
        .arg(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        warn!("Could not refresh desktop database: {}", e);
    }
}
