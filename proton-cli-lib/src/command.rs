//! Proton command and environment construction
//!
//! A launch is always `wrappers… [runtime-entry --] proton <verb> args…`:
//! user wrappers outermost, the Steam Linux Runtime (when configured) between
//! them and Proton, never the other way round.

use crate::config::Toolchain;
use crate::error::{ProtonCliError, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Proton entry point inside an installation directory
pub const PROTON_ENTRY: &str = "proton";

/// Entry point script of a Steam Linux Runtime bundle
pub const RUNTIME_ENTRY: &str = "_v2-entry-point";

/// Separates the runtime's own arguments from the wrapped command
pub const RUNTIME_SEPARATOR: &str = "--";

/// Prefix data directory
pub const ENV_COMPAT_DATA_PATH: &str = "STEAM_COMPAT_DATA_PATH";

/// Steam client install root
pub const ENV_CLIENT_INSTALL_PATH: &str = "STEAM_COMPAT_CLIENT_INSTALL_PATH";

/// Compatibility tool search path
pub const ENV_TOOL_PATHS: &str = "STEAM_COMPAT_TOOL_PATHS";

/// Windows programs shipped with Proton that can be run by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    /// Prefix initialization
    Wineboot,
    /// Wine configuration GUI
    Winecfg,
    /// Registry editor
    Regedit,
    /// DLL registration
    Regsvr32,
    /// Task manager
    Taskmgr,
    /// Add/remove programs
    Uninstaller,
}

impl BuiltinTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinTool::Wineboot => "wineboot",
            BuiltinTool::Winecfg => "winecfg",
            BuiltinTool::Regedit => "regedit",
            BuiltinTool::Regsvr32 => "regsvr32",
            BuiltinTool::Taskmgr => "taskmgr",
            BuiltinTool::Uninstaller => "uninstaller",
        }
    }

    /// Human readable name
    pub fn description(&self) -> &'static str {
        match self {
            BuiltinTool::Wineboot => "Prefix initialization",
            BuiltinTool::Winecfg => "Wine configuration",
            BuiltinTool::Regedit => "Registry Editor",
            BuiltinTool::Regsvr32 => "regsvr32",
            BuiltinTool::Taskmgr => "Task Manager",
            BuiltinTool::Uninstaller => "Uninstaller",
        }
    }
}

/// One token of a launch options string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOption {
    /// `KEY=VALUE`: set in the child's environment
    EnvAssignment { key: String, value: String },
    /// Anything else: a program to wrap the launch with (e.g. `gamemoderun`)
    WrapperToken { value: String },
}

/// Parse a free-text launch options string like `MANGOHUD=1 gamemoderun`.
///
/// The string is split with shell quoting rules. Tokens containing `=` are
/// environment assignments (split at the first `=`); all others are wrappers,
/// kept in order of appearance.
pub fn parse_launch_options(input: &str) -> Result<Vec<LaunchOption>> {
    let tokens = shlex::split(input)
        .ok_or_else(|| ProtonCliError::InvalidOptions(format!("unbalanced quotes in {:?}", input)))?;

    tokens
        .into_iter()
        .map(|token| match token.split_once('=') {
            Some(("", _)) => Err(ProtonCliError::InvalidOptions(format!(
                "missing variable name in {:?}",
                token
            ))),
            Some((key, value)) => Ok(LaunchOption::EnvAssignment {
                key: key.to_string(),
                value: value.to_string(),
            }),
            None => Ok(LaunchOption::WrapperToken { value: token }),
        })
        .collect()
}

/// Build the argument vector for a Proton invocation.
///
/// `args` follow the entry point (e.g. `["run", "game.exe"]`). The runtime
/// entry point is only inserted if the script actually exists.
pub fn build_command(
    proton: &Path,
    runtime: Option<&Path>,
    args: &[OsString],
    wrappers: &[String],
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = wrappers.iter().map(OsString::from).collect();

    if let Some(entry) = runtime.map(|r| r.join(RUNTIME_ENTRY)).filter(|e| e.is_file()) {
        argv.push(entry.into_os_string());
        argv.push(RUNTIME_SEPARATOR.into());
    }

    argv.push(proton.join(PROTON_ENTRY).into_os_string());
    argv.extend(args.iter().cloned());
    argv
}

/// Build the child environment on top of `base`.
///
/// The client install root is the Steam root that holds the runtime
/// (`<steam>/steamapps/common/<runtime>`), or `base_dir` without a runtime.
pub fn build_env<I>(
    base: I,
    prefix: &Path,
    runtime: Option<&Path>,
    proton: Option<&Path>,
    base_dir: &Path,
) -> HashMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: HashMap<OsString, OsString> = base.into_iter().collect();

    env.insert(ENV_COMPAT_DATA_PATH.into(), prefix.as_os_str().to_owned());

    let install_root = runtime
        .filter(|r| r.exists())
        .and_then(|r| r.ancestors().nth(3))
        .unwrap_or(base_dir);
    env.insert(
        ENV_CLIENT_INSTALL_PATH.into(),
        install_root.as_os_str().to_owned(),
    );

    if let Some(tools_dir) = proton.and_then(Path::parent) {
        env.insert(ENV_TOOL_PATHS.into(), tools_dir.as_os_str().to_owned());
    }

    env
}

/// Everything needed to launch one Proton invocation
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub toolchain: Toolchain,
    pub prefix: PathBuf,
    pub args: Vec<OsString>,
    pub wrappers: Vec<String>,
    pub env_overrides: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    /// `proton run <target>` inside `prefix`
    pub fn run(toolchain: Toolchain, prefix: impl Into<PathBuf>, target: impl Into<OsString>) -> Self {
        Self {
            toolchain,
            prefix: prefix.into(),
            args: vec!["run".into(), target.into()],
            wrappers: Vec::new(),
            env_overrides: Vec::new(),
            cwd: None,
        }
    }

    /// `proton run <tool>` inside `prefix`
    pub fn tool(toolchain: Toolchain, prefix: impl Into<PathBuf>, tool: BuiltinTool) -> Self {
        Self::run(toolchain, prefix, tool.as_str())
    }

    /// Append positional arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Apply parsed launch options
    pub fn with_options(mut self, options: Vec<LaunchOption>) -> Self {
        for option in options {
            match option {
                LaunchOption::EnvAssignment { key, value } => self.env_overrides.push((key, value)),
                LaunchOption::WrapperToken { value } => self.wrappers.push(value),
            }
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn argv(&self) -> Vec<OsString> {
        build_command(
            &self.toolchain.proton,
            self.toolchain.runtime.as_deref(),
            &self.args,
            &self.wrappers,
        )
    }

    /// Environment for the child: current process environment, Proton
    /// variables, then user overrides.
    pub fn env(&self, base_dir: &Path) -> HashMap<OsString, OsString> {
        let mut env = build_env(
            std::env::vars_os(),
            &self.prefix,
            self.toolchain.runtime.as_deref(),
            Some(&self.toolchain.proton),
            base_dir,
        );
        for (key, value) in &self.env_overrides {
            env.insert(key.into(), value.into());
        }
        env
    }
}
