//! Foreground execution of Proton invocations

use crate::command::LaunchSpec;
use crate::error::{ProtonCliError, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

const SIGINT: i32 = 2;

/// How a foreground child finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with the child's exit code
    Exited(i32),
    /// Stopped by the user (Ctrl+C)
    Interrupted,
    /// Killed by another signal
    Signaled(i32),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    /// Exit code to hand back to the shell
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Interrupted => 0,
            ExitOutcome::Signaled(sig) => 128 + sig,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitOutcome::Exited(code),
            (None, Some(SIGINT)) => ExitOutcome::Interrupted,
            (None, Some(sig)) => ExitOutcome::Signaled(sig),
            (None, None) => ExitOutcome::Exited(1),
        }
    }
}

/// Run `argv` in the foreground with inherited stdio and exactly `env`.
///
/// Ctrl+C reaches the child through the terminal; the parent waits for the
/// child to finish and reports [`ExitOutcome::Interrupted`].
pub async fn run(
    argv: &[OsString],
    env: &HashMap<OsString, OsString>,
    cwd: Option<&Path>,
) -> Result<ExitOutcome> {
    let (program, args) = argv.split_first().ok_or_else(|| ProtonCliError::LaunchFailed {
        command: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;
    let cmdline = display_command(argv);
    debug!("Executing: {}", cmdline);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ProtonCliError::PermissionDenied {
            path: Path::new(program).to_path_buf(),
            hint: "the file is not executable".into(),
        },
        _ => ProtonCliError::LaunchFailed {
            command: cmdline.clone(),
            source: e,
        },
    })?;

    tokio::select! {
        status = child.wait() => {
            let outcome = ExitOutcome::from_status(status?);
            debug!("{} finished: {:?}", cmdline, outcome);
            Ok(outcome)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, waiting for {} to exit", cmdline);
            child.wait().await?;
            Ok(ExitOutcome::Interrupted)
        }
    }
}

/// Run a prepared launch
pub async fn launch(spec: &LaunchSpec, base_dir: &Path) -> Result<ExitOutcome> {
    run(&spec.argv(), &spec.env(base_dir), spec.cwd.as_deref()).await
}

fn display_command(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    fn path_env() -> HashMap<OsString, OsString> {
        std::env::vars_os().collect()
    }

    #[tokio::test]
    async fn passes_through_exit_code() {
        let outcome = run(&sh("exit 3"), &path_env(), None).await.unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(3));
        assert!(!outcome.success());
        assert_eq!(outcome.code(), 3);

        let outcome = run(&sh("true"), &path_env(), None).await.unwrap();
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn child_sees_only_given_environment_and_cwd() {
        let dir = TempDir::new().unwrap();
        let mut env = HashMap::new();
        env.insert(OsString::from("ONLY_VAR"), OsString::from("42"));

        let script = "[ \"$ONLY_VAR\" = 42 ] && [ -z \"$HOME\" ] && [ \"$(pwd -P)\" = \"$EXPECTED\" ]";
        env.insert(
            OsString::from("EXPECTED"),
            dir.path().canonicalize().unwrap().into_os_string(),
        );
        let outcome = run(&sh(script), &env, Some(dir.path())).await.unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(0));
    }

    #[tokio::test]
    async fn sigint_death_is_an_interrupt() {
        let outcome = run(&sh("kill -INT $$"), &path_env(), None).await.unwrap();
        assert_eq!(outcome, ExitOutcome::Interrupted);
        assert_eq!(outcome.code(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let argv = vec![OsString::from("/nonexistent/proton"), OsString::from("run")];
        match run(&argv, &path_env(), None).await.unwrap_err() {
            ProtonCliError::LaunchFailed { command, .. } => {
                assert_eq!(command, "/nonexistent/proton run")
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = run(&[], &path_env(), None).await.unwrap_err();
        assert!(matches!(err, ProtonCliError::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn non_executable_binary_is_a_permission_error() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("proton");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        let argv = vec![script.into_os_string()];
        let err = run(&argv, &path_env(), None).await.unwrap_err();
        assert!(matches!(err, ProtonCliError::PermissionDenied { .. }));
    }
}
