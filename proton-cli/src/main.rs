//! proton-cli

mod commands;
mod prompt;

use clap::{Parser, Subcommand};
use proton_cli_lib::{ConfigStore, Paths, PrefixManager, ProtonCliError, Result, Settings};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proton-cli")]
#[command(about = "Run Windows programs with Proton from the command line")]
#[command(version)]
#[command(long_about = r#"proton-cli - Proton from the command line

Finds or downloads Proton and the Steam Linux Runtime, manages Wine prefixes
and launches Windows executables inside them.

Start with 'proton-cli check' (or 'proton-cli pull-proton'), then
'proton-cli run game.exe'."#)]
struct Cli {
    /// Enable debug logging (same as PROTON_CLI_DEBUG=1)
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan for installed Proton versions and the Steam Linux Runtime, and select one
    Check,

    /// Download the latest GE-Proton release
    PullProton,

    /// Download or refresh the Steam Linux Runtime (sniper)
    PullRuntime,

    /// Delete an installed Proton version
    ProtonDelete,

    /// Create and initialize a new prefix
    PrefixMake {
        /// Prefix name (asked for when omitted)
        name: Option<String>,
    },

    /// List prefixes
    PrefixList,

    /// Delete a prefix
    PrefixDelete {
        /// Prefix name (chosen from a menu when omitted)
        name: Option<String>,
    },

    /// Open a prefix's C: drive in the file manager
    OpenPrefix {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Run a Windows executable
    Run {
        /// Prefix to run in
        #[arg(short, long)]
        prefix: Option<String>,

        /// Launch options, e.g. "MANGOHUD=1 gamemoderun"
        #[arg(short, long, allow_hyphen_values = true)]
        options: Option<String>,

        /// Executable to run
        exe: PathBuf,

        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },

    /// Pick and run an application installed in a prefix
    Apps {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Run the Wine configuration tool
    Winecfg {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Import a .reg file into a prefix
    Regedit {
        #[arg(short, long)]
        prefix: Option<String>,

        /// Registry file to import
        file: PathBuf,
    },

    /// Run regsvr32; local .dll files are copied into system32 first
    Regsvr32 {
        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },

    /// Run the Wine task manager
    Taskmgr {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Run the Wine uninstaller
    Uninstaller {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Update proton-cli to the latest release
    Update {
        /// Restore the binary replaced by the last update
        #[arg(long)]
        rollback: bool,

        /// Install even if the release publishes no checksum
        #[arg(long)]
        allow_unverified: bool,
    },
}

/// Everything a command handler needs
pub struct Context {
    pub settings: Settings,
    pub paths: Paths,
    pub store: ConfigStore,
    pub prefixes: PrefixManager,
}

impl Context {
    fn load() -> Result<Self> {
        let settings = Settings::load()?;
        let paths = settings.paths()?;
        paths.ensure_dirs()?;
        Ok(Self {
            store: ConfigStore::new(&paths.config_file),
            prefixes: PrefixManager::new(&paths.prefixes_dir),
            settings,
            paths,
        })
    }
}

fn init_logging(debug: bool) {
    let debug = debug
        || std::env::var("PROTON_CLI_DEBUG")
            .map(|v| v == "1")
            .unwrap_or(false);
    let level = if debug { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("proton_cli={level},proton_cli_lib={level}", level = level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(err: &ProtonCliError) {
    eprintln!("✖ {}", err);
    tracing::debug!("{:?}", err);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match Context::load() {
        Ok(ctx) => match commands::dispatch(&ctx, cli.command).await {
            Ok(code) => code,
            Err(e) => {
                report(&e);
                1
            }
        },
        Err(e) => {
            report(&e);
            1
        }
    };

    process::exit(code);
}
