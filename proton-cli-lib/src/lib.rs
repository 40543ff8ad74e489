//! proton-cli library
//!
//! Finds and downloads Proton and the Steam Linux Runtime, manages Wine
//! prefixes and launches Windows programs through Proton.

pub mod apps;
pub mod archive;
pub mod command;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod invoker;
pub mod locator;
pub mod prefix;
pub mod select;
pub mod settings;
pub mod shortcut;
pub mod update;

pub use command::{parse_launch_options, BuiltinTool, LaunchOption, LaunchSpec};
pub use config::{ConfigRecord, ConfigStore, Toolchain};
pub use error::{ProtonCliError, Result};
pub use fetch::{FetchOutcome, Fetcher, ReleaseInfo, RuntimeOutcome};
pub use invoker::ExitOutcome;
pub use locator::{ProtonInstall, Removal, RuntimeBundle};
pub use prefix::{Prefix, PrefixManager};
pub use settings::{Paths, Settings};
