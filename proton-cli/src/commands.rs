//! Command handlers. Each returns the process exit code.

use crate::prompt;
use crate::{Command, Context};
use proton_cli_lib::apps::{scan_installed_apps, InstalledApp};
use proton_cli_lib::command::{parse_launch_options, BuiltinTool, LaunchOption, LaunchSpec};
use proton_cli_lib::config::{ConfigRecord, Toolchain};
use proton_cli_lib::fetch::{FetchOutcome, Fetcher, RuntimeOutcome};
use proton_cli_lib::invoker::{self, ExitOutcome};
use proton_cli_lib::locator::{self, Removal};
use proton_cli_lib::prefix::{stage_dll_args, Prefix, DEFAULT_PREFIX};
use proton_cli_lib::select::EmptyInput;
use proton_cli_lib::shortcut::{self, DesktopEntry};
use proton_cli_lib::update::{self, Updater};
use proton_cli_lib::{ProtonCliError, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub async fn dispatch(ctx: &Context, command: Command) -> Result<i32> {
    match command {
        Command::Check => check(ctx),
        Command::PullProton => pull_proton(ctx).await,
        Command::PullRuntime => pull_runtime(ctx).await,
        Command::ProtonDelete => proton_delete(ctx),
        Command::PrefixMake { name } => prefix_make(ctx, name).await,
        Command::PrefixList => prefix_list(ctx),
        Command::PrefixDelete { name } => prefix_delete(ctx, name),
        Command::OpenPrefix { prefix } => open_prefix(ctx, prefix).await,
        Command::Run {
            prefix,
            options,
            exe,
            args,
        } => run(ctx, prefix, options, exe, args).await,
        Command::Apps { prefix } => apps(ctx, prefix).await,
        Command::Winecfg { prefix } => run_tool(ctx, prefix, BuiltinTool::Winecfg, Vec::new()).await,
        Command::Regedit { prefix, file } => {
            let file = file
                .canonicalize()
                .map_err(|_| ProtonCliError::FileNotFound(file.clone()))?;
            println!("  File: {}", file.display());
            run_tool(ctx, prefix, BuiltinTool::Regedit, vec![file.into_os_string()]).await
        }
        Command::Regsvr32 { prefix, args } => run_tool(ctx, prefix, BuiltinTool::Regsvr32, args).await,
        Command::Taskmgr { prefix } => run_tool(ctx, prefix, BuiltinTool::Taskmgr, Vec::new()).await,
        Command::Uninstaller { prefix } => {
            run_tool(ctx, prefix, BuiltinTool::Uninstaller, Vec::new()).await
        }
        Command::Update {
            rollback,
            allow_unverified,
        } => update(ctx, rollback, allow_unverified).await,
    }
}

fn check(ctx: &Context) -> Result<i32> {
    println!("➜ Scanning for Proton versions...");
    let installs = locator::find_installations(&ctx.paths.proton_search_paths());

    let chosen = if installs.is_empty() {
        println!("⚠ Proton not found in standard directories.");
        println!("If you have Proton installed in a custom location, enter its full path.");
        prompt::read_line("Custom Proton path (Enter to skip): ")
            .filter(|input| !input.is_empty())
            .and_then(|input| {
                let found = locator::resolve_custom_path(&input, &ctx.paths.home);
                if found.is_none() {
                    eprintln!("✖ Invalid path or 'proton' executable not found.");
                }
                found
            })
    } else {
        prompt::choose(
            "Found Proton versions",
            &installs,
            |i| format!("{} ({})", i.name, i.source.display()),
            EmptyInput::First,
        )
        .cloned()
    };

    let runtime = chosen.as_ref().and_then(|_| {
        println!("➜ Scanning for Steam Linux Runtime...");
        let runtime = locator::find_support_runtime(&ctx.paths.runtime_search_paths());
        match &runtime {
            Some(rt) => println!("✔ Found Steam Linux Runtime: {}", rt.name),
            None => println!("⚠ Steam Linux Runtime not found. Applications will run with system libraries."),
        }
        runtime
    });

    let record = ConfigRecord::new(
        chosen.as_ref().map(|i| i.path.clone()),
        runtime.map(|r| r.path),
    );
    ctx.store.save(&record)?;

    match chosen {
        Some(install) => {
            println!("✔ Selected Proton: {} ({})", install.name, install.path.display());
            Ok(0)
        }
        None => {
            eprintln!("✖ No Proton version selected.");
            Ok(1)
        }
    }
}

async fn pull_proton(ctx: &Context) -> Result<i32> {
    println!("➜ Checking the latest GE-Proton release...");
    let fetcher = Fetcher::new(&ctx.settings, &ctx.paths, true)?;
    let release = fetcher.fetch_latest(&ctx.settings.proton_api_url).await?;
    println!("Latest version: {}", release.tag_name);

    match fetcher.install_release(&release).await? {
        FetchOutcome::AlreadyInstalled(path) => {
            println!("✔ {} is already installed: {}", release.tag_name, path.display())
        }
        FetchOutcome::Installed(path) => println!("✔ Installation complete: {}", path.display()),
    }
    println!("Run 'proton-cli check' to select it.");
    Ok(0)
}

async fn pull_runtime(ctx: &Context) -> Result<i32> {
    println!("➜ Checking Steam Linux Runtime (sniper)...");
    let fetcher = Fetcher::new(&ctx.settings, &ctx.paths, true)?;
    let outcome = fetcher
        .pull_runtime(&ctx.store, || {
            println!("⚠ Runtime found but might be outdated.");
            prompt::confirm("Do you want to update/re-download?", true)
        })
        .await?;

    match outcome {
        RuntimeOutcome::UpToDate(_) => println!("✔ You already have the latest runtime."),
        RuntimeOutcome::Installed(path) => {
            println!("✔ Runtime installed: {}", path.display());
            println!("Run 'proton-cli check' to apply changes.");
        }
        RuntimeOutcome::Declined => println!("Keeping the installed runtime."),
    }
    Ok(0)
}

fn proton_delete(ctx: &Context) -> Result<i32> {
    println!("➜ Scanning for Proton versions to delete...");
    let installs = locator::find_installations(&ctx.paths.proton_search_paths());
    if installs.is_empty() {
        println!("⚠ No Proton versions found in search directories.");
        return Ok(0);
    }

    let Some(install) = prompt::choose(
        "Select Proton version to delete",
        &installs,
        |i| format!("{} ({})", i.name, i.source.display()),
        EmptyInput::Cancel,
    ) else {
        println!("Operation cancelled.");
        return Ok(0);
    };

    let (removal, cleared) = locator::delete_installation(install, &ctx.store, |i| {
        prompt::confirm(
            &format!(
                "⚠ '{}' at '{}' will be PERMANENTLY deleted. Are you sure?",
                i.name,
                i.source.display()
            ),
            false,
        )
    })?;

    match removal {
        Removal::Cancelled => println!("Deletion cancelled."),
        Removal::Removed => {
            println!("✔ Version deleted.");
            if cleared {
                println!("⚠ Deleted version was the active one. Configuration cleared.");
            }
        }
    }
    Ok(0)
}

async fn prefix_make(ctx: &Context, name: Option<String>) -> Result<i32> {
    let name = match name.or_else(|| prompt::read_line("Enter name for new prefix: ")) {
        Some(name) if !name.is_empty() => name,
        _ => {
            println!("Operation cancelled.");
            return Ok(0);
        }
    };

    create_prefix(ctx, &name).await?;
    Ok(0)
}

async fn create_prefix(ctx: &Context, name: &str) -> Result<Prefix> {
    println!("➜ Creating prefix: {}", name);
    println!("➜ Initializing Wine prefix (this may take a while)...");
    let prefix = ctx
        .prefixes
        .create(name, &ctx.store.load(), &ctx.paths.base_dir)
        .await?;
    println!("✔ Prefix initialized: {}", prefix.path.display());
    Ok(prefix)
}

fn prefix_list(ctx: &Context) -> Result<i32> {
    let prefixes = ctx.prefixes.list()?;
    if prefixes.is_empty() {
        println!("⚠ No prefixes found.");
        return Ok(0);
    }

    println!("Prefixes in {}:", ctx.prefixes.root().display());
    for prefix in &prefixes {
        println!("  {}", prefix.name);
    }
    Ok(0)
}

fn prefix_delete(ctx: &Context, name: Option<String>) -> Result<i32> {
    let prefix = match name {
        Some(name) => ctx.prefixes.get(&name)?,
        None => {
            let prefixes = ctx.prefixes.list()?;
            if prefixes.is_empty() {
                println!("⚠ No prefixes found.");
                return Ok(0);
            }
            match prompt::choose(
                "Select prefix to delete",
                &prefixes,
                |p| p.name.clone(),
                EmptyInput::Cancel,
            ) {
                Some(prefix) => prefix.clone(),
                None => {
                    println!("Operation cancelled.");
                    return Ok(0);
                }
            }
        }
    };

    let removal = ctx.prefixes.delete(&prefix, |p| {
        prompt::confirm(
            &format!("⚠ '{}' prefix will be deleted. Are you sure?", p.name),
            false,
        )
    })?;
    match removal {
        Removal::Removed => println!("✔ Prefix deleted."),
        Removal::Cancelled => println!("Deletion cancelled."),
    }
    Ok(0)
}

/// Resolve `-p NAME` or ask; `None` when there is nothing to pick or the user gave up
fn select_prefix(ctx: &Context, name: Option<String>, title: &str) -> Result<Option<Prefix>> {
    if let Some(name) = name {
        return ctx.prefixes.get(&name).map(Some);
    }

    let prefixes = ctx.prefixes.list()?;
    if prefixes.is_empty() {
        println!("⚠ No prefixes found. Create one with 'proton-cli prefix-make'.");
        return Ok(None);
    }
    Ok(prompt::choose(title, &prefixes, |p| p.name.clone(), EmptyInput::Reject).cloned())
}

async fn open_prefix(ctx: &Context, prefix: Option<String>) -> Result<i32> {
    let Some(prefix) = select_prefix(ctx, prefix, "Select prefix to open")? else {
        return Ok(0);
    };

    let drive_c = prefix.drive_c();
    let opener = which::which("xdg-open").map_err(|_| ProtonCliError::FileNotFound(PathBuf::from("xdg-open")))?;
    println!("➜ Opening: {}", drive_c.display());

    let env: HashMap<OsString, OsString> = std::env::vars_os().collect();
    let argv = vec![opener.into_os_string(), drive_c.into_os_string()];
    Ok(invoker::run(&argv, &env, None).await?.code())
}

/// Launch options from `-o`, or asked for on a terminal
fn launch_options(given: Option<String>) -> Option<String> {
    if given.is_some() {
        return given;
    }
    if !prompt::interactive() {
        return None;
    }

    println!("\nLaunch options:");
    println!("Enter environment variables (e.g. MANGOHUD=1) or wrappers (e.g. gamemoderun).");
    prompt::read_line("Options [Enter for none]: ").filter(|o| !o.is_empty())
}

async fn run(
    ctx: &Context,
    prefix: Option<String>,
    options: Option<String>,
    exe: PathBuf,
    args: Vec<OsString>,
) -> Result<i32> {
    let toolchain = ctx.store.load().toolchain()?;
    let exe = exe
        .canonicalize()
        .map_err(|_| ProtonCliError::FileNotFound(exe.clone()))?;

    let prefix = match prefix {
        Some(name) => ctx.prefixes.get(&name)?,
        None => {
            let prefixes = ctx.prefixes.list()?;
            if prefixes.is_empty() {
                println!("⚠ No prefixes found. Creating '{}'...", DEFAULT_PREFIX);
                create_prefix(ctx, DEFAULT_PREFIX).await?
            } else {
                match prompt::choose("Select prefix", &prefixes, |p| p.name.clone(), EmptyInput::First) {
                    Some(prefix) => prefix.clone(),
                    None => {
                        println!("Operation cancelled.");
                        return Ok(0);
                    }
                }
            }
        }
    };

    let options = launch_options(options);
    let parsed = parse_launch_options(options.as_deref().unwrap_or(""))?;
    offer_shortcut(ctx, &exe, &prefix, options.as_deref(), &args);

    launch_exe(ctx, toolchain, &prefix, &exe, args, parsed).await
}

async fn apps(ctx: &Context, prefix: Option<String>) -> Result<i32> {
    let toolchain = ctx.store.load().toolchain()?;
    let Some(prefix) = select_prefix(ctx, prefix, "Select prefix")? else {
        return Ok(0);
    };

    println!("➜ Scanning applications...");
    let found = scan_installed_apps(&prefix.drive_c());
    if found.is_empty() {
        eprintln!("✖ No installed application (.exe) found in this prefix.");
        return Ok(1);
    }

    let Some(app) = prompt::choose(
        "Found applications",
        &found,
        InstalledApp::display_name,
        EmptyInput::First,
    ) else {
        println!("Operation cancelled.");
        return Ok(0);
    };

    let options = launch_options(None);
    let parsed = parse_launch_options(options.as_deref().unwrap_or(""))?;
    offer_shortcut(ctx, &app.path, &prefix, options.as_deref(), &[]);

    launch_exe(ctx, toolchain, &prefix, &app.path, Vec::new(), parsed).await
}

async fn launch_exe(
    ctx: &Context,
    toolchain: Toolchain,
    prefix: &Prefix,
    exe: &Path,
    args: Vec<OsString>,
    options: Vec<LaunchOption>,
) -> Result<i32> {
    println!("\n➜ Launching: {}", exe.display());
    println!("  Prefix: {}", prefix.name);
    match toolchain.runtime.as_deref().and_then(Path::file_name) {
        Some(runtime) => println!("  Runtime: {}", runtime.to_string_lossy()),
        None => println!("  Runtime: System libraries"),
    }

    let mut spec = LaunchSpec::run(toolchain, &prefix.path, exe)
        .args(args)
        .with_options(options);
    if let Some(dir) = exe.parent() {
        spec = spec.current_dir(dir);
    }

    finish(invoker::launch(&spec, &ctx.paths.base_dir).await?)
}

async fn run_tool(
    ctx: &Context,
    prefix: Option<String>,
    tool: BuiltinTool,
    args: Vec<OsString>,
) -> Result<i32> {
    let toolchain = ctx.store.load().toolchain()?;
    let title = format!("Select prefix for {}", tool.description());
    let Some(prefix) = select_prefix(ctx, prefix, &title)? else {
        return Ok(0);
    };

    let args = match tool {
        BuiltinTool::Regsvr32 => stage_dll_args(&prefix, &args)?,
        _ => args,
    };

    println!("➜ Starting {}...", tool.description());
    let spec = LaunchSpec::tool(toolchain, &prefix.path, tool).args(args);
    finish(invoker::launch(&spec, &ctx.paths.base_dir).await?)
}

fn finish(outcome: ExitOutcome) -> Result<i32> {
    match outcome {
        ExitOutcome::Interrupted => println!("\n⚠ Application stopped."),
        ExitOutcome::Signaled(sig) => eprintln!("✖ Process killed by signal {}", sig),
        ExitOutcome::Exited(code) if !outcome.success() => {
            debug!("Process exited with code {}", code)
        }
        ExitOutcome::Exited(_) => {}
    }
    Ok(outcome.code())
}

/// Offer to create (or refresh) a desktop shortcut for `exe`. Failures only warn.
fn offer_shortcut(ctx: &Context, exe: &Path, prefix: &Prefix, options: Option<&str>, args: &[OsString]) {
    if !prompt::interactive() {
        return;
    }

    let applications = ctx.paths.home.join(".local/share/applications");
    let default_name = exe
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app".to_string());

    let (name, target) = match shortcut::find_existing(&applications, exe) {
        Some(existing) => {
            let file_name = existing.file_name().map(|n| n.to_string_lossy().into_owned());
            println!("\nℹ A shortcut already exists: {}", file_name.unwrap_or_default());
            if !prompt::confirm("Do you want to update it with the current options?", false) {
                return;
            }
            let name = shortcut::read_name(&existing).unwrap_or(default_name);
            (name, existing)
        }
        None => {
            if !prompt::confirm("\nCreate a desktop shortcut?", true) {
                return;
            }
            let name = prompt::read_line(&format!("Shortcut name [Default: {}]: ", default_name))
                .filter(|n| !n.is_empty())
                .unwrap_or(default_name);
            let target = shortcut::shortcut_path(&applications, &name);
            (name, target)
        }
    };

    let program = match std::env::current_exe() {
        Ok(program) => program,
        Err(e) => {
            warn!("Could not determine the proton-cli executable: {}", e);
            return;
        }
    };

    let entry = DesktopEntry {
        name,
        program,
        prefix: prefix.name.clone(),
        options: options.map(str::to_string),
        exe: exe.to_path_buf(),
        args: args.to_vec(),
    };
    match entry.write_to(&target) {
        Ok(()) => println!("✔ Shortcut saved to: {}", target.display()),
        Err(e) => eprintln!("✖ Could not create shortcut: {}", e),
    }
}

async fn update(ctx: &Context, rollback: bool, allow_unverified: bool) -> Result<i32> {
    let exe = std::env::current_exe()
        .map_err(|e| ProtonCliError::Update(format!("Could not determine executable path: {}", e)))?;

    if rollback {
        update::rollback(&exe)?;
        println!("✔ Restored the previous version from {}", update::backup_path(&exe).display());
        return Ok(0);
    }

    println!("➜ Checking for updates...");
    let updater = Updater::new(&ctx.settings.update_api_url, true)?;
    let check = updater.check().await?;
    println!("  Current version: {}", check.current);
    println!("  Latest version:  {}", check.latest);

    if !check.is_newer() {
        println!("✔ You are using the latest version.");
        return Ok(0);
    }

    if !prompt::confirm("⚠ New version available! Do you want to update?", true) {
        println!("Update cancelled.");
        return Ok(0);
    }

    let backup = updater.install(&check.release, &exe, allow_unverified).await?;
    println!("✔ Updated to {}.", check.latest);
    println!("  Previous version kept at {} ('proton-cli update --rollback' restores it)", backup.display());
    Ok(0)
}
