//! Subcommand handlers. The installer core lives in `distros`; everything
//! here collects options, renders tables and drains the progress queue.

use crate::common::config::InstallerConfig;
use crate::common::paths;
use crate::common::progress::{
    bar_position, create_install_bar, create_spinner, finish_spinner_with_success,
};
use crate::distros::base::apply_git_variants;
use crate::distros::configure::configure_session;
use crate::distros::context::RunContext;
use crate::distros::host::{Host, HostPaths};
use crate::distros::osinfo::OsInfo;
use crate::distros::privilege::{self, Credential, Elevation};
use crate::distros::progress::{InstallProgressMsg, ProgressSink};
use crate::distros::runner::{CancelToken, SystemRunner, is_cancelled};
use crate::distros::types::{
    Dependency, InstallOverrides, RepositoryType, Terminal, WindowManager,
};
use crate::distros::{Distribution, DistroRegistry};
use crate::ui::{self, prelude::*};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde_json::json;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::time::Duration;

const INSTALL_LOG: &str = "install.log";
const EXIT_CANCELLED: u8 = 130;

/// Compositor and terminal selection shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Window manager to target (defaults to the config value)
    #[arg(long, value_enum)]
    pub wm: Option<WindowManager>,

    /// Terminal emulator to target (defaults to the config value)
    #[arg(long, value_enum)]
    pub terminal: Option<Terminal>,
}

impl SessionArgs {
    fn resolve(&self, config: &InstallerConfig) -> (WindowManager, Terminal) {
        (
            self.wm.unwrap_or(config.window_manager),
            self.terminal.unwrap_or(config.terminal),
        )
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Resolve this dependency to its git build (repeatable)
    #[arg(long = "git", value_name = "NAME")]
    pub git: Vec<String>,

    /// Distribution id to use instead of the detected one
    #[arg(long, value_name = "ID")]
    pub distro: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Resolve this dependency to its git build (repeatable)
    #[arg(long = "git", value_name = "NAME")]
    pub git: Vec<String>,

    /// Never install this dependency (repeatable)
    #[arg(long, value_name = "NAME")]
    pub disable: Vec<String>,

    /// Install this dependency even when it is present (repeatable)
    #[arg(long, value_name = "NAME")]
    pub reinstall: Vec<String>,

    /// Prompt for the sudo password once up front
    #[arg(long, conflicts_with = "password_stdin")]
    pub ask_password: bool,

    /// Read the sudo password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,

    /// Abort the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<InstallerConfig> {
    InstallerConfig::load(path)
}

/// OS identity for `distro`, or the detected one. A forced id that differs
/// from the running system gets a synthetic identity with just that id.
fn target_os(distro: Option<&str>) -> Result<OsInfo> {
    let detected = OsInfo::detect();
    match distro {
        None => Ok(detected.context("detecting operating system")?),
        Some(id) => Ok(detected
            .ok()
            .filter(|os| os.id == id)
            .unwrap_or_else(|| OsInfo::parse_os_release(&format!("ID={}\n", id)))),
    }
}

fn build_distro(config: &InstallerConfig, os: OsInfo) -> Result<Box<dyn Distribution>> {
    let registry = DistroRegistry::with_builtin()?;
    let host = Host::system(os, config.cache_dir.clone())?
        .with_force_quickshell_git(config.force_quickshell_git);
    Ok(registry.detect(host)?)
}

fn git_set(config: &InstallerConfig, extra: &[String]) -> HashSet<String> {
    config.variants(extra).into_keys().collect()
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Parse `#RRGGBB`.
fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

pub fn list_distros() -> Result<ExitCode> {
    let registry = DistroRegistry::with_builtin()?;
    let configs = registry.configs();

    if get_output_format() == OutputFormat::Json {
        let data: Vec<_> = configs
            .iter()
            .map(|c| json!({ "id": c.id, "family": c.family, "color": c.color_hex }))
            .collect();
        emit(
            Level::Info,
            "distros.list",
            &format!("{} distributions", configs.len()),
            Some(json!(data)),
        );
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = new_table(vec!["ID", "Family", "Color"]);
    for config in &configs {
        let mut swatch = Cell::new(format!("██ {}", config.color_hex));
        if let Some((r, g, b)) = parse_hex_color(config.color_hex) {
            swatch = swatch.fg(Color::Rgb { r, g, b });
        }
        table.add_row(vec![
            Cell::new(config.id),
            Cell::new(config.family.to_string()),
            swatch,
        ]);
    }
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}

fn detect_dependencies(
    distro: &dyn Distribution,
    wm: WindowManager,
    terminal: Terminal,
) -> Vec<Dependency> {
    if get_output_format() != OutputFormat::Text {
        return distro.detect_dependencies_with_terminal(wm, terminal);
    }
    let pb = create_spinner(format!("Detecting dependencies on {}...", distro.id()));
    let dependencies = distro.detect_dependencies_with_terminal(wm, terminal);
    let missing = dependencies.iter().filter(|d| !d.is_installed()).count();
    finish_spinner_with_success(
        pb,
        format!("Checked {} dependencies, {} missing", dependencies.len(), missing),
    );
    dependencies
}

fn print_dependencies(distro: &dyn Distribution, dependencies: &[Dependency]) {
    if get_output_format() == OutputFormat::Json {
        emit(
            Level::Info,
            "detect.dependencies",
            &format!("{} dependencies on {}", dependencies.len(), distro.id()),
            serde_json::to_value(dependencies).ok(),
        );
        return;
    }

    let mut table = new_table(vec!["Dependency", "Status", "Variant", "Required", "Description"]);
    for dep in dependencies {
        let status_color = if dep.is_installed() { Color::Green } else { Color::Red };
        table.add_row(vec![
            Cell::new(&dep.name),
            Cell::new(dep.status.to_string()).fg(status_color),
            Cell::new(dep.variant.to_string()),
            Cell::new(if dep.required { "yes" } else { "no" }),
            Cell::new(&dep.description),
        ]);
    }
    println!("{table}");
}

pub fn detect(config_path: Option<&Path>, target: &TargetArgs) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let (wm, terminal) = target.session.resolve(&config);
    let distro = build_distro(&config, target_os(target.distro.as_deref())?)?;

    let mut dependencies = detect_dependencies(distro.as_ref(), wm, terminal);
    apply_git_variants(&mut dependencies, &git_set(&config, &target.git));
    print_dependencies(distro.as_ref(), &dependencies);
    Ok(ExitCode::SUCCESS)
}

pub fn mapping(config_path: Option<&Path>, target: &TargetArgs) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let (wm, _) = target.session.resolve(&config);
    let distro = build_distro(&config, target_os(target.distro.as_deref())?)?;

    let variants = config.variants(&target.git);
    let mapping = distro.package_mapping_with_variants(wm, &variants);
    let mut entries: Vec<_> = mapping.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if get_output_format() == OutputFormat::Json {
        let data: Vec<_> = entries
            .iter()
            .map(|(dep, m)| json!({ "dependency": dep, "mapping": m }))
            .collect();
        emit(
            Level::Info,
            "mapping.list",
            &format!("{} mappings for {} on {}", entries.len(), wm, distro.id()),
            Some(json!(data)),
        );
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = new_table(vec!["Dependency", "Package", "Repository", "Source"]);
    for (dep, m) in &entries {
        let repo_color = match m.repository {
            RepositoryType::System => Color::Green,
            RepositoryType::ThirdParty => Color::Yellow,
            RepositoryType::Manual => Color::Magenta,
        };
        table.add_row(vec![
            Cell::new(dep),
            Cell::new(&m.name),
            Cell::new(m.repository.to_string()).fg(repo_color),
            Cell::new(m.repo_url.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{} packages for {} ({})", distro.id(), wm, distro.package_manager());
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}

fn collect_credential(args: &InstallArgs) -> Result<Credential> {
    if sudo::check() == sudo::RunningAs::Root {
        return Ok(Credential::empty());
    }
    if args.password_stdin {
        return Ok(privilege::read_credential_from_stdin()?);
    }
    if args.ask_password {
        return Ok(privilege::prompt_credential()?);
    }
    Ok(Credential::empty())
}

/// One install.log entry for a progress event.
fn format_log_entry(timestamp: &str, msg: &InstallProgressMsg) -> String {
    let mut entry = format!("{} [{}] {}\n", timestamp, msg.phase, msg.step);
    if !msg.command_info.is_empty() {
        entry.push_str(&format!("  $ {}\n", msg.command_info));
    }
    for line in msg.log_output.lines() {
        entry.push_str(&format!("  {}\n", line));
    }
    entry
}

fn open_install_log(path: &Path) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            emit(
                Level::Warn,
                "install.log",
                &format!("Cannot write {}: {}", path.display(), err),
                None,
            );
            None
        }
    }
}

/// Drain the progress queue until the sender side is dropped.
fn render_progress(rx: Receiver<InstallProgressMsg>, mut log: Option<File>) {
    let bar = (get_output_format() == OutputFormat::Text).then(create_install_bar);

    for msg in rx {
        if let Some(file) = log.as_mut() {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let _ = file.write_all(format_log_entry(&timestamp, &msg).as_bytes());
        }

        let Some(bar) = &bar else {
            emit(
                Level::Info,
                "install.progress",
                &msg.step,
                serde_json::to_value(&msg).ok(),
            );
            continue;
        };
        bar.set_position(bar_position(msg.progress));
        bar.set_prefix(msg.phase.label());
        bar.set_message(msg.step.clone());
        if ui::is_debug_enabled() && !msg.command_info.is_empty() {
            bar.println(format!("$ {}", msg.command_info));
        }
        if msg.is_complete {
            bar.finish_and_clear();
        }
    }

    if let Some(bar) = bar
        && !bar.is_finished()
    {
        bar.abandon();
    }
}

pub async fn install(config_path: Option<&Path>, args: InstallArgs) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let (wm, terminal) = args.session.resolve(&config);

    let os = OsInfo::detect().context("detecting operating system")?;
    if os.is_unsupported() {
        emit(
            Level::Warn,
            "install.unsupported",
            &format!(
                "{} {} does not ship the packages DankMaterialShell needs; installation will likely fail",
                os.name(),
                os.version_id
            ),
            None,
        );
    }
    let distro = build_distro(&config, os)?;
    emit(
        Level::Info,
        "install.distro",
        &format!("Detected {} ({})", distro.host().os.name(), distro.id()),
        None,
    );

    let mut dependencies = detect_dependencies(distro.as_ref(), wm, terminal);
    apply_git_variants(&mut dependencies, &git_set(&config, &args.git));
    print_dependencies(distro.as_ref(), &dependencies);

    let overrides = InstallOverrides {
        reinstall: args.reinstall.iter().cloned().collect(),
        disabled: config.disabled_set(&args.disable),
    };

    let interactive = !args.yes && !args.password_stdin && std::io::stdin().is_terminal();
    if interactive {
        let proceed = dialoguer::Confirm::new()
            .with_prompt(format!("Install missing dependencies for {}?", wm.display_name()))
            .default(true)
            .interact()?;
        if !proceed {
            emit(Level::Info, "install.aborted", "Nothing was changed", None);
            return Ok(ExitCode::SUCCESS);
        }
    }

    let elevation = Elevation::detect(collect_credential(&args)?);
    let cancel = match args.timeout.or(config.command_timeout_secs) {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };

    let log_path = config.cache_dir()?.join(INSTALL_LOG);
    let log = open_install_log(&log_path);
    let (sink, rx) = ProgressSink::channel(config.queue_capacity);
    let renderer = tokio::task::spawn_blocking(move || render_progress(rx, log));

    let worker_cancel = cancel.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        let runner = distro.host().runner.clone();
        let ctx = RunContext::new(runner.as_ref(), &elevation, &worker_cancel, &sink);
        distro.install_packages(&dependencies, wm, &overrides, &ctx)
    });

    let joined = tokio::select! {
        res = &mut worker => res,
        _ = tokio::signal::ctrl_c() => {
            emit(Level::Warn, "install.cancel", "Cancelling installation...", None);
            cancel.cancel();
            (&mut worker).await
        }
    };
    let outcome = joined.map_err(|e| anyhow!("install task failed: {}", e))?;
    renderer
        .await
        .map_err(|e| anyhow!("progress renderer failed: {}", e))?;

    match outcome {
        Ok(()) => {
            emit(
                Level::Success,
                "install.complete",
                &format!(
                    "DankMaterialShell is ready. Log in to a {} session to start it.",
                    wm.display_name()
                ),
                None,
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if is_cancelled(&err) => {
            emit(Level::Warn, "install.cancelled", "Installation cancelled", None);
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(err) => {
            emit(
                Level::Error,
                "install.failed",
                &format!("Installation failed: {:#}", err),
                None,
            );
            emit(
                Level::Info,
                "install.log",
                &format!("Full log: {}", log_path.display()),
                None,
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn configure(config_path: Option<&Path>, session: &SessionArgs) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let (wm, terminal) = session.resolve(&config);
    let paths = HostPaths::detect(config.cache_dir.clone())?;

    let runner = SystemRunner;
    let elevation = Elevation::detect(Credential::empty());
    let cancel = CancelToken::new();
    let sink = ProgressSink::discard();
    let ctx = RunContext::new(&runner, &elevation, &cancel, &sink);

    let warnings = configure_session(&paths, wm, terminal, &ctx);
    if warnings.is_empty() {
        emit(
            Level::Success,
            "configure.done",
            &format!("Configured {} session with {}", wm.display_name(), terminal),
            None,
        );
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

pub fn config(config_path: Option<&Path>, command: ConfigCommands) -> Result<ExitCode> {
    match command {
        ConfigCommands::Show => {
            let config = load_config(config_path)?;
            print!("{}", config.to_documented_toml()?);
        }
        ConfigCommands::Init { force } => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => paths::config_file_path()?,
            };
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            InstallerConfig::default().save_to_path(&path)?;
            emit(
                Level::Success,
                "config.init",
                &format!("Wrote {}", path.display()),
                None,
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
