//! Post-install session configuration: environment variables, compositor
//! autostart and the DMS user service. Every failure here is a warning.

use super::context::RunContext;
use super::host::HostPaths;
use super::progress::{InstallProgressMsg, Phase};
use super::types::{Terminal, WindowManager};
use crate::common::systemd::SystemdManager;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ENVIRONMENT_FILE: &str = "90-dms.conf";
const DMS_SERVICE: &str = "dms.service";

/// Contents of the `environment.d` drop-in for `terminal`.
pub fn environment_config(terminal: Terminal) -> String {
    format!(
        "TERMINAL={}\nQT_QPA_PLATFORM=wayland\nQT_QPA_PLATFORMTHEME=gtk3\nQT_WAYLAND_DISABLE_WINDOWDECORATION=1\nELECTRON_OZONE_PLATFORM_HINT=auto\n",
        terminal.command()
    )
}

/// Copy `path` aside as `<name>.backup.<timestamp>`.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".backup.{}", stamp));
    let backup = path.with_file_name(name);
    fs::copy(path, &backup)
        .with_context(|| format!("backing up {} to {}", path.display(), backup.display()))?;
    Ok(backup)
}

/// Write the environment drop-in. Returns `None` when it was already current.
pub fn write_environment_config(paths: &HostPaths, terminal: Terminal) -> Result<Option<PathBuf>> {
    let dir = paths.config_home.join("environment.d");
    let path = dir.join(ENVIRONMENT_FILE);
    let content = environment_config(terminal);

    if path.exists() {
        let existing = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        if existing == content {
            return Ok(None);
        }
        backup_file(&path)?;
    }

    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(Some(path))
}

/// Add the `dms run` autostart line to the Hyprland config when absent.
///
/// Niri starts the shell through its systemd unit instead, so only
/// Hyprland gets a config change.
pub fn write_window_manager_config(paths: &HostPaths, wm: WindowManager) -> Result<Option<PathBuf>> {
    let WindowManager::Hyprland = wm else {
        return Ok(None);
    };

    let dir = paths.config_home.join("hypr");
    let path = dir.join("hyprland.conf");
    let line = "exec-once = dms run";

    let existing = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
    } else {
        String::new()
    };
    if existing.lines().any(|l| l.trim() == line) {
        return Ok(None);
    }
    if path.exists() {
        backup_file(&path)?;
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str("\n# DankMaterialShell\n");
    updated.push_str(line);
    updated.push('\n');

    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    fs::write(&path, updated).with_context(|| format!("writing {}", path.display()))?;
    Ok(Some(path))
}

/// Tie the DMS user service to the compositor session.
pub fn enable_dms_service(ctx: &RunContext, wm: WindowManager) -> Result<()> {
    let systemd = SystemdManager::user(ctx.runner).with_cancel(ctx.cancel.clone());
    match wm {
        WindowManager::Niri => systemd.add_wants("niri.service", DMS_SERVICE),
        WindowManager::Hyprland => Ok(()),
    }
}

/// Run the configuration phase, returning the warnings it produced.
pub fn configure_session(
    paths: &HostPaths,
    wm: WindowManager,
    terminal: Terminal,
    ctx: &RunContext,
) -> Vec<String> {
    let step = "Configuring system...";
    let mut warnings = Vec::new();
    ctx.progress.emit(
        InstallProgressMsg::new(Phase::Configuration, 0.0, step)
            .with_log("Starting post-installation configuration..."),
    );

    match write_environment_config(paths, terminal) {
        Ok(Some(path)) => ctx.log(Phase::Configuration, 0.3, step, format!("Wrote {}", path.display())),
        Ok(None) => ctx.log(Phase::Configuration, 0.3, step, "Environment config already up to date"),
        Err(err) => warnings.push(format!("failed to write environment config: {:#}", err)),
    }

    match write_window_manager_config(paths, wm) {
        Ok(Some(path)) => ctx.log(Phase::Configuration, 0.6, step, format!("Updated {}", path.display())),
        Ok(None) => {}
        Err(err) => warnings.push(format!("failed to write window manager config: {:#}", err)),
    }

    if let Err(err) = enable_dms_service(ctx, wm) {
        warnings.push(format!("failed to enable dms service: {:#}", err));
    }

    for warning in &warnings {
        ctx.warn(Phase::Configuration, 0.9, step, warning.clone());
    }
    warnings
}
