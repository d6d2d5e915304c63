//! Arch Linux and derivatives: pacman for the official repositories and an
//! AUR helper for everything else.

use super::base::BaseDetection;
use super::context::RunContext;
use super::host::Host;
use super::manual::{CloneDir, DEFAULT_CFLAGS, ManualPackageInstaller, discard_build_dir};
use super::pipeline::{Distribution, distinct_package_names};
use super::privilege::Elevation;
use super::progress::Phase;
use super::registry::{DistroConfig, DistroRegistry, RegistryError};
use super::runner::CommandSpec;
use super::selfheal::with_recovery;
use super::types::{
    DMS_DEPENDENCY, DistroFamily, PackageManagerKind, PackageMap, PackageMapping, PackageVariant,
    VariantMap, WindowManager,
};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// Repository marker for AUR packages.
pub const AUR: &str = "aur";
const AUR_HELPERS: [&str; 2] = ["paru", "yay"];
const YAY_BIN_URL: &str = "https://aur.archlinux.org/yay-bin.git";
const MAKEPKG_CONF: &str = "/etc/makepkg.conf";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    registry.register("arch", "#1793D1", DistroFamily::Arch, construct)?;
    registry.register("archarm", "#1793D1", DistroFamily::Arch, construct)?;
    registry.register("cachyos", "#08A283", DistroFamily::Arch, construct)?;
    registry.register("endeavouros", "#7F3FBF", DistroFamily::Arch, construct)?;
    registry.register("manjaro", "#35BF5C", DistroFamily::Arch, construct)?;
    registry.register("garuda", "#6E40C9", DistroFamily::Arch, construct)?;
    Ok(())
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(ArchDistribution::new(config, host))
}

/// The value of `CFLAGS` in a makepkg.conf, joined onto one line.
pub fn makepkg_cflags(content: &str) -> Option<String> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("CFLAGS=") {
            let start = offset + (line.len() - trimmed.len()) + "CFLAGS=".len();
            let rest = &content[start..];
            let raw = match rest.strip_prefix('"') {
                Some(quoted) => &quoted[..quoted.find('"')?],
                None => rest.lines().next().unwrap_or_default(),
            };
            let flags = raw
                .replace("\\\n", " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            return (!flags.is_empty()).then_some(flags);
        }
        offset += line.len();
    }
    None
}

pub struct ArchDistribution {
    config: DistroConfig,
    host: Host,
}

impl ArchDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self { config, host }
    }

    /// The first installed AUR helper.
    pub fn aur_helper(&self) -> Option<&'static str> {
        AUR_HELPERS
            .into_iter()
            .find(|helper| self.command_exists(helper))
    }

    fn aur(name: &str) -> PackageMapping {
        PackageMapping::third_party(name, AUR)
    }

    fn refuse_root(ctx: &RunContext, what: &str) -> Result<()> {
        if matches!(ctx.elevation, Elevation::Root) {
            bail!("{} cannot run as root; rerun as a regular user with sudo rights", what);
        }
        Ok(())
    }

    /// Build and install `yay-bin` from the AUR with makepkg.
    fn bootstrap_yay(&self, ctx: &RunContext) -> Result<()> {
        Self::refuse_root(ctx, "makepkg")?;
        let step = "Installing AUR helper yay...";
        ctx.log(
            Phase::RepositoryEnablement,
            0.1,
            step,
            "No AUR helper found, building yay-bin",
        );

        let cache_dir = &self.host.paths.cache_dir;
        fs::create_dir_all(cache_dir)
            .with_context(|| format!("creating cache directory {}", cache_dir.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix("yay-bin-build-")
            .tempdir_in(cache_dir)
            .with_context(|| format!("creating build directory in {}", cache_dir.display()))?;

        let mut clone = CloneDir::new(
            ctx.runner,
            ctx.cancel,
            YAY_BIN_URL,
            None,
            scratch.path().join("yay-bin"),
        );
        with_recovery(&mut clone, |clone| {
            ctx.validate_sudo(Phase::RepositoryEnablement, 0.3)?;
            ctx.exec(
                Phase::RepositoryEnablement,
                0.5,
                step,
                CommandSpec::new("makepkg")
                    .args(["-si", "--noconfirm"])
                    .dir(&clone.path),
            )?;
            Ok(())
        })
        .context("failed to install yay")?;

        discard_build_dir(scratch, Phase::RepositoryEnablement, 0.8, ctx);
        Ok(())
    }
}

impl BaseDetection for ArchDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        self.runner()
            .succeeds(&CommandSpec::new("pacman").args(["-Q", package]))
    }
}

impl ManualPackageInstaller for ArchDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("pacman")
            .args(["-S", "--needed", "--noconfirm"])
            .args(packages)
    }

    fn build_cflags(&self, _ctx: &RunContext) -> String {
        fs::read_to_string(Path::new(MAKEPKG_CONF))
            .ok()
            .and_then(|content| makepkg_cflags(&content))
            .unwrap_or_else(|| DEFAULT_CFLAGS.to_string())
    }
}

impl Distribution for ArchDistribution {
    fn config(&self) -> &DistroConfig {
        &self.config
    }

    fn package_manager(&self) -> PackageManagerKind {
        PackageManagerKind::Pacman
    }

    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap) -> PackageMap {
        let git = |name: &str| self.variant_for(variants, name) == PackageVariant::Git;

        let quickshell = if git("quickshell") { "quickshell-git" } else { "quickshell" };
        let dms = if git(DMS_DEPENDENCY) { "dms-shell-git" } else { "dms-shell-bin" };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("ghostty", PackageMapping::system("ghostty")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            (DMS_DEPENDENCY, Self::aur(dms)),
            ("quickshell", Self::aur(quickshell)),
            ("matugen", Self::aur("matugen-bin")),
            ("dgop", Self::aur("dgop")),
        ]
        .into_iter()
        .map(|(name, mapping)| (name.to_string(), mapping))
        .collect();

        match wm {
            WindowManager::Hyprland => {
                let hyprland = if git("hyprland") {
                    Self::aur("hyprland-git")
                } else {
                    PackageMapping::system("hyprland")
                };
                packages.insert("hyprctl".into(), hyprland.clone());
                packages.insert("hyprland".into(), hyprland);
                packages.insert("jq".into(), PackageMapping::system("jq"));
            }
            WindowManager::Niri => {
                let (niri, satellite) = if git("niri") {
                    (Self::aur("niri-git"), Self::aur("xwayland-satellite-git"))
                } else {
                    (
                        PackageMapping::system("niri"),
                        PackageMapping::system("xwayland-satellite"),
                    )
                };
                packages.insert("niri".into(), niri);
                packages.insert("xwayland-satellite".into(), satellite);
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[
            "base-devel",
            "git",
            "cmake",
            "ninja",
            "qt6-base",
            "qt6-declarative",
            "qt6-shadertools",
            "qt6-wayland",
            "qt6-svg",
            "spirv-tools",
            "cli11",
            "wayland-protocols",
            "libdrm",
            "mesa",
            "pipewire",
            "jemalloc",
            "pam",
            "polkit",
        ]
    }

    /// The AUR needs no registration, only a helper to build from it.
    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }
        if let Some(helper) = self.aur_helper() {
            ctx.log(
                Phase::RepositoryEnablement,
                0.5,
                "Checking AUR helper...",
                format!("Using AUR helper {}", helper),
            );
            return Ok(());
        }
        self.bootstrap_yay(ctx)
    }

    fn install_third_party_packages(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        let names = distinct_package_names(mappings);
        if names.is_empty() {
            return Ok(());
        }
        let helper = self.aur_helper().unwrap_or("yay");
        Self::refuse_root(ctx, helper)?;

        let step = format!("Installing {} AUR packages...", names.len());
        ctx.log(
            Phase::ThirdPartyPackages,
            0.0,
            &step,
            format!("Installing AUR packages with {}: {}", helper, names.join(", ")),
        );
        ctx.validate_sudo(Phase::ThirdPartyPackages, 0.1)?;
        ctx.exec(
            Phase::ThirdPartyPackages,
            0.2,
            &step,
            CommandSpec::new(helper)
                .args(["-S", "--needed", "--noconfirm"])
                .args(&names),
        )?;
        Ok(())
    }
}
