//! Ubuntu and its derivatives: apt plus Launchpad PPAs.

use super::base::BaseDetection;
use super::context::RunContext;
use super::debian::{apt_install, dpkg_installed};
use super::host::Host;
use super::manual::{ManualPackageInstaller, query_cflags};
use super::pipeline::Distribution;
use super::registry::{DistroConfig, DistroRegistry, RegistryError};
use super::repos::{EnabledRepos, RepositorySource, enable_repositories};
use super::runner::CommandSpec;
use super::types::{
    DMS_DEPENDENCY, DistroFamily, PackageManagerKind, PackageMap, PackageMapping, PackageVariant,
    VariantMap, WindowManager,
};
use anyhow::{Result, bail};
use std::path::PathBuf;

const DANKLINUX: &str = "avengemedia/danklinux";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    registry.register("ubuntu", "#E95420", DistroFamily::Ubuntu, construct)?;
    registry.register("pop", "#48B9C7", DistroFamily::Ubuntu, construct)?;
    registry.register("linuxmint", "#87CF3E", DistroFamily::Ubuntu, construct)?;
    registry.register("zorin", "#15A6F0", DistroFamily::Ubuntu, construct)?;
    Ok(())
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(UbuntuDistribution::new(config, host))
}

pub struct UbuntuDistribution {
    config: DistroConfig,
    host: Host,
    repos: EnabledRepos,
}

impl UbuntuDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self {
            config,
            host,
            repos: EnabledRepos::default(),
        }
    }

    /// Sources files add-apt-repository may have written for `owner/ppa`:
    /// the deb822 `.sources` form and the legacy `.list` form.
    pub fn ppa_source_files(&self, ppa: &str) -> Vec<PathBuf> {
        let Some((owner, name)) = ppa.split_once('/') else {
            return Vec::new();
        };
        let stem = format!(
            "{}/{}-ubuntu-{}-{}",
            SOURCES_DIR, owner, name, self.host.os.version_codename
        );
        vec![
            PathBuf::from(format!("{}.sources", stem)),
            PathBuf::from(format!("{}.list", stem)),
        ]
    }

    fn ppa(name: &str) -> PackageMapping {
        PackageMapping::third_party(name, DANKLINUX)
    }
}

impl BaseDetection for UbuntuDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        dpkg_installed(self.runner(), package)
    }
}

impl ManualPackageInstaller for UbuntuDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        apt_install(packages)
    }

    fn build_cflags(&self, ctx: &RunContext) -> String {
        query_cflags(ctx, CommandSpec::new("dpkg-buildflags").args(["--get", "CFLAGS"]))
    }
}

impl RepositorySource for UbuntuDistribution {
    fn provider(&self) -> &'static str {
        "PPA"
    }

    fn repository_exists(&self, repo: &str) -> bool {
        self.ppa_source_files(repo)
            .iter()
            .any(|path| self.runner().path_exists(path))
    }

    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
        if !repo.contains('/') {
            bail!("PPA {} is not in owner/name form", repo);
        }
        Ok(vec![
            CommandSpec::new("add-apt-repository")
                .args(["-y", "--no-update"])
                .arg(format!("ppa:{}", repo)),
        ])
    }

    fn refresh_command(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new("apt-get").arg("update"))
    }
}

impl Distribution for UbuntuDistribution {
    fn config(&self) -> &DistroConfig {
        &self.config
    }

    fn package_manager(&self) -> PackageManagerKind {
        PackageManagerKind::Apt
    }

    fn go_package(&self) -> Option<&'static str> {
        Some("golang-go")
    }

    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap) -> PackageMap {
        let git = |name: &str| self.variant_for(variants, name) == PackageVariant::Git;
        let quickshell = if git("quickshell") { "quickshell-git" } else { "quickshell" };
        let dms = if git(DMS_DEPENDENCY) {
            PackageMapping::third_party("dms-git", "avengemedia/dms-git")
        } else {
            PackageMapping::third_party("dms", "avengemedia/dms")
        };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            (DMS_DEPENDENCY, dms),
            ("quickshell", Self::ppa(quickshell)),
            ("ghostty", Self::ppa("ghostty")),
            ("matugen", Self::ppa("matugen")),
            ("dgop", Self::ppa("dgop")),
        ]
        .into_iter()
        .map(|(name, mapping)| (name.to_string(), mapping))
        .collect();

        match wm {
            WindowManager::Hyprland => {
                let hyprland = PackageMapping::third_party("hyprland", "cppiber/hyprland");
                packages.insert("hyprctl".into(), hyprland.clone());
                packages.insert("hyprland".into(), hyprland);
                packages.insert("jq".into(), PackageMapping::system("jq"));
            }
            WindowManager::Niri => {
                packages.insert("niri".into(), PackageMapping::manual("niri"));
                packages.insert("xwayland-satellite".into(), Self::ppa("xwayland-satellite"));
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[
            "build-essential",
            "git",
            "unzip",
            "software-properties-common",
            "cmake",
            "ninja-build",
            "pkg-config",
            "qt6-base-dev",
            "qt6-base-private-dev",
            "qt6-declarative-dev",
            "qt6-declarative-private-dev",
            "qt6-shadertools-dev",
            "qt6-wayland-dev",
            "qt6-wayland-private-dev",
            "spirv-tools",
            "libcli11-dev",
            "wayland-protocols",
            "libwayland-dev",
            "libdrm-dev",
            "libgbm-dev",
            "libpipewire-0.3-dev",
            "libjemalloc-dev",
            "libpam0g-dev",
            "libglib2.0-dev",
            "libpolkit-agent-1-dev",
        ]
    }

    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        enable_repositories(self, &self.repos, mappings, ctx)
    }
}
