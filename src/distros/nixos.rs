//! NixOS: user-profile installs from nixpkgs, with upstream flakes pinned in
//! the user flake registry for packages nixpkgs does not carry.
//!
//! Nothing here needs elevation. The system configuration is left alone.

use super::base::BaseDetection;
use super::context::RunContext;
use super::host::Host;
use super::manual::ManualPackageInstaller;
use super::pipeline::Distribution;
use super::progress::Phase;
use super::registry::{DistroConfig, DistroRegistry, RegistryError};
use super::repos::{EnabledRepos, RepositorySource, enable_repositories};
use super::runner::{CancelToken, CommandSpec};
use super::types::{
    DMS_DEPENDENCY, Dependency, DistroFamily, PackageManagerKind, PackageMap, PackageMapping,
    PackageVariant, RepositoryType, VariantMap, WindowManager,
};
use crate::common::systemd::ServiceScope;
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

const GTK_PORTAL: &str = "/run/current-system/sw/share/xdg-desktop-portal/portals/gtk.portal";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    registry.register("nixos", "#7EBAE4", DistroFamily::Nix, construct)
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(NixOsDistribution::new(config, host))
}

/// `nix` with flakes enabled for this invocation.
fn nix() -> CommandSpec {
    CommandSpec::new("nix").args(["--extra-experimental-features", "nix-command flakes"])
}

/// Registry alias for a flake reference: its last path segment, lowercased.
pub fn flake_alias(flake: &str) -> String {
    flake
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(flake)
        .trim_end_matches(".git")
        .to_lowercase()
}

pub struct NixOsDistribution {
    config: DistroConfig,
    host: Host,
    repos: EnabledRepos,
}

impl NixOsDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self {
            config,
            host,
            repos: EnabledRepos::default(),
        }
    }

    fn command_output(&self, spec: &CommandSpec) -> String {
        self.runner()
            .run(spec, &CancelToken::new())
            .ok()
            .filter(|output| output.success)
            .map(|output| output.output)
            .unwrap_or_default()
    }

    fn flake(name: &str, flake: &str) -> PackageMapping {
        PackageMapping::third_party(name, flake)
    }

    fn variant_mapping(
        &self,
        variants: &VariantMap,
        name: &str,
        git_name: &str,
        git_flake: &str,
    ) -> PackageMapping {
        match self.variant_for(variants, name) {
            PackageVariant::Git => Self::flake(git_name, git_flake),
            PackageVariant::Stable => PackageMapping::system(name),
        }
    }
}

/// Whether a `nix profile list` listing has an element for `package`.
///
/// Current nix prints `Name:` and `Flake attribute:` fields per element.
/// Older releases print one numbered line per element with the flake
/// reference (`flake:nixpkgs#legacyPackages.<system>.<name>`) second.
fn profile_contains(listing: &str, package: &str) -> bool {
    let attribute_matches =
        |attr: &str| attr == package || attr.ends_with(&format!(".{}", package));

    listing.lines().map(str::trim).any(|line| {
        if let Some(name) = line.strip_prefix("Name:") {
            return name.trim() == package;
        }
        if let Some(attr) = line.strip_prefix("Flake attribute:") {
            return attribute_matches(attr.trim());
        }
        let mut fields = line.split_whitespace();
        let numbered = fields
            .next()
            .is_some_and(|index| index.chars().all(|c| c.is_ascii_digit()));
        numbered
            && fields
                .next()
                .and_then(|reference| reference.split_once('#'))
                .is_some_and(|(_, attr)| attribute_matches(attr))
    })
}

impl BaseDetection for NixOsDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        profile_contains(&self.command_output(&nix().args(["profile", "list"])), package)
    }

    fn detect_xdg_portal(&self) -> Dependency {
        let present = self.runner().path_exists(Path::new(GTK_PORTAL))
            || self.package_installed("xdg-desktop-portal-gtk");
        Dependency::new(
            "xdg-desktop-portal-gtk",
            "Desktop integration portal for GTK",
            present,
        )
    }

    /// accountsservice is enabled through the system configuration, so the
    /// running daemon is the only reliable signal.
    fn detect_accounts_service(&self) -> Dependency {
        Dependency::new(
            "accountsservice",
            "D-Bus interface for user account query and manipulation",
            self.service_active("accounts-daemon", ServiceScope::System),
        )
    }
}

impl ManualPackageInstaller for NixOsDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        nix()
            .args(["profile", "install"])
            .args(packages.iter().map(|pkg| format!("nixpkgs#{}", pkg)))
    }

    fn install_needs_privilege(&self) -> bool {
        false
    }
}

impl RepositorySource for NixOsDistribution {
    fn provider(&self) -> &'static str {
        "flake"
    }

    fn repository_exists(&self, repo: &str) -> bool {
        let alias = format!("flake:{}", flake_alias(repo));
        self.command_output(&nix().args(["registry", "list"]))
            .lines()
            .any(|line| line.split_whitespace().any(|field| field == alias) && line.contains(repo))
    }

    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
        Ok(vec![
            nix().args(["registry", "add"]).arg(flake_alias(repo)).arg(repo),
        ])
    }

    fn refresh_command(&self) -> Option<CommandSpec> {
        None
    }

    fn repositories_need_privilege(&self) -> bool {
        false
    }
}

impl Distribution for NixOsDistribution {
    fn config(&self) -> &DistroConfig {
        &self.config
    }

    fn package_manager(&self) -> PackageManagerKind {
        PackageManagerKind::Nix
    }

    fn go_package(&self) -> Option<&'static str> {
        None
    }

    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap) -> PackageMap {
        let dms = match self.variant_for(variants, DMS_DEPENDENCY) {
            PackageVariant::Git => Self::flake("dms-shell-git", "git+https://github.com/AvengeMedia/DankMaterialShell"),
            PackageVariant::Stable => Self::flake("dms-shell", "github:AvengeMedia/DankMaterialShell"),
        };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("ghostty", PackageMapping::system("ghostty")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            ("matugen", PackageMapping::system("matugen")),
            (DMS_DEPENDENCY, dms),
            ("dgop", Self::flake("dgop", "github:AvengeMedia/dgop")),
        ]
        .into_iter()
        .map(|(name, mapping)| (name.to_string(), mapping))
        .collect();

        packages.insert(
            "quickshell".into(),
            self.variant_mapping(
                variants,
                "quickshell",
                "quickshell-git",
                "git+https://git.outfoxxed.me/quickshell/quickshell",
            ),
        );

        match wm {
            WindowManager::Hyprland => {
                let hyprland = self.variant_mapping(
                    variants,
                    "hyprland",
                    "hyprland-git",
                    "github:hyprwm/Hyprland",
                );
                packages.insert("hyprctl".into(), hyprland.clone());
                packages.insert("hyprland".into(), hyprland);
                packages.insert("jq".into(), PackageMapping::system("jq"));
            }
            WindowManager::Niri => {
                let niri = self.variant_mapping(variants, "niri", "niri-git", "github:YaLTeR/niri");
                let satellite = match niri.repository {
                    RepositoryType::System => PackageMapping::system("xwayland-satellite"),
                    _ => Self::flake(
                        "xwayland-satellite-git",
                        "github:Supreeeme/xwayland-satellite",
                    ),
                };
                packages.insert("niri".into(), niri);
                packages.insert("xwayland-satellite".into(), satellite);
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[]
    }

    /// Builds happen inside nix, so there is nothing to prepare.
    fn install_prerequisites(&self, ctx: &RunContext) -> Result<()> {
        ctx.log(
            Phase::Prerequisites,
            0.5,
            "Checking prerequisites...",
            "Nix builds packages in its own sandbox, no prerequisites needed",
        );
        Ok(())
    }

    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        enable_repositories(self, &self.repos, mappings, ctx)
    }

    /// Install the default package of each registered flake.
    fn install_third_party_packages(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        let mut seen = HashSet::new();
        let aliases: Vec<String> = mappings
            .iter()
            .filter_map(|mapping| mapping.repo_url.as_deref())
            .map(flake_alias)
            .filter(|alias| seen.insert(alias.clone()))
            .collect();
        if aliases.is_empty() {
            return Ok(());
        }

        let step = format!("Installing {} flake packages...", aliases.len());
        ctx.log(
            Phase::ThirdPartyPackages,
            0.0,
            &step,
            format!("Installing flakes: {}", aliases.join(", ")),
        );
        ctx.exec(
            Phase::ThirdPartyPackages,
            0.2,
            &step,
            nix().args(["profile", "install"]).args(&aliases),
        )?;
        Ok(())
    }
}
