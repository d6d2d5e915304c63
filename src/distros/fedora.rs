//! Fedora and its respins: dnf plus COPR projects.

use super::base::BaseDetection;
use super::context::RunContext;
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

const COPR_HOST: &str = "copr.fedorainfracloud.org";
const DANKLINUX: &str = "avengemedia/danklinux";
const NIRI_GIT: &str = "yalter/niri-git";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    registry.register("fedora", "#0B57A4", DistroFamily::Fedora, construct)?;
    registry.register("nobara", "#0B57A4", DistroFamily::Fedora, construct)?;
    registry.register("ultramarine", "#00078B", DistroFamily::Fedora, construct)?;
    registry.register("fedora-asahi-remix", "#0B57A4", DistroFamily::Fedora, construct)?;
    Ok(())
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(FedoraDistribution::new(config, host))
}

pub struct FedoraDistribution {
    config: DistroConfig,
    host: Host,
    repos: EnabledRepos,
}

impl FedoraDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self {
            config,
            host,
            repos: EnabledRepos::default(),
        }
    }

    /// Repo file dnf writes for an enabled COPR project `owner/project`.
    pub fn copr_repo_file(project: &str) -> Option<PathBuf> {
        let (owner, name) = project.split_once('/')?;
        Some(PathBuf::from(format!(
            "/etc/yum.repos.d/_copr:{}:{}:{}.repo",
            COPR_HOST, owner, name
        )))
    }
}

impl BaseDetection for FedoraDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        self.runner()
            .succeeds(&CommandSpec::new("rpm").args(["-q", package]))
    }
}

impl ManualPackageInstaller for FedoraDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("dnf").args(["install", "-y"]).args(packages)
    }

    fn build_cflags(&self, ctx: &RunContext) -> String {
        query_cflags(ctx, CommandSpec::new("rpm").args(["--eval", "%{optflags}"]))
    }
}

impl RepositorySource for FedoraDistribution {
    fn provider(&self) -> &'static str {
        "COPR"
    }

    fn repository_exists(&self, repo: &str) -> bool {
        Self::copr_repo_file(repo).is_some_and(|path| self.runner().path_exists(&path))
    }

    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
        if !repo.contains('/') {
            bail!("COPR project {} is not in owner/project form", repo);
        }
        Ok(vec![
            CommandSpec::new("dnf").args(["copr", "enable", "-y", repo]),
        ])
    }

    fn refresh_command(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new("dnf").arg("makecache"))
    }
}

impl Distribution for FedoraDistribution {
    fn config(&self) -> &DistroConfig {
        &self.config
    }

    fn package_manager(&self) -> PackageManagerKind {
        PackageManagerKind::Dnf
    }

    fn go_package(&self) -> Option<&'static str> {
        Some("golang")
    }

    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap) -> PackageMap {
        let quickshell = match self.variant_for(variants, "quickshell") {
            PackageVariant::Git => PackageMapping::third_party("quickshell-git", DANKLINUX),
            PackageVariant::Stable => PackageMapping::third_party("quickshell", DANKLINUX),
        };
        let dms = match self.variant_for(variants, DMS_DEPENDENCY) {
            PackageVariant::Git => PackageMapping::third_party("dms", "avengemedia/dms-git"),
            PackageVariant::Stable => PackageMapping::third_party("dms", "avengemedia/dms"),
        };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            (DMS_DEPENDENCY, dms),
            ("quickshell", quickshell),
            ("ghostty", PackageMapping::third_party("ghostty", "scottames/ghostty")),
            ("matugen", PackageMapping::third_party("matugen", DANKLINUX)),
            ("dgop", PackageMapping::third_party("dgop", DANKLINUX)),
        ]
        .into_iter()
        .map(|(name, mapping)| (name.to_string(), mapping))
        .collect();

        match wm {
            WindowManager::Hyprland => {
                let hyprland = match self.variant_for(variants, "hyprland") {
                    PackageVariant::Git => {
                        PackageMapping::third_party("hyprland-git", "solopasha/hyprland")
                    }
                    PackageVariant::Stable => PackageMapping::system("hyprland"),
                };
                packages.insert("hyprctl".into(), hyprland.clone());
                packages.insert("hyprland".into(), hyprland);
                packages.insert("jq".into(), PackageMapping::system("jq"));
            }
            WindowManager::Niri => {
                let (niri, satellite) = match self.variant_for(variants, "niri") {
                    PackageVariant::Git => (
                        PackageMapping::third_party("niri", NIRI_GIT),
                        PackageMapping::third_party("xwayland-satellite", NIRI_GIT),
                    ),
                    PackageVariant::Stable => (
                        PackageMapping::system("niri"),
                        PackageMapping::system("xwayland-satellite"),
                    ),
                };
                packages.insert("niri".into(), niri);
                packages.insert("xwayland-satellite".into(), satellite);
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[
            "git",
            "make",
            "unzip",
            "gcc",
            "gcc-c++",
            "cmake",
            "ninja-build",
            "pkgconf-pkg-config",
            "dnf-plugins-core",
            "qt6-qtbase-devel",
            "qt6-qtbase-private-devel",
            "qt6-qtdeclarative-devel",
            "qt6-qtshadertools-devel",
            "qt6-qtwayland-devel",
            "spirv-tools-devel",
            "cli11-devel",
            "wayland-devel",
            "wayland-protocols-devel",
            "libdrm-devel",
            "mesa-libgbm-devel",
            "pipewire-devel",
            "jemalloc-devel",
            "pam-devel",
            "polkit-devel",
            "glib2-devel",
        ]
    }

    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        enable_repositories(self, &self.repos, mappings, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distros::privilege::Elevation;
    use crate::distros::progress::ProgressSink;
    use crate::distros::runner::CancelToken;
    use crate::distros::testing::{self, FakeRunner, TestHost};
    use crate::distros::types::RepositoryType;

    fn distro(test: &TestHost) -> FedoraDistribution {
        let config = DistroConfig {
            id: "fedora",
            color_hex: "#0B57A4",
            family: DistroFamily::Fedora,
        };
        FedoraDistribution::new(config, test.host.clone())
    }

    #[test]
    fn copr_repo_file_uses_dnf_naming() {
        assert_eq!(
            FedoraDistribution::copr_repo_file("avengemedia/danklinux").unwrap(),
            PathBuf::from("/etc/yum.repos.d/_copr:copr.fedorainfracloud.org:avengemedia:danklinux.repo")
        );
        assert!(FedoraDistribution::copr_repo_file("danklinux").is_none());
    }

    #[test]
    fn enabled_copr_is_not_enabled_again() {
        let runner = FakeRunner::new().with_path(
            "/etc/yum.repos.d/_copr:copr.fedorainfracloud.org:avengemedia:danklinux.repo",
        );
        let test = TestHost::new(runner, testing::FEDORA);
        let distro = distro(&test);
        let elevation = Elevation::Interactive;
        let cancel = CancelToken::new();
        let sink = ProgressSink::discard();
        let ctx = RunContext::new(test.runner.as_ref(), &elevation, &cancel, &sink);

        let mapping = distro.package_mapping(WindowManager::Niri);
        let third_party = vec![
            mapping["quickshell"].clone(),
            mapping["ghostty"].clone(),
            mapping["matugen"].clone(),
        ];
        distro.enable_repositories(&third_party, &ctx).unwrap();

        assert_eq!(
            test.runner.calls(),
            vec![
                "sudo dnf copr enable -y scottames/ghostty",
                "sudo dnf makecache",
            ]
        );
    }

    #[test]
    fn git_niri_comes_from_copr() {
        let test = TestHost::new(FakeRunner::new(), testing::FEDORA);
        let variants: VariantMap = [("niri".to_string(), PackageVariant::Git)].into();
        let mapping = distro(&test).package_mapping_with_variants(WindowManager::Niri, &variants);
        assert_eq!(mapping["niri"].repository, RepositoryType::ThirdParty);
        assert_eq!(mapping["niri"].repo_url.as_deref(), Some(NIRI_GIT));
        assert_eq!(mapping["xwayland-satellite"].repo_url.as_deref(), Some(NIRI_GIT));
    }

    #[test]
    fn git_hyprland_comes_from_copr() {
        let test = TestHost::new(FakeRunner::new(), testing::FEDORA);
        let variants: VariantMap = [("hyprland".to_string(), PackageVariant::Git)].into();
        let mapping = distro(&test).package_mapping_with_variants(WindowManager::Hyprland, &variants);
        assert_eq!(
            mapping["hyprland"],
            PackageMapping::third_party("hyprland-git", "solopasha/hyprland")
        );
        assert_eq!(mapping["hyprctl"], mapping["hyprland"]);
    }

    #[test]
    fn go_toolchain_package_is_golang() {
        let test = TestHost::new(FakeRunner::new(), testing::FEDORA);
        let distro = distro(&test);
        let elevation = Elevation::Root;
        let cancel = CancelToken::new();
        let sink = ProgressSink::discard();
        let ctx = RunContext::new(test.runner.as_ref(), &elevation, &cancel, &sink);
        distro.install_prerequisites(&ctx).unwrap();
        assert_eq!(test.runner.count("dnf install -y golang"), 1);
    }
}
