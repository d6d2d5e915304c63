//! openSUSE Tumbleweed, Leap and Slowroll: zypper plus the AvengeMedia OBS
//! projects.

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
use anyhow::Result;

const COLOR: &str = "#73BA25";
const OBS_BASE_URL: &str = "https://download.opensuse.org/repositories";
const DANKLINUX: &str = "home:AvengeMedia:danklinux";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    for id in ["opensuse-tumbleweed", "opensuse-leap", "opensuse-slowroll"] {
        registry.register(id, COLOR, DistroFamily::Suse, construct)?;
    }
    Ok(())
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(OpenSuseDistribution::new(config, host))
}

pub struct OpenSuseDistribution {
    config: DistroConfig,
    host: Host,
    repos: EnabledRepos,
}

impl OpenSuseDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self {
            config,
            host,
            repos: EnabledRepos::default(),
        }
    }

    /// OBS build target for the running release.
    fn obs_version(&self) -> String {
        match self.config.id {
            "opensuse-leap" => format!("openSUSE_Leap_{}", self.host.os.version_id),
            "opensuse-slowroll" => "openSUSE_Slowroll".to_string(),
            _ => "openSUSE_Tumbleweed".to_string(),
        }
    }

    /// `.repo` descriptor for a project such as `home:AvengeMedia:danklinux`.
    pub fn repo_file_url(&self, project: &str) -> String {
        format!(
            "{}/{}/{}/{}.repo",
            OBS_BASE_URL,
            project.replace(':', ":/"),
            self.obs_version(),
            project
        )
    }

    fn dms_mapping(&self, variant: PackageVariant) -> PackageMapping {
        match variant {
            PackageVariant::Git => PackageMapping::third_party("dms-git", "home:AvengeMedia:dms-git"),
            PackageVariant::Stable => PackageMapping::third_party("dms", "home:AvengeMedia:dms"),
        }
    }

    /// Stable niri and its shim ship in the distribution; git builds come
    /// from OBS.
    fn compositor_mapping(&self, name: &str, variant: PackageVariant) -> PackageMapping {
        match variant {
            PackageVariant::Git => PackageMapping::third_party(format!("{}-git", name), DANKLINUX),
            PackageVariant::Stable => PackageMapping::system(name),
        }
    }
}

impl BaseDetection for OpenSuseDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        self.runner()
            .succeeds(&CommandSpec::new("rpm").args(["-q", package]))
    }
}

impl ManualPackageInstaller for OpenSuseDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("zypper").args(["install", "-y"]).args(packages)
    }

    fn build_cflags(&self, ctx: &RunContext) -> String {
        let optflags = query_cflags(ctx, CommandSpec::new("rpm").args(["--eval", "%{optflags}"]));
        format!("{} -I/usr/include/wayland", optflags)
    }
}

impl RepositorySource for OpenSuseDistribution {
    fn provider(&self) -> &'static str {
        "OBS"
    }

    fn repository_exists(&self, repo: &str) -> bool {
        self.runner()
            .succeeds(&CommandSpec::new("zypper").args(["repos", &repo.replace(':', "-")]))
    }

    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
        Ok(vec![
            CommandSpec::new("zypper")
                .args(["addrepo", "-f"])
                .arg(self.repo_file_url(repo)),
        ])
    }

    fn refresh_command(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new("zypper").args(["--gpg-auto-import-keys", "refresh"]))
    }
}

impl Distribution for OpenSuseDistribution {
    fn config(&self) -> &DistroConfig {
        &self.config
    }

    fn package_manager(&self) -> PackageManagerKind {
        PackageManagerKind::Zypper
    }

    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap) -> PackageMap {
        let quickshell = match self.variant_for(variants, "quickshell") {
            PackageVariant::Git => PackageMapping::third_party("quickshell-git", DANKLINUX),
            PackageVariant::Stable => PackageMapping::third_party("quickshell", DANKLINUX),
        };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            (DMS_DEPENDENCY, self.dms_mapping(self.variant_for(variants, DMS_DEPENDENCY))),
            ("quickshell", quickshell),
            ("ghostty", PackageMapping::third_party("ghostty", DANKLINUX)),
            ("matugen", PackageMapping::third_party("matugen", DANKLINUX)),
            ("dgop", PackageMapping::third_party("dgop", DANKLINUX)),
        ]
        .into_iter()
        .map(|(name, mapping)| (name.to_string(), mapping))
        .collect();

        match wm {
            WindowManager::Hyprland => {
                packages.insert("hyprland".into(), PackageMapping::system("hyprland"));
                packages.insert("hyprctl".into(), PackageMapping::system("hyprland"));
                packages.insert("jq".into(), PackageMapping::system("jq"));
            }
            WindowManager::Niri => {
                // The shim follows the compositor's variant.
                let variant = self.variant_for(variants, "niri");
                packages.insert("niri".into(), self.compositor_mapping("niri", variant));
                packages.insert(
                    "xwayland-satellite".into(),
                    self.compositor_mapping("xwayland-satellite", variant),
                );
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[
            "make",
            "unzip",
            "gcc",
            "gcc-c++",
            "cmake",
            "ninja",
            "pkgconf-pkg-config",
            "git",
            "qt6-base-devel",
            "qt6-declarative-devel",
            "qt6-declarative-private-devel",
            "qt6-shadertools",
            "qt6-shadertools-devel",
            "qt6-wayland-devel",
            "qt6-waylandclient-private-devel",
            "spirv-tools-devel",
            "cli11-devel",
            "wayland-protocols-devel",
            "libgbm-devel",
            "libdrm-devel",
            "pipewire-devel",
            "jemalloc-devel",
            "wayland-utils",
            "Mesa-libGLESv3-devel",
            "pam-devel",
            "glib2-devel",
            "polkit-devel",
        ]
    }

    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()> {
        enable_repositories(self, &self.repos, mappings, ctx)
    }
}
