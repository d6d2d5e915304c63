//! Debian 13 and newer: apt plus the AvengeMedia OBS apt repositories.
//! Compositors Debian does not package are built from source.

use super::base::BaseDetection;
use super::context::RunContext;
use super::host::Host;
use super::manual::{ManualPackageInstaller, query_cflags};
use super::pipeline::Distribution;
use super::registry::{DistroConfig, DistroRegistry, RegistryError};
use super::repos::{EnabledRepos, RepositorySource, enable_repositories};
use super::runner::{CancelToken, CommandRunner, CommandSpec};
use super::types::{
    DMS_DEPENDENCY, DistroFamily, PackageManagerKind, PackageMap, PackageMapping, PackageVariant,
    VariantMap, WindowManager,
};
use anyhow::{Result, bail};
use std::path::PathBuf;

const OBS_BASE_URL: &str = "https://download.opensuse.org/repositories";
const DANKLINUX: &str = "home:AvengeMedia:danklinux";
const KEYRING_DIR: &str = "/etc/apt/keyrings";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

pub fn register(registry: &mut DistroRegistry) -> Result<(), RegistryError> {
    registry.register("debian", "#A80030", DistroFamily::Debian, construct)
}

fn construct(config: DistroConfig, host: Host) -> Box<dyn Distribution> {
    Box::new(DebianDistribution::new(config, host))
}

/// Whether apt has `package` fully installed, from `dpkg-query` status.
pub fn dpkg_installed(runner: &dyn CommandRunner, package: &str) -> bool {
    let spec = CommandSpec::new("dpkg-query").args(["-W", "-f=${Status}", package]);
    runner
        .run(&spec, &CancelToken::new())
        .map(|output| output.success && output.output.contains("install ok installed"))
        .unwrap_or(false)
}

/// apt install invocation shared with Ubuntu.
pub fn apt_install(packages: &[String]) -> CommandSpec {
    CommandSpec::new("apt-get")
        .args(["install", "-y"])
        .args(packages)
        .env("DEBIAN_FRONTEND", "noninteractive")
}

pub struct DebianDistribution {
    config: DistroConfig,
    host: Host,
    repos: EnabledRepos,
}

impl DebianDistribution {
    pub fn new(config: DistroConfig, host: Host) -> Self {
        Self {
            config,
            host,
            repos: EnabledRepos::default(),
        }
    }

    /// OBS target: `Debian_<major>` for releases, `Debian_Testing` for
    /// testing and sid, which carry no `VERSION_ID`.
    fn obs_version(&self) -> String {
        let major = self.host.os.version_id.split('.').next().unwrap_or_default();
        if major.is_empty() {
            "Debian_Testing".to_string()
        } else {
            format!("Debian_{}", major)
        }
    }

    /// Base URL of the apt repository for an OBS project.
    pub fn repo_base_url(&self, project: &str) -> String {
        format!(
            "{}/{}/{}",
            OBS_BASE_URL,
            project.replace(':', ":/"),
            self.obs_version()
        )
    }

    fn list_name(project: &str) -> String {
        project.replace(':', "-")
    }

    fn sources_file(project: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}.list", SOURCES_DIR, Self::list_name(project)))
    }

    fn obs(name: &str) -> PackageMapping {
        PackageMapping::third_party(name, DANKLINUX)
    }
}

impl BaseDetection for DebianDistribution {
    fn host(&self) -> &Host {
        &self.host
    }

    fn package_installed(&self, package: &str) -> bool {
        dpkg_installed(self.runner(), package)
    }
}

impl ManualPackageInstaller for DebianDistribution {
    fn install_command(&self, packages: &[String]) -> CommandSpec {
        apt_install(packages)
    }

    fn build_cflags(&self, ctx: &RunContext) -> String {
        query_cflags(ctx, CommandSpec::new("dpkg-buildflags").args(["--get", "CFLAGS"]))
    }
}

impl RepositorySource for DebianDistribution {
    fn provider(&self) -> &'static str {
        "OBS"
    }

    fn repository_exists(&self, repo: &str) -> bool {
        self.runner().path_exists(&Self::sources_file(repo))
    }

    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
        if repo.contains(['\'', '"', ' ']) {
            bail!("refusing to write apt source for malformed project {}", repo);
        }
        let base = self.repo_base_url(repo);
        let name = Self::list_name(repo);
        let keyring = format!("{}/{}.gpg", KEYRING_DIR, name);
        let source = format!("deb [signed-by={}] {}/ /", keyring, base);

        Ok(vec![
            CommandSpec::new("mkdir").args(["-p", KEYRING_DIR]),
            CommandSpec::new("sh").arg("-c").arg(format!(
                "curl -fsSL {}/Release.key | gpg --dearmor --yes -o {}",
                base, keyring
            )),
            CommandSpec::new("sh").arg("-c").arg(format!(
                "echo '{}' > {}",
                source,
                Self::sources_file(repo).display()
            )),
        ])
    }

    fn refresh_command(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new("apt-get").arg("update"))
    }
}

impl Distribution for DebianDistribution {
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
            PackageMapping::third_party("dms-git", "home:AvengeMedia:dms-git")
        } else {
            PackageMapping::third_party("dms", "home:AvengeMedia:dms")
        };

        let mut packages: PackageMap = [
            ("git", PackageMapping::system("git")),
            ("kitty", PackageMapping::system("kitty")),
            ("alacritty", PackageMapping::system("alacritty")),
            ("xdg-desktop-portal-gtk", PackageMapping::system("xdg-desktop-portal-gtk")),
            ("accountsservice", PackageMapping::system("accountsservice")),
            (DMS_DEPENDENCY, dms),
            ("quickshell", Self::obs(quickshell)),
            ("ghostty", Self::obs("ghostty")),
            ("matugen", Self::obs("matugen")),
            ("dgop", Self::obs("dgop")),
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
                packages.insert("niri".into(), PackageMapping::manual("niri"));
                packages.insert(
                    "xwayland-satellite".into(),
                    PackageMapping::manual("xwayland-satellite"),
                );
            }
        }
        packages
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &[
            "build-essential",
            "git",
            "curl",
            "gpg",
            "unzip",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distros::privilege::Elevation;
    use crate::distros::progress::ProgressSink;
    use crate::distros::runner::CommandOutput;
    use crate::distros::testing::{self, FakeRunner, StubReleases, TestHost};
    use crate::distros::types::{Dependency, InstallOverrides, RepositoryType};
    use std::sync::Arc;

    fn distro(test: &TestHost) -> DebianDistribution {
        debian_on(test.host.clone())
    }

    fn debian_on(host: Host) -> DebianDistribution {
        let config = DistroConfig {
            id: "debian",
            color_hex: "#A80030",
            family: DistroFamily::Debian,
        };
        DebianDistribution::new(config, host)
    }

    fn build_niri(test: &TestHost, distro: &DebianDistribution, variants: &VariantMap) -> Result<()> {
        let elevation = Elevation::Root;
        let cancel = CancelToken::new();
        let sink = ProgressSink::discard();
        let ctx = RunContext::new(test.runner.as_ref(), &elevation, &cancel, &sink);
        distro.install_manual_packages(&["niri".to_string()], variants, &ctx)
    }

    fn niri_clones(test: &TestHost) -> Vec<String> {
        test.runner
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("git clone"))
            .collect()
    }

    #[test]
    fn testing_without_version_uses_testing_repo() {
        let test = TestHost::new(FakeRunner::new(), "ID=debian\nVERSION_CODENAME=forky\n");
        assert_eq!(
            distro(&test).repo_base_url(DANKLINUX),
            "https://download.opensuse.org/repositories/home:/AvengeMedia:/danklinux/Debian_Testing"
        );
        let test = TestHost::new(FakeRunner::new(), testing::DEBIAN);
        assert!(distro(&test).repo_base_url(DANKLINUX).ends_with("/Debian_13"));
    }

    #[test]
    fn repository_add_imports_key_and_writes_source() {
        let test = TestHost::new(FakeRunner::new(), testing::DEBIAN);
        let commands = distro(&test).add_repository_commands(DANKLINUX).unwrap();
        let rendered: Vec<String> = commands.iter().map(CommandSpec::display).collect();
        assert_eq!(rendered[0], "mkdir -p /etc/apt/keyrings");
        assert!(rendered[1].contains("Debian_13/Release.key | gpg --dearmor --yes -o /etc/apt/keyrings/home-AvengeMedia-danklinux.gpg"));
        assert!(rendered[2].contains("signed-by=/etc/apt/keyrings/home-AvengeMedia-danklinux.gpg"));
        assert!(rendered[2].contains("/etc/apt/sources.list.d/home-AvengeMedia-danklinux.list"));
    }

    #[test]
    fn dpkg_status_must_be_fully_installed() {
        let runner = FakeRunner::new()
            .on(" git", CommandOutput::ok("install ok installed"))
            .on(" jq", CommandOutput::ok("deinstall ok config-files"));
        let test = TestHost::new(runner, testing::DEBIAN);
        let distro = distro(&test);
        assert!(distro.package_installed("git"));
        assert!(!distro.package_installed("jq"));
    }

    #[test]
    fn niri_is_built_from_source() {
        let runner = FakeRunner::new()
            .with_commands(&["go", "cargo"])
            .on("dpkg-query", CommandOutput::ok("install ok installed"));
        let test = TestHost::new(runner, testing::DEBIAN);
        let distro = distro(&test);
        let mapping = distro.package_mapping(WindowManager::Niri);
        assert_eq!(mapping["niri"].repository, RepositoryType::Manual);

        let elevation = Elevation::Root;
        let cancel = CancelToken::new();
        let sink = ProgressSink::discard();
        let ctx = RunContext::new(test.runner.as_ref(), &elevation, &cancel, &sink);
        let deps = vec![Dependency::new("niri", "", false)];
        distro
            .install_packages(&deps, WindowManager::Niri, &InstallOverrides::default(), &ctx)
            .unwrap();

        let calls = test.runner.calls();
        assert!(calls.iter().any(|c| c.starts_with("git clone --depth 1 --branch v0.2.0 https://github.com/YaLTeR/niri.git")));
        assert!(calls.contains(&"cargo build --release --locked".to_string()));
        assert!(calls.contains(&"install -Dm755 target/release/niri /usr/local/bin/niri".to_string()));
        assert_eq!(test.runner.count("apt-get"), 0);
        assert_eq!(test.runner.count("rustup"), 0);
    }

    #[test]
    fn missing_release_tag_falls_back_to_default_branch() {
        let test = TestHost::new(FakeRunner::new().with_commands(&["cargo"]), testing::DEBIAN);
        let distro = debian_on(test.host.clone().with_releases(Arc::new(StubReleases(None))));

        build_niri(&test, &distro, &VariantMap::new()).unwrap();

        let clones = niri_clones(&test);
        assert_eq!(clones.len(), 1);
        assert!(clones[0].starts_with("git clone --depth 1 https://github.com/YaLTeR/niri.git "));
        assert!(!clones[0].contains("--branch"));
    }

    #[test]
    fn git_variant_clones_default_branch() {
        let test = TestHost::new(FakeRunner::new().with_commands(&["cargo"]), testing::DEBIAN);
        let variants = VariantMap::from([("niri".to_string(), PackageVariant::Git)]);

        build_niri(&test, &distro(&test), &variants).unwrap();

        let clones = niri_clones(&test);
        assert_eq!(clones.len(), 1);
        assert!(!clones[0].contains("--branch"));
    }

    #[test]
    fn failed_build_reclones_once_and_recovers() {
        let runner = FakeRunner::new()
            .with_commands(&["cargo"])
            .on_times("cargo build", CommandOutput::failed(101, "error: could not compile"), 1);
        let test = TestHost::new(runner, testing::DEBIAN);

        build_niri(&test, &distro(&test), &VariantMap::new()).unwrap();

        assert_eq!(niri_clones(&test).len(), 2);
        assert_eq!(test.runner.count("cargo build"), 2);
        assert_eq!(test.runner.count("install -Dm755 target/release/niri"), 1);
    }

    #[test]
    fn repeated_build_failure_is_fatal_and_cleans_up() {
        let runner = FakeRunner::new()
            .with_commands(&["cargo"])
            .on("cargo build", CommandOutput::failed(101, "error: could not compile"));
        let test = TestHost::new(runner, testing::DEBIAN);

        let err = build_niri(&test, &distro(&test), &VariantMap::new()).unwrap_err();

        assert!(format!("{:#}", err).contains("failed again"));
        assert_eq!(niri_clones(&test).len(), 2);
        assert_eq!(test.runner.count("cargo build"), 2);
        let leftover = std::fs::read_dir(&test.host.paths.cache_dir).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn missing_cargo_bootstraps_rust_first() {
        let test = TestHost::new(FakeRunner::new(), testing::DEBIAN);

        build_niri(&test, &distro(&test), &VariantMap::new()).unwrap();

        let calls = test.runner.calls();
        let bootstrap: Vec<&str> = calls
            .iter()
            .map(String::as_str)
            .filter(|call| call.contains("rustup"))
            .collect();
        assert_eq!(
            bootstrap,
            vec!["apt-get install -y rustup", "rustup install stable", "rustup default stable"]
        );
        let rustup = test.runner.position("rustup default stable").unwrap();
        let build = test.runner.position("cargo build").unwrap();
        assert!(rustup < build);
    }
}
