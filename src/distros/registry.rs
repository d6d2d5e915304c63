//! Table of supported distributions, built once at startup from an explicit
//! list of family registration functions.

use super::host::Host;
use super::osinfo::OsInfo;
use super::pipeline::Distribution;
use super::types::DistroFamily;
use super::{arch, debian, fedora, nixos, opensuse, ubuntu};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unsupported distribution: {id}")]
    NotFound { id: String },
    #[error("distribution {id} is already registered")]
    Duplicate { id: String },
}

/// Static identity of one registered distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistroConfig {
    pub id: &'static str,
    pub color_hex: &'static str,
    pub family: DistroFamily,
}

pub type Constructor = fn(DistroConfig, Host) -> Box<dyn Distribution>;

#[derive(Clone, Copy)]
struct Entry {
    config: DistroConfig,
    constructor: Constructor,
}

/// Maps distribution IDs to constructors. Entries cannot be replaced or
/// removed once registered.
#[derive(Default)]
pub struct DistroRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl DistroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every family shipped with the installer.
    pub fn with_builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        arch::register(&mut registry)?;
        fedora::register(&mut registry)?;
        debian::register(&mut registry)?;
        ubuntu::register(&mut registry)?;
        opensuse::register(&mut registry)?;
        nixos::register(&mut registry)?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        id: &'static str,
        color_hex: &'static str,
        family: DistroFamily,
        constructor: Constructor,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(id) {
            return Err(RegistryError::Duplicate { id: id.to_string() });
        }
        self.entries.insert(
            id,
            Entry {
                config: DistroConfig {
                    id,
                    color_hex,
                    family,
                },
                constructor,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Result<DistroConfig, RegistryError> {
        self.entries
            .get(id)
            .map(|entry| entry.config)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Pick the entry for a detected OS: its own ID first, then each
    /// `ID_LIKE` token, then the family default for well-known parents.
    pub fn resolve(&self, os: &OsInfo) -> Result<DistroConfig, RegistryError> {
        if let Ok(config) = self.lookup(&os.id) {
            return Ok(config);
        }
        for like in &os.id_like {
            if let Ok(config) = self.lookup(like) {
                return Ok(config);
            }
            let fallback = match like.as_str() {
                "suse" | "opensuse" => Some("opensuse-tumbleweed"),
                "rhel" | "centos" => Some("fedora"),
                _ => None,
            };
            if let Some(config) = fallback.and_then(|id| self.lookup(id).ok()) {
                return Ok(config);
            }
        }
        Err(RegistryError::NotFound { id: os.id.clone() })
    }

    pub fn create(&self, id: &str, host: Host) -> Result<Box<dyn Distribution>, RegistryError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
        Ok((entry.constructor)(entry.config, host))
    }

    /// Resolve the host's OS and build its distribution.
    pub fn detect(&self, host: Host) -> Result<Box<dyn Distribution>, RegistryError> {
        let config = self.resolve(&host.os)?;
        self.create(config.id, host)
    }

    /// Registered entries sorted by ID.
    pub fn configs(&self) -> Vec<DistroConfig> {
        self.entries.values().map(|entry| entry.config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distros::progress::{Phase, ProgressSink};
    use crate::distros::runner::CancelToken;
    use crate::distros::context::RunContext;
    use crate::distros::privilege::Elevation;
    use crate::distros::testing::{self, FakeRunner, TestHost};
    use crate::distros::types::{
        Dependency, InstallOverrides, PackageVariant, RepositoryType, Terminal, VariantMap,
        WindowManager,
    };

    fn registry() -> DistroRegistry {
        DistroRegistry::with_builtin().unwrap()
    }

    const ALL_RELEASES: [&str; 7] = [
        testing::TUMBLEWEED,
        testing::LEAP,
        testing::ARCH,
        testing::FEDORA,
        testing::DEBIAN,
        testing::UBUNTU,
        testing::NIXOS,
    ];

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(
                "arch",
                "#000000",
                DistroFamily::Arch,
                |config, host| -> Box<dyn Distribution> {
                    Box::new(arch::ArchDistribution::new(config, host))
                },
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate { id: "arch".into() });
    }

    #[test]
    fn unknown_id_is_not_found() {
        assert_eq!(
            registry().lookup("haiku").unwrap_err(),
            RegistryError::NotFound { id: "haiku".into() }
        );
    }

    #[test]
    fn opensuse_flavours_share_family_and_color() {
        let registry = registry();
        for id in ["opensuse-tumbleweed", "opensuse-leap", "opensuse-slowroll"] {
            let config = registry.lookup(id).unwrap();
            assert_eq!(config.family, DistroFamily::Suse);
            assert_eq!(config.color_hex, "#73BA25");
        }
    }

    #[test]
    fn id_like_resolves_derivatives() {
        let registry = registry();
        let os = OsInfo::parse_os_release("ID=tuxedo\nID_LIKE=\"ubuntu debian\"\n");
        assert_eq!(registry.resolve(&os).unwrap().id, "ubuntu");

        let os = OsInfo::parse_os_release("ID=gecko\nID_LIKE=\"suse\"\n");
        assert_eq!(registry.resolve(&os).unwrap().id, "opensuse-tumbleweed");

        let os = OsInfo::parse_os_release("ID=rocky\nID_LIKE=\"rhel centos fedora\"\n");
        assert_eq!(registry.resolve(&os).unwrap().id, "fedora");

        let os = OsInfo::parse_os_release("ID=gentoo\n");
        assert!(registry.resolve(&os).is_err());
    }

    #[test]
    fn configs_are_sorted() {
        let ids: Vec<&str> = registry().configs().iter().map(|c| c.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"nixos"));
    }

    #[test]
    fn every_detected_dependency_has_a_mapping() {
        let registry = registry();
        for release in ALL_RELEASES {
            let test = TestHost::new(FakeRunner::new(), release);
            let distro = registry.detect(test.host.clone()).unwrap();
            for wm in [WindowManager::Niri, WindowManager::Hyprland] {
                for terminal in Terminal::ALL {
                    let deps = distro.detect_dependencies_with_terminal(wm, terminal);
                    for variant in [PackageVariant::Stable, PackageVariant::Git] {
                        let variants: VariantMap =
                            deps.iter().map(|d| (d.name.clone(), variant)).collect();
                        let mapping = distro.package_mapping_with_variants(wm, &variants);
                        for dep in &deps {
                            assert!(
                                mapping.contains_key(&dep.name),
                                "{} has no mapping for {} ({}, {})",
                                distro.id(),
                                dep.name,
                                wm,
                                variant
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn detection_order_is_fixed() {
        let registry = registry();
        let test = TestHost::new(FakeRunner::new(), testing::FEDORA);
        let distro = registry.detect(test.host.clone()).unwrap();
        let names: Vec<String> = distro
            .detect_dependencies(WindowManager::Hyprland)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            [
                "dms (DankMaterialShell)",
                "ghostty",
                "git",
                "hyprland",
                "quickshell",
                "xdg-desktop-portal-gtk",
                "accountsservice",
                "hyprctl",
                "jq",
                "matugen",
                "dgop",
            ]
        );
    }

    #[test]
    fn git_variant_renames_package() {
        let registry = registry();
        for release in ALL_RELEASES {
            let test = TestHost::new(FakeRunner::new(), release);
            let distro = registry.detect(test.host.clone()).unwrap();
            let stable = distro.package_mapping(WindowManager::Niri);
            let variants: VariantMap = [("quickshell".to_string(), PackageVariant::Git)].into();
            let git = distro.package_mapping_with_variants(WindowManager::Niri, &variants);

            let (stable, git) = (&stable["quickshell"], &git["quickshell"]);
            if stable.repository == RepositoryType::Manual {
                // Source builds switch the clone target instead of the name.
                assert_eq!(git.repository, RepositoryType::Manual);
                continue;
            }
            assert_ne!(stable.name, git.name, "{}", distro.id());
            assert!(git.name.starts_with(&stable.name), "{}", distro.id());
            assert_ne!(git.repository, RepositoryType::System);
        }
    }

    #[test]
    fn satisfied_dependencies_run_nothing() {
        let registry = registry();
        for release in ALL_RELEASES {
            let test = TestHost::new(FakeRunner::new(), release);
            let distro = registry.detect(test.host.clone()).unwrap();
            let deps: Vec<Dependency> = ["git", "quickshell", "niri", "matugen"]
                .iter()
                .map(|name| Dependency::new(*name, "", true))
                .collect();

            let elevation = Elevation::Interactive;
            let cancel = CancelToken::new();
            let (sink, rx) = ProgressSink::channel(16);
            let ctx = RunContext::new(test.runner.as_ref(), &elevation, &cancel, &sink);
            distro
                .install_packages(&deps, WindowManager::Niri, &InstallOverrides::default(), &ctx)
                .unwrap();
            drop(sink);

            assert!(test.runner.calls().is_empty(), "{} ran commands", distro.id());
            let events: Vec<_> = rx.iter().collect();
            assert_eq!(events.len(), 1);
            assert!(events[0].is_complete);
            assert_eq!(events[0].phase, Phase::Complete);
        }
    }
}
