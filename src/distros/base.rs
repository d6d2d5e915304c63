//! Detection shared by every distribution, and dependency categorization.

use super::host::Host;
use super::runner::CommandRunner;
use super::types::{
    DMS_DEPENDENCY, Dependency, InstallOverrides, PackageMap, PackageMapping, PackageVariant,
    RepositoryType, Terminal, WindowManager,
};
use crate::common::systemd::{ServiceScope, SystemdManager};
use crate::ui::prelude::*;
use std::collections::HashSet;

/// Read-only probes. Implementors supply the host and a package-database
/// query; everything else has a default built on those two.
pub trait BaseDetection {
    fn host(&self) -> &Host;

    /// Whether `package` is recorded as installed by the package manager.
    fn package_installed(&self, package: &str) -> bool;

    fn runner(&self) -> &dyn CommandRunner {
        self.host().runner.as_ref()
    }

    fn command_exists(&self, name: &str) -> bool {
        self.runner().command_exists(name)
    }

    fn service_active(&self, service: &str, scope: ServiceScope) -> bool {
        SystemdManager::new(scope, self.runner()).is_active(service)
    }

    fn detect_command(&self, name: &str, description: &str) -> Dependency {
        Dependency::new(name, description, self.command_exists(name))
    }

    fn detect_package(&self, name: &str, description: &str, installed: bool) -> Dependency {
        Dependency::new(name, description, installed)
    }

    /// The shell counts as installed when its CLI is on PATH or its files
    /// sit in the user's quickshell config.
    fn detect_dms(&self) -> Dependency {
        let in_config = self
            .runner()
            .path_exists(&self.host().paths.config_home.join("quickshell").join("dms"));
        Dependency::new(
            DMS_DEPENDENCY,
            "Desktop shell built on quickshell",
            self.command_exists("dms") || in_config,
        )
    }

    fn detect_terminal(&self, terminal: Terminal) -> Dependency {
        self.detect_command(terminal.command(), terminal.description())
    }

    fn detect_git(&self) -> Dependency {
        self.detect_command("git", "Version control system")
    }

    fn detect_window_manager(&self, wm: WindowManager) -> Dependency {
        let description = match wm {
            WindowManager::Niri => "Scrollable-tiling Wayland compositor",
            WindowManager::Hyprland => "Dynamic tiling Wayland compositor",
        };
        Dependency::new(
            wm.dependency_name(),
            description,
            self.command_exists(wm.binary()),
        )
    }

    fn detect_quickshell(&self) -> Dependency {
        let present = self.command_exists("qs") || self.command_exists("quickshell");
        Dependency::new("quickshell", "QtQuick based desktop shell toolkit", present)
    }

    fn detect_xdg_portal(&self) -> Dependency {
        self.detect_package(
            "xdg-desktop-portal-gtk",
            "Desktop integration portal for GTK",
            self.package_installed("xdg-desktop-portal-gtk"),
        )
    }

    fn detect_accounts_service(&self) -> Dependency {
        self.detect_package(
            "accountsservice",
            "D-Bus interface for user account query and manipulation",
            self.package_installed("accountsservice"),
        )
    }

    fn detect_hyprland_tools(&self) -> Vec<Dependency> {
        vec![
            self.detect_command("hyprctl", "Hyprland control utility"),
            self.detect_command("jq", "JSON processor used by Hyprland scripts"),
        ]
    }

    fn detect_xwayland_satellite(&self) -> Dependency {
        self.detect_command("xwayland-satellite", "Xwayland support")
    }

    fn detect_matugen(&self) -> Dependency {
        self.detect_command("matugen", "Material color palette generator").optional()
    }

    fn detect_dgop(&self) -> Dependency {
        self.detect_command("dgop", "System monitoring backend").optional()
    }

    /// The full detection sequence in display order.
    fn detect_standard(&self, wm: WindowManager, terminal: Terminal) -> Vec<Dependency> {
        let mut dependencies = vec![
            self.detect_dms(),
            self.detect_terminal(terminal),
            self.detect_git(),
            self.detect_window_manager(wm),
            self.detect_quickshell(),
            self.detect_xdg_portal(),
            self.detect_accounts_service(),
        ];

        if wm == WindowManager::Hyprland {
            dependencies.extend(self.detect_hyprland_tools());
        }
        if wm.needs_xwayland_shim() {
            dependencies.push(self.detect_xwayland_satellite());
        }

        dependencies.push(self.detect_matugen());
        dependencies.push(self.detect_dgop());
        dependencies
    }
}

/// Switch the named dependencies to their git variant.
pub fn apply_git_variants(dependencies: &mut [Dependency], git: &HashSet<String>) {
    for dep in dependencies.iter_mut() {
        if git.contains(&dep.name) {
            dep.variant = PackageVariant::Git;
        }
    }
}

/// One dependency routed to an install strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPackage {
    pub dependency: String,
    pub mapping: PackageMapping,
}

/// Result of categorization: three disjoint buckets plus the dependencies
/// that had no mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageBuckets {
    pub system: Vec<PlannedPackage>,
    pub third_party: Vec<PlannedPackage>,
    pub manual: Vec<PlannedPackage>,
    pub unmapped: Vec<String>,
}

impl PackageBuckets {
    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.third_party.is_empty() && self.manual.is_empty()
    }

    /// Distinct system package names in bucket order.
    pub fn system_packages(&self) -> Vec<String> {
        distinct_names(&self.system)
    }

    pub fn third_party_mappings(&self) -> Vec<PackageMapping> {
        let mut seen = HashSet::new();
        self.third_party
            .iter()
            .filter(|p| seen.insert(p.mapping.name.clone()))
            .map(|p| p.mapping.clone())
            .collect()
    }

    /// Dependency names (not package names) to build from source.
    pub fn manual_dependencies(&self) -> Vec<String> {
        self.manual.iter().map(|p| p.dependency.clone()).collect()
    }
}

fn distinct_names(packages: &[PlannedPackage]) -> Vec<String> {
    let mut seen = HashSet::new();
    packages
        .iter()
        .filter(|p| seen.insert(p.mapping.name.clone()))
        .map(|p| p.mapping.name.clone())
        .collect()
}

/// Route each dependency that still needs work to an install strategy.
///
/// Disabled dependencies are skipped first, then installed ones not flagged
/// for reinstall. A dependency without a mapping is reported and skipped.
pub fn categorize(
    dependencies: &[Dependency],
    mapping: &PackageMap,
    overrides: &InstallOverrides,
) -> PackageBuckets {
    let mut buckets = PackageBuckets::default();

    for dep in dependencies {
        if overrides.is_disabled(&dep.name) {
            continue;
        }
        if dep.is_installed() && !overrides.wants_reinstall(&dep.name) {
            continue;
        }

        let Some(package) = mapping.get(&dep.name) else {
            emit(
                Level::Warn,
                "distros.mapping.missing",
                &format!("No package mapping for {}, skipping", dep.name),
                None,
            );
            buckets.unmapped.push(dep.name.clone());
            continue;
        };

        let planned = PlannedPackage {
            dependency: dep.name.clone(),
            mapping: package.clone(),
        };
        match package.repository {
            RepositoryType::System => buckets.system.push(planned),
            RepositoryType::ThirdParty => buckets.third_party.push(planned),
            RepositoryType::Manual => buckets.manual.push(planned),
        }
    }

    buckets
}
