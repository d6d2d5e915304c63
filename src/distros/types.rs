//! Shared data model for dependency detection, package mapping and installation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Stable key of the DankMaterialShell dependency itself.
pub const DMS_DEPENDENCY: &str = "dms (DankMaterialShell)";

/// Whether a dependency is already present on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyStatus {
    Installed,
    Missing,
}

impl DependencyStatus {
    pub fn from_present(present: bool) -> Self {
        if present { Self::Installed } else { Self::Missing }
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// Stable release packaging or latest-upstream packaging/build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PackageVariant {
    #[default]
    Stable,
    Git,
}

impl fmt::Display for PackageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Git => write!(f, "git"),
        }
    }
}

/// Per-dependency variant choices, keyed by dependency name.
pub type VariantMap = HashMap<String, PackageVariant>;

/// A single detected dependency. `name` is the join key for mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub status: DependencyStatus,
    pub description: String,
    pub required: bool,
    pub variant: PackageVariant,
}

impl Dependency {
    pub fn new(name: impl Into<String>, description: impl Into<String>, present: bool) -> Self {
        Self {
            name: name.into(),
            status: DependencyStatus::from_present(present),
            description: description.into(),
            required: true,
            variant: PackageVariant::Stable,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_installed(&self) -> bool {
        self.status == DependencyStatus::Installed
    }
}

/// Collect the variant chosen for each dependency.
pub fn variant_map(dependencies: &[Dependency]) -> VariantMap {
    dependencies
        .iter()
        .map(|dep| (dep.name.clone(), dep.variant))
        .collect()
}

/// Supported compositors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WindowManager {
    #[default]
    Niri,
    Hyprland,
}

impl WindowManager {
    /// Name of the dependency (and executable) that provides the compositor.
    pub fn dependency_name(&self) -> &'static str {
        match self {
            Self::Niri => "niri",
            Self::Hyprland => "hyprland",
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Self::Niri => "niri",
            Self::Hyprland => "Hyprland",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Niri => "Niri",
            Self::Hyprland => "Hyprland",
        }
    }

    /// Compositors without native X11 support need the xwayland-satellite shim.
    pub fn needs_xwayland_shim(&self) -> bool {
        matches!(self, Self::Niri)
    }
}

impl fmt::Display for WindowManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Supported terminal emulators.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    #[default]
    Ghostty,
    Kitty,
    Alacritty,
}

impl Terminal {
    pub const ALL: [Terminal; 3] = [Terminal::Ghostty, Terminal::Kitty, Terminal::Alacritty];

    /// Dependency name, which is also the executable name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Ghostty => "ghostty",
            Self::Kitty => "kitty",
            Self::Alacritty => "alacritty",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ghostty => "A fast, native terminal emulator built in Zig",
            Self::Kitty => "A feature-rich, customizable terminal emulator",
            Self::Alacritty => "A simple terminal emulator (no dynamic theming)",
        }
    }

    pub fn from_dependency_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.command() == name)
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Where a concrete package comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepositoryType {
    /// The distribution's own repositories.
    System,
    /// A vendor-hosted repository (AUR, COPR, OBS, PPA, flake registry).
    ThirdParty,
    /// Compiled locally from source.
    Manual,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::ThirdParty => write!(f, "third-party"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A concrete installable artifact for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageMapping {
    pub name: String,
    pub repository: RepositoryType,
    /// Only present for `ThirdParty` mappings.
    pub repo_url: Option<String>,
}

impl PackageMapping {
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: RepositoryType::System,
            repo_url: None,
        }
    }

    pub fn third_party(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: RepositoryType::ThirdParty,
            repo_url: Some(repo_url.into()),
        }
    }

    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: RepositoryType::Manual,
            repo_url: None,
        }
    }
}

/// Full mapping table of one distribution, keyed by dependency name.
pub type PackageMap = HashMap<String, PackageMapping>;

/// Group of distributions sharing a package manager and conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistroFamily {
    Arch,
    Fedora,
    Debian,
    Ubuntu,
    Suse,
    Nix,
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Arch => "arch",
            Self::Fedora => "fedora",
            Self::Debian => "debian",
            Self::Ubuntu => "ubuntu",
            Self::Suse => "suse",
            Self::Nix => "nix",
        };
        write!(f, "{}", name)
    }
}

/// Native package manager driven by a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    Pacman,
    Dnf,
    Apt,
    Zypper,
    Nix,
}

impl PackageManagerKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pacman => "pacman",
            Self::Dnf => "dnf",
            Self::Apt => "apt",
            Self::Zypper => "zypper",
            Self::Nix => "nix",
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// User overrides collected by the front end.
#[derive(Debug, Clone, Default)]
pub struct InstallOverrides {
    pub reinstall: HashSet<String>,
    pub disabled: HashSet<String>,
}

impl InstallOverrides {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    pub fn wants_reinstall(&self, name: &str) -> bool {
        self.reinstall.contains(name)
    }
}

/// Pick the terminal the user selected from a detected dependency list.
pub fn detect_terminal_from_deps(dependencies: &[Dependency]) -> Terminal {
    dependencies
        .iter()
        .find_map(|dep| Terminal::from_dependency_name(&dep.name))
        .unwrap_or_default()
}
