//! Source builds for software a distribution does not package.
//!
//! Each build clones the upstream repository into a scratch directory under
//! the cache, runs the recipe's build steps and installs the result with
//! elevated rights. The scratch directory is removed when the build ends,
//! whatever the outcome. A failed build gets one fresh clone before the
//! failure is reported (see [`selfheal`](super::selfheal)).

use super::base::BaseDetection;
use super::context::RunContext;
use super::progress::{InstallProgressMsg, Phase};
use super::runner::{CancelToken, CommandRunner, CommandSpec};
use super::selfheal::{Recreatable, with_recovery};
use super::types::{PackageVariant, VariantMap};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const GITHUB_API_URL: &str = "https://api.github.com/repos";
pub const DEFAULT_CFLAGS: &str = "-O2 -g";
const INSTALL_PREFIX: &str = "/usr/local";

/// Looks up the newest release tag of an upstream project.
pub trait ReleaseSource: Send + Sync {
    fn latest_tag(&self, owner: &str, repo: &str) -> Result<String>;
}

#[derive(Deserialize, Debug)]
struct GitHubRelease {
    tag_name: String,
}

/// Latest release through the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    timeout: Duration,
}

impl Default for GitHubReleases {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

impl ReleaseSource for GitHubReleases {
    fn latest_tag(&self, owner: &str, repo: &str) -> Result<String> {
        let url = format!("{}/{}/{}/releases/latest", GITHUB_API_URL, owner, repo);

        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("dankinstall/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .with_context(|| format!("Failed to fetch release information for {}/{}", owner, repo))?;

        if !response.status().is_success() {
            return Err(anyhow!("GitHub API returned status: {}", response.status()));
        }

        let release: GitHubRelease = response
            .json()
            .context("Failed to parse release information")?;
        Ok(release.tag_name)
    }
}

/// How a cloned project is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystem {
    /// CMake with the Ninja generator.
    CMake,
    /// `cargo build --release`, installing the listed binaries.
    Cargo { binaries: &'static [&'static str] },
    /// `go build` of one package into one binary.
    Go {
        dir: &'static str,
        package: &'static str,
        binary: &'static str,
    },
}

/// Where to fetch a project and how to build it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRecipe {
    /// Dependency name this recipe satisfies.
    pub name: &'static str,
    pub owner: &'static str,
    pub repo: &'static str,
    pub build: BuildSystem,
    /// Extra privileged copies `(source relative to the clone, destination)`.
    /// Sources without a `/` are directories and are copied recursively.
    pub extra_files: &'static [(&'static str, &'static str)],
}

const RECIPES: &[SourceRecipe] = &[
    SourceRecipe {
        name: "quickshell",
        owner: "quickshell-mirror",
        repo: "quickshell",
        build: BuildSystem::CMake,
        extra_files: &[],
    },
    SourceRecipe {
        name: "matugen",
        owner: "InioX",
        repo: "matugen",
        build: BuildSystem::Cargo {
            binaries: &["matugen"],
        },
        extra_files: &[],
    },
    SourceRecipe {
        name: "niri",
        owner: "YaLTeR",
        repo: "niri",
        build: BuildSystem::Cargo {
            binaries: &["niri"],
        },
        extra_files: &[
            ("resources/niri-session", "/usr/local/bin/niri-session"),
            (
                "resources/niri.desktop",
                "/usr/local/share/wayland-sessions/niri.desktop",
            ),
            (
                "resources/niri-portals.conf",
                "/usr/local/share/xdg-desktop-portal/niri-portals.conf",
            ),
            (
                "resources/niri.service",
                "/usr/local/lib/systemd/user/niri.service",
            ),
            (
                "resources/niri-shutdown.target",
                "/usr/local/lib/systemd/user/niri-shutdown.target",
            ),
        ],
    },
    SourceRecipe {
        name: "xwayland-satellite",
        owner: "Supreeeme",
        repo: "xwayland-satellite",
        build: BuildSystem::Cargo {
            binaries: &["xwayland-satellite"],
        },
        extra_files: &[],
    },
    SourceRecipe {
        name: "dgop",
        owner: "AvengeMedia",
        repo: "dgop",
        build: BuildSystem::Go {
            dir: ".",
            package: "./cmd/cli",
            binary: "dgop",
        },
        extra_files: &[],
    },
    SourceRecipe {
        name: super::types::DMS_DEPENDENCY,
        owner: "AvengeMedia",
        repo: "DankMaterialShell",
        build: BuildSystem::Go {
            dir: "core",
            package: "./cmd/dms",
            binary: "dms",
        },
        extra_files: &[("quickshell", "/etc/xdg/quickshell/dms")],
    },
];

/// One command of a build, run in the clone directory.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub label: String,
    pub spec: CommandSpec,
    pub privileged: bool,
}

impl SourceRecipe {
    pub fn for_dependency(name: &str) -> Option<&'static SourceRecipe> {
        RECIPES.iter().find(|recipe| recipe.name == name)
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }

    pub fn needs_rust(&self) -> bool {
        matches!(self.build, BuildSystem::Cargo { .. })
    }

    /// Short name for paths and messages.
    pub fn slug(&self) -> &'static str {
        self.name.split_whitespace().next().unwrap_or(self.name)
    }

    /// Build and install steps for a clone at `src`.
    pub fn steps(&self, src: &Path, cflags: &str, tmpdir: &Path) -> Vec<BuildStep> {
        let tmp = tmpdir.display().to_string();
        let with_flags = |spec: CommandSpec| {
            spec.dir(src)
                .env("TMPDIR", tmp.clone())
                .env("CFLAGS", cflags)
                .env("CXXFLAGS", cflags)
        };
        let slug = self.slug();
        let mut steps = Vec::new();

        match self.build {
            BuildSystem::CMake => {
                steps.push(BuildStep {
                    label: format!("Configuring {} build...", slug),
                    spec: with_flags(CommandSpec::new("cmake").args([
                        "-GNinja",
                        "-B",
                        "build",
                        "-DCMAKE_BUILD_TYPE=RelWithDebInfo",
                        "-DCRASH_REPORTER=off",
                        "-DCMAKE_CXX_STANDARD=20",
                    ])),
                    privileged: false,
                });
                steps.push(BuildStep {
                    label: format!("Building {} (this may take a while)...", slug),
                    spec: with_flags(CommandSpec::new("cmake").args(["--build", "build"])),
                    privileged: false,
                });
                steps.push(BuildStep {
                    label: format!("Installing {}...", slug),
                    spec: CommandSpec::new("cmake")
                        .args(["--install", "build"])
                        .dir(src),
                    privileged: true,
                });
            }
            BuildSystem::Cargo { binaries } => {
                steps.push(BuildStep {
                    label: format!("Building {} with cargo (this may take a while)...", slug),
                    spec: with_flags(CommandSpec::new("cargo").args(["build", "--release", "--locked"])),
                    privileged: false,
                });
                for binary in binaries {
                    steps.push(install_file(
                        src,
                        &format!("target/release/{}", binary),
                        &format!("{}/bin/{}", INSTALL_PREFIX, binary),
                    ));
                }
            }
            BuildSystem::Go {
                dir,
                package,
                binary,
            } => {
                let build_dir = src.join(dir);
                steps.push(BuildStep {
                    label: format!("Building {} with go...", slug),
                    spec: CommandSpec::new("go")
                        .args(["build", "-trimpath", "-o", binary, package])
                        .dir(&build_dir)
                        .env("TMPDIR", tmp.clone())
                        .env("CGO_CFLAGS", cflags),
                    privileged: false,
                });
                steps.push(install_file(
                    &build_dir,
                    binary,
                    &format!("{}/bin/{}", INSTALL_PREFIX, binary),
                ));
            }
        }

        for &(from, to) in self.extra_files {
            if from.contains('/') {
                steps.push(install_file(src, from, to));
            } else {
                steps.push(BuildStep {
                    label: format!("Installing {} files...", slug),
                    spec: CommandSpec::new("mkdir").args(["-p", to]).dir(src),
                    privileged: true,
                });
                steps.push(BuildStep {
                    label: format!("Installing {} files...", slug),
                    spec: CommandSpec::new("cp").args(["-rT", from, to]).dir(src),
                    privileged: true,
                });
            }
        }

        steps
    }
}

/// `install -D` a single file; executables land in a `bin` directory.
fn install_file(dir: &Path, from: &str, to: &str) -> BuildStep {
    let mode = if to.contains("/bin/") { "755" } else { "644" };
    BuildStep {
        label: format!("Installing {}...", to),
        spec: CommandSpec::new("install")
            .arg(format!("-Dm{}", mode))
            .args([from, to])
            .dir(dir),
        privileged: true,
    }
}

/// Compiler flags printed by `spec`, or [`DEFAULT_CFLAGS`] when the query
/// fails or prints nothing.
pub fn query_cflags(ctx: &RunContext, spec: CommandSpec) -> String {
    let command = spec.display();
    match ctx.runner.run_checked(&spec, ctx.cancel) {
        Ok(output) if !output.trimmed().is_empty() => output.trimmed().to_string(),
        _ => {
            ctx.warn(
                Phase::ManualBuilds,
                0.0,
                "Building from source...",
                format!("could not read flags from `{}`, using {}", command, DEFAULT_CFLAGS),
            );
            DEFAULT_CFLAGS.to_string()
        }
    }
}

/// A git clone used as a build tree. Recreating it means deleting the
/// directory and cloning again.
pub struct CloneDir<'a> {
    runner: &'a dyn CommandRunner,
    cancel: &'a CancelToken,
    pub url: String,
    /// Tag or branch; `None` clones the default branch.
    pub reference: Option<String>,
    pub path: PathBuf,
}

impl<'a> CloneDir<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        cancel: &'a CancelToken,
        url: impl Into<String>,
        reference: Option<String>,
        path: PathBuf,
    ) -> Self {
        Self {
            runner,
            cancel,
            url: url.into(),
            reference,
            path,
        }
    }

    pub fn clone_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("git").args(["clone", "--depth", "1"]);
        if let Some(reference) = &self.reference {
            spec = spec.args(["--branch", reference.as_str()]);
        }
        spec.arg(self.url.clone())
            .arg(self.path.display().to_string())
    }
}

impl Recreatable for CloneDir<'_> {
    fn describe(&self) -> String {
        format!("clone of {}", self.url)
    }

    fn ensure(&mut self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.runner
            .run_checked(&self.clone_command(), self.cancel)
            .with_context(|| format!("failed to clone {}", self.url))?;
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing {}", self.path.display()))
            }
        }
    }
}

/// Remove a finished build directory, warning instead of failing when it
/// cannot be removed.
pub fn discard_build_dir(scratch: TempDir, phase: Phase, fraction: f64, ctx: &RunContext) {
    let path = scratch.path().display().to_string();
    if let Err(err) = scratch.close() {
        ctx.warn(
            phase,
            fraction,
            "Cleaning up...",
            format!("could not remove build directory {}: {}", path, err),
        );
    }
}

/// Default-method mixin for building dependencies from source.
pub trait ManualPackageInstaller: BaseDetection {
    /// Native install command for `packages`, before privilege wrapping.
    fn install_command(&self, packages: &[String]) -> CommandSpec;

    /// Whether `install_command` needs elevated rights.
    fn install_needs_privilege(&self) -> bool {
        true
    }

    /// Compiler flags recommended by the distribution.
    fn build_cflags(&self, _ctx: &RunContext) -> String {
        DEFAULT_CFLAGS.to_string()
    }

    /// Install a Rust toolchain through rustup unless cargo already exists.
    fn install_rust_toolchain(&self, ctx: &RunContext) -> Result<()> {
        if self.command_exists("cargo") {
            return Ok(());
        }

        let install = self.install_command(&["rustup".to_string()]);
        let installed = if self.install_needs_privilege() {
            ctx.exec_privileged(Phase::ManualBuilds, 0.02, "Installing rustup...", install)
        } else {
            ctx.exec(Phase::ManualBuilds, 0.02, "Installing rustup...", install)
        };
        installed.context("failed to install rustup")?;

        ctx.exec(
            Phase::ManualBuilds,
            0.04,
            "Installing stable Rust toolchain...",
            CommandSpec::new("rustup").args(["install", "stable"]),
        )
        .context("failed to install the stable Rust toolchain")?;
        ctx.exec(
            Phase::ManualBuilds,
            0.05,
            "Installing stable Rust toolchain...",
            CommandSpec::new("rustup").args(["default", "stable"]),
        )
        .context("failed to select the stable Rust toolchain")?;

        if !self.command_exists("cargo") {
            ctx.warn(
                Phase::ManualBuilds,
                0.05,
                "Installing stable Rust toolchain...",
                "cargo not found in PATH after installing Rust; ~/.cargo/bin may need to be added",
            );
        }
        Ok(())
    }

    /// Build every named dependency in order; the first failure is fatal.
    fn install_manual_packages(
        &self,
        names: &[String],
        variants: &VariantMap,
        ctx: &RunContext,
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        ctx.log(
            Phase::ManualBuilds,
            0.0,
            "Building from source...",
            format!("Installing manual packages: {}", names.join(", ")),
        );

        let needs_rust = names
            .iter()
            .filter_map(|name| SourceRecipe::for_dependency(name))
            .any(SourceRecipe::needs_rust);
        if needs_rust {
            self.install_rust_toolchain(ctx)
                .context("failed to install Rust")?;
        }

        let span = 1.0 / names.len() as f64;
        for (index, name) in names.iter().enumerate() {
            let mut variant = variants.get(name).copied().unwrap_or_default();
            if name == "quickshell" && self.host().force_quickshell_git {
                variant = PackageVariant::Git;
            }
            let start = 0.1 + 0.9 * span * index as f64;
            self.install_manual_package(name, variant, start, 0.9 * span, ctx)
                .with_context(|| format!("failed to install {}", name))?;
        }
        Ok(())
    }

    /// Clone, build and install one dependency from source.
    fn install_manual_package(
        &self,
        name: &str,
        variant: PackageVariant,
        start: f64,
        span: f64,
        ctx: &RunContext,
    ) -> Result<()> {
        let recipe = SourceRecipe::for_dependency(name)
            .ok_or_else(|| anyhow!("no source build recipe for {}", name))?;
        let slug = recipe.slug();
        let cache_dir = &self.host().paths.cache_dir;
        fs::create_dir_all(cache_dir)
            .with_context(|| format!("creating cache directory {}", cache_dir.display()))?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-build-", slug))
            .tempdir_in(cache_dir)
            .with_context(|| format!("creating build directory in {}", cache_dir.display()))?;

        let reference = match variant {
            PackageVariant::Git => None,
            PackageVariant::Stable => match self.host().releases.latest_tag(recipe.owner, recipe.repo) {
                Ok(tag) => {
                    ctx.log(
                        Phase::ManualBuilds,
                        start,
                        &format!("Cloning {}...", slug),
                        format!("Using latest {} tag: {}", slug, tag),
                    );
                    Some(tag)
                }
                Err(err) => {
                    ctx.warn(
                        Phase::ManualBuilds,
                        start,
                        &format!("Cloning {}...", slug),
                        format!("failed to fetch latest {} tag ({:#}), using default branch", slug, err),
                    );
                    None
                }
            },
        };

        let mut clone = CloneDir::new(
            ctx.runner,
            ctx.cancel,
            recipe.clone_url(),
            reference,
            scratch.path().join(slug),
        );
        ctx.progress.emit(
            InstallProgressMsg::new(
                Phase::ManualBuilds,
                start,
                format!("Cloning {} repository...", slug),
            )
            .with_command(clone.clone_command().display()),
        );

        let cflags = self.build_cflags(ctx);
        ctx.log(
            Phase::ManualBuilds,
            start,
            &format!("Building {}...", slug),
            format!("Using CFLAGS: {}", cflags),
        );

        with_recovery(&mut clone, |clone| {
            let steps = recipe.steps(&clone.path, &cflags, cache_dir);
            let count = steps.len().max(1) as f64;
            for (index, step) in steps.into_iter().enumerate() {
                let fraction = start + span * (index as f64 + 1.0) / (count + 1.0);
                if step.privileged {
                    ctx.exec_privileged(Phase::ManualBuilds, fraction, &step.label, step.spec)?;
                } else {
                    ctx.exec(Phase::ManualBuilds, fraction, &step.label, step.spec)?;
                }
            }
            Ok(())
        })?;

        discard_build_dir(scratch, Phase::ManualBuilds, start + span, ctx);
        ctx.log(
            Phase::ManualBuilds,
            start + span,
            &format!("Installed {}", slug),
            format!("{} installed successfully from source", slug),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_recipe_has_steps() {
        for recipe in RECIPES {
            let steps = recipe.steps(Path::new("/tmp/src"), DEFAULT_CFLAGS, Path::new("/tmp"));
            assert!(steps.iter().any(|s| s.privileged), "{} never installs", recipe.name);
            assert!(steps.iter().any(|s| !s.privileged), "{} never builds", recipe.name);
        }
    }

    #[test]
    fn quickshell_uses_cmake_with_flags() {
        let recipe = SourceRecipe::for_dependency("quickshell").unwrap();
        let steps = recipe.steps(
            Path::new("/cache/qs/src"),
            "-O2 -g -I/usr/include/wayland",
            Path::new("/cache"),
        );
        assert_eq!(
            steps[0].spec.display(),
            "cmake -GNinja -B build -DCMAKE_BUILD_TYPE=RelWithDebInfo -DCRASH_REPORTER=off -DCMAKE_CXX_STANDARD=20"
        );
        assert!(
            steps[0]
                .spec
                .env
                .contains(&("CXXFLAGS".into(), "-O2 -g -I/usr/include/wayland".into()))
        );
        assert_eq!(steps[1].spec.display(), "cmake --build build");
        assert_eq!(steps[2].spec.display(), "cmake --install build");
        assert!(steps[2].privileged);
    }

    #[test]
    fn dms_recipe_builds_cli_from_core() {
        let recipe = SourceRecipe::for_dependency(super::super::types::DMS_DEPENDENCY).unwrap();
        assert_eq!(recipe.slug(), "dms");
        let steps = recipe.steps(Path::new("/src"), DEFAULT_CFLAGS, Path::new("/tmp"));
        assert_eq!(steps[0].spec.dir.as_deref(), Some(Path::new("/src/core")));
        assert!(steps.iter().any(|s| s.spec.display() == "cp -rT quickshell /etc/xdg/quickshell/dms"));
    }

    #[test]
    fn clone_command_pins_reference() {
        let runner = crate::distros::testing::FakeRunner::new();
        let cancel = CancelToken::new();
        let clone = CloneDir::new(
            &runner,
            &cancel,
            "https://github.com/quickshell-mirror/quickshell.git",
            Some("v0.2.0".into()),
            PathBuf::from("/cache/qs"),
        );
        assert_eq!(
            clone.clone_command().display(),
            "git clone --depth 1 --branch v0.2.0 https://github.com/quickshell-mirror/quickshell.git /cache/qs"
        );
    }

    #[test]
    fn rust_recipes_are_flagged() {
        assert!(SourceRecipe::for_dependency("matugen").unwrap().needs_rust());
        assert!(SourceRecipe::for_dependency("niri").unwrap().needs_rust());
        assert!(!SourceRecipe::for_dependency("quickshell").unwrap().needs_rust());
        assert!(SourceRecipe::for_dependency("ghostty").is_none());
    }

    #[test]
    fn leftover_build_dir_is_only_a_warning() {
        let runner = crate::distros::testing::FakeRunner::new();
        let elevation = crate::distros::privilege::Elevation::Root;
        let cancel = CancelToken::new();
        let (sink, rx) = crate::distros::progress::ProgressSink::channel(8);
        let ctx = RunContext::new(&runner, &elevation, &cancel, &sink);

        let scratch = tempfile::tempdir().unwrap();
        fs::remove_dir(scratch.path()).unwrap();
        discard_build_dir(scratch, Phase::ManualBuilds, 0.5, &ctx);

        let logs: Vec<String> = rx.try_iter().map(|msg| msg.log_output).collect();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].starts_with("Warning: could not remove build directory"));
    }
}
