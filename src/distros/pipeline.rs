//! The `Distribution` contract and the installation pipeline every family
//! shares.

use super::base::{BaseDetection, categorize};
use super::configure::configure_session;
use super::context::RunContext;
use super::manual::ManualPackageInstaller;
use super::progress::{InstallProgressMsg, Phase};
use super::registry::DistroConfig;
use super::runner::{CommandError, CommandOutput};
use super::types::{
    Dependency, DistroFamily, InstallOverrides, PackageManagerKind, PackageMap, PackageMapping,
    PackageVariant, Terminal, VariantMap, WindowManager, detect_terminal_from_deps, variant_map,
};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Run the family's install command for `packages`, elevated when the
/// package manager needs it.
pub fn run_install<D>(
    distro: &D,
    phase: Phase,
    fraction: f64,
    step: &str,
    packages: &[String],
    ctx: &RunContext,
) -> Result<CommandOutput, CommandError>
where
    D: ManualPackageInstaller + ?Sized,
{
    let spec = distro.install_command(packages);
    if distro.install_needs_privilege() {
        ctx.exec_privileged(phase, fraction, step, spec)
    } else {
        ctx.exec(phase, fraction, step, spec)
    }
}

/// One supported distribution family.
///
/// Implementors provide identity, the package table and repository
/// enablement; detection, prerequisite checks, batched installs and the
/// phase pipeline come from the provided methods.
pub trait Distribution: BaseDetection + ManualPackageInstaller + Send + Sync {
    fn config(&self) -> &DistroConfig;

    fn package_manager(&self) -> PackageManagerKind;

    /// Full package table for `wm` with per-dependency variant choices.
    fn package_mapping_with_variants(&self, wm: WindowManager, variants: &VariantMap)
    -> PackageMap;

    /// Packages needed to build and run the shell stack.
    fn prerequisites(&self) -> &'static [&'static str];

    /// Register the third-party repositories referenced by `mappings` and
    /// refresh the package index.
    fn enable_repositories(&self, mappings: &[PackageMapping], ctx: &RunContext) -> Result<()>;

    fn id(&self) -> &str {
        self.config().id
    }

    fn color_hex(&self) -> &str {
        self.config().color_hex
    }

    fn family(&self) -> DistroFamily {
        self.config().family
    }

    /// Package providing the `go` toolchain, installed with the
    /// prerequisites when `go` is not on PATH.
    fn go_package(&self) -> Option<&'static str> {
        Some("go")
    }

    fn detect_dependencies(&self, wm: WindowManager) -> Vec<Dependency> {
        self.detect_dependencies_with_terminal(wm, Terminal::Ghostty)
    }

    fn detect_dependencies_with_terminal(
        &self,
        wm: WindowManager,
        terminal: Terminal,
    ) -> Vec<Dependency> {
        self.detect_standard(wm, terminal)
    }

    fn package_mapping(&self, wm: WindowManager) -> PackageMap {
        self.package_mapping_with_variants(wm, &VariantMap::new())
    }

    /// Variant to resolve `name` to, honoring the quickshell git override.
    fn variant_for(&self, variants: &VariantMap, name: &str) -> PackageVariant {
        if name == "quickshell" && self.host().force_quickshell_git {
            return PackageVariant::Git;
        }
        variants.get(name).copied().unwrap_or_default()
    }

    /// Install the missing prerequisites in one batch.
    fn install_prerequisites(&self, ctx: &RunContext) -> Result<()> {
        let step = "Checking prerequisites...";
        ctx.progress.emit(
            InstallProgressMsg::new(Phase::Prerequisites, 0.0, step)
                .with_log("Checking prerequisite packages"),
        );

        let mut missing: Vec<String> = self
            .prerequisites()
            .iter()
            .filter(|pkg| !self.package_installed(pkg))
            .map(|pkg| pkg.to_string())
            .collect();

        if let Some(go) = self.go_package() {
            if self.command_exists("go") {
                ctx.log(Phase::Prerequisites, 0.3, step, "go already available in PATH");
            } else if !missing.iter().any(|pkg| pkg == go) {
                ctx.log(Phase::Prerequisites, 0.3, step, "go not found in PATH, will install go");
                missing.push(go.to_string());
            }
        }

        if missing.is_empty() {
            ctx.log(Phase::Prerequisites, 0.5, step, "All prerequisites already installed");
            return Ok(());
        }

        ctx.log(
            Phase::Prerequisites,
            0.4,
            step,
            format!("Installing prerequisites: {}", missing.join(", ")),
        );
        run_install(
            self,
            Phase::Prerequisites,
            0.5,
            &format!("Installing {} prerequisites...", missing.len()),
            &missing,
            ctx,
        )?;
        Ok(())
    }

    /// One batched install of every system package.
    fn install_system_packages(&self, packages: &[String], ctx: &RunContext) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        ctx.log(
            Phase::SystemPackages,
            0.0,
            "Installing system packages...",
            format!("Installing system packages: {}", packages.join(", ")),
        );
        run_install(
            self,
            Phase::SystemPackages,
            0.2,
            &format!("Installing {} system packages...", packages.len()),
            packages,
            ctx,
        )?;
        Ok(())
    }

    /// One batched install of every third-party package, after the
    /// repositories were enabled.
    fn install_third_party_packages(
        &self,
        mappings: &[PackageMapping],
        ctx: &RunContext,
    ) -> Result<()> {
        let names = distinct_package_names(mappings);
        if names.is_empty() {
            return Ok(());
        }
        ctx.log(
            Phase::ThirdPartyPackages,
            0.0,
            "Installing third-party packages...",
            format!("Installing third-party packages: {}", names.join(", ")),
        );
        run_install(
            self,
            Phase::ThirdPartyPackages,
            0.2,
            &format!("Installing {} third-party packages...", names.len()),
            &names,
            ctx,
        )?;
        Ok(())
    }

    /// Categorize `dependencies` and drive the phase pipeline.
    ///
    /// Nothing runs when every dependency is already satisfied. A failure in
    /// any install phase aborts the run; completed phases are kept.
    fn install_packages(
        &self,
        dependencies: &[Dependency],
        wm: WindowManager,
        overrides: &InstallOverrides,
        ctx: &RunContext,
    ) -> Result<()> {
        let variants = variant_map(dependencies);
        let mapping = self.package_mapping_with_variants(wm, &variants);
        let buckets = categorize(dependencies, &mapping, overrides);

        if buckets.is_empty() {
            ctx.progress.emit(
                InstallProgressMsg::complete("Nothing to install")
                    .with_log("All selected dependencies are already installed"),
            );
            return Ok(());
        }

        ctx.progress.emit(
            InstallProgressMsg::new(Phase::Prerequisites, 0.0, "Checking system prerequisites...")
                .with_log(format!("Starting installation on {}", self.id())),
        );
        self.install_prerequisites(ctx)
            .context("failed to install prerequisites")?;

        let third_party = buckets.third_party_mappings();
        if !third_party.is_empty() {
            ctx.progress.emit(
                InstallProgressMsg::new(Phase::RepositoryEnablement, 0.0, "Enabling repositories...")
                    .with_log("Setting up repositories for additional packages"),
            );
            self.enable_repositories(&third_party, ctx)
                .context("failed to enable repositories")?;
        }

        let system = buckets.system_packages();
        self.install_system_packages(&system, ctx)
            .context("failed to install system packages")?;

        self.install_third_party_packages(&third_party, ctx)
            .context("failed to install third-party packages")?;

        let manual = buckets.manual_dependencies();
        if !manual.is_empty() {
            ctx.progress.emit(
                InstallProgressMsg::new(
                    Phase::ManualBuilds,
                    0.0,
                    format!("Building {} packages from source...", manual.len()),
                )
                .with_log(format!("Building from source: {}", manual.join(", "))),
            );
            self.install_manual_packages(&manual, &variants, ctx)
                .context("failed to install manual packages")?;
        }

        let terminal = detect_terminal_from_deps(dependencies);
        configure_session(&self.host().paths, wm, terminal, ctx);

        ctx.progress.emit(
            InstallProgressMsg::complete("Installation complete!")
                .with_log("All packages installed and configured successfully"),
        );
        Ok(())
    }
}

/// Distinct package names in first-seen order.
pub fn distinct_package_names(mappings: &[PackageMapping]) -> Vec<String> {
    let mut seen = HashSet::new();
    mappings
        .iter()
        .filter(|mapping| seen.insert(mapping.name.as_str()))
        .map(|mapping| mapping.name.clone())
        .collect()
}
