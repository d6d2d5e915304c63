//! Third-party repository enablement shared by the package-manager families.

use super::context::RunContext;
use super::progress::Phase;
use super::runner::{CommandError, CommandSpec};
use super::types::PackageMapping;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// A family's way of registering vendor repositories.
pub trait RepositorySource {
    /// Provider name used in messages ("OBS", "COPR", "PPA").
    fn provider(&self) -> &'static str;

    /// Whether a definition for `repo` already exists on the host.
    fn repository_exists(&self, repo: &str) -> bool;

    /// Privileged commands that register `repo`.
    fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>>;

    /// Index refresh run once after new repositories were registered.
    fn refresh_command(&self) -> Option<CommandSpec>;

    /// Whether the add and refresh commands need elevated rights.
    fn repositories_need_privilege(&self) -> bool {
        true
    }
}

/// Repositories already handled by one distribution instance.
#[derive(Debug, Default)]
pub struct EnabledRepos(Mutex<HashSet<String>>);

impl EnabledRepos {
    /// Record `repo`; false when it was already recorded.
    pub fn mark(&self, repo: &str) -> bool {
        match self.0.lock() {
            Ok(mut set) => set.insert(repo.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(repo.to_string()),
        }
    }

    pub fn contains(&self, repo: &str) -> bool {
        match self.0.lock() {
            Ok(set) => set.contains(repo),
            Err(poisoned) => poisoned.into_inner().contains(repo),
        }
    }
}

/// Distinct repository identifiers in first-seen order.
pub fn distinct_repos(mappings: &[PackageMapping]) -> Vec<String> {
    let mut seen = HashSet::new();
    mappings
        .iter()
        .filter_map(|mapping| mapping.repo_url.as_deref())
        .filter(|repo| !repo.is_empty())
        .filter(|repo| seen.insert(repo.to_string()))
        .map(str::to_string)
        .collect()
}

fn already_exists(err: &CommandError) -> bool {
    err.output()
        .map(|output| {
            let lower = output.to_lowercase();
            lower.contains("already exists") || lower.contains("already enabled")
        })
        .unwrap_or(false)
}

/// Register every repository referenced by `mappings` that this instance
/// has not handled yet, then refresh the package index once. The refresh
/// runs whenever anything was pending, including repositories that already
/// existed on the host.
///
/// Existing definitions are left alone. An add command that fails because
/// the repository already exists counts as success.
pub fn enable_repositories<S>(
    source: &S,
    enabled: &EnabledRepos,
    mappings: &[PackageMapping],
    ctx: &RunContext,
) -> Result<()>
where
    S: RepositorySource + ?Sized,
{
    let provider = source.provider();
    let pending: Vec<String> = distinct_repos(mappings)
        .into_iter()
        .filter(|repo| !enabled.contains(repo))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let run = |fraction: f64, step: &str, spec: CommandSpec| {
        if source.repositories_need_privilege() {
            ctx.exec_privileged(Phase::RepositoryEnablement, fraction, step, spec)
        } else {
            ctx.exec(Phase::RepositoryEnablement, fraction, step, spec)
        }
    };

    let span = 0.8 / pending.len() as f64;
    for (index, repo) in pending.iter().enumerate() {
        let fraction = span * index as f64;
        let step = format!("Enabling {} repository {}...", provider, repo);
        enabled.mark(repo);

        if source.repository_exists(repo) {
            ctx.log(
                Phase::RepositoryEnablement,
                fraction,
                &step,
                format!("{} repository {} already exists, skipping", provider, repo),
            );
            continue;
        }

        for spec in source.add_repository_commands(repo)? {
            match run(fraction, &step, spec) {
                Ok(_) => {}
                Err(err) if already_exists(&err) => {
                    ctx.log(
                        Phase::RepositoryEnablement,
                        fraction,
                        &step,
                        format!("{} repository {} already exists", provider, repo),
                    );
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to enable {} repository {}", provider, repo)
                    });
                }
            }
        }
        ctx.log(
            Phase::RepositoryEnablement,
            fraction,
            &step,
            format!("{} repository {} enabled", provider, repo),
        );
    }

    if let Some(refresh) = source.refresh_command() {
        run(0.9, "Refreshing repositories...", refresh)
            .context("failed to refresh repositories")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distros::privilege::Elevation;
    use crate::distros::progress::ProgressSink;
    use crate::distros::runner::{CancelToken, CommandOutput};
    use crate::distros::testing::FakeRunner;

    struct Fake {
        existing: Vec<&'static str>,
    }

    impl RepositorySource for Fake {
        fn provider(&self) -> &'static str {
            "TEST"
        }

        fn repository_exists(&self, repo: &str) -> bool {
            self.existing.iter().any(|existing| *existing == repo)
        }

        fn add_repository_commands(&self, repo: &str) -> Result<Vec<CommandSpec>> {
            Ok(vec![CommandSpec::new("addrepo").arg(repo)])
        }

        fn refresh_command(&self) -> Option<CommandSpec> {
            Some(CommandSpec::new("refresh"))
        }
    }

    fn run_enable(runner: &FakeRunner, source: &Fake, enabled: &EnabledRepos, repos: &[&str]) -> Result<()> {
        let elevation = Elevation::Root;
        let cancel = CancelToken::new();
        let sink = ProgressSink::discard();
        let ctx = RunContext::new(runner, &elevation, &cancel, &sink);
        let mappings: Vec<PackageMapping> = repos
            .iter()
            .map(|repo| PackageMapping::third_party("pkg", *repo))
            .collect();
        enable_repositories(source, enabled, &mappings, &ctx)
    }

    #[test]
    fn same_repo_is_added_once_per_run() {
        let runner = FakeRunner::new();
        let source = Fake { existing: vec![] };
        let enabled = EnabledRepos::default();
        run_enable(&runner, &source, &enabled, &["a", "a", "b"]).unwrap();
        run_enable(&runner, &source, &enabled, &["a"]).unwrap();

        assert_eq!(runner.count("addrepo a"), 1);
        assert_eq!(runner.count("addrepo b"), 1);
        assert_eq!(runner.count("refresh"), 1);
    }

    #[test]
    fn existing_repo_is_not_added() {
        let runner = FakeRunner::new();
        let source = Fake { existing: vec!["a"] };
        run_enable(&runner, &source, &EnabledRepos::default(), &["a"]).unwrap();
        assert_eq!(runner.count("addrepo"), 0);
        assert_eq!(runner.count("refresh"), 1);
    }

    #[test]
    fn already_exists_failure_counts_as_success() {
        let runner = FakeRunner::new().on(
            "addrepo",
            CommandOutput::failed(4, "Repository named 'a' already exists."),
        );
        let source = Fake { existing: vec![] };
        run_enable(&runner, &source, &EnabledRepos::default(), &["a"]).unwrap();
        assert_eq!(runner.count("refresh"), 1);
    }

    #[test]
    fn other_add_failures_are_fatal() {
        let runner = FakeRunner::new().on("addrepo", CommandOutput::failed(1, "network unreachable"));
        let source = Fake { existing: vec![] };
        let err = run_enable(&runner, &source, &EnabledRepos::default(), &["a"]).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to enable TEST repository a"));
        assert_eq!(runner.count("refresh"), 0);
    }

    #[test]
    fn failed_refresh_is_fatal() {
        let runner = FakeRunner::new().on("refresh", CommandOutput::failed(7, "gpg error"));
        let source = Fake { existing: vec![] };
        let err = run_enable(&runner, &source, &EnabledRepos::default(), &["a"]).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to refresh repositories"));
    }
}
