//! Scripted command runner and host fixtures for unit tests.

use super::host::{Host, HostPaths};
use super::manual::ReleaseSource;
use super::osinfo::OsInfo;
use super::runner::{CancelToken, CommandError, CommandOutput, CommandRunner, CommandSpec};
use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Rule {
    pattern: String,
    outcome: CommandOutput,
    remaining: Option<usize>,
}

/// Records every command and answers with canned outcomes.
///
/// Rules match on a substring of the rendered command line; the first
/// matching rule that is not used up wins. Unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    rules: Mutex<Vec<Rule>>,
    commands: HashSet<String>,
    paths: HashSet<PathBuf>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `pattern` with `outcome`.
    pub fn on(self, pattern: &str, outcome: CommandOutput) -> Self {
        self.push_rule(pattern, outcome, None)
    }

    /// Answer the next `times` matching commands with `outcome`.
    pub fn on_times(self, pattern: &str, outcome: CommandOutput, times: usize) -> Self {
        self.push_rule(pattern, outcome, Some(times))
    }

    /// Executables that `command_exists` reports as present.
    pub fn with_commands(mut self, names: &[&str]) -> Self {
        self.commands.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Paths that `path_exists` reports as present.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    fn push_rule(self, pattern: &str, outcome: CommandOutput, remaining: Option<usize>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                outcome,
                remaining,
            });
        }
        self
    }

    /// Rendered command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.specs().iter().map(CommandSpec::display).collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(pattern))
            .count()
    }

    /// Index of the first recorded command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.contains(pattern))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, CommandError> {
        let command = spec.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        cancel.check(&command)?;

        let Ok(mut rules) = self.rules.lock() else {
            return Ok(CommandOutput::ok(""));
        };
        let rule = rules
            .iter_mut()
            .find(|rule| command.contains(&rule.pattern) && rule.remaining != Some(0));
        match rule {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                Ok(rule.outcome.clone())
            }
            None => Ok(CommandOutput::ok("")),
        }
    }

    fn command_exists(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }
}

/// Release lookup returning a fixed tag, or failing when none is set.
pub struct StubReleases(pub Option<String>);

impl ReleaseSource for StubReleases {
    fn latest_tag(&self, owner: &str, repo: &str) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| anyhow!("no release for {}/{}", owner, repo))
    }
}

/// A host backed by `runner` with config and cache under a fresh tempdir.
pub struct TestHost {
    pub host: Host,
    pub runner: Arc<FakeRunner>,
    pub dir: TempDir,
}

impl TestHost {
    pub fn new(runner: FakeRunner, os_release: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(runner);
        let paths = HostPaths {
            config_home: dir.path().join("config"),
            cache_dir: dir.path().join("cache"),
        };
        let host = Host::new(runner.clone(), OsInfo::parse_os_release(os_release), paths)
            .with_releases(Arc::new(StubReleases(Some("v0.2.0".into()))));
        Self { host, runner, dir }
    }
}

pub const TUMBLEWEED: &str = "ID=\"opensuse-tumbleweed\"\nID_LIKE=\"opensuse suse\"\nVERSION_ID=\"20251012\"\n";
pub const LEAP: &str = "ID=\"opensuse-leap\"\nID_LIKE=\"suse opensuse\"\nVERSION_ID=\"16.0\"\n";
pub const ARCH: &str = "ID=arch\n";
pub const FEDORA: &str = "ID=fedora\nVERSION_ID=42\n";
pub const DEBIAN: &str = "ID=debian\nVERSION_ID=\"13\"\nVERSION_CODENAME=trixie\n";
pub const UBUNTU: &str = "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"24.04\"\nVERSION_CODENAME=noble\n";
pub const NIXOS: &str = "ID=nixos\nVERSION_ID=\"25.05\"\n";
