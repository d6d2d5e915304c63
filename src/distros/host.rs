use super::manual::{GitHubReleases, ReleaseSource};
use super::osinfo::OsInfo;
use super::runner::{CommandRunner, SystemRunner};
use crate::common::paths;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Directories the installer writes to outside the package database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// `$XDG_CONFIG_HOME`, home of compositor and environment config.
    pub config_home: PathBuf,
    /// Scratch space for source builds.
    pub cache_dir: PathBuf,
}

impl HostPaths {
    pub fn detect(cache_override: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match cache_override {
            Some(dir) => dir,
            None => paths::dankinstall_cache_dir()?,
        };
        Ok(Self {
            config_home: paths::user_config_home()?,
            cache_dir,
        })
    }
}

/// Everything a distribution needs to talk to the machine it runs on.
#[derive(Clone)]
pub struct Host {
    pub runner: Arc<dyn CommandRunner>,
    pub os: OsInfo,
    pub paths: HostPaths,
    pub releases: Arc<dyn ReleaseSource>,
    /// Resolve quickshell to its git variant regardless of detection.
    pub force_quickshell_git: bool,
}

impl Host {
    pub fn new(runner: Arc<dyn CommandRunner>, os: OsInfo, paths: HostPaths) -> Self {
        Self {
            runner,
            os,
            paths,
            releases: Arc::new(GitHubReleases::default()),
            force_quickshell_git: false,
        }
    }

    /// The real machine: os-release, XDG directories, and duct-backed commands.
    pub fn system(os: OsInfo, cache_override: Option<PathBuf>) -> Result<Self> {
        Ok(Self::new(
            Arc::new(SystemRunner),
            os,
            HostPaths::detect(cache_override)?,
        ))
    }

    pub fn with_releases(mut self, releases: Arc<dyn ReleaseSource>) -> Self {
        self.releases = releases;
        self
    }

    pub fn with_force_quickshell_git(mut self, force: bool) -> Self {
        self.force_quickshell_git = force;
        self
    }
}
