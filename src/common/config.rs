//! Installer configuration stored as TOML.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Options that are unset are written as commented lines by `config init`,
//! which keeps the generated file self-documenting.

use crate::common::paths;
use crate::distros::types::{PackageVariant, Terminal, VariantMap, WindowManager};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Compositor to install and configure
    pub window_manager: WindowManager,
    /// Terminal emulator to install
    pub terminal: Terminal,
    /// Always build or install quickshell from upstream git
    pub force_quickshell_git: bool,
    /// Dependencies resolved to their git variant
    pub git_variants: Vec<String>,
    /// Dependencies that are never installed
    pub disabled: Vec<String>,
    /// Capacity of the progress event queue
    pub queue_capacity: usize,
    /// Deadline for a whole install run, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Where source builds and the install log live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            window_manager: WindowManager::default(),
            terminal: Terminal::default(),
            force_quickshell_git: false,
            git_variants: Vec::new(),
            disabled: Vec::new(),
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            command_timeout_secs: None,
            cache_dir: None,
        }
    }
}

impl InstallerConfig {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(paths::config_file_path()?),
        }
    }

    /// Read the config, falling back to defaults when the file does not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading installer config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing installer config {}", path.display()))?;
        if config.queue_capacity == 0 {
            config.queue_capacity = Self::DEFAULT_QUEUE_CAPACITY;
        }
        Ok(config)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }

        fs::write(path, self.to_documented_toml()?)
            .with_context(|| format!("writing installer config to {}", path.display()))?;
        Ok(())
    }

    /// TOML with unset optional fields present as comments.
    pub fn to_documented_toml(&self) -> Result<String> {
        let mut output = toml::to_string_pretty(self).context("serializing installer config")?;
        if self.command_timeout_secs.is_none() {
            output.push_str("# command_timeout_secs = 3600  # abort the whole run after this many seconds\n");
        }
        if self.cache_dir.is_none() {
            output.push_str("# cache_dir = \"/path/to/cache\"  # defaults to $XDG_CACHE_HOME/dankinstall\n");
        }
        Ok(output)
    }

    /// Variant per dependency name, from `git_variants` plus extra names.
    pub fn variants<'a>(&'a self, extra_git: impl IntoIterator<Item = &'a String>) -> VariantMap {
        self.git_variants
            .iter()
            .chain(extra_git)
            .map(|name| (name.clone(), PackageVariant::Git))
            .collect()
    }

    pub fn disabled_set<'a>(&'a self, extra: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
        self.disabled.iter().chain(extra).cloned().collect()
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating cache directory at {}", dir.display()))?;
                Ok(dir.clone())
            }
            None => paths::dankinstall_cache_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = InstallerConfig::load_from_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(config, InstallerConfig::default());
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "window_manager = \"hyprland\"\ngit_variants = [\"niri\"]\n",
        )
        .unwrap();

        let config = InstallerConfig::load_from_path(&path).unwrap();
        assert_eq!(config.window_manager, WindowManager::Hyprland);
        assert_eq!(config.terminal, Terminal::Ghostty);
        assert_eq!(config.git_variants, vec!["niri".to_string()]);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = InstallerConfig {
            terminal: Terminal::Kitty,
            disabled: vec!["matugen".into()],
            command_timeout_secs: Some(600),
            ..Default::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(InstallerConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn documented_output_comments_unset_options() {
        let text = InstallerConfig::default().to_documented_toml().unwrap();
        assert!(text.contains("# command_timeout_secs"));
        assert!(text.contains("# cache_dir"));
        assert!(text.contains("queue_capacity = 64"));
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "window_manager = 3\n").unwrap();
        let err = InstallerConfig::load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }

    #[test]
    fn variants_merge_config_and_flags() {
        let config = InstallerConfig {
            git_variants: vec!["quickshell".into()],
            ..Default::default()
        };
        let extra = vec!["niri".to_string()];
        let variants = config.variants(&extra);
        assert_eq!(variants["quickshell"], PackageVariant::Git);
        assert_eq!(variants["niri"], PackageVariant::Git);
        assert!(!variants.contains_key("git"));
    }
}
