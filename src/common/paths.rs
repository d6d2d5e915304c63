use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for dankinstall

const APP_DIR: &str = "dankinstall";

/// Get the dankinstall config directory
pub fn dankinstall_config_dir() -> Result<PathBuf> {
    let config_dir = user_config_home()?.join(APP_DIR);

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the dankinstall cache directory (source builds, install log)
pub fn dankinstall_cache_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .context("Unable to determine user cache directory")?
        .join(APP_DIR);

    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("creating cache directory at {}", cache_dir.display()))?;

    Ok(cache_dir)
}

/// The user's XDG config home, where compositor and terminal configs live
pub fn user_config_home() -> Result<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .context("Unable to determine user config directory")
}

/// Default location of the installer configuration file
pub fn config_file_path() -> Result<PathBuf> {
    Ok(dankinstall_config_dir()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_xdg<T>(f: impl FnOnce(&std::path::Path) -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let old_config = std::env::var_os("XDG_CONFIG_HOME");
        let old_cache = std::env::var_os("XDG_CACHE_HOME");
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", dir.path().join("config"));
            std::env::set_var("XDG_CACHE_HOME", dir.path().join("cache"));
        }
        let result = f(dir.path());
        unsafe {
            match old_config {
                Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
            match old_cache {
                Some(value) => std::env::set_var("XDG_CACHE_HOME", value),
                None => std::env::remove_var("XDG_CACHE_HOME"),
            }
        }
        result
    }

    #[test]
    #[serial]
    fn config_file_lives_under_xdg_config_home() {
        with_xdg(|root| {
            let path = config_file_path().unwrap();
            assert_eq!(path, root.join("config").join("dankinstall").join("config.toml"));
            assert!(root.join("config").join("dankinstall").is_dir());
        });
    }

    #[test]
    #[serial]
    fn cache_dir_is_created_on_demand() {
        with_xdg(|root| {
            let dir = dankinstall_cache_dir().unwrap();
            assert_eq!(dir, root.join("cache").join("dankinstall"));
            assert!(dir.is_dir());
        });
    }
}
