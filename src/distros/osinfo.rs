use std::fs;
use std::path::Path;
use thiserror::Error;

const OS_RELEASE: &str = "/etc/os-release";

#[derive(Debug, Error)]
pub enum OsInfoError {
    #[error("{path} not found")]
    Missing { path: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has no ID field")]
    NoId { path: String },
}

/// Identity of the running operating system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OsInfo {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: String,
    pub version_codename: String,
    pub pretty_name: String,
    pub architecture: String,
}

impl OsInfo {
    /// Detect from `/etc/os-release`.
    pub fn detect() -> Result<Self, OsInfoError> {
        Self::from_path(Path::new(OS_RELEASE))
    }

    pub fn from_path(path: &Path) -> Result<Self, OsInfoError> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(OsInfoError::Missing { path: display });
        }
        let content = fs::read_to_string(path).map_err(|source| OsInfoError::Read {
            path: display.clone(),
            source,
        })?;
        let info = Self::parse_os_release(&content);
        if info.id.is_empty() {
            return Err(OsInfoError::NoId { path: display });
        }
        Ok(info)
    }

    pub fn parse_os_release(content: &str) -> Self {
        let mut info = Self {
            architecture: std::env::consts::ARCH.to_string(),
            ..Default::default()
        };

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => info.id = value.to_lowercase(),
                "ID_LIKE" => {
                    info.id_like = value.split_whitespace().map(str::to_lowercase).collect()
                }
                "VERSION_ID" => info.version_id = value.to_string(),
                "VERSION_CODENAME" => info.version_codename = value.to_string(),
                "UBUNTU_CODENAME" if info.version_codename.is_empty() => {
                    info.version_codename = value.to_string()
                }
                "PRETTY_NAME" => info.pretty_name = value.to_string(),
                _ => {}
            }
        }

        info
    }

    /// Display name, falling back to the ID.
    pub fn name(&self) -> &str {
        if self.pretty_name.is_empty() {
            &self.id
        } else {
            &self.pretty_name
        }
    }

    pub fn is_unsupported(&self) -> bool {
        is_unsupported_distro(&self.id, &self.version_id)
    }
}

/// Releases known not to carry the packages the shell needs.
pub fn is_unsupported_distro(id: &str, version_id: &str) -> bool {
    let minimum: Option<(u32, u32)> = match id {
        "debian" => Some((13, 0)),
        "ubuntu" => Some((24, 4)),
        "fedora" => Some((41, 0)),
        "opensuse-leap" => Some((16, 0)),
        _ => None,
    };

    let (Some(minimum), Some(version)) = (minimum, parse_version(version_id)) else {
        return false;
    };
    version < minimum
}

/// "24.04" -> (24, 4); "13" -> (13, 0). Rolling releases have no version.
fn parse_version(version_id: &str) -> Option<(u32, u32)> {
    let mut parts = version_id.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    Some((major, minor))
}
