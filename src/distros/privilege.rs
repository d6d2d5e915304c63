//! Elevated command execution through sudo.

use super::runner::{CommandSpec, StdinBytes};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("no password was provided and no terminal is available for sudo to prompt on")]
    NoCredential,
    #[error("failed to read password: {0}")]
    Prompt(String),
}

/// The user's sudo password. Never logged, zeroed on drop.
#[derive(Default)]
pub struct Credential {
    secret: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Bytes handed to `sudo -S`: the password and a newline.
    fn stdin_bytes(&self) -> StdinBytes {
        let mut bytes = Vec::with_capacity(self.secret.len() + 1);
        bytes.extend_from_slice(self.secret.as_bytes());
        bytes.push(b'\n');
        StdinBytes::new(bytes)
    }

    pub fn clear(&mut self) {
        let mut bytes = std::mem::take(&mut self.secret).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Credential(<empty>)")
        } else {
            write!(f, "Credential(<redacted>)")
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.clear();
    }
}

/// How privileged commands get their rights for one run.
#[derive(Debug)]
pub enum Elevation {
    /// The process already runs as root.
    Root,
    /// Password piped to `sudo -S`.
    Password(Credential),
    /// Plain `sudo`, which prompts on the terminal itself.
    Interactive,
}

impl Elevation {
    pub fn detect(credential: Credential) -> Self {
        if sudo::check() == sudo::RunningAs::Root {
            Self::Root
        } else if credential.is_empty() {
            Self::Interactive
        } else {
            Self::Password(credential)
        }
    }

    /// Whether wrapped commands go through sudo.
    pub fn uses_sudo(&self) -> bool {
        matches!(self, Self::Password(_) | Self::Interactive)
    }

    /// `sudo -v`, refreshing the cached sudo timestamp for tools that call
    /// sudo on their own (AUR helpers, makepkg).
    pub fn validate_command(&self) -> Option<CommandSpec> {
        match self {
            Self::Root => None,
            Self::Password(credential) => Some(
                CommandSpec::new("sudo")
                    .args(["-S", "-p", "", "-v"])
                    .stdin(credential.stdin_bytes()),
            ),
            Self::Interactive => Some(CommandSpec::new("sudo").arg("-v")),
        }
    }

    /// Rewrite `spec` so it runs with elevated rights.
    pub fn wrap(&self, spec: CommandSpec) -> CommandSpec {
        match self {
            Self::Root => spec,
            Self::Password(credential) => {
                let wrapped = CommandSpec::new("sudo").args(["-S", "-p", ""]);
                carry_over(wrapped, spec).stdin(credential.stdin_bytes())
            }
            Self::Interactive => carry_over(CommandSpec::new("sudo"), spec),
        }
    }
}

/// Append the inner command to a sudo invocation. sudo resets the
/// environment, so extra variables travel through `env`.
fn carry_over(mut wrapped: CommandSpec, inner: CommandSpec) -> CommandSpec {
    if !inner.env.is_empty() {
        wrapped = wrapped.arg("env");
        for (key, value) in &inner.env {
            wrapped = wrapped.arg(format!("{}={}", key, value));
        }
    }
    wrapped.args.push(inner.program.clone());
    wrapped.args.extend(inner.args.iter().cloned());
    wrapped.dir = inner.dir.clone();
    wrapped
}

/// Ask for the sudo password on the terminal.
pub fn prompt_credential() -> Result<Credential, PrivilegeError> {
    dialoguer::Password::new()
        .with_prompt("Password for sudo")
        .allow_empty_password(false)
        .interact()
        .map(Credential::new)
        .map_err(|e| PrivilegeError::Prompt(e.to_string()))
}

/// Read the password from the first line of stdin.
pub fn read_credential_from_stdin() -> Result<Credential, PrivilegeError> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| PrivilegeError::Prompt(e.to_string()))?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    line.clear();
    if trimmed.is_empty() {
        return Err(PrivilegeError::NoCredential);
    }
    Ok(Credential::new(trimmed))
}
