//! Command execution with captured combined output and cancellation.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes fed to a child's stdin. Zeroed on drop and never printed.
#[derive(Clone, Default)]
pub struct StdinBytes(Vec<u8>);

impl StdinBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StdinBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StdinBytes(<{} bytes>)", self.0.len())
    }
}

impl Drop for StdinBytes {
    fn drop(&mut self) {
        self.0.fill(0);
        std::hint::black_box(&self.0);
    }
}

/// A command to execute: program, arguments, working directory, extra env.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<StdinBytes>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, bytes: StdinBytes) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// Shell-quoted rendering for logs and `CommandInfo`. Never includes stdin.
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Result of a finished command. `output` is stdout and stderr interleaved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            output: output.into(),
        }
    }

    pub fn trimmed(&self) -> &str {
        self.output.trim()
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed ({status})\n{output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

impl CommandError {
    pub fn failed(spec: &CommandSpec, output: &CommandOutput) -> Self {
        let status = match output.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        Self::Failed {
            command: spec.display(),
            status,
            output: output.output.clone(),
        }
    }

    /// Captured output of a failed command, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Whether an error chain was caused by cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<CommandError>(),
            Some(CommandError::Cancelled { .. })
        )
    })
}

/// Cooperative cancellation flag with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast with a cancellation error if the run was cancelled.
    pub fn check(&self, what: &str) -> Result<(), CommandError> {
        if self.is_cancelled() {
            return Err(CommandError::Cancelled {
                command: what.to_string(),
            });
        }
        Ok(())
    }
}

/// Executes commands and answers read-only host questions.
pub trait CommandRunner: Send + Sync {
    /// Run to completion, returning output regardless of exit status.
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, CommandError>;

    fn command_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Run and turn a non-zero exit into `CommandError::Failed`.
    fn run_checked(
        &self,
        spec: &CommandSpec,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CommandError> {
        let output = self.run(spec, cancel)?;
        if output.success {
            Ok(output)
        } else {
            Err(CommandError::failed(spec, &output))
        }
    }

    /// Read-only probe: true only if the command ran and exited zero.
    fn succeeds(&self, spec: &CommandSpec) -> bool {
        self.run(spec, &CancelToken::new())
            .map(|output| output.success)
            .unwrap_or(false)
    }
}

/// Runs commands on the host through duct.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, CommandError> {
        let command = spec.display();
        cancel.check(&command)?;

        let mut expr = duct::cmd(&spec.program, &spec.args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();
        if let Some(dir) = &spec.dir {
            expr = expr.dir(dir);
        }
        for (key, value) in &spec.env {
            expr = expr.env(key, value);
        }
        if let Some(input) = &spec.stdin {
            expr = expr.stdin_bytes(input.as_bytes().to_vec());
        }

        let handle = expr.start().map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

        loop {
            match handle.try_wait() {
                Ok(Some(output)) => {
                    return Ok(CommandOutput {
                        success: output.status.success(),
                        code: output.status.code(),
                        output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    });
                }
                Ok(None) => {}
                Err(source) => return Err(CommandError::Spawn { command, source }),
            }

            if cancel.is_cancelled() {
                let _ = handle.kill();
                return Err(CommandError::Cancelled { command });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
