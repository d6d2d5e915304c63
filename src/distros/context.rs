use super::privilege::Elevation;
use super::progress::{InstallProgressMsg, Phase, ProgressSink};
use super::runner::{CancelToken, CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::ui::prelude::*;

/// Per-run state threaded through every install step: the command runner,
/// how to elevate, the cancellation token and the progress queue.
pub struct RunContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub elevation: &'a Elevation,
    pub cancel: &'a CancelToken,
    pub progress: &'a ProgressSink,
}

impl<'a> RunContext<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        elevation: &'a Elevation,
        cancel: &'a CancelToken,
        progress: &'a ProgressSink,
    ) -> Self {
        Self {
            runner,
            elevation,
            cancel,
            progress,
        }
    }

    /// Run an unprivileged step, reporting it and its output.
    pub fn exec(
        &self,
        phase: Phase,
        fraction: f64,
        step: &str,
        spec: CommandSpec,
    ) -> Result<CommandOutput, CommandError> {
        self.exec_inner(phase, fraction, step, spec, false)
    }

    /// Run a step with elevated rights.
    pub fn exec_privileged(
        &self,
        phase: Phase,
        fraction: f64,
        step: &str,
        spec: CommandSpec,
    ) -> Result<CommandOutput, CommandError> {
        let spec = self.elevation.wrap(spec);
        self.exec_inner(phase, fraction, step, spec, self.elevation.uses_sudo())
    }

    /// Refresh sudo's cached credentials before handing control to a tool
    /// that elevates by itself.
    pub fn validate_sudo(&self, phase: Phase, fraction: f64) -> Result<(), CommandError> {
        let Some(spec) = self.elevation.validate_command() else {
            return Ok(());
        };
        self.exec_inner(phase, fraction, "Authenticating with sudo...", spec, true)?;
        Ok(())
    }

    pub fn log(&self, phase: Phase, fraction: f64, step: &str, message: impl Into<String>) {
        let message = message.into();
        emit(Level::Debug, "distros.log", &message, None);
        self.progress.log(phase, fraction, step, message);
    }

    pub fn warn(&self, phase: Phase, fraction: f64, step: &str, message: impl Into<String>) {
        let message = message.into();
        emit(Level::Warn, "distros.warning", &message, None);
        self.progress.log(phase, fraction, step, format!("Warning: {}", message));
    }

    fn exec_inner(
        &self,
        phase: Phase,
        fraction: f64,
        step: &str,
        spec: CommandSpec,
        needs_sudo: bool,
    ) -> Result<CommandOutput, CommandError> {
        let command = spec.display();
        self.progress.emit(
            InstallProgressMsg::new(phase, fraction, step)
                .with_command(command.clone())
                .with_sudo(needs_sudo),
        );
        emit(
            Level::Debug,
            "distros.exec",
            &format!("$ {}", command),
            None,
        );

        let result = self.runner.run_checked(&spec, self.cancel);
        match &result {
            Ok(output) if !output.trimmed().is_empty() => {
                self.progress.log(phase, fraction, step, output.trimmed());
            }
            Err(CommandError::Failed { output, .. }) if !output.trim().is_empty() => {
                self.progress.log(phase, fraction, step, output.trim());
            }
            _ => {}
        }
        result
    }
}
