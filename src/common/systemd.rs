use crate::distros::runner::{CancelToken, CommandRunner, CommandSpec};
use anyhow::{Context, Result};

/// Represents the scope of a systemd service (system or user)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceScope {
    System,
    User,
}

impl ServiceScope {
    /// Get the systemctl command arguments for this scope
    pub fn systemctl_args(&self) -> &'static [&'static str] {
        match self {
            ServiceScope::System => &[],
            ServiceScope::User => &["--user"],
        }
    }
}

/// systemctl driven through a [`CommandRunner`]
pub struct SystemdManager<'a> {
    scope: ServiceScope,
    runner: &'a dyn CommandRunner,
    cancel: CancelToken,
}

impl<'a> SystemdManager<'a> {
    pub fn new(scope: ServiceScope, runner: &'a dyn CommandRunner) -> Self {
        Self {
            scope,
            runner,
            cancel: CancelToken::new(),
        }
    }

    pub fn user(runner: &'a dyn CommandRunner) -> Self {
        Self::new(ServiceScope::User, runner)
    }

    /// Abort in-flight systemctl calls when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Check if a service is currently active
    pub fn is_active(&self, service_name: &str) -> bool {
        self.runner
            .succeeds(&self.systemctl(&["is-active", "--quiet", service_name]))
    }

    /// Make `target` pull in `service_name` when it starts
    pub fn add_wants(&self, target: &str, service_name: &str) -> Result<()> {
        self.runner
            .run_checked(&self.systemctl(&["add-wants", target, service_name]), &self.cancel)
            .with_context(|| format!("Failed to add {} to {}", service_name, target))?;
        Ok(())
    }

    fn systemctl(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("systemctl")
            .args(self.scope.systemctl_args().iter().copied())
            .args(args.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distros::runner::CommandOutput;
    use crate::distros::testing::FakeRunner;

    #[test]
    fn user_scope_passes_user_flag() {
        let runner = FakeRunner::new();
        SystemdManager::user(&runner)
            .add_wants("niri.service", "dms.service")
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec!["systemctl --user add-wants niri.service dms.service"]
        );
    }

    #[test]
    fn system_scope_has_no_flag() {
        let runner = FakeRunner::new().on("accounts-daemon", CommandOutput::failed(3, ""));
        let systemd = SystemdManager::new(ServiceScope::System, &runner);
        assert!(!systemd.is_active("accounts-daemon"));
        assert!(systemd.is_active("dbus"));
        assert_eq!(runner.calls()[0], "systemctl is-active --quiet accounts-daemon");
    }

    #[test]
    fn failed_add_wants_is_an_error() {
        let runner = FakeRunner::new().on("add-wants", CommandOutput::failed(1, "no such unit"));
        let err = SystemdManager::user(&runner)
            .add_wants("niri.service", "dms.service")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no such unit"));
    }
}
