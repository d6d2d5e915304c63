//! Progress events and the bounded queue they travel through.

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Ordered stages of one installation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Prerequisites,
    RepositoryEnablement,
    SystemPackages,
    ThirdPartyPackages,
    ManualBuilds,
    Configuration,
    Complete,
}

impl Phase {
    /// Overall progress band `[start, end)` owned by this phase.
    pub fn band(&self) -> (f64, f64) {
        match self {
            Self::Prerequisites => (0.0, 0.10),
            Self::RepositoryEnablement => (0.10, 0.25),
            Self::SystemPackages => (0.25, 0.50),
            Self::ThirdPartyPackages => (0.50, 0.70),
            Self::ManualBuilds => (0.70, 0.90),
            Self::Configuration => (0.90, 0.99),
            Self::Complete => (1.0, 1.0),
        }
    }

    /// Absolute progress for a fraction of the way through this phase.
    pub fn at(&self, fraction: f64) -> f64 {
        let (start, end) = self.band();
        start + (end - start) * fraction.clamp(0.0, 1.0)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Prerequisites => "Prerequisites",
            Self::RepositoryEnablement => "Repository enablement",
            Self::SystemPackages => "System packages",
            Self::ThirdPartyPackages => "Third-party packages",
            Self::ManualBuilds => "Source builds",
            Self::Configuration => "Configuration",
            Self::Complete => "Complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One immutable status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallProgressMsg {
    pub phase: Phase,
    pub progress: f64,
    pub step: String,
    pub is_complete: bool,
    pub needs_sudo: bool,
    pub command_info: String,
    pub log_output: String,
}

impl InstallProgressMsg {
    /// An event placed `fraction` of the way through `phase`.
    pub fn new(phase: Phase, fraction: f64, step: impl Into<String>) -> Self {
        Self {
            phase,
            progress: phase.at(fraction),
            step: step.into(),
            is_complete: false,
            needs_sudo: false,
            command_info: String::new(),
            log_output: String::new(),
        }
    }

    pub fn complete(step: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            ..Self::new(Phase::Complete, 1.0, step)
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command_info = command.into();
        self
    }

    pub fn with_sudo(mut self, needs_sudo: bool) -> Self {
        self.needs_sudo = needs_sudo;
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log_output = log.into();
        self
    }
}

#[derive(Debug)]
struct Watermark {
    phase: Phase,
    progress: f64,
}

/// Sending half of the bounded progress queue.
///
/// Sending blocks while the queue is full. Phase and progress are clamped so
/// a run never reports going backwards.
pub struct ProgressSink {
    tx: Option<SyncSender<InstallProgressMsg>>,
    watermark: Mutex<Watermark>,
}

impl ProgressSink {
    pub fn channel(capacity: usize) -> (Self, Receiver<InstallProgressMsg>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self::from_sender(tx), rx)
    }

    pub fn from_sender(tx: SyncSender<InstallProgressMsg>) -> Self {
        Self {
            tx: Some(tx),
            watermark: Mutex::new(Watermark {
                phase: Phase::Prerequisites,
                progress: 0.0,
            }),
        }
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self {
            tx: None,
            watermark: Mutex::new(Watermark {
                phase: Phase::Prerequisites,
                progress: 0.0,
            }),
        }
    }

    pub fn emit(&self, mut msg: InstallProgressMsg) {
        {
            let mut mark = match self.watermark.lock() {
                Ok(mark) => mark,
                Err(poisoned) => poisoned.into_inner(),
            };
            if msg.phase < mark.phase {
                msg.phase = mark.phase;
            }
            if msg.progress < mark.progress {
                msg.progress = mark.progress;
            }
            msg.progress = msg.progress.clamp(0.0, 1.0);
            mark.phase = msg.phase;
            mark.progress = msg.progress;
        }

        if let Some(tx) = &self.tx {
            // A receiver that hung up no longer wants events; keep installing.
            let _ = tx.send(msg);
        }
    }

    /// Emit an informational log line in the current phase.
    pub fn log(&self, phase: Phase, fraction: f64, step: &str, log: impl Into<String>) {
        self.emit(InstallProgressMsg::new(phase, fraction, step).with_log(log));
    }
}
