use std::fmt;
use std::str::FromStr;

use crate::error::{HavocError, Result};
use crate::runtime::CommandOutput;

/// Everything a caller may ask of a managed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Reload,
    ForceReload,
    Status,
    Killall,
    Verify,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reload => "reload",
            Action::ForceReload => "force-reload",
            Action::Status => "status",
            Action::Killall => "killall",
            Action::Verify => "verify",
        }
    }

    /// `stop`, `restart`, `reload` and `force-reload` need a running unit to act on.
    pub fn requires_running(&self) -> bool {
        matches!(
            self,
            Action::Stop | Action::Restart | Action::Reload | Action::ForceReload
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = HavocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "restart" => Ok(Action::Restart),
            "reload" => Ok(Action::Reload),
            "force-reload" => Ok(Action::ForceReload),
            "status" => Ok(Action::Status),
            "killall" => Ok(Action::Killall),
            "verify" => Ok(Action::Verify),
            other => Err(HavocError::unsupported_action(other, "any unit")),
        }
    }
}

/// Observed state of a service or process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
    /// The probe output matched no known pattern.
    Unknown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Unknown => "unknown",
        })
    }
}

/// A transient (unit, action) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    unit: String,
    action: Action,
}

impl ActionRequest {
    pub fn new(unit: impl Into<String>, action: Action) -> Self {
        Self {
            unit: unit.into(),
            action,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Result of a service-level action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The service was already in the requested state; no command was issued.
    AlreadySatisfied,
    /// The transition command was issued.
    Executed(CommandOutput),
    /// Answer to `status`.
    State(RunState),
}

/// Result of a process-level action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// `killall` on a process that was not running; nothing was issued.
    NotRunning,
    /// `killall` skipped because the process state could not be determined.
    Indeterminate,
    /// `killall` was issued; `confirmed` is true iff the re-probe saw it stopped.
    Killed { confirmed: bool },
    /// Answer to `verify`.
    Verified(RunState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Service(ActionOutcome),
    Process(ProcessOutcome),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Service(ActionOutcome::AlreadySatisfied) => write!(f, "already satisfied"),
            Outcome::Service(ActionOutcome::Executed(out)) => {
                write!(f, "executed (exit {:?}) {}", out.exit_code, out.trimmed())
            }
            Outcome::Service(ActionOutcome::State(state)) => write!(f, "{state}"),
            Outcome::Process(ProcessOutcome::NotRunning) => write!(f, "not running"),
            Outcome::Process(ProcessOutcome::Indeterminate) => write!(f, "state unknown, not killed"),
            Outcome::Process(ProcessOutcome::Killed { confirmed: true }) => write!(f, "killed"),
            Outcome::Process(ProcessOutcome::Killed { confirmed: false }) => {
                write!(f, "kill issued but process still present")
            }
            Outcome::Process(ProcessOutcome::Verified(state)) => write!(f, "{state}"),
        }
    }
}
