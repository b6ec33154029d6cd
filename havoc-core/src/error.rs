use std::time::Duration;
use thiserror::Error;

/// Global error type for havoc actions.
#[derive(Error, Debug)]
pub enum HavocError {
    /// The remote session could not be established.
    #[error("Failed to connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    /// A command failed in transit (channel, transport or local spawn failure).
    #[error("Remote execution of `{command}` failed: {reason}")]
    RemoteExecution { command: String, reason: String },

    /// The action is not valid for the kind of unit it was requested on.
    #[error("Unsupported action '{action}' for {target}")]
    UnsupportedAction { action: String, target: String },

    /// The configured deployment mode cannot carry out this request.
    #[error("Deploy mode '{0}' is not supported")]
    UnsupportedTopology(String),

    /// The name is not a service or process known to havoc.
    #[error("Unknown service or process '{0}'")]
    UnknownService(String),

    /// No running instance exists on the compute node.
    #[error("No running instances found")]
    NoInstances,

    /// Fewer running instances than requested for a deterministic termination.
    #[error("Requested {requested} instances but only {available} are running")]
    InsufficientInstances { requested: usize, available: usize },

    /// `restart_instances` was called with nothing tracked.
    #[error("No terminated instances to restart")]
    NoTerminatedInstances,

    /// A polled resource reached its error state.
    #[error("{id} failed to reach expected status: in {status} state")]
    ResourceFailed { id: String, status: String },

    /// A polled resource did not reach the expected status in time.
    #[error("Timed out after {waited:?} waiting for {id} to become {expected} (last status: {last_status:?})")]
    PollTimeout {
        id: String,
        expected: String,
        last_status: Option<String>,
        waited: Duration,
    },

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by the config loader.
    #[error("Config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HavocError {
    pub fn unsupported_action(action: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            action: action.into(),
            target: target.into(),
        }
    }

    pub fn remote(command: &str, reason: impl ToString) -> Self {
        Self::RemoteExecution {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A specialized Result type for havoc operations.
pub type Result<T> = std::result::Result<T, HavocError>;
