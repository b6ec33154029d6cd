//! Deployment topologies.
//!
//! The mode is picked once from `[environment] deploy_mode` when a manager is
//! built and decides the command dialect and where each command runs.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::action::{Action, RunState};
use crate::error::{HavocError, Result};
use crate::probe::{self, Classifier};
use crate::runtime::CommandOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    /// Package-installed services spread over several hosts, driven over SSH.
    #[default]
    PkgMulti,
    /// Devstack on the machine havoc runs on.
    DevstackLocal,
    /// Devstack on a single remote host.
    DevstackRemote,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::PkgMulti => "pkg-multi",
            DeployMode::DevstackLocal => "devstack-local",
            DeployMode::DevstackRemote => "devstack-remote",
        }
    }

    /// Whether managers in this mode need an SSH session.
    pub fn is_remote(&self) -> bool {
        !matches!(self, DeployMode::DevstackLocal)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = HavocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pkg-multi" => Ok(DeployMode::PkgMulti),
            "devstack-local" => Ok(DeployMode::DevstackLocal),
            "devstack-remote" => Ok(DeployMode::DevstackRemote),
            other => Err(HavocError::Configuration(format!("unknown deploy_mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A subprocess on this machine.
    Local,
    /// The manager's remote session.
    Remote,
}

/// A resolved command and where it must run. Built per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub route: Route,
    pub command: String,
}

impl CommandPlan {
    pub fn local(command: impl Into<String>) -> Self {
        Self {
            route: Route::Local,
            command: command.into(),
        }
    }

    pub fn remote(command: impl Into<String>) -> Self {
        Self {
            route: Route::Remote,
            command: command.into(),
        }
    }
}

/// The command dialect of a deployment.
pub trait Topology: Send + Sync {
    fn mode(&self) -> DeployMode;

    /// Command whose output tells whether `service` runs.
    fn service_status(&self, service: &str) -> Result<CommandPlan>;

    /// Classifier for the output of [`Topology::service_status`].
    fn service_classifier(&self) -> Classifier;

    fn classify_service(&self, service: &str, output: &CommandOutput) -> RunState {
        (self.service_classifier())(service, output)
    }

    /// Command performing `action` on `service`.
    fn service_transition(&self, service: &str, action: Action) -> Result<CommandPlan>;

    /// `ps aux | grep [x]yz` for `process`.
    fn process_listing(&self, process: &str) -> Result<CommandPlan>;

    fn classify_process(&self, process: &str, output: &CommandOutput) -> RunState {
        probe::classify_process_listing(process, output)
    }

    fn kill_process(&self, process: &str) -> Result<CommandPlan>;

    /// Hypervisor (`virsh`) command, routed like every other command of this mode.
    fn hypervisor(&self, args: &str) -> Result<CommandPlan>;
}

fn service_command(sudo: bool, service: &str, verb: &str) -> String {
    let prefix = if sudo { "sudo " } else { "" };
    format!("{prefix}service {service} {verb}")
}

fn listing_command(process: &str) -> String {
    format!("ps aux | grep {}", probe::grep_pattern(process))
}

/// `pkg-multi`: every command goes through the node's SSH session.
#[derive(Debug, Clone, Default)]
pub struct MultiHostPackage {
    sudo: bool,
}

impl MultiHostPackage {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }
}

impl Topology for MultiHostPackage {
    fn mode(&self) -> DeployMode {
        DeployMode::PkgMulti
    }

    fn service_status(&self, service: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::remote(service_command(self.sudo, service, "status")))
    }

    fn service_classifier(&self) -> Classifier {
        probe::classify_service_status
    }

    fn service_transition(&self, service: &str, action: Action) -> Result<CommandPlan> {
        Ok(CommandPlan::remote(service_command(self.sudo, service, action.as_str())))
    }

    fn process_listing(&self, process: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::remote(listing_command(process)))
    }

    fn kill_process(&self, process: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::remote(format!("killall {process}")))
    }

    fn hypervisor(&self, args: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::remote(format!("virsh {args}")))
    }
}

/// `devstack-local`: services run from source on this machine, so their state is
/// read from the local process list and commands are local subprocesses.
#[derive(Debug, Clone, Default)]
pub struct LocalSingleHost {
    sudo: bool,
}

impl LocalSingleHost {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }
}

impl Topology for LocalSingleHost {
    fn mode(&self) -> DeployMode {
        DeployMode::DevstackLocal
    }

    fn service_status(&self, service: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::local(listing_command(service)))
    }

    fn service_classifier(&self) -> Classifier {
        probe::classify_local_listing
    }

    fn service_transition(&self, service: &str, action: Action) -> Result<CommandPlan> {
        Ok(CommandPlan::local(service_command(self.sudo, service, action.as_str())))
    }

    fn process_listing(&self, process: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::local(listing_command(process)))
    }

    fn classify_process(&self, process: &str, output: &CommandOutput) -> RunState {
        probe::classify_local_listing(process, output)
    }

    fn kill_process(&self, process: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::local(format!("killall {process}")))
    }

    fn hypervisor(&self, args: &str) -> Result<CommandPlan> {
        Ok(CommandPlan::local(format!("virsh {args}")))
    }
}

/// `devstack-remote`: recognised but not implemented; every request is refused.
#[derive(Debug, Clone, Default)]
pub struct RemoteSingleHost;

impl RemoteSingleHost {
    fn unsupported<T>(&self) -> Result<T> {
        Err(HavocError::UnsupportedTopology(DeployMode::DevstackRemote.to_string()))
    }
}

fn unknown_state(_unit: &str, _output: &CommandOutput) -> RunState {
    RunState::Unknown
}

impl Topology for RemoteSingleHost {
    fn mode(&self) -> DeployMode {
        DeployMode::DevstackRemote
    }

    fn service_status(&self, _service: &str) -> Result<CommandPlan> {
        self.unsupported()
    }

    fn service_classifier(&self) -> Classifier {
        unknown_state
    }

    fn service_transition(&self, _service: &str, _action: Action) -> Result<CommandPlan> {
        self.unsupported()
    }

    fn process_listing(&self, _process: &str) -> Result<CommandPlan> {
        self.unsupported()
    }

    fn kill_process(&self, _process: &str) -> Result<CommandPlan> {
        self.unsupported()
    }

    fn hypervisor(&self, _args: &str) -> Result<CommandPlan> {
        self.unsupported()
    }
}

/// Picks the dialect for `mode`.
pub fn for_mode(mode: DeployMode, sudo: bool) -> Arc<dyn Topology> {
    match mode {
        DeployMode::PkgMulti => Arc::new(MultiHostPackage::new(sudo)),
        DeployMode::DevstackLocal => Arc::new(LocalSingleHost::new(sudo)),
        DeployMode::DevstackRemote => Arc::new(RemoteSingleHost),
    }
}
