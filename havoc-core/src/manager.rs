use log::{debug, info, warn};
use std::sync::Arc;

use crate::action::{Action, ActionOutcome, ActionRequest, Outcome, ProcessOutcome, RunState};
use crate::config::{EnvironmentConfig, Target};
use crate::error::{HavocError, Result};
use crate::probe;
use crate::runtime::{CommandOutput, Dispatcher, SshSession};
use crate::services::{self, UnitKind};
use crate::topology::{self, DeployMode, Topology};

/// Carries out actions on the services and processes of one node.
///
/// Every action first probes the current state and collapses to a no-op when
/// the unit is already where the caller wants it, so repeating a request is safe.
pub struct NodeManager {
    topology: Arc<dyn Topology>,
    dispatcher: Dispatcher,
}

impl NodeManager {
    pub fn new(topology: Arc<dyn Topology>, dispatcher: Dispatcher) -> Self {
        Self {
            topology,
            dispatcher,
        }
    }

    /// Manager for `target` under the configured deploy mode.
    ///
    /// Remote modes get an SSH session that connects on first use.
    pub fn for_target(target: &Target, env: &EnvironmentConfig) -> Self {
        let topology = topology::for_mode(env.deploy_mode, env.use_sudo);
        let dispatcher = if env.deploy_mode.is_remote() {
            Dispatcher::with_remote(Arc::new(SshSession::new(target.clone())))
        } else {
            Dispatcher::local_only()
        };
        Self::new(topology, dispatcher)
    }

    pub fn mode(&self) -> DeployMode {
        self.topology.mode()
    }

    pub async fn is_service_running(&self, service: &str) -> Result<RunState> {
        probe::is_service_running(self.topology.as_ref(), &self.dispatcher, service).await
    }

    pub async fn is_process_running(&self, process: &str) -> Result<RunState> {
        probe::is_process_running(self.topology.as_ref(), &self.dispatcher, process).await
    }

    /// `start` is a no-op on a running service; `stop`, `restart`, `reload` and
    /// `force-reload` are no-ops on a stopped one. An unknown state never
    /// short-circuits.
    pub async fn service_action(&self, service: &str, action: Action) -> Result<ActionOutcome> {
        let satisfied_by = match action {
            Action::Status => {
                return Ok(ActionOutcome::State(self.is_service_running(service).await?));
            }
            Action::Start => RunState::Running,
            a if a.requires_running() => RunState::Stopped,
            other => {
                return Err(HavocError::unsupported_action(
                    other.as_str(),
                    format!("service {service}"),
                ))
            }
        };

        let current = self.is_service_running(service).await?;
        if current == satisfied_by {
            debug!("Manager: {} already {}, skipping {}", service, current, action);
            return Ok(ActionOutcome::AlreadySatisfied);
        }

        let plan = self.topology.service_transition(service, action)?;
        info!("Manager: {} {} (was {})", action, service, current);
        let output = self.dispatcher.run(&plan).await?;
        if !output.succeeded() {
            warn!(
                "Manager: `{}` exited with {:?}: {}",
                plan.command,
                output.exit_code,
                output.trimmed()
            );
        }
        Ok(ActionOutcome::Executed(output))
    }

    /// `killall` proceeds only on a running process and always re-probes afterwards;
    /// `verify` reports the current state.
    pub async fn process_action(&self, process: &str, action: Action) -> Result<ProcessOutcome> {
        match action {
            Action::Verify => Ok(ProcessOutcome::Verified(self.is_process_running(process).await?)),
            Action::Killall => match self.is_process_running(process).await? {
                RunState::Stopped => Ok(ProcessOutcome::NotRunning),
                RunState::Unknown => {
                    warn!("Manager: not killing {}: state unknown", process);
                    Ok(ProcessOutcome::Indeterminate)
                }
                RunState::Running => {
                    let plan = self.topology.kill_process(process)?;
                    info!("Manager: killall {}", process);
                    self.dispatcher.run(&plan).await?;
                    // kill can fail silently, so only the re-probe counts.
                    let after = self.is_process_running(process).await?;
                    Ok(ProcessOutcome::Killed {
                        confirmed: after == RunState::Stopped,
                    })
                }
            },
            other => Err(HavocError::unsupported_action(
                other.as_str(),
                format!("process {process}"),
            )),
        }
    }

    /// Looks the unit up in the catalogue and routes the request by its kind.
    pub async fn perform(&self, request: &ActionRequest) -> Result<Outcome> {
        let descriptor = services::lookup(request.unit())
            .ok_or_else(|| HavocError::UnknownService(request.unit().to_string()))?;
        match descriptor.kind {
            UnitKind::Service => self
                .service_action(descriptor.name, request.action())
                .await
                .map(Outcome::Service),
            UnitKind::Process => self
                .process_action(descriptor.name, request.action())
                .await
                .map(Outcome::Process),
        }
    }

    /// Runs `virsh <args>` where this mode runs hypervisor commands.
    pub async fn hypervisor(&self, args: &str) -> Result<CommandOutput> {
        let plan = self.topology.hypervisor(args)?;
        self.dispatcher.run(&plan).await
    }

    /// Releases the node's session.
    pub async fn close(&self) {
        self.dispatcher.close().await;
    }
}
