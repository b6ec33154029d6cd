//! Per-role managers: the named havoc actions of each node type.

pub mod compute;
pub mod controller;
pub mod network;
pub mod power;

use async_trait::async_trait;
use std::fmt;

use crate::action::{Action, ActionOutcome, RunState};
use crate::config::{HavocConfig, Role};
use crate::error::Result;
use crate::manager::NodeManager;

pub use compute::{ComputeNode, ComputeService, DomainState};
pub use controller::{ControllerNode, ControllerService};
pub use network::{NetworkNode, NetworkService};
pub use power::PowerController;

/// A service a role manager can start, stop and restart.
pub trait NodeService: Copy + fmt::Display + Send + Sync + 'static {
    fn unit(&self) -> &'static str;
}

#[async_trait]
pub trait ServiceNode: Send + Sync {
    type Service: NodeService;

    fn manager(&self) -> &NodeManager;

    async fn start(&self, service: Self::Service) -> Result<ActionOutcome> {
        self.manager().service_action(service.unit(), Action::Start).await
    }

    async fn stop(&self, service: Self::Service) -> Result<ActionOutcome> {
        self.manager().service_action(service.unit(), Action::Stop).await
    }

    async fn restart(&self, service: Self::Service) -> Result<ActionOutcome> {
        self.manager().service_action(service.unit(), Action::Restart).await
    }

    async fn status(&self, service: Self::Service) -> Result<RunState> {
        self.manager().is_service_running(service.unit()).await
    }
}

/// Manager for the single node configured for `role`.
pub fn single(config: &HavocConfig, role: Role) -> Result<NodeManager> {
    let target = config.nodes.expect_one(role)?;
    Ok(NodeManager::for_target(&target, &config.environment))
}

/// One manager per node configured for `role`, in configuration order.
pub fn all(config: &HavocConfig, role: Role) -> Result<Vec<NodeManager>> {
    Ok(config
        .nodes
        .targets(role)?
        .iter()
        .map(|target| NodeManager::for_target(target, &config.environment))
        .collect())
}
