use log::info;
use std::fmt;
use std::time::Duration;

use super::{NodeService, ServiceNode};
use crate::action::{Action, ProcessOutcome, RunState};
use crate::config::{HavocConfig, Role};
use crate::error::Result;
use crate::manager::NodeManager;
use crate::services;

/// Time dnsmasq gets to come back after nova-network restarts.
const DNSMASQ_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkService {
    NovaNetwork,
}

impl NodeService for NetworkService {
    fn unit(&self) -> &'static str {
        match self {
            NetworkService::NovaNetwork => services::NOVA_NETWORK,
        }
    }
}

impl fmt::Display for NetworkService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

pub struct NetworkNode {
    manager: NodeManager,
    settle: Duration,
}

impl NetworkNode {
    pub fn new(manager: NodeManager) -> Self {
        Self {
            manager,
            settle: DNSMASQ_SETTLE,
        }
    }

    pub fn connect(config: &HavocConfig) -> Result<Self> {
        super::single(config, Role::Network).map(Self::new)
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub async fn kill_dnsmasq(&self) -> Result<ProcessOutcome> {
        self.manager.process_action(services::DNSMASQ, Action::Killall).await
    }

    /// dnsmasq has no service of its own; restarting nova-network respawns it.
    pub async fn start_dnsmasq(&self) -> Result<RunState> {
        self.restart(NetworkService::NovaNetwork).await?;
        tokio::time::sleep(self.settle).await;

        let state = self.manager.is_process_running(services::DNSMASQ).await?;
        info!("Network: dnsmasq is {} after nova-network restart", state);
        Ok(state)
    }
}

impl ServiceNode for NetworkNode {
    type Service = NetworkService;

    fn manager(&self) -> &NodeManager {
        &self.manager
    }
}
