use std::fmt;

use super::{NodeService, ServiceNode};
use crate::config::{HavocConfig, Role};
use crate::error::Result;
use crate::manager::NodeManager;
use crate::services;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerService {
    NovaApi,
    NovaScheduler,
    Rabbitmq,
    Mysql,
}

impl ControllerService {
    pub const ALL: [ControllerService; 4] = [
        ControllerService::NovaApi,
        ControllerService::NovaScheduler,
        ControllerService::Rabbitmq,
        ControllerService::Mysql,
    ];
}

impl NodeService for ControllerService {
    fn unit(&self) -> &'static str {
        match self {
            ControllerService::NovaApi => services::NOVA_API,
            ControllerService::NovaScheduler => services::NOVA_SCHEDULER,
            ControllerService::Rabbitmq => services::RABBITMQ,
            ControllerService::Mysql => services::MYSQL,
        }
    }
}

impl fmt::Display for ControllerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

/// The API node: API, scheduler, message queue and database.
pub struct ControllerNode {
    manager: NodeManager,
}

impl ControllerNode {
    pub fn new(manager: NodeManager) -> Self {
        Self { manager }
    }

    pub fn connect(config: &HavocConfig) -> Result<Self> {
        super::single(config, Role::Controller).map(Self::new)
    }
}

impl ServiceNode for ControllerNode {
    type Service = ControllerService;

    fn manager(&self) -> &NodeManager {
        &self.manager
    }
}
