use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HavocError, Result};

fn default_ssh_timeout() -> u64 {
    30
}

/// The part a node plays in the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Controller,
    Network,
    Compute,
    Power,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Controller, Role::Network, Role::Compute, Role::Power];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Controller => "controller",
            Role::Network => "network",
            Role::Compute => "compute",
            Role::Power => "power",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HavocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "controller" | "api" => Ok(Role::Controller),
            "network" => Ok(Role::Network),
            "compute" => Ok(Role::Compute),
            "power" => Ok(Role::Power),
            other => Err(HavocError::Configuration(format!("unknown node role '{other}'"))),
        }
    }
}

/// A managed endpoint. Built once per manager and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    username: String,
    password: String,
    timeout: Duration,
    role: Role,
}

impl Target {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        role: Role,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            timeout,
            role,
        }
    }

    /// Parses the `<ip>:<user>:<password>` triple used in the `[nodes]` section.
    pub fn parse(value: &str, timeout: Duration, role: Role) -> Result<Self> {
        let fields: Vec<&str> = value.trim().splitn(3, ':').collect();
        match fields.as_slice() {
            [host, user, password] if !host.is_empty() && !user.is_empty() => {
                Ok(Self::new(*host, *user, *password, timeout, role))
            }
            _ => Err(HavocError::Configuration(format!(
                "node entry for {role} must be <ip>:<user>:<password>, got '{}'",
                value.trim()
            ))),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// The `[nodes]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodesConfig {
    #[serde(default, alias = "api")]
    pub controller: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub compute: Option<String>,
    #[serde(default)]
    pub power: Option<String>,
    /// Seconds allowed for SSH connect and for each remote operation.
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout: u64,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            controller: None,
            network: None,
            compute: None,
            power: None,
            ssh_timeout: default_ssh_timeout(),
        }
    }
}

impl NodesConfig {
    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout)
    }

    fn raw(&self, role: Role) -> Option<&str> {
        match role {
            Role::Controller => self.controller.as_deref(),
            Role::Network => self.network.as_deref(),
            Role::Compute => self.compute.as_deref(),
            Role::Power => self.power.as_deref(),
        }
    }

    /// All nodes configured for `role`, in file order. Empty when the key is absent.
    pub fn targets(&self, role: Role) -> Result<Vec<Target>> {
        let Some(raw) = self.raw(role) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| Target::parse(entry, self.ssh_timeout(), role))
            .collect()
    }

    /// The single node configured for `role`.
    pub fn expect_one(&self, role: Role) -> Result<Target> {
        let mut targets = self.targets(role)?;
        match targets.len() {
            1 => Ok(targets.remove(0)),
            0 => Err(HavocError::Configuration(format!("no {role} node configured"))),
            n => Err(HavocError::Configuration(format!(
                "expected exactly one {role} node, found {n}"
            ))),
        }
    }
}
