//! # Havoc Core
//!
//! Fault injection for multi-node compute deployments: stop and start services,
//! kill processes, destroy hypervisor domains and cycle node power, then poll
//! until the system reports the expected state again.
//!
//! ## Modules
//! - `config`: INI configuration, node triples and deploy mode.
//! - `runtime`: Where commands run (SSH session, local subprocess).
//! - `topology`: Command dialect per deploy mode.
//! - `probe`: Classification of status and process-list output.
//! - `manager`: Idempotent service and process actions on one node.
//! - `nodes`: Controller, network, compute and power managers.
//! - `poller`: Status polling with interval, timeout and error short-circuit.

pub mod action;
pub mod config;
pub mod error;
pub mod manager;
pub mod nodes;
pub mod poller;
pub mod probe;
pub mod runtime;
pub mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod topology;

pub use action::{Action, ActionOutcome, ActionRequest, Outcome, ProcessOutcome, RunState};
pub use config::{HavocConfig, Role, Target};
pub use error::{HavocError, Result};
pub use manager::NodeManager;
pub use poller::{wait_for_status, PollOutcome, PollPolicy};
pub use topology::DeployMode;
