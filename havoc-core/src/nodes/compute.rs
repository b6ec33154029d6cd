use lazy_static::lazy_static;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use std::fmt;
use std::mem;

use super::{NodeService, ServiceNode};
use crate::config::{HavocConfig, Role};
use crate::error::{HavocError, Result};
use crate::manager::NodeManager;
use crate::poller::{self, PollPolicy};
use crate::services;

lazy_static! {
    static ref INSTANCE_ID: Regex = Regex::new(r"instance-\d+").expect("instance id pattern is valid");
}

/// Domain state reported by `virsh domstate` once a domain has crashed.
pub const CRASHED_STATE: &str = "crashed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeService {
    NovaCompute,
    Libvirt,
}

impl NodeService for ComputeService {
    fn unit(&self) -> &'static str {
        match self {
            ComputeService::NovaCompute => services::NOVA_COMPUTE,
            ComputeService::Libvirt => services::LIBVIRT,
        }
    }
}

impl fmt::Display for ComputeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

/// The state column of `virsh list --all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Running,
    ShutOff,
}

impl DomainState {
    pub fn marker(&self) -> &'static str {
        match self {
            DomainState::Running => "running",
            DomainState::ShutOff => "shut off",
        }
    }
}

/// Every instance id on the lines of `listing` that mention `state`.
pub fn parse_domain_list(listing: &str, state: DomainState) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.contains(state.marker()))
        .flat_map(|line| INSTANCE_ID.find_iter(line).map(|m| m.as_str().to_string()))
        .collect()
}

/// A compute node: its services and the hypervisor domains it hosts.
///
/// Tracks the instances the last [`ComputeNode::terminate_instances`] call shut
/// off so that [`ComputeNode::restart_instances`] can bring them back.
pub struct ComputeNode {
    manager: NodeManager,
    rng: StdRng,
    terminated: Vec<String>,
}

impl ComputeNode {
    pub fn new(manager: NodeManager) -> Self {
        Self {
            manager,
            rng: StdRng::from_entropy(),
            terminated: Vec::new(),
        }
    }

    /// Fixes the random victim selection, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The first configured compute node.
    pub fn connect(config: &HavocConfig) -> Result<Self> {
        Self::connect_all(config)?
            .into_iter()
            .next()
            .ok_or_else(|| HavocError::Configuration("no compute node configured".to_string()))
    }

    pub fn connect_all(config: &HavocConfig) -> Result<Vec<Self>> {
        Ok(super::all(config, Role::Compute)?
            .into_iter()
            .map(Self::new)
            .collect())
    }

    /// Lists domains in `state`. Every call re-reads the hypervisor.
    pub async fn list_instances(&self, state: DomainState) -> Result<Vec<String>> {
        let output = self.manager.hypervisor("list --all").await?;
        Ok(parse_domain_list(&output.stdout, state))
    }

    pub async fn running_instances(&self) -> Result<Vec<String>> {
        self.list_instances(DomainState::Running).await
    }

    pub async fn stopped_instances(&self) -> Result<Vec<String>> {
        self.list_instances(DomainState::ShutOff).await
    }

    /// Destroys running instances and returns the ids it issued destroys for.
    ///
    /// Without `random`, destroys the first `count` in listing order, or the first
    /// one when `count` is zero. With `random`, destroys `count` distinct instances
    /// when that many run, otherwise a single random one.
    pub async fn terminate_instances(&mut self, random: bool, count: usize) -> Result<Vec<String>> {
        let running = self.running_instances().await?;
        if running.is_empty() {
            return Err(HavocError::NoInstances);
        }

        let victims: Vec<String> = if random {
            if count > 0 && running.len() >= count {
                running.choose_multiple(&mut self.rng, count).cloned().collect()
            } else {
                running.choose(&mut self.rng).cloned().into_iter().collect()
            }
        } else if count > 0 {
            if running.len() < count {
                return Err(HavocError::InsufficientInstances {
                    requested: count,
                    available: running.len(),
                });
            }
            running[..count].to_vec()
        } else {
            running[..1].to_vec()
        };

        self.terminated.clear();
        let mut destroyed = Vec::with_capacity(victims.len());
        for id in &victims {
            info!("Compute: destroying {}", id);
            if let Err(e) = self.manager.hypervisor(&format!("destroy {id}")).await {
                warn!("Compute: destroy {} failed after {} destroyed", id, destroyed.len());
                self.terminated = destroyed;
                return Err(e);
            }
            destroyed.push(id.clone());
        }

        let stopped = self.stopped_instances().await?;
        self.terminated = victims
            .iter()
            .filter(|id| stopped.contains(id))
            .cloned()
            .collect();
        if self.terminated.len() < victims.len() {
            warn!(
                "Compute: only {} of {} destroyed instances are shut off",
                self.terminated.len(),
                victims.len()
            );
        }
        Ok(victims)
    }

    /// Instances the last termination confirmed shut off, in destruction order.
    ///
    /// After a destroy fails midway, holds the instances destroyed before it.
    pub fn terminated_instances(&self) -> &[String] {
        &self.terminated
    }

    /// Issues `virsh start` for every tracked instance and returns them.
    ///
    /// Does not wait for the domains to boot; see [`ComputeNode::confirm_running`].
    /// If a start fails in transit, the instances not yet started stay tracked.
    pub async fn restart_instances(&mut self) -> Result<Vec<String>> {
        if self.terminated.is_empty() {
            return Err(HavocError::NoTerminatedInstances);
        }

        let pending = mem::take(&mut self.terminated);
        for (i, id) in pending.iter().enumerate() {
            info!("Compute: starting {}", id);
            if let Err(e) = self.manager.hypervisor(&format!("start {id}")).await {
                self.terminated = pending[i..].to_vec();
                return Err(e);
            }
        }
        Ok(pending)
    }

    /// `virsh domstate <id>`, trimmed.
    pub async fn domain_state(&self, id: &str) -> Result<String> {
        let output = self.manager.hypervisor(&format!("domstate {id}")).await?;
        Ok(output.trimmed().to_string())
    }

    /// Polls each domain until it reports `running`; a crashed domain fails at once.
    pub async fn confirm_running(&self, ids: &[String], policy: &PollPolicy) -> Result<()> {
        let policy = policy.clone().with_error_status(CRASHED_STATE);
        for id in ids {
            poller::wait_for_status(
                |id: &str| {
                    let id = id.to_string();
                    async move { self.domain_state(&id).await }
                },
                id,
                DomainState::Running.marker(),
                &policy,
            )
            .await?;
        }
        Ok(())
    }
}

impl ServiceNode for ComputeNode {
    type Service = ComputeService;

    fn manager(&self) -> &NodeManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Dispatcher, Shell};
    use crate::testing::ScriptedShell;
    use crate::topology::MultiHostPackage;
    use std::sync::Arc;
    use std::time::Duration;

    const LIST: &str = "virsh list --all";

    fn listing(rows: &[(u32, &str)]) -> String {
        let mut out = String::from(" Id    Name                           State\n----------------------------------------------------\n");
        for (n, state) in rows {
            let id = if *state == "running" { n.to_string() } else { "-".to_string() };
            out.push_str(&format!(" {id:<5} instance-{n:08x}              {state}\n"));
        }
        out
    }

    fn node() -> (ComputeNode, Arc<ScriptedShell>) {
        let shell = Arc::new(ScriptedShell::new());
        let manager = NodeManager::new(
            Arc::new(MultiHostPackage::new(false)),
            Dispatcher::new(Arc::new(ScriptedShell::new()), Some(shell.clone() as Arc<dyn Shell>)),
        );
        (ComputeNode::new(manager).with_seed(7), shell)
    }

    #[test]
    fn test_parse_domain_list() {
        let text = listing(&[(1, "running"), (2, "shut off"), (3, "running")]);
        assert_eq!(
            parse_domain_list(&text, DomainState::Running),
            vec!["instance-00000001", "instance-00000003"]
        );
        assert_eq!(parse_domain_list(&text, DomainState::ShutOff), vec!["instance-00000002"]);
        assert!(parse_domain_list("", DomainState::Running).is_empty());
    }

    #[test]
    fn test_line_may_contribute_several_ids() {
        let line = "running instance-1 instance-22\nrunning nothing here\n";
        assert_eq!(
            parse_domain_list(line, DomainState::Running),
            vec!["instance-1", "instance-22"]
        );
    }

    #[tokio::test]
    async fn test_random_termination_picks_distinct_instances() {
        let (mut node, shell) = node();
        let rows: Vec<(u32, &str)> = (1..=5).map(|n| (n, "running")).collect();
        shell.respond(LIST, &listing(&rows));

        let victims = node.terminate_instances(true, 5).await.unwrap();
        let mut sorted = victims.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert_eq!(shell.count_prefix("virsh destroy"), 5);
    }

    #[tokio::test]
    async fn test_random_with_too_few_destroys_one() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(1, "running"), (2, "running")]));

        let victims = node.terminate_instances(true, 3).await.unwrap();
        assert_eq!(victims.len(), 1);
        assert_eq!(shell.count_prefix("virsh destroy"), 1);
    }

    #[tokio::test]
    async fn test_default_destroys_first() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(4, "running"), (9, "running")]));
        shell.respond(LIST, &listing(&[(4, "shut off"), (9, "running")]));

        let victims = node.terminate_instances(false, 0).await.unwrap();
        assert_eq!(victims, vec!["instance-00000004"]);
        assert_eq!(node.terminated_instances(), &["instance-00000004".to_string()]);
    }

    #[tokio::test]
    async fn test_insufficient_instances() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(1, "running")]));

        let err = node.terminate_instances(false, 2).await.unwrap_err();
        assert!(matches!(
            err,
            HavocError::InsufficientInstances {
                requested: 2,
                available: 1
            }
        ));
        assert_eq!(shell.count_prefix("virsh destroy"), 0);
    }

    #[tokio::test]
    async fn test_untracked_shutoffs_are_ignored() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(1, "running"), (2, "shut off")]));
        shell.respond(LIST, &listing(&[(1, "shut off"), (2, "shut off")]));

        node.terminate_instances(false, 1).await.unwrap();
        assert_eq!(node.terminated_instances(), &["instance-00000001".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_restart_keeps_remaining_tracked() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(1, "running"), (2, "running")]));
        shell.respond(LIST, &listing(&[(1, "shut off"), (2, "shut off")]));
        shell.fail_on("virsh start instance-00000002");

        node.terminate_instances(false, 2).await.unwrap();
        let err = node.restart_instances().await.unwrap_err();
        assert!(matches!(err, HavocError::RemoteExecution { .. }));
        assert_eq!(node.terminated_instances(), &["instance-00000002".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_destroy_tracks_only_this_call() {
        let (mut node, shell) = node();
        shell.respond(LIST, &listing(&[(1, "running"), (2, "running"), (3, "running")]));
        shell.respond(LIST, &listing(&[(1, "shut off"), (2, "running"), (3, "running")]));
        shell.respond(LIST, &listing(&[(1, "shut off"), (2, "running"), (3, "running")]));
        shell.fail_on("virsh destroy instance-00000003");

        node.terminate_instances(false, 1).await.unwrap();
        assert_eq!(node.terminated_instances(), &["instance-00000001".to_string()]);

        let err = node.terminate_instances(false, 2).await.unwrap_err();
        assert!(matches!(err, HavocError::RemoteExecution { .. }));
        assert_eq!(node.terminated_instances(), &["instance-00000002".to_string()]);
        assert_eq!(shell.count("virsh destroy instance-00000002"), 1);
    }

    #[tokio::test]
    async fn test_confirm_running_polls_domstate() {
        let (node, shell) = node();
        shell.respond("virsh domstate instance-00000001", "shut off\n\n");
        shell.respond("virsh domstate instance-00000001", "running\n\n");

        let policy = PollPolicy::new(Duration::ZERO, Duration::from_secs(5));
        node.confirm_running(&["instance-00000001".to_string()], &policy)
            .await
            .unwrap();
        assert_eq!(shell.count("virsh domstate instance-00000001"), 2);
    }

    #[tokio::test]
    async fn test_confirm_running_fails_on_crash() {
        let (node, shell) = node();
        shell.respond("virsh domstate instance-00000001", "crashed\n");

        let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(600));
        let err = node
            .confirm_running(&["instance-00000001".to_string()], &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, HavocError::ResourceFailed { ref status, .. } if status == "crashed"));
    }
}
