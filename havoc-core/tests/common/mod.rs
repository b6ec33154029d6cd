#![allow(dead_code)]

use std::sync::Arc;

use havoc_core::nodes::ComputeNode;
use havoc_core::runtime::{Dispatcher, Shell};
use havoc_core::testing::ScriptedShell;
use havoc_core::topology::MultiHostPackage;
use havoc_core::NodeManager;

pub const VIRSH_LIST: &str = "virsh list --all";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A `pkg-multi` manager whose remote session is the returned scripted shell.
pub fn remote_manager() -> (NodeManager, Arc<ScriptedShell>) {
    let remote = Arc::new(ScriptedShell::new());
    let manager = NodeManager::new(
        Arc::new(MultiHostPackage::new(false)),
        Dispatcher::new(Arc::new(ScriptedShell::new()), Some(remote.clone() as Arc<dyn Shell>)),
    );
    (manager, remote)
}

pub fn compute_node() -> (ComputeNode, Arc<ScriptedShell>) {
    let (manager, remote) = remote_manager();
    (ComputeNode::new(manager).with_seed(42), remote)
}

/// `virsh list --all` output with one row per `(index, state)`.
pub fn domain_listing(rows: &[(u32, &str)]) -> String {
    let mut out = String::from(" Id    Name                           State\n");
    out.push_str("----------------------------------------------------\n");
    for (n, state) in rows {
        let id = if *state == "running" {
            n.to_string()
        } else {
            "-".to_string()
        };
        out.push_str(&format!(" {:<5} {:<30} {}\n", id, instance(*n), state));
    }
    out.push('\n');
    out
}

pub fn instance(n: u32) -> String {
    format!("instance-{n:08x}")
}
