mod common;

use anyhow::Result;
use havoc_core::HavocError;
use std::time::Duration;

use common::{compute_node, domain_listing, init_logger, instance, VIRSH_LIST};
use havoc_core::PollPolicy;

#[tokio::test]
async fn test_terminate_first_two_of_five() -> Result<()> {
    init_logger();
    let (mut compute, remote) = compute_node();
    let running: Vec<(u32, &str)> = (1..=5).map(|n| (n, "running")).collect();
    remote.respond(VIRSH_LIST, &domain_listing(&running));
    remote.respond(
        VIRSH_LIST,
        &domain_listing(&[
            (1, "shut off"),
            (2, "shut off"),
            (3, "running"),
            (4, "running"),
            (5, "running"),
        ]),
    );

    let destroyed = compute.terminate_instances(false, 2).await?;
    assert_eq!(destroyed, vec![instance(1), instance(2)]);
    assert_eq!(
        remote.issued(),
        vec![
            VIRSH_LIST.to_string(),
            format!("virsh destroy {}", instance(1)),
            format!("virsh destroy {}", instance(2)),
            VIRSH_LIST.to_string(),
        ]
    );
    assert_eq!(compute.terminated_instances(), compute.stopped_instances().await?.as_slice());
    Ok(())
}

#[tokio::test]
async fn test_terminate_without_instances() -> Result<()> {
    let (mut compute, remote) = compute_node();
    remote.respond(VIRSH_LIST, &domain_listing(&[(1, "shut off")]));

    let err = compute.terminate_instances(true, 1).await.unwrap_err();
    assert!(matches!(err, HavocError::NoInstances));
    assert_eq!(remote.count_prefix("virsh destroy"), 0);
    Ok(())
}

#[tokio::test]
async fn test_restart_requires_terminated_instances() -> Result<()> {
    let (mut compute, remote) = compute_node();

    let err = compute.restart_instances().await.unwrap_err();
    assert!(matches!(err, HavocError::NoTerminatedInstances));
    assert!(remote.issued().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_full_cycle_clears_tracking() -> Result<()> {
    init_logger();
    let (mut compute, remote) = compute_node();
    remote.respond(VIRSH_LIST, &domain_listing(&[(1, "running"), (2, "running")]));
    remote.respond(VIRSH_LIST, &domain_listing(&[(1, "shut off"), (2, "running")]));
    remote.respond(&format!("virsh domstate {}", instance(1)), "running\n");

    let destroyed = compute.terminate_instances(false, 0).await?;
    assert_eq!(destroyed, vec![instance(1)]);

    let restarted = compute.restart_instances().await?;
    assert_eq!(restarted, vec![instance(1)]);
    assert_eq!(remote.count(&format!("virsh start {}", instance(1))), 1);
    assert!(compute.terminated_instances().is_empty());

    compute
        .confirm_running(&restarted, &PollPolicy::new(Duration::ZERO, Duration::from_secs(1)))
        .await?;

    // Nothing left to restart.
    assert!(matches!(
        compute.restart_instances().await.unwrap_err(),
        HavocError::NoTerminatedInstances
    ));
    Ok(())
}

#[tokio::test]
async fn test_seeded_random_termination_is_reproducible() -> Result<()> {
    let rows: Vec<(u32, &str)> = (1..=8).map(|n| (n, "running")).collect();

    let mut picks = Vec::new();
    for _ in 0..2 {
        let (mut compute, remote) = compute_node();
        remote.respond(VIRSH_LIST, &domain_listing(&rows));
        picks.push(compute.terminate_instances(true, 3).await?);
    }
    assert_eq!(picks[0], picks[1]);
    assert_eq!(picks[0].len(), 3);
    Ok(())
}
