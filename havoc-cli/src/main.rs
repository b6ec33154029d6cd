mod args;

use anyhow::{bail, Context, Result};
use clap::Parser;
use havoc_core::config::Role;
use havoc_core::nodes::{ComputeNode, PowerController};
use havoc_core::services::{self, UnitKind};
use havoc_core::{Action, ActionRequest, HavocConfig, NodeManager};
use log::info;

use args::{Cli, Commands, InstanceCommand, PowerCommand};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = HavocConfig::load(cli.config.as_deref()).context("Failed to load havoc config")?;
    info!("Deploy mode: {}", config.environment.deploy_mode);

    match cli.command {
        Commands::Service { name, action } => act(&config, &name, action, UnitKind::Service).await?,
        Commands::Process { name, action } => act(&config, &name, action, UnitKind::Process).await?,
        Commands::Instances { node, command } => instances(&config, node, command).await?,
        Commands::Power { command } => power(&config, command).await?,
        Commands::Config => print_config(&config)?,
    }

    Ok(())
}

/// Runs the request on every node of the unit's role and prints one line per host.
async fn act(config: &HavocConfig, name: &str, action: Action, kind: UnitKind) -> Result<()> {
    let descriptor = services::lookup(name)
        .filter(|d| d.kind == kind)
        .with_context(|| format!("'{name}' is not a known {kind:?} unit"))?;

    let targets = config.nodes.targets(descriptor.role)?;
    if targets.is_empty() {
        bail!("no {} node configured for {}", descriptor.role, name);
    }

    let request = ActionRequest::new(name, action);
    for target in &targets {
        let manager = NodeManager::for_target(target, &config.environment);
        let outcome = manager.perform(&request).await;
        manager.close().await;
        println!("{:<16} {} {}: {}", target.host(), action, name, outcome?);
    }
    Ok(())
}

async fn instances(config: &HavocConfig, node: usize, command: InstanceCommand) -> Result<()> {
    let mut compute = ComputeNode::connect_all(config)?
        .into_iter()
        .nth(node)
        .with_context(|| format!("no compute node at index {node}"))?;

    match command {
        InstanceCommand::List { state } => {
            for id in compute.list_instances(state.into()).await? {
                println!("{id}");
            }
        }
        InstanceCommand::Terminate { selection } => {
            let destroyed = compute
                .terminate_instances(selection.random, selection.count)
                .await?;
            println!("destroyed: {}", destroyed.join(" "));
            println!("shut off:  {}", compute.terminated_instances().join(" "));
        }
        InstanceCommand::Cycle {
            selection,
            no_confirm,
        } => {
            compute
                .terminate_instances(selection.random, selection.count)
                .await?;
            let restarted = compute.restart_instances().await?;
            println!("restarted: {}", restarted.join(" "));
            if !no_confirm {
                let policy = config.compute.poll_policy()?;
                compute.confirm_running(&restarted, &policy).await?;
                println!("all running");
            }
        }
    }
    Ok(())
}

async fn power(config: &HavocConfig, command: PowerCommand) -> Result<()> {
    let power = PowerController::connect(config)?;
    let host = power.target().host().to_string();

    match command {
        PowerCommand::On => {
            if !power.power_on().await? {
                bail!("{host} did not acknowledge power on");
            }
            println!("{host}: power on");
        }
        PowerCommand::Off => {
            if !power.power_off().await? {
                bail!("{host} did not acknowledge power off");
            }
            println!("{host}: power off");
        }
        PowerCommand::Status => {
            let on = power.is_power_on().await?;
            println!("{host}: {}", if on { "on" } else { "not on" });
        }
    }
    Ok(())
}

fn print_config(config: &HavocConfig) -> Result<()> {
    let mut nodes = serde_json::Map::new();
    for role in Role::ALL {
        let entries: Vec<String> = config
            .nodes
            .targets(role)?
            .iter()
            .map(|t| format!("{}@{}", t.username(), t.host()))
            .collect();
        nodes.insert(role.to_string(), serde_json::json!(entries));
    }

    let summary = serde_json::json!({
        "deploy_mode": config.environment.deploy_mode.as_str(),
        "use_sudo": config.environment.use_sudo,
        "ssh_timeout_secs": config.nodes.ssh_timeout().as_secs(),
        "nodes": nodes,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
