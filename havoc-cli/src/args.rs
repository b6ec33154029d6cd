use clap::{Parser, Subcommand, ValueEnum};
use havoc_core::nodes::DomainState;
use havoc_core::Action;
use std::path::PathBuf;

/// Fault injection for multi-node compute deployments.
#[derive(Parser, Debug)]
#[command(name = "havoc")]
#[command(about = "Break and restore services, instances and power on managed nodes", long_about = None)]
pub struct Cli {
    /// Config file (default: $HAVOC_CONFIG, then etc/havoc.conf).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Act on a service on every node of its role.
    Service {
        /// Catalogued service, e.g. nova-api.
        name: String,
        /// start, stop, restart, reload, force-reload or status.
        action: Action,
    },
    /// Act on a bare process on every node of its role.
    Process {
        /// Catalogued process, e.g. dnsmasq.
        name: String,
        /// killall or verify.
        action: Action,
    },
    /// Hypervisor domains on a compute node.
    Instances {
        /// Index of the compute node in the config.
        #[arg(long, default_value_t = 0)]
        node: usize,

        #[command(subcommand)]
        command: InstanceCommand,
    },
    /// Chassis power of the power-managed node.
    Power {
        #[command(subcommand)]
        command: PowerCommand,
    },
    /// Print the resolved node map (passwords omitted).
    Config,
}

#[derive(Subcommand, Debug)]
pub enum InstanceCommand {
    /// List domains in a state.
    List {
        #[arg(short, long, value_enum, default_value_t = StateArg::Running)]
        state: StateArg,
    },
    /// Destroy running domains.
    Terminate {
        #[command(flatten)]
        selection: Selection,
    },
    /// Destroy domains, start them again and wait until they run.
    Cycle {
        #[command(flatten)]
        selection: Selection,

        /// Do not wait for the restarted domains.
        #[arg(long)]
        no_confirm: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct Selection {
    /// Pick victims at random.
    #[arg(short, long)]
    pub random: bool,

    /// How many to destroy (0 = one).
    #[arg(short = 'n', long, default_value_t = 0)]
    pub count: usize,
}

#[derive(Subcommand, Debug)]
pub enum PowerCommand {
    On,
    Off,
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StateArg {
    Running,
    ShutOff,
}

impl From<StateArg> for DomainState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Running => DomainState::Running,
            StateArg::ShutOff => DomainState::ShutOff,
        }
    }
}
