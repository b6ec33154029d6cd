//! Classifies probe output into a [`RunState`].
//!
//! The literal markers below are authoritative:
//!
//! | probe | output | state |
//! |---|---|---|
//! | `service <name> status` | contains `start/running` | running |
//! | `service <name> status` | contains `stop/waiting` | stopped |
//! | `service <name> status` | anything else | unknown |
//! | `ps aux \| grep [x]yz` | trimmed output contains the name | running |
//! | `ps aux \| grep [x]yz` | non-empty without the name, or empty with exit 1 | stopped |
//! | `ps aux \| grep [x]yz` | empty with any other or no exit status | unknown |
//!
//! On the local host the listing is read per `ps aux` row instead: our own row is
//! skipped and the name must start the program (or the script an interpreter
//! runs), so a command line that merely mentions the name, like
//! `havoc service nova-api start`, does not count.

use log::{debug, warn};

use crate::action::RunState;
use crate::error::Result;
use crate::runtime::{CommandOutput, Dispatcher};
use crate::topology::Topology;

pub const SERVICE_RUNNING_MARKER: &str = "start/running";
pub const SERVICE_STOPPED_MARKER: &str = "stop/waiting";

/// `grep` exits 1 when it selected no lines.
const GREP_NO_MATCH: i32 = 1;

/// A dialect-specific rule turning probe output into a state.
pub type Classifier = fn(unit: &str, output: &CommandOutput) -> RunState;

/// Upstart-style `service <name> status` output.
pub fn classify_service_status(_service: &str, output: &CommandOutput) -> RunState {
    let text = output.stdout.as_str();
    if text.contains(SERVICE_RUNNING_MARKER) {
        RunState::Running
    } else if text.contains(SERVICE_STOPPED_MARKER) {
        RunState::Stopped
    } else {
        RunState::Unknown
    }
}

/// Brackets the first character so the grep's own command line never matches:
/// `nova-api` becomes `[n]ova-api`.
pub fn grep_pattern(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("[{}]{}", first, chars.as_str()),
        None => String::new(),
    }
}

/// Output of `ps aux | grep <pattern>`.
pub fn classify_process_listing(process: &str, output: &CommandOutput) -> RunState {
    let listing = output.stdout.trim_end_matches('\n');
    if listing.contains(process) {
        RunState::Running
    } else if !listing.trim().is_empty() || output.exit_code == Some(GREP_NO_MATCH) {
        RunState::Stopped
    } else {
        RunState::Unknown
    }
}

/// `ps aux` columns: PID is the second, the command line starts at the eleventh.
const PS_PID_COLUMN: usize = 1;
const PS_COMMAND_COLUMN: usize = 10;

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

fn is_interpreter(program: &str) -> bool {
    program.starts_with("python") || matches!(program, "sh" | "bash" | "perl" | "ruby")
}

/// The program a `ps` command line runs: `argv[0]`, or the script handed to an interpreter.
fn program_of<'a>(argv: &[&'a str]) -> Option<&'a str> {
    let first = basename(*argv.first()?);
    if !is_interpreter(first) {
        return Some(first);
    }
    argv[1..]
        .iter()
        .find(|token| !token.starts_with('-'))
        .map(|token| basename(*token))
}

/// `ps aux | grep <pattern>` on this machine.
pub fn classify_local_listing(process: &str, output: &CommandOutput) -> RunState {
    classify_ps_rows(process, output, std::process::id())
}

pub(crate) fn classify_ps_rows(process: &str, output: &CommandOutput, own_pid: u32) -> RunState {
    let mut rows = 0;
    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        rows += 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let pid = fields.get(PS_PID_COLUMN).and_then(|p| p.parse::<u32>().ok());
        if pid == Some(own_pid) {
            continue;
        }
        let argv = fields.get(PS_COMMAND_COLUMN..).unwrap_or(&[]);
        if program_of(argv).map_or(false, |program| program.starts_with(process)) {
            return RunState::Running;
        }
    }
    if rows > 0 || output.exit_code == Some(GREP_NO_MATCH) {
        RunState::Stopped
    } else {
        RunState::Unknown
    }
}

/// Whether `service` is running, per the topology's status dialect.
pub async fn is_service_running(
    topology: &dyn Topology,
    dispatcher: &Dispatcher,
    service: &str,
) -> Result<RunState> {
    let plan = topology.service_status(service)?;
    let output = dispatcher.run(&plan).await?;
    let state = topology.classify_service(service, &output);
    log_state(service, state, &output);
    Ok(state)
}

/// Whether `process` appears in the process list.
pub async fn is_process_running(
    topology: &dyn Topology,
    dispatcher: &Dispatcher,
    process: &str,
) -> Result<RunState> {
    let plan = topology.process_listing(process)?;
    let output = dispatcher.run(&plan).await?;
    let state = topology.classify_process(process, &output);
    log_state(process, state, &output);
    Ok(state)
}

fn log_state(unit: &str, state: RunState, output: &CommandOutput) {
    match state {
        RunState::Unknown => warn!(
            "Probe: state of {} is unknown (exit {:?}): {:?}",
            unit,
            output.exit_code,
            output.trimmed()
        ),
        _ => debug!("Probe: {} is {}", unit, state),
    }
}
