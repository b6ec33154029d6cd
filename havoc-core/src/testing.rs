//! Scripted shell for tests. Enabled by the `test-utils` feature.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::error::{HavocError, Result};
use crate::runtime::{CommandOutput, Shell};

/// A [`Shell`] that replays canned outputs and records every command it was given.
///
/// Each command has a queue of outputs; the last one repeats once the queue is
/// drained. Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedShell {
    script: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    failing: Mutex<HashSet<String>>,
    issued: Mutex<Vec<String>>,
    argvs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `stdout` with exit status 0 for `command`.
    pub fn respond(&self, command: &str, stdout: &str) -> &Self {
        self.respond_with(command, CommandOutput::new(stdout, Some(0)))
    }

    pub fn respond_with(&self, command: &str, output: CommandOutput) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Makes `command` fail in transit.
    pub fn fail_on(&self, command: &str) -> &Self {
        self.failing.lock().unwrap().insert(command.to_string());
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    /// Argument vectors given to [`Shell::execute_argv`], in order.
    ///
    /// Each is also logged in [`ScriptedShell::issued`] joined by single spaces.
    pub fn issued_argv(&self) -> Vec<Vec<String>> {
        self.argvs.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Shell for ScriptedShell {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.issued.lock().unwrap().push(command.to_string());
        if self.failing.lock().unwrap().contains(command) {
            return Err(HavocError::remote(command, "scripted failure"));
        }

        let mut script = self.script.lock().unwrap();
        let output = match script.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::new("", Some(0)),
        };
        Ok(output)
    }

    async fn execute_argv(&self, argv: &[&str]) -> Result<CommandOutput> {
        self.argvs
            .lock()
            .unwrap()
            .push(argv.iter().map(|a| a.to_string()).collect());
        self.execute(&argv.join(" ")).await
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
