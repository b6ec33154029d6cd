use async_trait::async_trait;

use crate::error::Result;

/// Captured result of one command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Standard output, untrimmed.
    pub stdout: String,
    /// Exit status, if the transport could report one.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code,
        }
    }

    /// Best-effort success: only a known zero exit status counts.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// The abstraction for where commands run.
/// Implemented for SSH sessions and the local machine; tests script their own.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Runs one command line and waits for it to finish.
    ///
    /// A non-zero exit status is not an error; transport failures are.
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Runs one program with discrete arguments.
    ///
    /// No argument is ever split or interpreted. The default quotes each one for
    /// a POSIX shell and goes through [`Shell::execute`].
    async fn execute_argv(&self, argv: &[&str]) -> Result<CommandOutput> {
        self.execute(&quote_argv(argv)).await
    }

    /// Human-readable location, used in logs and error messages.
    fn describe(&self) -> String;

    /// Releases any held connection. The next command may reopen it.
    async fn close(&self) {}
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c)
}

/// Joins `argv` into one POSIX shell word per element.
pub fn quote_argv(argv: &[&str]) -> String {
    argv.iter()
        .map(|arg| {
            if !arg.is_empty() && arg.chars().all(is_shell_safe) {
                arg.to_string()
            } else {
                format!("'{}'", arg.replace('\'', "'\\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
