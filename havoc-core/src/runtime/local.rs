use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::traits::{CommandOutput, Shell};
use crate::error::{HavocError, Result};

/// Runs commands on this machine without a shell.
///
/// A command line is split on `|` into stages and every stage on whitespace;
/// each stage's stdout feeds the next one's stdin. No quoting, globbing or
/// variable expansion is performed. The exit status is the last stage's.
///
/// Commands carrying arbitrary values, such as credentials, go through
/// [`Shell::execute_argv`], which runs a single process and splits nothing.
#[derive(Debug, Default, Clone)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

/// Splits a command line into pipeline stages of `[program, args...]`.
pub(crate) fn parse_pipeline(command: &str) -> Result<Vec<Vec<String>>> {
    let stages: Vec<Vec<String>> = command
        .split('|')
        .map(|stage| stage.split_whitespace().map(str::to_string).collect())
        .collect();
    if stages.iter().any(|s: &Vec<String>| s.is_empty()) {
        return Err(HavocError::remote(command, "empty pipeline stage"));
    }
    Ok(stages)
}

async fn run_stage(command: &str, argv: &[String], input: Option<Vec<u8>>) -> Result<std::process::Output> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| HavocError::remote(command, format!("failed to spawn {}: {}", argv[0], e)))?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(bytes)) = (stdin, input) {
            // A stage may exit before reading everything (e.g. `head`); that is not a failure.
            let _ = stdin.write_all(&bytes).await;
        }
    };
    let (_, output) = tokio::join!(feed, child.wait_with_output());
    output.map_err(|e| HavocError::remote(command, e))
}

fn collect(output: std::process::Output) -> CommandOutput {
    CommandOutput::new(
        String::from_utf8_lossy(&output.stdout).into_owned(),
        output.status.code(),
    )
}

#[async_trait]
impl Shell for LocalShell {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Local: {}", command);
        let stages = parse_pipeline(command)?;

        let mut input = None;
        let mut last = None;
        for argv in &stages {
            let output = run_stage(command, argv, input.take()).await?;
            if !output.stderr.is_empty() {
                debug!(
                    "Local: stderr of {}: {}",
                    argv[0],
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            input = Some(output.stdout.clone());
            last = Some(output);
        }

        // parse_pipeline guarantees at least one stage.
        let output = last.ok_or_else(|| HavocError::remote(command, "empty pipeline"))?;
        Ok(collect(output))
    }

    async fn execute_argv(&self, argv: &[&str]) -> Result<CommandOutput> {
        let program = argv
            .first()
            .ok_or_else(|| HavocError::remote("", "empty argument vector"))?;
        debug!("Local: {} ({} args)", program, argv.len() - 1);

        let argv: Vec<String> = argv.iter().map(|a| a.to_string()).collect();
        // Errors name only the program; the arguments may hold secrets.
        let output = run_stage(program, &argv, None).await?;
        if !output.stderr.is_empty() {
            debug!(
                "Local: stderr of {}: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(collect(output))
    }

    fn describe(&self) -> String {
        "localhost".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_stages() {
        let stages = parse_pipeline("ps aux | grep [n]ova-api").unwrap();
        assert_eq!(
            stages,
            vec![
                vec!["ps".to_string(), "aux".to_string()],
                vec!["grep".to_string(), "[n]ova-api".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_pipeline_rejects_empty_stage() {
        assert!(parse_pipeline("ps aux | ").is_err());
        assert!(parse_pipeline("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_pipes_stdout_into_next_stage() {
        let out = LocalShell::new().execute("echo alpha beta | grep alpha").await.unwrap();
        assert_eq!(out.trimmed(), "alpha beta");
        assert!(out.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_grep_without_match_reports_exit_one() {
        let out = LocalShell::new().execute("echo alpha | grep [z]eta").await.unwrap();
        assert_eq!(out.trimmed(), "");
        assert_eq!(out.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_argv_is_never_split() {
        let out = LocalShell::new()
            .execute_argv(&["echo", "pa|echo INJECTED", "two  spaces"])
            .await
            .unwrap();
        assert_eq!(out.stdout, "pa|echo INJECTED two  spaces\n");
        assert!(out.succeeded());
    }

    #[tokio::test]
    async fn test_argv_errors_omit_arguments() {
        let err = LocalShell::new()
            .execute_argv(&["definitely-not-a-real-binary-havoc", "-P", "s3cret"])
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("s3cret"), "{err}");
        assert!(LocalShell::new().execute_argv(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_error() {
        let err = LocalShell::new()
            .execute("definitely-not-a-real-binary-havoc")
            .await
            .unwrap_err();
        assert!(matches!(err, HavocError::RemoteExecution { .. }));
    }
}
