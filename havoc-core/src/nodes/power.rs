use log::{debug, info, warn};
use std::sync::Arc;

use crate::config::{HavocConfig, Role, Target};
use crate::error::Result;
use crate::runtime::{LocalShell, Shell};

pub const POWER_ON_REPLY: &str = "Chassis Power Control: Up/On";
pub const POWER_OFF_REPLY: &str = "Chassis Power Control: Down/Off";
pub const POWER_IS_ON_REPLY: &str = "Chassis Power is on";

const IPMITOOL: &str = "ipmitool";

/// Drives a node's BMC with `ipmitool`, run on this machine.
///
/// Replies are classified by the literal fragments above. Anything else reads as
/// `false`; only a failure to run the tool at all is an error. The password is
/// passed as its own argument and never reaches a command line parser.
pub struct PowerController {
    target: Target,
    shell: Arc<dyn Shell>,
    program: String,
}

impl PowerController {
    pub fn new(target: Target) -> Self {
        Self::with_shell(target, Arc::new(LocalShell::new()))
    }

    pub fn with_shell(target: Target, shell: Arc<dyn Shell>) -> Self {
        Self {
            target,
            shell,
            program: IPMITOOL.to_string(),
        }
    }

    /// Runs `program` in place of `ipmitool`, with the same arguments.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn connect(config: &HavocConfig) -> Result<Self> {
        Ok(Self::new(config.nodes.expect_one(Role::Power)?))
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub async fn power_on(&self) -> Result<bool> {
        self.ipmi("power on", POWER_ON_REPLY).await
    }

    pub async fn power_off(&self) -> Result<bool> {
        self.ipmi("power off", POWER_OFF_REPLY).await
    }

    pub async fn is_power_on(&self) -> Result<bool> {
        self.ipmi("power status", POWER_IS_ON_REPLY).await
    }

    fn argv<'a>(&'a self, password: &'a str, subcommand: &'a str) -> Vec<&'a str> {
        let mut argv = vec![
            self.program.as_str(),
            "-I",
            "lan",
            "-H",
            self.target.host(),
            "-U",
            self.target.username(),
            "-P",
            password,
        ];
        argv.extend(subcommand.split(' '));
        argv
    }

    async fn ipmi(&self, subcommand: &str, expected: &str) -> Result<bool> {
        debug!("Power: {}", self.argv("****", subcommand).join(" "));
        let output = self
            .shell
            .execute_argv(&self.argv(self.target.password(), subcommand))
            .await?;

        let matched = output.trimmed().contains(expected);
        if matched {
            info!("Power: {} on {} acknowledged", subcommand, self.target.host());
        } else {
            warn!(
                "Power: {} on {} got unexpected reply {:?}",
                subcommand,
                self.target.host(),
                output.trimmed()
            );
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedShell;
    use std::time::Duration;

    fn controller() -> (PowerController, Arc<ScriptedShell>) {
        let shell = Arc::new(ScriptedShell::new());
        let target = Target::new("10.0.0.9", "admin", "s3cret", Duration::from_secs(5), Role::Power);
        (PowerController::with_shell(target, shell.clone()), shell)
    }

    #[tokio::test]
    async fn test_power_off_command_line() {
        let (power, shell) = controller();
        shell.respond(
            "ipmitool -I lan -H 10.0.0.9 -U admin -P s3cret power off",
            "Chassis Power Control: Down/Off\n",
        );

        assert!(power.power_off().await.unwrap());
        assert_eq!(shell.issued().len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_false() {
        let (power, shell) = controller();
        shell.respond(
            "ipmitool -I lan -H 10.0.0.9 -U admin -P s3cret power status",
            "Chassis Power is off\n",
        );
        assert!(!power.is_power_on().await.unwrap());
    }

    #[tokio::test]
    async fn test_password_is_one_argument() {
        let shell = Arc::new(ScriptedShell::new());
        let target = Target::new("10.0.0.9", "admin", "pa|ss word", Duration::from_secs(5), Role::Power);
        let power = PowerController::with_shell(target, shell.clone());

        power.is_power_on().await.unwrap();
        let argv = &shell.issued_argv()[0];
        assert_eq!(argv[0], "ipmitool");
        assert_eq!(argv[7..9], ["-P".to_string(), "pa|ss word".to_string()]);
        assert_eq!(argv[9..], ["power".to_string(), "status".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_password_cannot_inject_a_reply() {
        let target = Target::new(
            "10.0.0.9",
            "admin",
            "pa|echo INJECTED Chassis Power is on",
            Duration::from_secs(5),
            Role::Power,
        );
        let power = PowerController::new(target).with_program("true");
        assert!(!power.is_power_on().await.unwrap());
    }

    #[tokio::test]
    async fn test_tool_failure_is_error() {
        let (power, shell) = controller();
        shell.fail_on("ipmitool -I lan -H 10.0.0.9 -U admin -P s3cret power on");
        assert!(power.power_on().await.is_err());
    }
}
