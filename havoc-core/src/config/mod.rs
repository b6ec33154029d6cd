//! Configuration for havoc.
//!
//! Read from an INI file (the format follows its extension when that is `toml`,
//! `json`, `yaml` or `ini`) and layered with `HAVOC_<SECTION>__<KEY>` environment
//! overrides.

pub mod nodes;

use config::{Config, Environment, File, FileFormat};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HavocError, Result};
use crate::poller::PollPolicy;
use crate::topology::DeployMode;

pub use nodes::{NodesConfig, Role, Target};

pub const DEFAULT_CONFIG_PATH: &str = "etc/havoc.conf";
pub const CONFIG_PATH_ENV: &str = "HAVOC_CONFIG";

fn default_compute_source_dir() -> String {
    "/opt/stack/nova".to_string()
}

fn default_compute_config_path() -> String {
    "/etc/nova/nova.conf".to_string()
}

fn default_compute_bin_dir() -> String {
    "/usr/local/bin/".to_string()
}

fn default_build_interval() -> f64 {
    10.0
}

fn default_build_timeout() -> f64 {
    300.0
}

fn default_ssh_user() -> String {
    "root".to_string()
}

/// The `[environment]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub deploy_mode: DeployMode,
    /// Prefix service commands with `sudo`.
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default = "default_compute_source_dir")]
    pub compute_source_dir: String,
    #[serde(default = "default_compute_config_path")]
    pub compute_config_path: String,
    #[serde(default = "default_compute_bin_dir")]
    pub compute_bin_dir: String,
    #[serde(default)]
    pub controller_hostname: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            deploy_mode: DeployMode::default(),
            use_sudo: false,
            compute_source_dir: default_compute_source_dir(),
            compute_config_path: default_compute_config_path(),
            compute_bin_dir: default_compute_bin_dir(),
            controller_hostname: None,
        }
    }
}

/// The `[compute]` section: resource build polling.
#[derive(Debug, Deserialize, Clone)]
pub struct ComputeConfig {
    /// Seconds between status polls.
    #[serde(default = "default_build_interval")]
    pub build_interval: f64,
    /// Seconds before a build is considered stuck.
    #[serde(default = "default_build_timeout")]
    pub build_timeout: f64,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            build_interval: default_build_interval(),
            build_timeout: default_build_timeout(),
            ssh_user: default_ssh_user(),
        }
    }
}

impl ComputeConfig {
    pub fn poll_policy(&self) -> Result<PollPolicy> {
        let interval = seconds("build_interval", self.build_interval)?;
        let timeout = seconds("build_timeout", self.build_timeout)?;
        Ok(PollPolicy::new(interval, timeout))
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| HavocError::Configuration(format!("{key} must be a non-negative number of seconds, got {value}")))
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HavocConfig {
    #[serde(default)]
    pub nodes: NodesConfig,
    /// Credentials for dependent services, e.g. `mysql_password`.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
}

impl HavocConfig {
    /// Loads from `path`, else `$HAVOC_CONFIG`, else [`DEFAULT_CONFIG_PATH`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        if !path.is_file() {
            return Err(HavocError::Configuration(format!(
                "config file not found at {}",
                path.display()
            )));
        }
        debug!("Loading config from {}", path.display());

        let settings = Config::builder()
            .add_source(File::from(path.as_path()).format(format_for(&path)))
            .add_source(env_overrides())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parses INI text, still subject to environment overrides.
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Ini))
            .add_source(env_overrides())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn service_credential(&self, key: &str) -> Option<&str> {
        self.services.get(key).map(String::as_str)
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix("HAVOC")
        .prefix_separator("_")
        .separator("__")
}

fn format_for(path: &Path) -> FileFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => FileFormat::Toml,
        Some("json") => FileFormat::Json,
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        _ => FileFormat::Ini,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[nodes]
api = 10.1.0.2:stack:pw
compute = 10.1.0.3:stack:pw,10.1.0.4:stack:pw
ssh_timeout = 12

[services]
mysql_password = nova

[environment]
deploy_mode = devstack-local
use_sudo = true

[compute]
build_interval = 0.5
build_timeout = 60
"#;

    #[test]
    fn test_parse_ini_sections() {
        let cfg = HavocConfig::from_ini_str(SAMPLE).unwrap();
        assert_eq!(cfg.nodes.ssh_timeout(), Duration::from_secs(12));
        assert_eq!(cfg.nodes.expect_one(Role::Controller).unwrap().host(), "10.1.0.2");
        assert_eq!(cfg.nodes.targets(Role::Compute).unwrap().len(), 2);
        assert_eq!(cfg.environment.deploy_mode, DeployMode::DevstackLocal);
        assert!(cfg.environment.use_sudo);
        assert_eq!(cfg.environment.compute_source_dir, "/opt/stack/nova");
        assert_eq!(cfg.service_credential("mysql_password"), Some("nova"));

        let policy = cfg.compute.poll_policy().unwrap();
        assert_eq!(policy.interval(), Duration::from_millis(500));
        assert_eq!(policy.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let cfg = HavocConfig::from_ini_str("[nodes]\npower = 10.9.9.9:admin:admin\n").unwrap();
        assert_eq!(cfg.environment.deploy_mode, DeployMode::PkgMulti);
        assert_eq!(cfg.nodes.ssh_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.compute.build_timeout, 300.0);
        assert!(cfg.services.is_empty());
    }

    #[test]
    fn test_unknown_deploy_mode_rejected() {
        let err = HavocConfig::from_ini_str("[environment]\ndeploy_mode = bare-metal\n").unwrap_err();
        assert!(matches!(err, HavocError::ConfigLoad(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = HavocConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.nodes.targets(Role::Compute).unwrap()[1].host(), "10.1.0.4");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = HavocConfig::load(Some(Path::new("/nonexistent/havoc.conf"))).unwrap_err();
        assert!(matches!(err, HavocError::Configuration(_)));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let compute = ComputeConfig {
            build_interval: -1.0,
            ..Default::default()
        };
        assert!(compute.poll_policy().is_err());
    }
}
