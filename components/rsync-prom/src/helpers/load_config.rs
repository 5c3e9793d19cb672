// Local crates
use crate::orchestrator::WrapParams;
use crate::process::ExitCodePolicy;

// External crates
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Push gateway used when neither the file nor the command line set one.
pub const DEFAULT_PUSHGATEWAY: &str = "http://localhost:9091";
/// Default job label and metric name prefix.
pub const DEFAULT_JOB: &str = "rsync";

lazy_static! {
    /// The job name prefixes metric names, so it must be a valid metric name itself.
    static ref JOB_NAME: Regex = Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").unwrap();
}

/// Configuration problems found by [`Config::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The job name cannot prefix a metric name.
    #[error("job name {0:?} is not a valid prometheus metric name prefix")]
    InvalidJobName(String),
    /// The instance label is blank.
    #[error("instance label must not be empty")]
    EmptyInstance,
    /// The instance label cannot be part of a push gateway grouping key.
    #[error("instance label {0:?} must not contain '/'")]
    InvalidInstance(String),
    /// The push gateway address is not an http(s) URL.
    #[error("push gateway address {0:?} must be an http:// or https:// URL")]
    InvalidPushgateway(String),
}

/// `[pushgateway]` section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PushgatewayConfig {
    /// Push gateway base URL.
    pub url: String,
    /// Job label, also the prefix of the start and exit code metric names.
    pub job: String,
    /// Instance label identifying this rsync invocation.
    pub instance: String,
}

impl Default for PushgatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUSHGATEWAY.to_string(),
            job: DEFAULT_JOB.to_string(),
            instance: default_instance(),
        }
    }
}

/// `[rsync]` section.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RsyncConfig {
    /// Treat rsync exit code 24 (vanished source files) as success.
    pub exit_24_is_exit_0: bool,
    /// Copy rsync's stdout to ours while parsing it.
    pub echo_output: bool,
}

/// Log line format on stderr.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Format of the stderr output.
    pub format: LogFormat,
    /// Also write logs to a daily rotated file in this directory.
    pub log_dir: Option<PathBuf>,
}

/// rsync-prom configuration file. Every section and key is optional.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where and under which labels metrics are pushed.
    pub pushgateway: PushgatewayConfig,
    /// How rsync itself is treated.
    pub rsync: RsyncConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Command line values that take precedence over the configuration file.
/// Flags that are off leave the file's value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--prometheus-push-gateway`
    pub pushgateway: Option<String>,
    /// `--instance`
    pub instance: Option<String>,
    /// `--job`
    pub job: Option<String>,
    /// `--exit-24-is-exit-0`
    pub exit_24_is_exit_0: bool,
    /// `--echo-output`
    pub echo_output: bool,
    /// `--log-format`
    pub log_format: Option<LogFormat>,
    /// `--log-dir`
    pub log_dir: Option<PathBuf>,
}

/// `rsync@<hostname>`, or `rsync@` when the hostname is unknown.
pub fn default_instance() -> String {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| {
        tracing::warn!("Could not determine hostname for the default instance label");
        String::new()
    });
    format!("rsync@{hostname}")
}

impl Config {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading rsync-prom configuration file"
        );

        let config_str = match fs::read_to_string(path_ref) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read configuration file");
                return Err(e)
                    .with_context(|| format!("Failed to read config file at {:?}", path_ref));
            }
        };
        let config: Config = match toml::from_str(&config_str) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML configuration");
                return Err(e)
                    .with_context(|| format!("Failed to parse TOML from {:?}", path_ref));
            }
        };

        tracing::trace!(configuration_file_path = %path_ref.display(), "rsync-prom configuration file loaded successfully");
        Ok(config)
    }

    /// Loads `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Replaces file values with the flags that were given.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.pushgateway {
            self.pushgateway.url = url;
        }
        if let Some(instance) = overrides.instance {
            self.pushgateway.instance = instance;
        }
        if let Some(job) = overrides.job {
            self.pushgateway.job = job;
        }
        self.rsync.exit_24_is_exit_0 |= overrides.exit_24_is_exit_0;
        self.rsync.echo_output |= overrides.echo_output;
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if overrides.log_dir.is_some() {
            self.logging.log_dir = overrides.log_dir;
        }
    }

    /// Rejects settings the push gateway would refuse on every push.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gateway = &self.pushgateway;
        if !JOB_NAME.is_match(&gateway.job) {
            return Err(ConfigError::InvalidJobName(gateway.job.clone()));
        }
        if gateway.instance.trim().is_empty() {
            return Err(ConfigError::EmptyInstance);
        }
        // grouping label values travel as URL path segments
        if gateway.instance.contains('/') {
            return Err(ConfigError::InvalidInstance(gateway.instance.clone()));
        }
        let url = gateway.url.as_str();
        let has_scheme = url.starts_with("http://") || url.starts_with("https://");
        if !has_scheme || url.split_once("://").is_some_and(|(_, rest)| rest.is_empty()) {
            return Err(ConfigError::InvalidPushgateway(gateway.url.clone()));
        }
        Ok(())
    }

    /// Labels and gateway for the orchestrator.
    #[must_use]
    pub fn wrap_params(&self) -> WrapParams {
        WrapParams {
            pushgateway: self.pushgateway.url.clone(),
            instance: self.pushgateway.instance.clone(),
            job: self.pushgateway.job.clone(),
        }
    }

    /// Exit code remapping for the launcher.
    #[must_use]
    pub fn exit_code_policy(&self) -> ExitCodePolicy {
        ExitCodePolicy {
            exit_24_is_exit_0: self.rsync.exit_24_is_exit_0,
        }
    }
}
