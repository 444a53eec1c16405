use duration_str::deserialize_duration;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::health::endpoints::DEFAULT_PROBE_TIMEOUT;
use crate::http_server::config::ServerConfig;
use crate::instrumentation::LoggingConfig;

const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 5;
const DEFAULT_LEASE_NAME: &str = "cardinal-controller-leader";
const DEFAULT_LEASE_NAMESPACE: &str = "cardinal";
const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read the config file: `{0}`")]
    Io(#[from] std::io::Error),

    #[error("error retrieving config: `{0}`")]
    Yaml(#[from] serde_yaml::Error),
}

/// Runtime configuration of the controller process.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct CardinalConfig {
    pub logging: LoggingConfig,

    /// Read-only card facade.
    pub server: ServerConfig,

    pub leader_election: LeaderElectionConfig,

    /// How many registries reconcile in parallel.
    pub max_concurrent_reconciles: u16,

    /// Per-endpoint timeout of the health prober, e.g. "5s".
    #[serde(deserialize_with = "deserialize_duration")]
    pub probe_timeout: Duration,
}

impl Default for CardinalConfig {
    fn default() -> Self {
        CardinalConfig {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            leader_election: LeaderElectionConfig::default(),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct LeaderElectionConfig {
    pub enabled: bool,

    /// Name of the coordination lease backing the election.
    pub lease_name: String,

    /// Namespace holding the lease.
    pub namespace: String,

    /// How long a held lease stays valid without renewal, e.g. "15s".
    #[serde(deserialize_with = "deserialize_duration")]
    pub lease_duration: Duration,

    /// Delay between acquisition attempts and renewals, e.g. "2s".
    #[serde(deserialize_with = "deserialize_duration")]
    pub retry_interval: Duration,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        LeaderElectionConfig {
            enabled: true,
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            namespace: DEFAULT_LEASE_NAMESPACE.to_string(),
            lease_duration: DEFAULT_LEASE_DURATION,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl CardinalConfig {
    /// Loads the configuration from the provided YAML file, or the defaults
    /// when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(CardinalConfig::default()),
            Some(path) => Ok(serde_yaml::from_reader(File::open(path)?)?),
        }
    }
}
