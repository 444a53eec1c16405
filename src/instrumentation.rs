//! Tools to set up a [tracing_subscriber] to report instrumentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs from these crates follow the configured level, logs of other crates
/// are restricted to warnings. `RUST_LOG` overrides the whole filter.
const LOGGING_ENABLED_CRATES: &[&str] = &["cardinal"];

/// Represents errors while setting up tracing.
#[derive(Error, Debug)]
pub enum TracingError {
    #[error("invalid logging directive: `{0}`")]
    InvalidDirective(String),

    #[error("could not start tracing: {0}")]
    Init(String),
}

/// Defines the logging configuration of the controller.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct LoggingConfig {
    /// Log level applied to this project's crates.
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl LoggingConfig {
    fn directives(&self) -> String {
        let crates = LOGGING_ENABLED_CRATES
            .iter()
            .map(|name| format!("{name}={}", self.level.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        format!("warn,{crates}")
    }
}

/// Initializes the global tracing subscriber with a stdout layer filtered by
/// the configured level.
pub fn try_init_tracing(config: &LoggingConfig) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .map_err(|err| TracingError::InvalidDirective(err.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| TracingError::Init(err.to_string()))
}
