use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use std::path::PathBuf;
use thiserror::Error;

use crate::api::card::AgentCard;
use crate::api::registry::AgentRegistry;
use crate::config::{CardinalConfig, ConfigError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not read the controller config: `{0}`")]
    ConfigRead(#[from] ConfigError),

    #[error("Could not render the CRD manifests: `{0}`")]
    CrdRender(#[from] serde_yaml::Error),
}

/// What action was requested from the CLI?
pub enum CliCommand {
    /// Normal operation requested, run the controller with this config.
    RunController(CardinalConfig),
    /// A "one-shot" operation was performed, exit successfully.
    OneShot,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Path to the controller configuration file.
    #[arg(long, short, env = "CARDINAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the CustomResourceDefinition manifests to stdout.
    Crds,
}

impl Cli {
    pub fn init() -> Result<CliCommand, CliError> {
        let cli = Cli::parse();

        match cli.command {
            Some(Command::Crds) => {
                print!("{}", crd_manifests()?);
                Ok(CliCommand::OneShot)
            }
            None => Ok(CliCommand::RunController(CardinalConfig::load(
                cli.config.as_deref(),
            )?)),
        }
    }
}

/// The CRD manifests of both served kinds as a multi-document YAML stream,
/// ready for `kubectl apply`.
fn crd_manifests() -> Result<String, serde_yaml::Error> {
    Ok(format!(
        "{}---\n{}",
        serde_yaml::to_string(&AgentRegistry::crd())?,
        serde_yaml::to_string(&AgentCard::crd())?
    ))
}
