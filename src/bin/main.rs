use cardinal::cli::{Cli, CliCommand};
use cardinal::config::CardinalConfig;
use cardinal::controller::run;
use cardinal::instrumentation::try_init_tracing;
use std::error::Error;
use std::process::exit;
use tracing::{error, info};

fn main() {
    let cli_command = Cli::init().unwrap_or_else(|cli_error| {
        println!("Error parsing CLI arguments: {}", cli_error);
        exit(1);
    });

    let config = match cli_command {
        // Controller command call instructs normal operation.
        CliCommand::RunController(config) => config,

        // A "one-shot" operation was performed. Exit successfully.
        CliCommand::OneShot => exit(0),
    };

    if let Err(e) = _main(config) {
        error!("The controller main process exited with an error: {}", e);
        exit(1);
    }
}

// The actual main function, separated so errors propagate here and get logged
// once in string format instead of twice in "Rust mode".
fn _main(config: CardinalConfig) -> Result<(), Box<dyn Error>> {
    try_init_tracing(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run::run(config))?;

    info!("exiting gracefully");
    Ok(())
}
