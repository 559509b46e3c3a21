use std::path::Path;

use anyhow::Context as _;
use clap::Parser;
use runlens::config::AnalysisConfig;
use tracing::error;

mod analyze;
mod validate;

#[derive(Parser, Debug)]
struct CliArgs {
    /// The command to perform.
    #[command(subcommand)]
    command: Subcommand,
}

#[tokio::main]
async fn main() {
    // set up tracing
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let CliArgs { command } = CliArgs::parse();

    let result = match command {
        Subcommand::Analyze(analyze_args) => analyze::main(analyze_args).await,
        Subcommand::Validate(validate_args) => validate::main(validate_args).await,
        Subcommand::DefaultConfig => print_default_config(),
    };
    if let Err(err) = result {
        if let Some(cli_err) = err.downcast_ref::<clap::Error>() {
            cli_err.exit();
        } else {
            error!("error during execution: {:#}", err);
            std::process::exit(1);
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Compute per-job duration statistics and flag overdue runs.
    Analyze(analyze::Args),
    /// Only check that the header row of each file matches the configured
    /// layout.
    Validate(validate::Args),
    /// Print the default configuration as JSON, as a starting point for
    /// `--config`.
    DefaultConfig,
}

/// Loads the configuration file if one was given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_file(path).context("error loading configuration"),
        None => Ok(AnalysisConfig::default()),
    }
}

fn print_default_config() -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&AnalysisConfig::default())?;
    println!("{}", json);
    Ok(())
}
