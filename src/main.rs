//! `ipfrag` binary.
//!
//! Parses the command line, installs logging and runs the pipeline until
//! the requested datagram count is processed or a signal arrives.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use ipfrag::{Pipeline, PipelineConfig, cli::Cli};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match PipelineConfig::try_from(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}\n");
            let _ = Cli::command().print_help();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(config.log_level))
        .init();

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "cannot start pipeline");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run().await {
        Ok(summary) => {
            info!(
                processed = summary.counters.processed,
                reassembled = summary.counters.reassembled,
                interrupted = summary.interrupted,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "pipeline failed");
            ExitCode::FAILURE
        }
    }
}
