//! epiflow CLI entrypoint

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use epiflow::cli::Cli;
use epiflow::EpiflowError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing on stderr so listings on stdout stay pipeable
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<EpiflowError>())
                .map(EpiflowError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
