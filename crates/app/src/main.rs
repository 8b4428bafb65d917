use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use murmur::Cli;
use snafu::Report;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "murmur=info";
const VERBOSE_LOG_FILTER: &str = "murmur=debug,murmur_client=debug,murmur_stream=debug";
// Blocking stdin reads never finish on their own once the user quits.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("murmur: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(murmur::commands::run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(?error, "command failed");
            eprintln!("murmur: {}", Report::from_error(error));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
