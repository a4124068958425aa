use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LABELFUSE_LOG";
const DEFAULT_LOG_FILTER: &str = "labelfuse=warn";

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match labelfuse::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
