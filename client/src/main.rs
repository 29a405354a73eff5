use std::process::ExitCode;

use clap::Parser;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

fn main() -> ExitCode {
    let env_filter = match EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()
    {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("Invalid RUST_LOG: {err}");
            return ExitCode::FAILURE;
        }
    };

    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting the default subscriber failed: {err}");
        return ExitCode::FAILURE;
    }

    let config = cli::Args::parse().into_config();

    match wlremote_client::run(config) {
        Ok(()) => ExitCode::SUCCESS,

        Err(err) => {
            tracing::error!("{err}");

            if let wlremote_client::Setup::MissingGlobals(_) = err {
                tracing::error!("Help: the compositor may not implement the xdg-shell protocol");
            }

            ExitCode::FAILURE
        }
    }
}
