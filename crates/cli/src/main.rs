use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            1
        }
    };

    // Exit directly: the blocking stdin reader would otherwise hold the
    // runtime open until the next line arrives.
    std::process::exit(code);
}
