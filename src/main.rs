mod age;
mod aggregate;
mod classify;
mod cli;
mod config;
mod dataset;
mod error;
mod lookups;
mod metrics;
mod query;
mod rank;
mod report;
mod server;
mod snapshot;
mod source;
#[cfg(test)]
mod testing;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Report(cmd) => report::run(cmd).await.context("report failed"),
    }
}
