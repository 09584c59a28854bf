mod config;
mod engine;
mod exchange;
mod market;
mod pricing;
mod quoting;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::exchange::sim::SimExchange;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Quoting parameters: weights, rate, tick, groups.
    #[arg(long, default_value = "quoting.yml")]
    pub config: PathBuf,

    /// Instrument catalog and seed books for the simulated venue.
    #[arg(long, default_value = "catalog.json")]
    pub catalog: PathBuf,

    /// Probability that the simulated venue rejects an order insert.
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("index_maker=debug".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(&args.config)?;
    let exchange = Arc::new(SimExchange::from_file(&args.catalog)?.with_failure_rate(args.failure_rate));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received; stopping after the current group");
                shutdown.cancel();
            }
        }
    });

    let engine = Engine::new(exchange, config).await?;
    engine.run(shutdown).await
}
