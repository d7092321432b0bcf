//! promfront worker entry point.

use std::path::PathBuf;

use clap::Parser;

use promfront::config;
use promfront::http::{app, AppServer};
use promfront::observability::logging;

#[derive(Parser)]
#[command(name = "promfront", version, about = "Worker-process HTTP front with aggregated metrics")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = config::load(args.config.as_deref())?;
    logging::init(&config.log);

    tracing::info!(
        app_bind = %config.server.bind_address,
        metrics_bind = %config.metrics.bind_address,
        workers = config.server.workers,
        threads = config.server.threads,
        shard_dir = ?config.metrics.shard_dir,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.threads)
        .enable_all()
        .build()?;

    let server = AppServer::new(config, app::demo_app())?;
    runtime.block_on(server.run())?;

    tracing::info!("Shutdown complete");
    Ok(())
}
