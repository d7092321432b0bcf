//! Shared utilities for integration testing.

use std::path::Path;
use std::time::Duration;

use promfront::config::ServiceConfig;
use promfront::http::{app, AppServer};

/// Start a worker on the given localhost ports, fronting the demo app.
///
/// The server runs on a background task; tests talk to it over real
/// sockets. Each test uses its own port pair.
pub async fn start_worker(app_port: u16, metrics_port: u16, shard_dir: Option<&Path>) {
    let mut config = ServiceConfig::default();
    config.server.bind_address = format!("127.0.0.1:{app_port}");
    config.metrics.bind_address = format!("127.0.0.1:{metrics_port}");
    config.metrics.shard_dir = shard_dir.map(|p| p.to_path_buf());

    let server = AppServer::new(config, app::demo_app()).expect("worker setup failed");
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Wait for both listeners to come up.
    tokio::time::sleep(Duration::from_millis(300)).await;
}
