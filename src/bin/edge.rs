use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use backhaul::config::EdgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EdgeConfig::parse();
    backhaul::telemetry::init(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        tunnel_port = config.tunnel_port,
        public_port = config.public_port,
        "backhaul edge starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        backhaul::wait_for_shutdown().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    backhaul::edge::run(config, shutdown_rx).await
}
