use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use backhaul::config::OriginConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OriginConfig::parse();
    backhaul::telemetry::init(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        remote = %config.remote,
        local = %config.local,
        "backhaul origin starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        backhaul::wait_for_shutdown().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    backhaul::origin::run(config, shutdown_rx).await
}
