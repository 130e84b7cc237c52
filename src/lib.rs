//! Reverse HTTP tunnel.
//!
//! Two cooperating processes: the **edge** broker runs at a public address
//! and accepts both tunnel connections (from exactly one origin at a time)
//! and public HTTP traffic; the **origin** agent dials the edge outbound
//! from a private network, reads HTTP requests off the tunnel, replays them
//! against a local service, and writes the responses back. The tunnel
//! carries plain HTTP/1.1 messages over a single TCP stream with no extra
//! envelope.

pub mod codec;
pub mod config;
pub mod edge;
pub mod error;
pub mod origin;
pub mod session;
pub mod telemetry;

/// Single byte sent periodically by the origin to keep NAT state warm and
/// let the edge detect a dead connection. Never appears inside a message.
pub const KEEPALIVE_BYTE: u8 = 0x00;

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
