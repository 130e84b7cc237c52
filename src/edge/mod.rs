//! Edge broker: tunnel accept loop, public HTTP server, health endpoint.

pub mod bridge;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EdgeConfig;
use registry::TunnelRegistry;

/// Run the edge until the shutdown signal fires.
///
/// Binds both listeners up front so a taken port fails the process
/// immediately instead of surfacing on the first request.
pub async fn run(config: EdgeConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let registry = Arc::new(TunnelRegistry::new());

    let tunnel_listener = TcpListener::bind((config.bind.as_str(), config.tunnel_port)).await?;
    let public_listener = TcpListener::bind((config.bind.as_str(), config.public_port)).await?;
    info!(addr = %tunnel_listener.local_addr()?, "tunnel listener ready");
    info!(addr = %public_listener.local_addr()?, "public listener ready");

    let tunnels = tokio::spawn(accept_tunnels(
        Arc::clone(&registry),
        tunnel_listener,
        shutdown.clone(),
    ));
    let public = tokio::spawn(serve_public(
        Arc::clone(&registry),
        public_listener,
        shutdown,
    ));
    let _ = tokio::join!(tunnels, public);

    if let Some(current) = registry.current() {
        registry.remove(&current);
    }
    info!("edge stopped");
    Ok(())
}

/// Accept origin connections on the tunnel port. Each accept installs the
/// socket as the active session, evicting any predecessor.
async fn accept_tunnels(
    registry: Arc<TunnelRegistry>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    info!(peer = %peer, "origin connected");
                    TunnelRegistry::install(&registry, stream, peer.to_string());
                }
                Err(e) => warn!(error = %e, "tunnel accept error"),
            },
            _ = shutdown.changed() => {
                info!("tunnel listener shutting down");
                return;
            }
        }
    }
}

/// Serve public HTTP traffic, one spawned connection task per client.
async fn serve_public(
    registry: Arc<TunnelRegistry>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let registry = Arc::clone(&registry);
                            async move {
                                Ok::<_, hyper::Error>(handle_public(&registry, peer, req).await)
                            }
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!(peer = %peer, error = %e, "public connection error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "public accept error"),
            },
            _ = shutdown.changed() => {
                info!("public listener shutting down");
                return;
            }
        }
    }
}

async fn handle_public(
    registry: &Arc<TunnelRegistry>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if req.method() == Method::GET && req.uri().path() == "/health" {
        return health(registry);
    }
    bridge::forward(registry, peer, req).await
}

fn health(registry: &TunnelRegistry) -> Response<Full<Bytes>> {
    if registry.current().is_some() {
        bridge::text_response(StatusCode::OK, "Tunnel: Connected\n")
    } else {
        bridge::text_response(StatusCode::SERVICE_UNAVAILABLE, "Tunnel: Disconnected\n")
    }
}
