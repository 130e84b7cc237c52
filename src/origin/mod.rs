//! Origin agent: the dial/serve/retry loop and session lifecycle.

pub mod dispatcher;
pub mod keepalive;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::FrameReader;
use crate::config::OriginConfig;
use crate::error::TunnelError;
use crate::session::SessionWriter;

/// Dial timeout for reaching the edge.
const CONNECT_DEADLINE: Duration = Duration::from_secs(10);
/// Grace period for in-flight jobs once a session ends: the per-request
/// timeout (default 30 s) plus margin for the response write.
const DRAIN_DEADLINE: Duration = Duration::from_secs(35);

/// Shared per-process state for upstream calls.
pub(crate) struct OriginContext {
    pub(crate) local_base: String,
    pub(crate) request_timeout: Duration,
    pub(crate) client: reqwest::Client,
}

/// Outcome of a tunnel session.
enum TunnelOutcome {
    /// Graceful shutdown requested by the local process.
    Shutdown,
    /// Remote side disconnected or connection lost; should reconnect.
    Disconnected,
}

/// Run the reconnect supervisor until shutdown.
pub async fn run(config: OriginConfig, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let remote = config.remote_addr()?;
    let ctx = Arc::new(OriginContext {
        local_base: config.local_base()?,
        request_timeout: config.timeout,
        client: upstream::build_client()?,
    });
    info!(remote = %remote, local = %ctx.local_base, "starting origin agent");

    loop {
        match connect_and_serve(&remote, &config, &ctx, &mut shutdown).await {
            Ok(TunnelOutcome::Shutdown) => {
                info!("origin shut down gracefully");
                return Ok(());
            }
            Ok(TunnelOutcome::Disconnected) => {
                info!("tunnel disconnected, will reconnect");
            }
            Err(e) => {
                warn!(error = %e, "tunnel connection lost");
            }
        }

        if *shutdown.borrow() {
            info!("shutdown requested, not reconnecting");
            return Ok(());
        }

        debug!(delay_ms = config.reconnect.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect) => {}
            _ = shutdown.changed() => {
                info!("shutdown requested during reconnect wait");
                return Ok(());
            }
        }
    }
}

/// One session: dial, serve until the tunnel dies or shutdown fires, then
/// drain in-flight jobs.
async fn connect_and_serve(
    remote: &str,
    config: &OriginConfig,
    ctx: &Arc<OriginContext>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<TunnelOutcome, TunnelError> {
    info!(remote = %remote, "dialling edge");
    let stream = match timeout(CONNECT_DEADLINE, TcpStream::connect(remote)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(TunnelError::Connect(e)),
        Err(_) => {
            return Err(TunnelError::Timeout {
                op: "dial",
                after: CONNECT_DEADLINE,
            })
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }
    info!("tunnel established");

    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(SessionWriter::new(write_half));
    let reader = FrameReader::new(read_half);

    let mut keepalive_task = keepalive::spawn(Arc::clone(&writer), config.keepalive, shutdown.clone());

    let mut jobs = JoinSet::new();
    let outcome = tokio::select! {
        result = dispatcher::run(reader, Arc::clone(&writer), Arc::clone(ctx), &mut jobs) => {
            match result {
                Ok(()) => Ok(TunnelOutcome::Disconnected),
                Err(e) => Err(e),
            }
        }
        // The keep-alive writer is the session's failure detector for the
        // write direction; if it exits, the socket is gone.
        _ = &mut keepalive_task => {
            warn!("keep-alive writer exited, ending session");
            Ok(TunnelOutcome::Disconnected)
        }
        _ = shutdown.changed() => {
            debug!("shutdown during dispatch");
            Ok(TunnelOutcome::Shutdown)
        }
    };

    keepalive_task.abort();
    writer.shutdown().await;
    drain(jobs).await;

    outcome
}

/// Draining: wait for every job spawned under this session, bounded by the
/// per-request timeout they each already observe.
async fn drain(mut jobs: JoinSet<()>) {
    if jobs.is_empty() {
        return;
    }
    debug!(count = jobs.len(), "waiting for in-flight jobs");
    if timeout(DRAIN_DEADLINE, async {
        while jobs.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("drain deadline elapsed, aborting remaining jobs");
        jobs.abort_all();
    }
}
