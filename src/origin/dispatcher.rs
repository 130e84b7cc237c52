//! Dispatch loop: parse requests off the tunnel, spawn one job per frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{upstream, OriginContext};
use crate::codec::FrameReader;
use crate::error::TunnelError;
use crate::session::SessionWriter;

/// Read deadline per loop turn. Expiry with nothing buffered is just a
/// quiet tunnel; expiry mid-frame ends the session.
const IDLE_DEADLINE: Duration = Duration::from_secs(60);

/// Read requests until the tunnel closes or errors. `Ok(())` means the
/// remote closed cleanly; jobs land in `jobs` for the caller to drain.
pub(crate) async fn run<R, W>(
    mut reader: FrameReader<R>,
    writer: Arc<SessionWriter<W>>,
    ctx: Arc<OriginContext>,
    jobs: &mut JoinSet<()>,
) -> Result<(), TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match reader.read_request(IDLE_DEADLINE).await {
            Ok(Some(frame)) => {
                debug!(method = %frame.method, target = %frame.target, "request from tunnel");
                jobs.spawn(upstream::handle_request(
                    frame,
                    Arc::clone(&writer),
                    Arc::clone(&ctx),
                ));
            }
            Ok(None) => continue,
            Err(TunnelError::Closed(reason)) => {
                info!(reason, "tunnel closed by remote");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}
