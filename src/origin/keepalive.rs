//! Keep-alive writer: one `0x00` byte per interval.
//!
//! The byte keeps NAT state warm and feeds the edge's liveness deadline.
//! It goes through the session writer like any other message, so it can
//! never land inside a response.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::SessionWriter;
use crate::KEEPALIVE_BYTE;

/// Write deadline for a single keep-alive byte.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Spawn the keep-alive task. It exits on write failure or shutdown; the
/// supervisor watches the handle and ends the session when it does.
pub fn spawn<W>(
    writer: Arc<SessionWriter<W>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = writer
                        .write_frame(&[KEEPALIVE_BYTE], WRITE_DEADLINE, "keep-alive write")
                        .await
                    {
                        warn!(error = %e, "keep-alive failed");
                        return;
                    }
                }
                _ = shutdown.changed() => {
                    debug!("keep-alive task shutting down");
                    return;
                }
            }
        }
    })
}
