//! Write discipline for a tunnel session.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::TunnelError;

/// Serialises whole-message writes onto the tunnel socket.
///
/// Every message (request, response, or keep-alive byte) is already one
/// contiguous buffer and goes out in a single `write_all` under the lock,
/// so concurrent writers can never interleave bytes inside a message.
pub struct SessionWriter<W> {
    io: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> SessionWriter<W> {
    pub fn new(io: W) -> Self {
        Self { io: Mutex::new(io) }
    }

    /// Write one complete message within `deadline`.
    pub async fn write_frame(
        &self,
        bytes: &[u8],
        deadline: Duration,
        op: &'static str,
    ) -> Result<(), TunnelError> {
        let mut io = self.io.lock().await;
        match timeout(deadline, async {
            io.write_all(bytes).await?;
            io.flush().await
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TunnelError::Timeout {
                op,
                after: deadline,
            }),
        }
    }

    /// Half-close the write side so the remote reader sees EOF promptly.
    pub async fn shutdown(&self) {
        let mut io = self.io.lock().await;
        let _ = io.shutdown().await;
    }
}
