//! Single-slot tunnel registry with last-writer-wins replacement.
//!
//! The edge holds zero or one active tunnel session. A newly connecting
//! origin evicts any predecessor: the prior tunnel is almost certainly
//! stale (the origin's reconnect loop has already written it off), and
//! making the newcomer wait would strand the service.
//!
//! Each installed session gets a spawned reader task that is the sole
//! owner of the socket's read side. Idle, it consumes keep-alive bytes
//! under a liveness deadline; handed an exchange by the bridge, it reads
//! exactly one response frame and fulfils the exchange's reply channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::codec::{FrameReader, Liveness, ResponseFrame};
use crate::error::TunnelError;
use crate::session::SessionWriter;

/// The origin's keep-alive (default every 10 s) must land within this.
pub const LIVENESS_DEADLINE: Duration = Duration::from_secs(30);
/// Deadline for writing a bridged request onto the tunnel.
pub const REQUEST_WRITE_DEADLINE: Duration = Duration::from_secs(30);
/// Per-read deadline while a response frame arrives.
const RESPONSE_READ_DEADLINE: Duration = Duration::from_secs(30);

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// One pending bridge exchange handed to the session's reader task.
pub(crate) struct Exchange {
    /// Responses to HEAD carry headers only.
    pub(crate) head_request: bool,
    pub(crate) reply: oneshot::Sender<Result<ResponseFrame, TunnelError>>,
}

/// An installed tunnel session.
pub struct TunnelHandle {
    id: u64,
    peer: String,
    established_at: Instant,
    pub(crate) writer: SessionWriter<BoxWrite>,
    /// Serialises bridge exchanges: responses carry no request id, so
    /// pairing depends on strict alternation on the stream.
    pub(crate) exchange_lock: tokio::sync::Mutex<()>,
    pub(crate) exchange_tx: mpsc::Sender<Exchange>,
    closed_tx: watch::Sender<bool>,
}

impl TunnelHandle {
    pub fn uptime(&self) -> Duration {
        self.established_at.elapsed()
    }

    fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

/// Holds the zero-or-one active tunnel session.
pub struct TunnelRegistry {
    slot: Mutex<Option<Arc<TunnelHandle>>>,
    next_id: AtomicU64,
}

impl Default for TunnelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Install a freshly accepted tunnel connection, evicting any
    /// predecessor, and spawn its reader task.
    pub fn install<S>(registry: &Arc<Self>, stream: S, peer: String) -> Arc<TunnelHandle>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (exchange_tx, exchange_rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);

        let handle = Arc::new(TunnelHandle {
            id: registry.next_id.fetch_add(1, Ordering::Relaxed),
            peer,
            established_at: Instant::now(),
            writer: SessionWriter::new(Box::new(write_half) as BoxWrite),
            exchange_lock: tokio::sync::Mutex::new(()),
            exchange_tx,
            closed_tx,
        });

        let prev = registry.slot.lock().unwrap().replace(Arc::clone(&handle));
        if let Some(prev) = prev {
            info!(
                peer = %prev.peer,
                uptime_s = prev.uptime().as_secs(),
                "closing previous tunnel, replaced by a newer connection"
            );
            prev.close();
        }

        tokio::spawn(reader_task(
            Arc::clone(registry),
            Arc::clone(&handle),
            FrameReader::new(Box::new(read_half) as BoxRead),
            exchange_rx,
            closed_rx,
        ));

        handle
    }

    /// The active session, if any.
    pub fn current(&self) -> Option<Arc<TunnelHandle>> {
        self.slot.lock().unwrap().clone()
    }

    /// Close `handle`, releasing the slot only if it is still the
    /// occupant. A late failure report from a replaced session must not
    /// clobber a healthy successor.
    pub fn remove(&self, handle: &Arc<TunnelHandle>) {
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.as_ref().is_some_and(|cur| Arc::ptr_eq(cur, handle)) {
                *slot = None;
            }
        }
        handle.close();
    }
}

/// Sole owner of a session's read side: liveness monitor while idle,
/// response reader during a bridge exchange.
async fn reader_task(
    registry: Arc<TunnelRegistry>,
    handle: Arc<TunnelHandle>,
    mut reader: FrameReader<BoxRead>,
    mut exchange_rx: mpsc::Receiver<Exchange>,
    mut closed_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = closed_rx.changed() => {
                debug!(session = handle.id, "session closed, reader exiting");
                break;
            }
            exchange = exchange_rx.recv() => match exchange {
                None => break,
                Some(exchange) => {
                    match reader.read_response(exchange.head_request, RESPONSE_READ_DEADLINE).await {
                        Ok(frame) => {
                            let _ = exchange.reply.send(Ok(frame));
                        }
                        Err(e) => {
                            warn!(session = handle.id, error = %e, "response read failed");
                            let _ = exchange.reply.send(Err(e));
                            break;
                        }
                    }
                }
            },
            liveness = reader.await_keepalive(LIVENESS_DEADLINE) => match liveness {
                Ok(Liveness::KeepAlive) => {}
                Ok(Liveness::DataReady) => {
                    // The bridge enqueues its exchange before writing the
                    // request, so bytes with no exchange pending mean the
                    // stream is corrupt.
                    warn!(session = handle.id, "unsolicited bytes on tunnel, dropping session");
                    break;
                }
                Err(e) => {
                    info!(
                        session = handle.id,
                        peer = %handle.peer,
                        uptime_s = handle.uptime().as_secs(),
                        reason = %e,
                        "tunnel disconnected"
                    );
                    break;
                }
            },
        }
    }

    registry.remove(&handle);
    handle.writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RequestFrame;
    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(20);

    fn install(registry: &Arc<TunnelRegistry>) -> (Arc<TunnelHandle>, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let handle = TunnelRegistry::install(registry, local, "test-peer".to_string());
        (handle, remote)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(TICK).await;
        }
    }

    #[tokio::test]
    async fn test_slot_holds_at_most_one() {
        let registry = Arc::new(TunnelRegistry::new());
        assert!(registry.current().is_none());

        let (handle, _remote) = install(&registry);
        assert!(Arc::ptr_eq(&registry.current().unwrap(), &handle));
    }

    #[tokio::test]
    async fn test_install_replaces_and_closes_predecessor() {
        let registry = Arc::new(TunnelRegistry::new());
        let (first, mut first_remote) = install(&registry);
        let (second, _second_remote) = install(&registry);

        assert!(Arc::ptr_eq(&registry.current().unwrap(), &second));
        assert!(!Arc::ptr_eq(&registry.current().unwrap(), &first));

        // The replaced session's socket is observably closed: its remote
        // end reads EOF once the reader task winds down.
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), first_remote.read(&mut buf))
            .await
            .expect("replaced tunnel was not closed")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_late_remove_of_replaced_session_is_a_noop() {
        let registry = Arc::new(TunnelRegistry::new());
        let (first, _r1) = install(&registry);
        let (second, _r2) = install(&registry);

        registry.remove(&first);
        assert!(Arc::ptr_eq(&registry.current().unwrap(), &second));
    }

    #[tokio::test]
    async fn test_remote_close_clears_the_slot() {
        let registry = Arc::new(TunnelRegistry::new());
        let (_handle, remote) = install(&registry);
        drop(remote);
        wait_until(|| registry.current().is_none()).await;
    }

    #[tokio::test]
    async fn test_keepalive_bytes_keep_the_session_installed() {
        let registry = Arc::new(TunnelRegistry::new());
        let (_handle, mut remote) = install(&registry);

        for _ in 0..3 {
            remote.write_all(&[crate::KEEPALIVE_BYTE]).await.unwrap();
            tokio::time::sleep(TICK).await;
        }
        assert!(registry.current().is_some());
    }

    #[tokio::test]
    async fn test_unsolicited_bytes_drop_the_session() {
        let registry = Arc::new(TunnelRegistry::new());
        let (_handle, mut remote) = install(&registry);

        remote.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        wait_until(|| registry.current().is_none()).await;
    }

    #[tokio::test]
    async fn test_exchange_pairs_request_with_response() {
        let registry = Arc::new(TunnelRegistry::new());
        let (handle, remote) = install(&registry);

        // Fake origin: read one request off the tunnel, answer it.
        let origin = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(remote);
            let mut reader = FrameReader::new(read_half);
            let req = reader
                .read_request(Duration::from_secs(2))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(req.target, "/widget");
            write_half
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let _guard = handle.exchange_lock.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .exchange_tx
            .send(Exchange {
                head_request: false,
                reply: reply_tx,
            })
            .await
            .unwrap();

        let frame = RequestFrame {
            method: Method::GET,
            target: "/widget".into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        handle
            .writer
            .write_frame(&frame.encode(), REQUEST_WRITE_DEADLINE, "request write")
            .await
            .unwrap();

        let response = reply_rx.await.unwrap().unwrap();
        assert_eq!(response.status, http::StatusCode::OK);
        assert_eq!(&response.body[..], b"ok");
        origin.await.unwrap();
    }
}
