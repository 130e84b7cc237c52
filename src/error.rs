use std::io;
use std::time::Duration;

/// Failures on the tunnel transport boundary.
///
/// Errors within a single request boundary (an upstream call failing, a
/// public client hanging up) are handled locally and never surface here;
/// anything of this type collapses the session.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// Dialling the edge failed; the origin enters its reconnect delay.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// EOF or reset: the remote side is gone.
    #[error("tunnel closed: {0}")]
    Closed(&'static str),

    /// A read or write deadline elapsed.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Malformed HTTP on the tunnel stream.
    #[error("framing error: {0}")]
    Framing(String),

    /// Transport-level I/O failure.
    #[error("tunnel i/o error: {0}")]
    Io(#[from] io::Error),
}
