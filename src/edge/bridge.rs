//! Pairs one public HTTP request with one tunnel response.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::registry::{Exchange, TunnelHandle, TunnelRegistry, REQUEST_WRITE_DEADLINE};
use crate::codec::{RequestFrame, ResponseFrame};
use crate::error::TunnelError;

pub(crate) const NO_TUNNEL_BODY: &str =
    "Service temporarily unavailable - tunnel not connected\n";
pub(crate) const TUNNEL_FAILURE_BODY: &str = "Bad Gateway - tunnel failure\n";

/// Forward one public request through the tunnel.
///
/// No tunnel → `503`. A failed exchange (write error, read error, or
/// deadline) declares the tunnel dead, drops it from the registry, and
/// answers `502`. The public client always receives a complete HTTP
/// response.
pub async fn forward(
    registry: &Arc<TunnelRegistry>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let Some(tunnel) = registry.current() else {
        return text_response(StatusCode::SERVICE_UNAVAILABLE, NO_TUNNEL_BODY);
    };

    let method = req.method().clone();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    debug!(method = %method, target = %target, peer = %peer, "public request");

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %peer, error = %e, "failed to read public request body");
            return text_response(StatusCode::BAD_REQUEST, "Bad Request\n");
        }
    };

    let mut frame = RequestFrame {
        method: method.clone(),
        target: target.clone(),
        headers: parts.headers,
        body,
    };
    // Only the edge knows the public client's address; set it (replace,
    // never append) for the local service behind the origin.
    if let Ok(value) = HeaderValue::from_str(&peer.to_string()) {
        frame.headers.insert("x-forwarded-for", value);
    }

    match exchange(&tunnel, frame).await {
        Ok(resp) => {
            debug!(
                method = %method,
                target = %target,
                status = resp.status.as_u16(),
                "bridged"
            );
            let mut out = Response::new(Full::new(resp.body));
            *out.status_mut() = resp.status;
            *out.headers_mut() = resp.headers;
            out
        }
        Err(e) => {
            warn!(method = %method, target = %target, error = %e, "tunnel exchange failed");
            registry.remove(&tunnel);
            text_response(StatusCode::BAD_GATEWAY, TUNNEL_FAILURE_BODY)
        }
    }
}

/// Run one request/response round trip on the tunnel.
///
/// The exchange lock is held across the whole trip: with no request ids on
/// the wire, at most one public request may be in flight per tunnel or
/// responses could pair with the wrong request.
async fn exchange(
    tunnel: &Arc<TunnelHandle>,
    frame: RequestFrame,
) -> Result<ResponseFrame, TunnelError> {
    let _guard = tunnel.exchange_lock.lock().await;

    let (reply_tx, reply_rx) = oneshot::channel();
    tunnel
        .exchange_tx
        .send(Exchange {
            head_request: frame.method == Method::HEAD,
            reply: reply_tx,
        })
        .await
        .map_err(|_| TunnelError::Closed("session reader gone"))?;

    tunnel
        .writer
        .write_frame(&frame.encode(), REQUEST_WRITE_DEADLINE, "request write")
        .await?;

    match reply_rx.await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::Closed("session closed mid-exchange")),
    }
}

pub(crate) fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body.to_owned())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
