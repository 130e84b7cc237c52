//! One job: replay a tunnel request against the local service and write
//! the response (or a synthesised error) back through the session writer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, EXPECT, HOST,
    TRANSFER_ENCODING,
};
use http::StatusCode;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use super::OriginContext;
use crate::codec::{RequestFrame, ResponseFrame};
use crate::session::SessionWriter;

/// Deadline for writing a full response back through the tunnel.
const RESPONSE_WRITE_DEADLINE: Duration = Duration::from_secs(30);
/// Deadline for writing a synthesised error response.
const ERROR_WRITE_DEADLINE: Duration = Duration::from_secs(5);

pub(crate) const BAD_GATEWAY_BODY: &str = "Bad Gateway - Local API Error";
pub(crate) const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Build the shared upstream client. Redirects are never followed: a
/// redirect response must reach the public client verbatim.
pub(crate) fn build_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

enum CallError {
    /// Building the outbound request failed: a logic-level problem, not
    /// the local service's fault.
    Build(String),
    Upstream(reqwest::Error),
}

/// Handle one inbound request frame end to end. Failures stay inside this
/// request boundary: whatever happens, something syntactically valid is
/// written back and the tunnel survives.
pub(crate) async fn handle_request<W>(
    frame: RequestFrame,
    writer: Arc<SessionWriter<W>>,
    ctx: Arc<OriginContext>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let method = frame.method.clone();
    let target = frame.target.clone();

    let written = match call_local(frame, &ctx).await {
        Ok(resp) => {
            debug!(
                method = %method,
                target = %target,
                status = resp.status.as_u16(),
                "upstream responded"
            );
            writer
                .write_frame(&resp.encode(), RESPONSE_WRITE_DEADLINE, "response write")
                .await
        }
        Err(CallError::Upstream(e)) => {
            warn!(method = %method, target = %target, error = %e, "local service call failed");
            writer
                .write_frame(
                    &synthesize(StatusCode::BAD_GATEWAY, BAD_GATEWAY_BODY).encode(),
                    ERROR_WRITE_DEADLINE,
                    "error write",
                )
                .await
        }
        Err(CallError::Build(e)) => {
            warn!(method = %method, target = %target, error = %e, "failed to build local request");
            writer
                .write_frame(
                    &synthesize(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).encode(),
                    ERROR_WRITE_DEADLINE,
                    "error write",
                )
                .await
        }
    };

    if let Err(e) = written {
        warn!(method = %method, target = %target, error = %e, "failed to write response to tunnel");
    }
}

async fn call_local(frame: RequestFrame, ctx: &OriginContext) -> Result<ResponseFrame, CallError> {
    let url = format!("{}{}", ctx.local_base, frame.target);
    url::Url::parse(&url).map_err(|e| CallError::Build(format!("invalid upstream url: {e}")))?;

    let response = ctx
        .client
        .request(frame.method, &url)
        .headers(forward_headers(frame.headers))
        .body(frame.body)
        .timeout(ctx.request_timeout)
        .send()
        .await
        .map_err(CallError::Upstream)?;

    let status = response.status();
    let reason = status.canonical_reason().map(str::to_owned);
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(CallError::Upstream)?;

    Ok(ResponseFrame {
        status,
        reason,
        headers,
        body,
    })
}

/// Headers for the upstream call: everything from the frame except the
/// hop-by-hop fields the client regenerates, plus the forwarding proto
/// (replace, never append). `X-Forwarded-For` passes through as set by
/// the edge.
fn forward_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION, EXPECT] {
        headers.remove(name);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    headers
}

fn synthesize(status: StatusCode, body: &str) -> ResponseFrame {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    ResponseFrame {
        status,
        reason: None,
        headers,
        body: Bytes::from(body.to_owned()),
    }
}
