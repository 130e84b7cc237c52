//! HTTP/1.1 frame codec for the tunnel byte stream.
//!
//! The tunnel carries whole HTTP/1.1 messages with no extra envelope:
//! request messages edge→origin, response messages origin→edge, and single
//! `0x00` keep-alive bytes that may appear between messages but never
//! inside one. Parsing is incremental over an internal buffer; writing
//! serialises the entire message into one contiguous buffer so the session
//! write lock makes each message atomic on the wire.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TunnelError;
use crate::KEEPALIVE_BYTE;

/// Cap on a message's request/status line plus header section.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Header slots handed to httparse.
const MAX_HEADERS: usize = 128;

/// A complete HTTP request carried over the tunnel.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub method: Method,
    /// Origin-form request target, e.g. `/api/users?id=7`.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A complete HTTP response carried over the tunnel.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub status: StatusCode,
    /// Reason phrase as received; `None` means use the canonical one.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestFrame {
    /// Serialise into one contiguous buffer.
    ///
    /// Message framing is normalised: `Transfer-Encoding` is dropped and
    /// `Content-Length` set to the actual body length, since the body is
    /// already fully buffered. Everything else passes through unchanged.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.target.as_bytes());
        buf.put_slice(b" HTTP/1.1\r\n");
        put_headers(&mut buf, &self.headers);
        buf.put_slice(format!("content-length: {}\r\n\r\n", self.body.len()).as_bytes());
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl ResponseFrame {
    /// Serialise into one contiguous buffer, normalising framing the same
    /// way as [`RequestFrame::encode`]. Status codes that forbid a body
    /// (1xx, 204, 304) are emitted without `Content-Length` or body bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        let reason = self
            .reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("");
        buf.put_slice(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), reason).as_bytes());
        put_headers(&mut buf, &self.headers);
        if bodyless_status(self.status) {
            buf.put_slice(b"\r\n");
        } else {
            buf.put_slice(format!("content-length: {}\r\n\r\n", self.body.len()).as_bytes());
            buf.put_slice(&self.body);
        }
        buf.freeze()
    }
}

fn put_headers(buf: &mut BytesMut, headers: &HeaderMap) {
    for (name, value) in headers.iter() {
        if name == &CONTENT_LENGTH || name == &TRANSFER_ENCODING {
            continue;
        }
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

fn bodyless_status(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// What [`FrameReader::await_keepalive`] observed on the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Liveness {
    /// Only keep-alive bytes arrived; they were consumed.
    KeepAlive,
    /// Message bytes are buffered and ready to parse.
    DataReady,
}

enum BodyFraming {
    None,
    Length(usize),
    Chunked,
}

/// Incremental HTTP/1.1 reader over the tunnel's read half.
///
/// The buffer survives across calls, so a message that arrives while no
/// read is in progress (or split across reads) is never lost.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(io: R) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Read one complete request. Returns `Ok(None)` when `idle` elapses
    /// with no frame bytes buffered (a quiet tunnel, not an error). A
    /// deadline that expires mid-frame is a [`TunnelError::Timeout`].
    pub async fn read_request(
        &mut self,
        idle: Duration,
    ) -> Result<Option<RequestFrame>, TunnelError> {
        loop {
            self.discard_keepalives();
            if let Some((header_len, mut frame)) = parse_request_head(&self.buf)? {
                let framing = request_body_framing(&frame.headers)?;
                self.buf.advance(header_len);
                frame.body = self.read_body(framing, idle).await?;
                return Ok(Some(frame));
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(TunnelError::Framing("header section too large".into()));
            }
            match tokio::time::timeout(idle, self.fill()).await {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) if self.buf.is_empty() => {
                    return Err(TunnelError::Closed("remote closed the tunnel"));
                }
                Ok(Ok(false)) => return Err(TunnelError::Closed("eof mid-frame")),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) if self.buf.is_empty() => return Ok(None),
                Err(_) => {
                    return Err(TunnelError::Timeout {
                        op: "request read",
                        after: idle,
                    })
                }
            }
        }
    }

    /// Read one complete response. `head_request` suppresses the body the
    /// way a client must for responses to HEAD. `per_read` bounds every
    /// socket read while the message arrives.
    pub async fn read_response(
        &mut self,
        head_request: bool,
        per_read: Duration,
    ) -> Result<ResponseFrame, TunnelError> {
        loop {
            self.discard_keepalives();
            if let Some((header_len, mut frame)) = parse_response_head(&self.buf)? {
                let framing = if head_request || bodyless_status(frame.status) {
                    BodyFraming::None
                } else {
                    response_body_framing(&frame.headers)?
                };
                self.buf.advance(header_len);
                frame.body = self.read_body(framing, per_read).await?;
                return Ok(frame);
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(TunnelError::Framing("header section too large".into()));
            }
            match tokio::time::timeout(per_read, self.fill()).await {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) if self.buf.is_empty() => {
                    return Err(TunnelError::Closed("remote closed the tunnel"));
                }
                Ok(Ok(false)) => return Err(TunnelError::Closed("eof mid-frame")),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(TunnelError::Timeout {
                        op: "response read",
                        after: per_read,
                    })
                }
            }
        }
    }

    /// Wait for tunnel traffic while no message is expected, consuming
    /// keep-alive bytes. `DataReady` means non-keep-alive bytes are now
    /// buffered; silence past `deadline` is a timeout.
    pub async fn await_keepalive(&mut self, deadline: Duration) -> Result<Liveness, TunnelError> {
        self.discard_keepalives();
        if !self.buf.is_empty() {
            return Ok(Liveness::DataReady);
        }
        match tokio::time::timeout(deadline, self.fill()).await {
            Ok(Ok(true)) => {
                self.discard_keepalives();
                if self.buf.is_empty() {
                    Ok(Liveness::KeepAlive)
                } else {
                    Ok(Liveness::DataReady)
                }
            }
            Ok(Ok(false)) => Err(TunnelError::Closed("remote closed the tunnel")),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TunnelError::Timeout {
                op: "keep-alive wait",
                after: deadline,
            }),
        }
    }

    /// Strip keep-alive bytes queued ahead of the next message.
    fn discard_keepalives(&mut self) {
        while !self.buf.is_empty() && self.buf[0] == KEEPALIVE_BYTE {
            self.buf.advance(1);
        }
    }

    /// Pull more bytes from the socket; `Ok(false)` on EOF.
    async fn fill(&mut self) -> std::io::Result<bool> {
        let n = self.io.read_buf(&mut self.buf).await?;
        Ok(n > 0)
    }

    /// Like [`fill`], but inside a frame: EOF and deadline expiry are
    /// hard errors.
    async fn fill_frame(&mut self, per_read: Duration) -> Result<(), TunnelError> {
        match tokio::time::timeout(per_read, self.fill()).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(TunnelError::Closed("eof mid-frame")),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TunnelError::Timeout {
                op: "body read",
                after: per_read,
            }),
        }
    }

    async fn read_body(
        &mut self,
        framing: BodyFraming,
        per_read: Duration,
    ) -> Result<Bytes, TunnelError> {
        match framing {
            BodyFraming::None => Ok(Bytes::new()),
            BodyFraming::Length(n) => {
                while self.buf.len() < n {
                    self.fill_frame(per_read).await?;
                }
                Ok(self.buf.split_to(n).freeze())
            }
            BodyFraming::Chunked => self.read_chunked(per_read).await,
        }
    }

    async fn read_chunked(&mut self, per_read: Duration) -> Result<Bytes, TunnelError> {
        let mut out = BytesMut::new();
        loop {
            let line_end = loop {
                match find_crlf(&self.buf) {
                    Some(pos) => break pos,
                    None => self.fill_frame(per_read).await?,
                }
            };
            let size = parse_chunk_size(&self.buf[..line_end])?;
            self.buf.advance(line_end + 2);

            if size == 0 {
                // Trailer section: discard any trailer fields, then the
                // final empty line.
                loop {
                    let pos = loop {
                        match find_crlf(&self.buf) {
                            Some(pos) => break pos,
                            None => self.fill_frame(per_read).await?,
                        }
                    };
                    self.buf.advance(pos + 2);
                    if pos == 0 {
                        return Ok(out.freeze());
                    }
                }
            }

            while self.buf.len() < size + 2 {
                self.fill_frame(per_read).await?;
            }
            out.extend_from_slice(&self.buf[..size]);
            if &self.buf[size..size + 2] != b"\r\n" {
                return Err(TunnelError::Framing("chunk data not CRLF-terminated".into()));
            }
            self.buf.advance(size + 2);
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, TunnelError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| TunnelError::Framing("chunk size line is not ASCII".into()))?;
    let size = line.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(size, 16)
        .map_err(|_| TunnelError::Framing(format!("invalid chunk size {size:?}")))
}

fn parse_request_head(buf: &[u8]) -> Result<Option<(usize, RequestFrame)>, TunnelError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut slots);
    match req.parse(buf) {
        Ok(httparse::Status::Partial) => Ok(None),
        Ok(httparse::Status::Complete(header_len)) => {
            let method = req
                .method
                .ok_or_else(|| TunnelError::Framing("missing method".into()))?
                .parse::<Method>()
                .map_err(|e| TunnelError::Framing(format!("invalid method: {e}")))?;
            let target = req
                .path
                .ok_or_else(|| TunnelError::Framing("missing request target".into()))?
                .to_string();
            let headers = collect_headers(req.headers)?;
            Ok(Some((
                header_len,
                RequestFrame {
                    method,
                    target,
                    headers,
                    body: Bytes::new(),
                },
            )))
        }
        Err(e) => Err(TunnelError::Framing(format!("invalid request head: {e}"))),
    }
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(usize, ResponseFrame)>, TunnelError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut slots);
    match resp.parse(buf) {
        Ok(httparse::Status::Partial) => Ok(None),
        Ok(httparse::Status::Complete(header_len)) => {
            let code = resp
                .code
                .ok_or_else(|| TunnelError::Framing("missing status code".into()))?;
            let status = StatusCode::from_u16(code)
                .map_err(|e| TunnelError::Framing(format!("invalid status code: {e}")))?;
            let reason = resp.reason.filter(|r| !r.is_empty()).map(str::to_owned);
            let headers = collect_headers(resp.headers)?;
            Ok(Some((
                header_len,
                ResponseFrame {
                    status,
                    reason,
                    headers,
                    body: Bytes::new(),
                },
            )))
        }
        Err(e) => Err(TunnelError::Framing(format!("invalid response head: {e}"))),
    }
}

fn collect_headers(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, TunnelError> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for h in parsed {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| TunnelError::Framing(format!("invalid header name {:?}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| TunnelError::Framing(format!("invalid value for header {:?}", h.name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn request_body_framing(headers: &HeaderMap) -> Result<BodyFraming, TunnelError> {
    if let Some(framing) = chunked_framing(headers)? {
        return Ok(framing);
    }
    match content_length(headers)? {
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::None),
    }
}

/// Responses on a persistent stream must delimit their body explicitly: a
/// close-delimited body would consume the tunnel. The origin always emits
/// `Content-Length`, so anything else is corruption.
fn response_body_framing(headers: &HeaderMap) -> Result<BodyFraming, TunnelError> {
    if let Some(framing) = chunked_framing(headers)? {
        return Ok(framing);
    }
    match content_length(headers)? {
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Err(TunnelError::Framing(
            "response has neither content-length nor chunked framing".into(),
        )),
    }
}

fn chunked_framing(headers: &HeaderMap) -> Result<Option<BodyFraming>, TunnelError> {
    let mut any = false;
    let mut chunked = false;
    for value in headers.get_all(TRANSFER_ENCODING) {
        any = true;
        let value = value
            .to_str()
            .map_err(|_| TunnelError::Framing("non-ASCII transfer-encoding".into()))?;
        if value
            .split(',')
            .any(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
        {
            chunked = true;
        }
    }
    match (any, chunked) {
        (false, _) => Ok(None),
        (true, true) => Ok(Some(BodyFraming::Chunked)),
        (true, false) => Err(TunnelError::Framing(
            "transfer-encoding without chunked cannot be framed".into(),
        )),
    }
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, TunnelError> {
    let mut result = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let n: usize = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| TunnelError::Framing("invalid content-length".into()))?;
        if result.is_some_and(|prev| prev != n) {
            return Err(TunnelError::Framing("conflicting content-length".into()));
        }
        result = Some(n);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const IDLE: Duration = Duration::from_millis(100);

    fn reader(bytes: &[u8]) -> FrameReader<std::io::Cursor<Vec<u8>>> {
        FrameReader::new(std::io::Cursor::new(bytes.to_vec()))
    }

    #[tokio::test]
    async fn test_request_without_body() {
        let mut r = reader(b"GET /ping HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let frame = r.read_request(IDLE).await.unwrap().unwrap();
        assert_eq!(frame.method, Method::GET);
        assert_eq!(frame.target, "/ping");
        assert_eq!(frame.headers["host"], "example.com");
        assert!(frame.body.is_empty());
    }

    #[tokio::test]
    async fn test_request_with_content_length_body() {
        let mut r = reader(b"POST /submit?x=1 HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        let frame = r.read_request(IDLE).await.unwrap().unwrap();
        assert_eq!(frame.method, Method::POST);
        assert_eq!(frame.target, "/submit?x=1");
        assert_eq!(&frame.body[..], b"hello");
    }

    #[tokio::test]
    async fn test_request_with_chunked_body() {
        let mut r = reader(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        );
        let frame = r.read_request(IDLE).await.unwrap().unwrap();
        assert_eq!(&frame.body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_keepalive_bytes_skipped_before_request() {
        let mut bytes = vec![KEEPALIVE_BYTE; 3];
        bytes.extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");
        let mut r = reader(&bytes);
        let frame = r.read_request(IDLE).await.unwrap().unwrap();
        assert_eq!(frame.target, "/");
    }

    #[tokio::test]
    async fn test_idle_timeout_is_not_an_error() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut r = FrameReader::new(rx);
        let result = r.read_request(Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_timeout_mid_frame_is_an_error() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(b"GET /slow HT").await.unwrap();
        let mut r = FrameReader::new(rx);
        let err = r.read_request(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TunnelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_eof_at_frame_boundary_is_closed() {
        let mut r = reader(b"");
        let err = r.read_request(IDLE).await.unwrap_err();
        assert!(matches!(
            err,
            TunnelError::Closed("remote closed the tunnel")
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_closed() {
        let mut r = reader(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        let err = r.read_request(IDLE).await.unwrap_err();
        assert!(matches!(err, TunnelError::Closed("eof mid-frame")));
    }

    #[tokio::test]
    async fn test_malformed_head_is_framing_error() {
        let mut r = reader(b"NOT AN HTTP LINE AT ALL\x01\r\n\r\n");
        let err = r.read_request(IDLE).await.unwrap_err();
        assert!(matches!(err, TunnelError::Framing(_)));
    }

    #[tokio::test]
    async fn test_response_with_body() {
        let mut r = reader(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nX-A: 1\r\n\r\npong");
        let frame = r.read_response(false, IDLE).await.unwrap();
        assert_eq!(frame.status, StatusCode::OK);
        assert_eq!(frame.headers["x-a"], "1");
        assert_eq!(&frame.body[..], b"pong");
    }

    #[tokio::test]
    async fn test_keepalive_bytes_between_responses_are_invisible() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na");
        bytes.extend_from_slice(&[KEEPALIVE_BYTE, KEEPALIVE_BYTE]);
        bytes.extend_from_slice(b"HTTP/1.1 201 Created\r\nContent-Length: 1\r\n\r\nb");
        let mut r = reader(&bytes);
        let first = r.read_response(false, IDLE).await.unwrap();
        let second = r.read_response(false, IDLE).await.unwrap();
        assert_eq!(&first.body[..], b"a");
        assert_eq!(second.status, StatusCode::CREATED);
        assert_eq!(&second.body[..], b"b");
    }

    #[tokio::test]
    async fn test_response_to_head_has_no_body() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n");
        bytes.extend_from_slice(b"HTTP/1.1 204 No Content\r\n\r\n");
        let mut r = reader(&bytes);
        let head = r.read_response(true, IDLE).await.unwrap();
        assert!(head.body.is_empty());
        // The stream position is exactly after the head response.
        let next = r.read_response(false, IDLE).await.unwrap();
        assert_eq!(next.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_response_without_framing_is_rejected() {
        let mut r = reader(b"HTTP/1.1 200 OK\r\n\r\n");
        let err = r.read_response(false, IDLE).await.unwrap_err();
        assert!(matches!(err, TunnelError::Framing(_)));
    }

    #[tokio::test]
    async fn test_chunked_response_with_trailers() {
        let mut r = reader(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              4\r\nwiki\r\n0\r\nX-Trailer: 1\r\n\r\n",
        );
        let frame = r.read_response(false, IDLE).await.unwrap();
        assert_eq!(&frame.body[..], b"wiki");
    }

    #[tokio::test]
    async fn test_await_keepalive() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut r = FrameReader::new(rx);

        tx.write_all(&[KEEPALIVE_BYTE]).await.unwrap();
        assert_eq!(r.await_keepalive(IDLE).await.unwrap(), Liveness::KeepAlive);

        tx.write_all(b"HTTP/1.1").await.unwrap();
        assert_eq!(r.await_keepalive(IDLE).await.unwrap(), Liveness::DataReady);

        drop(tx);
        // Buffered bytes still report ready; only a drained stream EOFs.
        assert_eq!(r.await_keepalive(IDLE).await.unwrap(), Liveness::DataReady);
    }

    #[tokio::test]
    async fn test_await_keepalive_times_out_on_silence() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut r = FrameReader::new(rx);
        let err = r.await_keepalive(Duration::from_millis(20)).await;
        assert!(matches!(err, Err(TunnelError::Timeout { .. })));
    }

    #[test]
    fn test_request_encode_normalises_framing() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.append("x-many", HeaderValue::from_static("1"));
        headers.append("x-many", HeaderValue::from_static("2"));
        let frame = RequestFrame {
            method: Method::POST,
            target: "/a/b?c=d".into(),
            headers,
            body: Bytes::from_static(b"abc"),
        };
        let encoded = frame.encode();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.starts_with("POST /a/b?c=d HTTP/1.1\r\n"));
        assert!(text.contains("content-length: 3\r\n"));
        assert!(!text.to_ascii_lowercase().contains("transfer-encoding"));
        // Duplicate headers survive as a multiset.
        assert_eq!(text.matches("x-many:").count(), 2);
        assert!(text.ends_with("\r\n\r\nabc"));
    }

    #[test]
    fn test_response_encode_no_content() {
        let frame = ResponseFrame {
            status: StatusCode::NO_CONTENT,
            reason: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let text = String::from_utf8(frame.encode().to_vec()).unwrap();
        assert_eq!(text, "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[tokio::test]
    async fn test_encoded_response_parses_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-id", HeaderValue::from_static("7"));
        let frame = ResponseFrame {
            status: StatusCode::ACCEPTED,
            reason: None,
            headers,
            body: Bytes::from_static(b"queued"),
        };
        let mut r = reader(&frame.encode());
        let parsed = r.read_response(false, IDLE).await.unwrap();
        assert_eq!(parsed.status, StatusCode::ACCEPTED);
        assert_eq!(parsed.headers["x-id"], "7");
        assert_eq!(&parsed.body[..], b"queued");
    }
}
