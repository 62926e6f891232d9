//! The request value handed to application handlers.

use std::cell::Cell;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use bytes::Bytes;
use http::{header, Method, Version};
use serde::Serialize;
use tracing::info;

use crate::codec::FormData;
use crate::protocol::{Arguments, Headers, HttpError, RequestHead, StreamError};
use crate::stream::ResponseSink;

/// One uploaded file from a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Uploaded files keyed by form field name.
pub type FileMap = HashMap<String, Vec<FilePart>>;

/// One fully-decoded HTTP request, plus the handle for writing its
/// response back through the owning connection.
///
/// The handler receives the request by value and gives it up by calling
/// [`Request::finish`]; once finished, no further writes can be
/// expressed. The connection strictly outlives the request.
pub struct Request<'conn> {
    head: RequestHead,
    body: Bytes,
    remote_ip: IpAddr,
    protocol: &'static str,
    host: String,
    arguments: Arguments,
    files: FileMap,
    start_time: Instant,
    finish_time: Option<Instant>,
    writer: ResponseWriter<'conn>,
}

impl<'conn> Request<'conn> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        head: RequestHead,
        body: Bytes,
        form: FormData,
        peer: SocketAddr,
        tls: bool,
        xheaders: bool,
        start_time: Instant,
        writer: ResponseWriter<'conn>,
    ) -> Self {
        let mut arguments = head.arguments().clone();
        arguments.extend(form.arguments);

        let (remote_ip, protocol) = if xheaders {
            (remote_ip_override(head.headers(), peer.ip()), protocol_override(head.headers(), tls))
        } else {
            (peer.ip(), if tls { "https" } else { "http" })
        };

        let host = head.headers().get(header::HOST).unwrap_or("127.0.0.1").to_string();

        Self {
            head,
            body,
            remote_ip,
            protocol,
            host,
            arguments,
            files: form.files,
            start_time,
            finish_time: None,
            writer,
        }
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &str {
        self.head.uri()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn query(&self) -> &str {
        self.head.query()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &Headers {
        self.head.headers()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Peer address, possibly overridden by proxy headers (xheaders mode).
    pub fn remote_ip(&self) -> IpAddr {
        self.remote_ip
    }

    /// `"http"` or `"https"`.
    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Query-string and form-body arguments, merged.
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Files uploaded through a multipart body, by field name.
    pub fn files(&self) -> &FileMap {
        &self.files
    }

    /// Time elapsed since the request head was read.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Write a chunk of the response. Completes once the chunk has been
    /// handed to the socket.
    pub async fn write_bytes(&mut self, chunk: impl Into<Bytes>) -> Result<(), HttpError> {
        self.writer.write(chunk.into()).await
    }

    /// Serialize `value` as JSON and write it as a response chunk.
    pub async fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), HttpError> {
        let encoded = serde_json::to_vec(value)?;
        self.writer.write(Bytes::from(encoded)).await
    }

    /// Mark the response complete and flush whatever is still queued.
    ///
    /// Consumes the request; the connection then re-arms for the next
    /// request or closes, per its keep-alive decision.
    pub async fn finish(mut self) -> Result<(), HttpError> {
        self.finish_time = Some(Instant::now());
        self.writer.mark_finished();
        let result = self.writer.flush().await;

        let elapsed = self
            .finish_time
            .map(|at| at.duration_since(self.start_time))
            .unwrap_or_default();
        info!(
            method = %self.head.method(),
            path = self.head.path(),
            remote_ip = %self.remote_ip,
            elapsed = ?elapsed,
            "request finished"
        );
        result
    }
}

/// The write facet of a connection's stream, scoped to one request.
pub struct ResponseWriter<'conn> {
    sink: &'conn mut dyn ResponseSink,
    finished: &'conn Cell<bool>,
}

impl<'conn> ResponseWriter<'conn> {
    pub(crate) fn new(sink: &'conn mut dyn ResponseSink, finished: &'conn Cell<bool>) -> Self {
        Self { sink, finished }
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), HttpError> {
        if self.sink.is_closed() {
            return Err(StreamError::Closed.into());
        }
        self.sink.write(chunk);
        self.sink.flush().await.map_err(HttpError::from)
    }

    async fn flush(&mut self) -> Result<(), HttpError> {
        if self.sink.is_closed() {
            return Err(StreamError::Closed.into());
        }
        self.sink.flush().await.map_err(HttpError::from)
    }

    fn mark_finished(&self) {
        self.finished.set(true);
    }
}

fn remote_ip_override(headers: &Headers, peer: IpAddr) -> IpAddr {
    let candidate = headers.get("x-real-ip").or_else(|| headers.get("x-forwarded-for"));
    match candidate.and_then(|value| value.trim().parse::<Ipv4Addr>().ok()) {
        Some(ip) => IpAddr::V4(ip),
        None => peer,
    }
}

fn protocol_override(headers: &Headers, tls: bool) -> &'static str {
    let candidate = headers.get("x-scheme").or_else(|| headers.get("x-forwarded-proto"));
    match candidate.map(str::trim) {
        Some("http") => "http",
        Some("https") => "https",
        _ => {
            if tls {
                "https"
            } else {
                "http"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_request_head;
    use async_trait::async_trait;
    use http::header::{HeaderName, HeaderValue};

    #[derive(Default)]
    struct MockSink {
        written: Vec<u8>,
        queue: Vec<Bytes>,
        closed: bool,
    }

    #[async_trait(?Send)]
    impl ResponseSink for MockSink {
        fn write(&mut self, chunk: Bytes) {
            self.queue.push(chunk);
        }

        async fn flush(&mut self) -> Result<(), StreamError> {
            for chunk in self.queue.drain(..) {
                self.written.extend_from_slice(&chunk);
            }
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }

        fn writing(&self) -> bool {
            !self.queue.is_empty()
        }
    }

    fn peer() -> SocketAddr {
        "192.0.2.7:1234".parse().unwrap()
    }

    #[tokio::test]
    async fn writes_reach_the_sink_in_order_and_finish_marks_the_flag() {
        let head = parse_request_head(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        let finished = Cell::new(false);
        let mut sink = MockSink::default();

        {
            let writer = ResponseWriter::new(&mut sink, &finished);
            let mut request = Request::new(
                head,
                Bytes::new(),
                crate::codec::FormData::default(),
                peer(),
                false,
                false,
                Instant::now(),
                writer,
            );

            assert_eq!(request.host(), "h");
            assert_eq!(request.remote_ip(), peer().ip());
            assert_eq!(request.protocol(), "http");
            assert_eq!(request.uri(), "/x");

            #[derive(serde::Serialize)]
            struct Payload {
                ok: bool,
            }

            request.write_bytes("status-line ").await.unwrap();
            request.write_json(&Payload { ok: true }).await.unwrap();
            assert!(!finished.get());
            request.finish().await.unwrap();
        }

        assert!(finished.get());
        assert_eq!(sink.written, b"status-line {\"ok\":true}");
    }

    #[tokio::test]
    async fn xheaders_overlay_applies_at_construction() {
        let head = parse_request_head(
            b"GET / HTTP/1.1\r\nHost: h\r\nX-Real-Ip: 203.0.113.9\r\nX-Scheme: https\r\n\r\n",
        )
        .unwrap();
        let finished = Cell::new(false);
        let mut sink = MockSink::default();

        let writer = ResponseWriter::new(&mut sink, &finished);
        let request = Request::new(
            head,
            Bytes::new(),
            crate::codec::FormData::default(),
            peer(),
            false,
            true,
            Instant::now(),
            writer,
        );

        assert_eq!(request.remote_ip(), "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_eq!(request.protocol(), "https");
    }

    #[tokio::test]
    async fn writes_on_a_closed_sink_fail_fast() {
        let head = parse_request_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let finished = Cell::new(false);
        let mut sink = MockSink { closed: true, ..Default::default() };

        let writer = ResponseWriter::new(&mut sink, &finished);
        let mut request = Request::new(
            head,
            Bytes::new(),
            crate::codec::FormData::default(),
            peer(),
            false,
            false,
            Instant::now(),
            writer,
        );

        let result = request.write_bytes("too late").await;
        assert!(matches!(result, Err(HttpError::Stream { source: StreamError::Closed })));
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> Headers {
        let mut headers = Headers::new();
        for (name, value) in pairs {
            headers.add(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        headers
    }

    #[test]
    fn remote_ip_uses_proxy_header_when_it_is_dotted_ipv4() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        let h = headers(&[("x-real-ip", "203.0.113.9")]);
        assert_eq!(remote_ip_override(&h, peer), "203.0.113.9".parse::<IpAddr>().unwrap());

        let h = headers(&[("x-forwarded-for", "203.0.113.9")]);
        assert_eq!(remote_ip_override(&h, peer), "203.0.113.9".parse::<IpAddr>().unwrap());

        // a forwarding chain is not a dotted quad; keep the socket peer
        let h = headers(&[("x-forwarded-for", "203.0.113.9, 198.51.100.2")]);
        assert_eq!(remote_ip_override(&h, peer), peer);

        let h = headers(&[("x-real-ip", "not-an-address")]);
        assert_eq!(remote_ip_override(&h, peer), peer);

        assert_eq!(remote_ip_override(&headers(&[]), peer), peer);
    }

    #[test]
    fn protocol_accepts_only_the_two_literal_schemes() {
        let h = headers(&[("x-scheme", "https")]);
        assert_eq!(protocol_override(&h, false), "https");

        let h = headers(&[("x-forwarded-proto", "http")]);
        assert_eq!(protocol_override(&h, true), "http");

        let h = headers(&[("x-scheme", "gopher")]);
        assert_eq!(protocol_override(&h, false), "http");
        assert_eq!(protocol_override(&h, true), "https");

        assert_eq!(protocol_override(&headers(&[]), false), "http");
        assert_eq!(protocol_override(&headers(&[]), true), "https");
    }
}
