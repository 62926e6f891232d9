//! The per-socket HTTP state machine.
//!
//! A [`Connection`] owns one [`Stream`] and drives it through
//! header-read → body-read → dispatch → response-write, then either
//! re-arms for the next request (keep-alive) or closes. Any error at or
//! below the stream ends this connection and nothing else.
//!
//! Between dispatch and the handler's `finish` no read is issued on the
//! stream; pipelined bytes simply wait in the socket until the loop
//! comes back around.

use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use bytes::Bytes;
use http::{header, Method, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tracing::{debug, warn};

use crate::codec::{parse_form_body, parse_request_head, FormData};
use crate::ensure;
use crate::handler::RequestHandler;
use crate::protocol::{HttpError, Request, RequestHead, ResponseWriter, StreamError};
use crate::server::ServerOptions;
use crate::stream::Stream;

const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";

/// The one byte sequence this crate writes on its own authority.
const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 (Continue)\r\n\r\n";

/// Where a connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingHeaders,
    ReadingBody,
    Dispatched,
    Writing,
    Closed,
}

/// One client socket's state machine.
pub struct Connection<S> {
    stream: Stream<S>,
    remote_addr: SocketAddr,
    options: Rc<ServerOptions>,
    tls: bool,
    state: State,
    finished: Cell<bool>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + 'static,
{
    pub fn new(
        stream: Stream<S>,
        remote_addr: SocketAddr,
        options: Rc<ServerOptions>,
        tls: bool,
    ) -> Self {
        Self {
            stream,
            remote_addr,
            options,
            tls,
            state: State::AwaitingHeaders,
            finished: Cell::new(false),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Serve requests on this socket until the peer goes away, the
    /// keep-alive decision says stop, or an error kills the connection.
    ///
    /// The stream is closed on every exit path.
    pub async fn process<H>(mut self, handler: Rc<H>) -> Result<(), HttpError>
    where
        H: RequestHandler + ?Sized,
    {
        let result = self.drive(handler.as_ref()).await;
        self.state = State::Closed;
        self.stream.close().await;
        result
    }

    async fn drive<H>(&mut self, handler: &H) -> Result<(), HttpError>
    where
        H: RequestHandler + ?Sized,
    {
        let mut kept_alive = false;
        loop {
            self.state = State::AwaitingHeaders;
            let Some(head_bytes) = self.read_head(kept_alive).await? else {
                return Ok(());
            };
            let started = Instant::now();

            let head = parse_request_head(&head_bytes)?;
            let keep_alive = should_keep_alive(&head, self.options.no_keep_alive);

            let body = self.read_body(&head).await?;
            let form = decode_body(&head, &body)?;

            self.state = State::Dispatched;
            self.finished.set(false);
            let writer = ResponseWriter::new(&mut self.stream, &self.finished);
            let request = Request::new(
                head,
                body,
                form,
                self.remote_addr,
                self.tls,
                self.options.xheaders,
                started,
                writer,
            );
            handler.handle(request).await;

            if !self.finished.get() {
                warn!(remote = %self.remote_addr, "handler returned without finishing the request");
                return Ok(());
            }

            self.state = State::Writing;
            if self.stream.is_closed() {
                return Ok(());
            }
            self.stream.flush().await?;

            if !keep_alive {
                return Ok(());
            }
            kept_alive = true;
        }
    }

    /// Read the next request head, up to and including the blank line.
    ///
    /// Returns `None` on the clean end of a connection: the peer closing
    /// between requests, or an idle kept-alive socket timing out.
    async fn read_head(&mut self, kept_alive: bool) -> Result<Option<Bytes>, HttpError> {
        let read = self.stream.read_until(HEAD_DELIMITER);

        let result = if kept_alive {
            match time::timeout(self.options.keep_alive_timeout, read).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(remote = %self.remote_addr, "idle keep-alive connection timed out");
                    return Ok(None);
                }
            }
        } else {
            read.await
        };

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StreamError::PeerClosed) => {
                if self.stream.buffered() > 0 {
                    warn!(remote = %self.remote_addr, "peer closed mid request head");
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the declared body, if any, enforcing the buffer cap and
    /// answering `Expect: 100-continue` first.
    async fn read_body(&mut self, head: &RequestHead) -> Result<Bytes, HttpError> {
        let Some(length) = head.content_length()? else {
            return Ok(Bytes::new());
        };
        if length == 0 {
            return Ok(Bytes::new());
        }
        ensure!(
            length <= self.options.max_buffer_size as u64,
            HttpError::PayloadTooLarge { length, limit: self.options.max_buffer_size }
        );

        if head.expects_continue() {
            self.stream.write(Bytes::from_static(CONTINUE_LINE));
            self.stream.flush().await.map_err(HttpError::from)?;
        }

        self.state = State::ReadingBody;
        Ok(self.stream.read_exact(length as usize).await?)
    }
}

fn decode_body(head: &RequestHead, body: &[u8]) -> Result<FormData, HttpError> {
    if body.is_empty() {
        return Ok(FormData::default());
    }
    match head.headers().get(header::CONTENT_TYPE) {
        Some(content_type) => Ok(parse_form_body(content_type, body)?),
        None => Ok(FormData::default()),
    }
}

/// The keep-alive decision, evaluated once per request.
fn should_keep_alive(head: &RequestHead, no_keep_alive: bool) -> bool {
    if no_keep_alive {
        return false;
    }
    let directive = head.headers().get(header::CONNECTION).map(str::trim);

    if head.version() == Version::HTTP_11 {
        return !directive.is_some_and(|value| value.eq_ignore_ascii_case("close"));
    }

    if head.headers().contains(header::CONTENT_LENGTH)
        || matches!(head.method(), &Method::GET | &Method::HEAD)
    {
        return directive.is_some_and(|value| value.eq_ignore_ascii_case("keep-alive"));
    }

    false
}
