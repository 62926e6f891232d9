//! Server assembly: options, the HTTP server, and the accept loop.
//!
//! The generic TCP accept loop ([`TcpServer`]) knows nothing about HTTP;
//! it hands accepted sockets to a [`StreamHandler`] capability.
//! [`HttpServer`] supplies one: it wraps each socket in TLS when
//! configured, builds a [`crate::stream::Stream`] and a
//! [`crate::connection::Connection`], and spawns the connection's driver
//! task onto the reactor.

mod acceptor;
pub use acceptor::StreamHandler;
pub use acceptor::TcpServer;

mod registry;
pub use registry::ServerRegistry;

mod tls;
pub use tls::TlsOptions;

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::handler::RequestHandler;
use crate::reactor;
use crate::stream::Stream;

/// Per-server knobs, shared by every connection the server accepts.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Close after every response, regardless of what the request asks.
    pub no_keep_alive: bool,
    /// Trust reverse-proxy identity headers (`X-Real-Ip`,
    /// `X-Forwarded-For`, `X-Scheme`, `X-Forwarded-Proto`).
    pub xheaders: bool,
    /// Per-stream cap on buffered bytes; also the request body limit.
    pub max_buffer_size: usize,
    /// How long a kept-alive socket may sit idle between requests.
    pub keep_alive_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            no_keep_alive: false,
            xheaders: false,
            max_buffer_size: 100 * 1024 * 1024,
            keep_alive_timeout: Duration::from_secs(3600),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("tls setup failed: {reason}")]
    Tls { reason: String },
}

/// An HTTP server: a request handler plus connection options, usable as
/// the [`StreamHandler`] of a [`TcpServer`].
pub struct HttpServer<H> {
    handler: Rc<H>,
    options: Rc<ServerOptions>,
    tls: Option<TlsAcceptor>,
}

impl<H: RequestHandler> HttpServer<H> {
    pub fn builder() -> HttpServerBuilder<H> {
        HttpServerBuilder { handler: None, options: ServerOptions::default(), ssl: None }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

pub struct HttpServerBuilder<H> {
    handler: Option<Rc<H>>,
    options: ServerOptions,
    ssl: Option<TlsOptions>,
}

impl<H: RequestHandler> HttpServerBuilder<H> {
    /// The application entry point. Required.
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Rc::new(handler));
        self
    }

    pub fn no_keep_alive(mut self, no_keep_alive: bool) -> Self {
        self.options.no_keep_alive = no_keep_alive;
        self
    }

    pub fn xheaders(mut self, xheaders: bool) -> Self {
        self.options.xheaders = xheaders;
        self
    }

    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.options.max_buffer_size = max_buffer_size;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.options.keep_alive_timeout = timeout;
        self
    }

    /// Serve TLS on accepted sockets with the given certificate and key.
    pub fn ssl(mut self, options: TlsOptions) -> Self {
        self.ssl = Some(options);
        self
    }

    pub fn build(self) -> Result<HttpServer<H>, ServerBuildError> {
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;
        let tls = match &self.ssl {
            Some(options) => Some(
                tls::build_acceptor(options)
                    .map_err(|e| ServerBuildError::Tls { reason: format!("{e:#}") })?,
            ),
            None => None,
        };
        Ok(HttpServer { handler, options: Rc::new(self.options), tls })
    }
}

#[async_trait(?Send)]
impl<H: RequestHandler> StreamHandler for HttpServer<H> {
    async fn on_stream(&self, socket: TcpStream, addr: SocketAddr) {
        if let Err(e) = socket.set_nodelay(true) {
            debug!(remote = %addr, cause = %e, "could not disable nagle");
        }

        let handler = Rc::clone(&self.handler);
        let options = Rc::clone(&self.options);
        let tls = self.tls.clone();

        reactor::spawn(async move {
            let max_buffer_size = options.max_buffer_size;
            let result = match tls {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(tls_stream) => {
                        let stream = Stream::new(tls_stream, max_buffer_size);
                        Connection::new(stream, addr, options, true).process(handler).await
                    }
                    Err(e) => {
                        warn!(remote = %addr, cause = %e, "tls handshake failed");
                        return;
                    }
                },
                None => {
                    let stream = Stream::new(socket, max_buffer_size);
                    Connection::new(stream, addr, options, false).process(handler).await
                }
            };

            match result {
                Ok(()) => debug!(remote = %addr, "connection closed"),
                Err(e) => warn!(remote = %addr, cause = %e, "connection closed with error"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;
    use async_trait::async_trait;

    struct Nop;

    #[async_trait(?Send)]
    impl RequestHandler for Nop {
        async fn handle(&self, _request: Request<'_>) {}
    }

    #[test]
    fn builder_defaults() {
        let server = HttpServer::builder().handler(Nop).build().unwrap();
        assert!(!server.options().no_keep_alive);
        assert!(!server.options().xheaders);
        assert_eq!(server.options().max_buffer_size, 100 * 1024 * 1024);
        assert_eq!(server.options().keep_alive_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn builder_without_a_handler_is_rejected() {
        let result = HttpServer::<Nop>::builder().build();
        assert!(matches!(result, Err(ServerBuildError::MissingHandler)));
    }
}
