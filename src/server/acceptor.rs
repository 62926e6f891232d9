//! The generic TCP accept loop.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Capability handed one accepted socket at a time.
///
/// This is the seam between the transport-agnostic accept loop and
/// whatever protocol runs on the socket; [`crate::server::HttpServer`]
/// is the HTTP implementation.
#[async_trait(?Send)]
pub trait StreamHandler {
    async fn on_stream(&self, socket: TcpStream, addr: SocketAddr);
}

/// Bind-listen-accept, until the shutdown token fires.
///
/// Accept failures are logged and survived; per-connection failures
/// never reach this loop at all.
pub struct TcpServer {
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl TcpServer {
    pub async fn bind(addr: SocketAddr, shutdown: CancellationToken) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, shutdown })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self, handler: Rc<dyn StreamHandler>) {
        loop {
            select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, addr)) => handler.on_stream(socket, addr).await,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RequestHandler;
    use crate::protocol::Request;
    use crate::reactor::{self, Reactor};
    use crate::server::HttpServer;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Ok200;

    #[async_trait(?Send)]
    impl RequestHandler for Ok200 {
        async fn handle(&self, mut request: Request<'_>) {
            let _ = request
                .write_bytes(Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"))
                .await;
            let _ = request.finish().await;
        }
    }

    #[test]
    fn acceptor_survives_a_malformed_connection() {
        let reactor = Reactor::new().unwrap();
        reactor.run(async {
            let shutdown = CancellationToken::new();
            let server =
                TcpServer::bind("127.0.0.1:0".parse().unwrap(), shutdown.clone()).await.unwrap();
            let addr = server.local_addr().unwrap();

            let http = HttpServer::builder().handler(Ok200).build().unwrap();
            reactor::spawn(server.serve(Rc::new(http)));

            // a connection that sends garbage is closed without a response
            let mut bad = TcpStream::connect(addr).await.unwrap();
            bad.write_all(b"GARBAGE\r\n\r\n").await.unwrap();
            let mut rest = Vec::new();
            bad.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty());

            // the acceptor is unaffected; the next connection is served
            let mut good = TcpStream::connect(addr).await.unwrap();
            good.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            good.read_to_end(&mut response).await.unwrap();
            assert!(response.starts_with(b"HTTP/1.1 200 OK"));

            shutdown.cancel();
        });
    }
}
