use std::rc::Rc;

use futures::FutureExt;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use tempest::handler::make_handler;
use tempest::protocol::Request;
use tempest::reactor::Reactor;
use tempest::server::{HttpServer, ServerRegistry};

fn main() -> tempest::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let handler = make_handler(|mut request: Request<'_>| {
        async move {
            let body = format!("Hello from {} over {}\n", request.path(), request.protocol());
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            if request.write_bytes(head).await.is_err() {
                return;
            }
            if request.write_bytes(body).await.is_err() {
                return;
            }
            if let Err(e) = request.finish().await {
                warn!(cause = %e, "could not finish request");
            }
        }
        .boxed_local()
    });

    let server = HttpServer::builder().handler(handler).build()?;

    let mut registry = ServerRegistry::new();
    registry.register("hello", "127.0.0.1:8888".parse()?, Rc::new(server));

    let reactor = Reactor::new()?;
    reactor.run(registry.run())
}
