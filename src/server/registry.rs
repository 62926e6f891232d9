//! The server registry owned by `main`.

use std::net::SocketAddr;
use std::rc::Rc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::reactor;
use crate::server::{StreamHandler, TcpServer};

struct Registration {
    name: String,
    addr: SocketAddr,
    handler: Rc<dyn StreamHandler>,
}

/// Named servers to bind and run together, with one shared shutdown.
///
/// Created and owned by `main` and passed by handle; there is no
/// process-wide table.
#[derive(Default)]
pub struct ServerRegistry {
    entries: Vec<Registration>,
    shutdown: CancellationToken,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        addr: SocketAddr,
        handler: Rc<dyn StreamHandler>,
    ) {
        self.entries.push(Registration { name: name.into(), addr, handler });
    }

    /// A handle that stops every registered server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind every registered server and spawn its accept loop. Returns
    /// the bound addresses, in registration order.
    pub async fn start(&self) -> crate::Result<Vec<SocketAddr>> {
        let mut bound = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let server = TcpServer::bind(entry.addr, self.shutdown.clone())
                .await
                .with_context(|| format!("binding {} at {}", entry.name, entry.addr))?;
            let addr = server.local_addr()?;
            info!(name = %entry.name, %addr, "listening");
            bound.push(addr);
            reactor::spawn(server.serve(Rc::clone(&entry.handler)));
        }
        Ok(bound)
    }

    /// Run every registered server until ctrl-c or an external
    /// [`Self::shutdown_token`] cancellation.
    pub async fn run(self) -> crate::Result<()> {
        self.start().await?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("waiting for ctrl-c")?;
                info!("shutting down");
                self.shutdown.cancel();
            }
            _ = self.shutdown.cancelled() => {}
        }
        Ok(())
    }
}
