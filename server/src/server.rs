//! Accept loop serving one client connection at a time

use crate::command::CommandDispatcher;
use crate::session::{ClientConnection, Inbound};
use anyhow::{Context, Result};
use pulsegate_shared::Response;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP front end of the dispatcher
pub struct CommandServer {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    read_timeout: Duration,
}

impl CommandServer {
    /// Bind the listening socket
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<CommandDispatcher>,
        read_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self::from_listener(listener, dispatcher, read_timeout))
    }

    pub fn from_listener(
        listener: TcpListener,
        dispatcher: Arc<CommandDispatcher>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            read_timeout,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections one after another until `shutdown` resolves.
    ///
    /// A failing connection is logged and dropped; it never ends the loop.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        info!("starting up on {}", self.local_addr()?);

        loop {
            match self.dispatcher.store().get().await {
                Some(owner) => info!("waiting for connection from {}...", owner),
                None => info!("waiting for connection..."),
            }

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            info!("connection from: {}", peer);
            let conn = ClientConnection::new(stream, peer, self.read_timeout);

            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Shutdown requested while serving {}", peer);
                    break;
                }
                result = serve_connection(conn, &self.dispatcher) => {
                    match result {
                        Ok(()) => info!("Client disconnected: {}", peer),
                        Err(e) => error!("Connection from {} closed: {:#}", peer, e),
                    }
                }
            }
        }

        info!("server shutting down");
        Ok(())
    }
}

/// Answer every frame on one connection until the peer hangs up
pub async fn serve_connection<S>(
    mut conn: ClientConnection<S>,
    dispatcher: &CommandDispatcher,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let requester = conn.peer().ip();

    while let Some(inbound) = conn.recv().await? {
        let response = match inbound {
            Inbound::Command(message) => {
                debug!("command from {}: {:?}", requester, message.cmd);
                dispatcher.dispatch(&message, requester).await
            }
            Inbound::Malformed(e) => {
                warn!("Malformed frame from {}: {}", requester, e);
                Response::Error(format!("Malformed request: {e}"))
            }
        };

        conn.send(&response).await?;
    }

    Ok(())
}
