use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relayrpc_frame::FrameCodec;
use relayrpc_transport::{Endpoint, Listener, RpcStream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;
use crate::functions::FunctionTable;
use crate::handshake::{handshake_server, Mode};
use crate::ids::Role;
use crate::single_shot::SingleShotExchange;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// An accepted stream after the handshake, in the mode the client asked for.
pub enum Session<S> {
    Persistent(Connection),
    SingleShot(SingleShotExchange<S>),
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Persistent(conn) => f.debug_tuple("Persistent").field(conn).finish(),
            Session::SingleShot(exchange) => f.debug_tuple("SingleShot").field(exchange).finish(),
        }
    }
}

impl<S> Session<S> {
    pub fn peer_id(&self) -> &str {
        match self {
            Session::Persistent(conn) => conn.peer_id(),
            Session::SingleShot(exchange) => exchange.peer_id(),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Session::Persistent(_) => Mode::Persistent,
            Session::SingleShot(_) => Mode::SingleShot,
        }
    }
}

/// Accepts call channels on an endpoint and answers them from one function
/// table.
pub struct Server {
    listener: Listener,
    config: ConnectionConfig,
    next_peer_id: AtomicU64,
}

impl Server {
    /// Bind to an endpoint, exporting `functions`.
    pub async fn bind(endpoint: &Endpoint, functions: FunctionTable) -> Result<Self> {
        let listener = Listener::bind(endpoint).await?;
        info!(endpoint = %listener.local_endpoint(), "server listening");
        Ok(Self {
            listener,
            config: ConnectionConfig::default().with_functions(functions),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Replace the connection settings, function table included.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Where the server is reachable; resolves an ephemeral TCP port.
    pub fn local_endpoint(&self) -> Endpoint {
        self.listener.local_endpoint()
    }

    /// Accept the next stream and run the handshake, assigning a peer id.
    pub async fn accept(&self) -> Result<Session<RpcStream>> {
        let stream = self.listener.accept().await?;
        let peer_id = self.next_peer_id();
        accept_over(stream, &peer_id, &self.config).await
    }

    /// Accept and serve streams until `shutdown` is cancelled. Every stream
    /// runs on its own task; persistent connections are closed on shutdown.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok(stream) => {
                    let peer_id = self.next_peer_id();
                    debug!(peer_id = %peer_id, transport = stream.transport_name(), "accepted stream");
                    tokio::spawn(run_session(
                        stream,
                        peer_id,
                        self.config.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        info!(endpoint = %self.listener.local_endpoint(), "server stopped");
        Ok(())
    }

    fn next_peer_id(&self) -> String {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        format!("peer-{id}")
    }
}

/// Handshake as the acceptor over an already connected stream.
pub async fn accept_over<S>(io: S, peer_id: &str, config: &ConnectionConfig) -> Result<Session<S>>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, FrameCodec::default());
    let handshake = handshake_server(&mut framed, peer_id, &config.handshake).await?;
    Ok(match handshake.mode {
        Mode::Persistent => Session::Persistent(Connection::start(
            framed,
            handshake,
            Role::Acceptor,
            config,
        )),
        Mode::SingleShot => Session::SingleShot(SingleShotExchange::new(framed, handshake, config)),
    })
}

async fn run_session(
    stream: RpcStream,
    peer_id: String,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) {
    let session = tokio::select! {
        _ = shutdown.cancelled() => return,
        session = accept_over(stream, &peer_id, &config) => session,
    };
    match session {
        Ok(Session::Persistent(conn)) => {
            tokio::select! {
                _ = conn.closed() => {}
                _ = shutdown.cancelled() => conn.close(),
            }
        }
        Ok(Session::SingleShot(exchange)) => {
            if let Err(err) = exchange.respond(&config.functions).await {
                debug!(peer_id = %peer_id, error = %err, "single-shot exchange failed");
            }
        }
        Err(err) => warn!(peer_id = %peer_id, error = %err, "handshake failed"),
    }
}
