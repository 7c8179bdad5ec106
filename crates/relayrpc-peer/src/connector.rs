use relayrpc_codec::Value;
use relayrpc_frame::FrameCodec;
use relayrpc_transport::Endpoint;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;
use crate::handshake::{handshake_client, Mode};
use crate::ids::Role;
use crate::single_shot::call_once_over;

/// Open a persistent connection with default settings.
pub async fn connect(endpoint: &Endpoint) -> Result<Connection> {
    connect_with_config(endpoint, &ConnectionConfig::default()).await
}

/// Open a persistent connection. `config.functions` are exported to the
/// server for the life of the connection.
pub async fn connect_with_config(
    endpoint: &Endpoint,
    config: &ConnectionConfig,
) -> Result<Connection> {
    let stream = relayrpc_transport::connect(endpoint).await?;
    connect_over(stream, config).await
}

/// Handshake as the initiator over an already connected stream.
pub async fn connect_over<S>(io: S, config: &ConnectionConfig) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, FrameCodec::default());
    let handshake = handshake_client(&mut framed, Mode::Persistent, &config.handshake).await?;
    Ok(Connection::start(
        framed,
        handshake,
        Role::Initiator,
        config,
    ))
}

/// Run one single-shot call with default settings.
pub async fn call_once(endpoint: &Endpoint, name: &str, args: Vec<Value>) -> Result<Value> {
    call_once_with_config(endpoint, name, args, &ConnectionConfig::default()).await
}

/// Run one single-shot call.
pub async fn call_once_with_config(
    endpoint: &Endpoint,
    name: &str,
    args: Vec<Value>,
    config: &ConnectionConfig,
) -> Result<Value> {
    let stream = relayrpc_transport::connect(endpoint).await?;
    call_once_over(stream, name, args, config).await
}
