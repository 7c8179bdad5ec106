//! Bidirectional call channel for relayrpc.
//!
//! A [`Server`] exports a [`FunctionTable`]; a client either opens a
//! persistent [`Connection`] with [`connect`] or runs one [`call_once`]
//! exchange. On a persistent connection both sides may call each other, and
//! arguments and results may carry streams, sinks, pending values and
//! closures that stay live for the life of the connection.
//!
//! ```no_run
//! use relayrpc_codec::Value;
//! use relayrpc_peer::{connect, FunctionTable, Server};
//! use relayrpc_transport::Endpoint;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> relayrpc_peer::Result<()> {
//! let functions = FunctionTable::new().with_function("echoReverse", |args| async move {
//!     let text = args.first().and_then(Value::as_str).unwrap_or_default();
//!     Ok(Value::from(text.chars().rev().collect::<String>()))
//! });
//! let endpoint: Endpoint = "tcp://127.0.0.1:0".parse()?;
//! let server = Server::bind(&endpoint, functions).await?;
//! let endpoint = server.local_endpoint();
//! tokio::spawn(server.serve(CancellationToken::new()));
//!
//! let conn = connect(&endpoint).await?;
//! let reply = conn.invoke("echoReverse", vec![Value::from("hello")]).await?;
//! assert_eq!(reply, Value::from("olleh"));
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod connector;
pub mod error;
pub mod functions;
pub mod handshake;
pub mod ids;
pub mod message;
pub mod relay;
pub mod server;
pub mod single_shot;
mod table;

pub use connection::{Connection, ConnectionConfig};
pub use connector::{call_once, call_once_with_config, connect, connect_over, connect_with_config};
pub use error::{PeerError, Result};
pub use functions::FunctionTable;
pub use handshake::{
    handshake_client, handshake_server, HandshakeConfig, HandshakeRequest, HandshakeResponse,
    HandshakeResult, Mode,
};
pub use ids::{IdAllocator, Partition, Role};
pub use message::{Failure, FailureKind, Message, Outcome};
pub use relay::{persistent_registry, single_shot_registry};
pub use server::{accept_over, Server, Session};
pub use single_shot::{call_once_over, Fault, SingleShotExchange};
