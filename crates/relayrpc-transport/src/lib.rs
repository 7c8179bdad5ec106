//! Socket endpoints and async listeners.
//!
//! This is the lowest layer of relayrpc. It knows nothing about frames or
//! values: it binds, accepts and dials byte streams over
//! - Unix domain sockets (`unix:///path/to.sock` or a bare path)
//! - TCP (`tcp://host:port`)
//!
//! Everything else builds on top of the [`RpcStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect, Listener};
pub use stream::RpcStream;
pub use tcp::TcpSocket;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
