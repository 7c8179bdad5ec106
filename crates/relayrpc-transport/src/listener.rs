use crate::endpoint::Endpoint;
use crate::error::Result;
#[cfg(not(unix))]
use crate::error::TransportError;
use crate::stream::RpcStream;
use crate::tcp::TcpSocket;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any supported [`Endpoint`].
pub enum Listener {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpSocket),
}

impl Listener {
    /// Bind a listener for the endpoint.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Listener::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(endpoint.to_string())),
            Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpSocket::bind(addr).await?)),
        }
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<RpcStream> {
        match self {
            #[cfg(unix)]
            Listener::Unix(socket) => socket.accept().await,
            Listener::Tcp(socket) => socket.accept().await,
        }
    }

    /// The endpoint clients should dial, with any ephemeral port resolved.
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            Listener::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
            Listener::Tcp(socket) => Endpoint::Tcp(socket.local_addr().to_string()),
        }
    }
}

/// Dial an endpoint.
pub async fn connect(endpoint: &Endpoint) -> Result<RpcStream> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path).await,
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::Unsupported(endpoint.to_string())),
        Endpoint::Tcp(addr) => TcpSocket::connect(addr).await,
    }
}
