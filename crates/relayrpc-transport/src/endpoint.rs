use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

const UNIX_SCHEME: &str = "unix://";
const TCP_SCHEME: &str = "tcp://";

/// Where a server listens or a client dials.
///
/// Accepted spellings:
/// - `unix:///tmp/app.sock` or a bare path such as `/tmp/app.sock`
/// - `tcp://127.0.0.1:7400`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Short transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Endpoint::Unix(_) => "unix-domain-socket",
            Endpoint::Tcp(_) => "tcp",
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "endpoint must not be empty"));
        }

        if let Some(addr) = trimmed.strip_prefix(TCP_SCHEME) {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| invalid(input, "expected tcp://host:port"))?;
            if host.is_empty() {
                return Err(invalid(input, "missing host"));
            }
            port.parse::<u16>()
                .map_err(|_| invalid(input, "port must be a number between 0 and 65535"))?;
            return Ok(Endpoint::Tcp(addr.to_string()));
        }

        let path = trimmed.strip_prefix(UNIX_SCHEME).unwrap_or(trimmed);
        if path.is_empty() {
            return Err(invalid(input, "missing socket path"));
        }
        if path.contains("://") {
            return Err(invalid(input, "unknown scheme (expected unix:// or tcp://)"));
        }
        Ok(Endpoint::Unix(PathBuf::from(path)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{TCP_SCHEME}{addr}"),
        }
    }
}

fn invalid(input: &str, reason: &str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
