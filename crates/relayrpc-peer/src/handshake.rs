use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relayrpc_codec::Serialization;
use relayrpc_frame::{Frame, FrameCodec, FrameError, FrameKind};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{PeerError, Result};

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;
const MAX_PEER_ID_LEN: usize = 128;

/// Transport variant requested by the dialing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Long-lived multiplexed connection.
    Persistent,
    /// One request, one reply.
    SingleShot,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Persistent => "persistent",
            Mode::SingleShot => "single-shot",
        })
    }
}

/// Client handshake request sent in a `Control` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Protocol name. Must be `relayrpc` by default.
    pub protocol: String,
    /// Protocol version string, `<major>.<minor>`.
    pub version: String,
    pub mode: Mode,
    pub serialization: Serialization,
}

/// Server handshake response sent in a `Control` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Protocol name. Must match request protocol.
    pub protocol: String,
    /// Server protocol version.
    pub version: String,
    pub mode: Mode,
    pub serialization: Serialization,
    /// Opaque server-assigned peer identifier.
    pub peer_id: String,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Server-assigned peer identifier.
    pub peer_id: String,
    /// Protocol version of the remote side.
    pub protocol_version: String,
    pub mode: Mode,
    pub serialization: Serialization,
}

/// Configuration for handshake negotiation.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Bound on the whole exchange.
    pub timeout: Duration,
    /// Expected protocol name.
    pub protocol_name: String,
    /// Local protocol version.
    pub protocol_version: String,
    /// Maximum handshake frame payload size in bytes.
    pub max_handshake_payload: usize,
    /// Serialization a dialing side asks for.
    pub serialization: Serialization,
    /// Modes an accepting side allows.
    pub accepted_modes: Vec<Mode>,
    /// Serializations an accepting side allows.
    pub accepted_serializations: Vec<Serialization>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            protocol_name: "relayrpc".to_string(),
            protocol_version: "1.0".to_string(),
            max_handshake_payload: 16 * 1024,
            serialization: Serialization::Tagged,
            accepted_modes: vec![Mode::Persistent, Mode::SingleShot],
            accepted_serializations: vec![Serialization::Tagged, Serialization::Json],
        }
    }
}

impl HandshakeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_serialization(mut self, serialization: Serialization) -> Self {
        self.serialization = serialization;
        self
    }

    pub fn with_accepted_modes(mut self, modes: &[Mode]) -> Self {
        self.accepted_modes = modes.to_vec();
        self
    }

    pub fn with_accepted_serializations(mut self, serializations: &[Serialization]) -> Self {
        self.accepted_serializations = serializations.to_vec();
        self
    }
}

/// Perform client-side handshake.
///
/// The codec's payload cap is lowered to `max_handshake_payload` for the
/// exchange; callers restore their runtime limit afterwards.
pub async fn handshake_client<S>(
    framed: &mut Framed<S, FrameCodec>,
    mode: Mode,
    config: &HandshakeConfig,
) -> Result<HandshakeResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;

    let req = HandshakeRequest {
        protocol: config.protocol_name.clone(),
        version: config.protocol_version.clone(),
        mode,
        serialization: config.serialization,
    };

    framed
        .codec_mut()
        .set_max_payload_size(config.max_handshake_payload);
    let resp: HandshakeResponse = with_timeout(config.timeout, async {
        send_control_json(framed, &req).await?;
        let payload = recv_control_payload(framed, config.max_handshake_payload).await?;
        Ok(serde_json::from_slice(&payload)?)
    })
    .await?;

    validate_protocol_name(&resp.protocol)?;
    validate_version(&resp.version)?;
    validate_peer_id(&resp.peer_id)?;

    if resp.protocol != config.protocol_name {
        return Err(PeerError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{}')",
            resp.protocol, config.protocol_name
        )));
    }

    if !is_version_compatible(&config.protocol_version, &resp.version)? {
        return Err(PeerError::HandshakeFailed(format!(
            "incompatible version '{}' (local '{}')",
            resp.version, config.protocol_version
        )));
    }

    if resp.mode != mode || resp.serialization != config.serialization {
        return Err(PeerError::HandshakeFailed(format!(
            "server answered {}/{} to a {}/{} request",
            resp.mode, resp.serialization, mode, config.serialization
        )));
    }

    debug!(peer_id = %resp.peer_id, %mode, "client handshake complete");
    Ok(HandshakeResult {
        peer_id: resp.peer_id,
        protocol_version: resp.version,
        mode,
        serialization: resp.serialization,
    })
}

/// Perform server-side handshake.
///
/// A request the server does not accept gets no response; the caller drops
/// the stream.
pub async fn handshake_server<S>(
    framed: &mut Framed<S, FrameCodec>,
    peer_id: &str,
    config: &HandshakeConfig,
) -> Result<HandshakeResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;
    validate_peer_id(peer_id)?;

    framed
        .codec_mut()
        .set_max_payload_size(config.max_handshake_payload);
    with_timeout(config.timeout, async {
        let payload = recv_control_payload(framed, config.max_handshake_payload).await?;
        let req: HandshakeRequest = serde_json::from_slice(&payload)?;

        validate_protocol_name(&req.protocol)?;
        validate_version(&req.version)?;

        if req.protocol != config.protocol_name {
            return Err(PeerError::HandshakeFailed(format!(
                "unknown protocol '{}' (expected '{}')",
                req.protocol, config.protocol_name
            )));
        }

        if !is_version_compatible(&req.version, &config.protocol_version)? {
            return Err(PeerError::HandshakeFailed(format!(
                "incompatible version '{}' (server '{}')",
                req.version, config.protocol_version
            )));
        }

        if !config.accepted_modes.contains(&req.mode) {
            return Err(PeerError::HandshakeFailed(format!(
                "mode '{}' not accepted",
                req.mode
            )));
        }

        if !config.accepted_serializations.contains(&req.serialization) {
            return Err(PeerError::HandshakeFailed(format!(
                "serialization '{}' not accepted",
                req.serialization
            )));
        }

        let resp = HandshakeResponse {
            protocol: config.protocol_name.clone(),
            version: config.protocol_version.clone(),
            mode: req.mode,
            serialization: req.serialization,
            peer_id: peer_id.to_string(),
        };
        send_control_json(framed, &resp).await?;

        debug!(peer_id, mode = %req.mode, "server handshake complete");
        Ok(HandshakeResult {
            peer_id: peer_id.to_string(),
            protocol_version: req.version,
            mode: req.mode,
            serialization: req.serialization,
        })
    })
    .await
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PeerError::Timeout(timeout))?
}

async fn send_control_json<S, T>(framed: &mut Framed<S, FrameCodec>, value: &T) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    framed.send(Frame::new(FrameKind::Control, payload)).await?;
    Ok(())
}

async fn recv_control_payload<S>(
    framed: &mut Framed<S, FrameCodec>,
    max_handshake_payload: usize,
) -> Result<bytes::Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(Ok(frame)) => {
            if frame.kind != FrameKind::Control {
                return Err(PeerError::HandshakeFailed(format!(
                    "expected control frame, got {}",
                    frame.kind
                )));
            }
            Ok(frame.payload)
        }
        Some(Err(FrameError::PayloadTooLarge { size, .. })) => {
            Err(PeerError::HandshakeFailed(format!(
                "handshake payload too large: {size} (max {max_handshake_payload})"
            )))
        }
        Some(Err(FrameError::ConnectionClosed)) | None => Err(PeerError::Disconnected(
            "connection closed during handshake".to_string(),
        )),
        Some(Err(err)) => Err(PeerError::Frame(err)),
    }
}

fn validate_protocol_name(protocol: &str) -> Result<()> {
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(PeerError::HandshakeFailed(format!(
            "invalid protocol name length: {}",
            protocol.len()
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(PeerError::HandshakeFailed(format!(
            "invalid protocol version length: {}",
            version.len()
        )));
    }
    let _ = parse_version(version)?;
    Ok(())
}

fn validate_peer_id(peer_id: &str) -> Result<()> {
    if peer_id.is_empty() || peer_id.len() > MAX_PEER_ID_LEN {
        return Err(PeerError::HandshakeFailed(format!(
            "invalid peer_id length: {}",
            peer_id.len()
        )));
    }
    Ok(())
}

fn is_version_compatible(client_version: &str, server_version: &str) -> Result<bool> {
    let (client_major, client_minor) = parse_version(client_version)?;
    let (server_major, server_minor) = parse_version(server_version)?;

    Ok(client_major == server_major && client_minor >= server_minor)
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let invalid = |why: &str| PeerError::HandshakeFailed(format!("invalid version '{version}': {why}"));

    let (major, minor) = version
        .split_once('.')
        .ok_or_else(|| invalid("expected '<major>.<minor>'"))?;
    if minor.contains('.') {
        return Err(invalid("expected '<major>.<minor>'"));
    }

    let major = major.parse::<u16>().map_err(|_| invalid("non-numeric major"))?;
    let minor = minor.parse::<u16>().map_err(|_| invalid("non-numeric minor"))?;

    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use relayrpc_frame::FrameConfig;
    use tokio::io::DuplexStream;

    use super::*;

    fn pair() -> (Framed<DuplexStream, FrameCodec>, Framed<DuplexStream, FrameCodec>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Framed::new(a, FrameCodec::new(FrameConfig::default())),
            Framed::new(b, FrameCodec::new(FrameConfig::default())),
        )
    }

    #[tokio::test]
    async fn successful_handshake() {
        let (mut client, mut server) = pair();
        let server = tokio::spawn(async move {
            handshake_server(&mut server, "peer-1", &HandshakeConfig::default()).await
        });

        let client_result =
            handshake_client(&mut client, Mode::Persistent, &HandshakeConfig::default())
                .await
                .unwrap();
        let server_result = server.await.unwrap().unwrap();

        assert_eq!(client_result.peer_id, "peer-1");
        assert_eq!(client_result.protocol_version, "1.0");
        assert_eq!(client_result.mode, Mode::Persistent);
        assert_eq!(server_result.serialization, Serialization::Tagged);
        assert_eq!(client_result.peer_id, server_result.peer_id);
    }

    #[tokio::test]
    async fn rejected_mode_closes_without_response() {
        let (mut client, mut server) = pair();
        let server_config = HandshakeConfig::default().with_accepted_modes(&[Mode::Persistent]);
        let server = tokio::spawn(async move {
            let result = handshake_server(&mut server, "peer-2", &server_config).await;
            drop(server);
            result
        });

        let err = handshake_client(&mut client, Mode::SingleShot, &HandshakeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Disconnected(_)));

        let server_err = server.await.unwrap().unwrap_err();
        assert!(server_err.to_string().contains("mode 'single-shot' not accepted"));
    }

    #[tokio::test]
    async fn rejected_serialization() {
        let (mut client, mut server) = pair();
        let server_config =
            HandshakeConfig::default().with_accepted_serializations(&[Serialization::Tagged]);
        let server =
            tokio::spawn(async move { handshake_server(&mut server, "peer-3", &server_config).await });

        let client_config = HandshakeConfig::default().with_serialization(Serialization::Json);
        assert!(handshake_client(&mut client, Mode::Persistent, &client_config)
            .await
            .is_err());
        assert!(matches!(
            server.await.unwrap(),
            Err(PeerError::HandshakeFailed(msg)) if msg.contains("serialization 'json'")
        ));
    }

    #[tokio::test]
    async fn version_mismatch_fails() {
        let (mut client, mut server) = pair();
        let server_config = HandshakeConfig {
            protocol_version: "2.0".to_string(),
            ..HandshakeConfig::default()
        };
        let server =
            tokio::spawn(async move { handshake_server(&mut server, "peer-4", &server_config).await });

        let _ = handshake_client(&mut client, Mode::Persistent, &HandshakeConfig::default()).await;
        assert!(matches!(
            server.await.unwrap(),
            Err(PeerError::HandshakeFailed(msg)) if msg.contains("incompatible version")
        ));
    }

    #[tokio::test]
    async fn oversized_handshake_payload_is_rejected() {
        let (mut client, mut server) = pair();
        let server_config = HandshakeConfig {
            max_handshake_payload: 8,
            ..HandshakeConfig::default()
        };
        let server =
            tokio::spawn(async move { handshake_server(&mut server, "peer-5", &server_config).await });

        client
            .send(Frame::new(FrameKind::Control, vec![b' '; 64]))
            .await
            .unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(PeerError::HandshakeFailed(msg)) if msg.contains("too large")
        ));
    }

    #[tokio::test]
    async fn non_control_frame_is_rejected() {
        let (mut client, mut server) = pair();
        let server = tokio::spawn(async move {
            handshake_server(&mut server, "peer-6", &HandshakeConfig::default()).await
        });

        client
            .send(Frame::new(FrameKind::Message, &b"[]"[..]))
            .await
            .unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(PeerError::HandshakeFailed(msg)) if msg.contains("expected control frame")
        ));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut client, _server) = pair();
        let config = HandshakeConfig::default().with_timeout(Duration::from_millis(50));
        let err = handshake_client(&mut client, Mode::Persistent, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("1.0").unwrap(), (1, 0));
        assert!(parse_version("1").is_err());
        assert!(parse_version("1.2.3").is_err());
        assert!(parse_version("a.1").is_err());
        assert!(is_version_compatible("1.2", "1.1").unwrap());
        assert!(!is_version_compatible("1.0", "1.1").unwrap());
        assert!(!is_version_compatible("2.0", "1.0").unwrap());
    }
}
