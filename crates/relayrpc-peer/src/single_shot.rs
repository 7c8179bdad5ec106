//! One request, one reply.
//!
//! After a `single-shot` handshake the dialing side sends one `Request`
//! frame holding `[functionName, args]`. The accepting side answers with one
//! `Reply` frame holding the result, or one `Fault` frame holding a JSON
//! `{"status", "message"}` object, and then closes the stream. Only values
//! that need no back-channel can cross: streams, sinks, pending values and
//! closures are refused before anything is sent.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use relayrpc_codec::{decode_json, encode_json, Codec, Serialization, Value};
use relayrpc_frame::{Frame, FrameCodec, FrameError, FrameKind};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::connection::ConnectionConfig;
use crate::error::{PeerError, Result};
use crate::functions::FunctionTable;
use crate::handshake::{handshake_client, HandshakeResult, Mode};
use crate::relay::single_shot_registry;

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_FAILED: u16 = 500;

/// Error reply of a single-shot exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub status: u16,
    pub message: String,
}

impl Fault {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Fault> for PeerError {
    fn from(fault: Fault) -> Self {
        PeerError::Remote {
            status: fault.status,
            message: fault.message,
        }
    }
}

/// Value encoding for one exchange.
#[derive(Clone)]
struct Body {
    serialization: Serialization,
    codec: Codec<()>,
    max_payload: usize,
}

impl Body {
    fn new(serialization: Serialization, config: &ConnectionConfig) -> Self {
        Self {
            serialization,
            codec: Codec::new(single_shot_registry()).with_max_depth(config.max_depth),
            max_payload: config.max_payload_size,
        }
    }

    /// Encode `value`, refusing anything the frame codec would not send.
    fn encode(&self, value: Value) -> Result<Bytes> {
        let bytes = match self.serialization {
            Serialization::Tagged => self.codec.encode(value, &())?,
            Serialization::Json => encode_json(&value)?,
        };
        if bytes.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_payload,
            }
            .into());
        }
        Ok(bytes)
    }

    fn decode(&self, payload: &[u8]) -> Result<Value> {
        Ok(match self.serialization {
            Serialization::Tagged => self.codec.decode(payload, &())?,
            Serialization::Json => decode_json(payload)?,
        })
    }
}

/// The accepting side of a single-shot exchange, after the handshake.
pub struct SingleShotExchange<S> {
    framed: Framed<S, FrameCodec>,
    handshake: HandshakeResult,
    body: Body,
}

impl<S> SingleShotExchange<S> {
    pub fn peer_id(&self) -> &str {
        &self.handshake.peer_id
    }

    pub fn serialization(&self) -> Serialization {
        self.handshake.serialization
    }
}

impl<S> SingleShotExchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        mut framed: Framed<S, FrameCodec>,
        handshake: HandshakeResult,
        config: &ConnectionConfig,
    ) -> Self {
        framed
            .codec_mut()
            .set_max_payload_size(config.max_payload_size);
        let body = Body::new(handshake.serialization, config);
        Self {
            framed,
            handshake,
            body,
        }
    }

    /// Read the request, run the named function and write its reply.
    ///
    /// Request-level failures are answered with a fault and are not errors
    /// here; only a broken stream is.
    pub async fn respond(mut self, functions: &FunctionTable) -> Result<()> {
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => {
                return Err(PeerError::Disconnected(
                    "closed before sending a request".to_string(),
                ))
            }
        };

        let reply = if frame.kind == FrameKind::Request {
            answer(&self.body, &frame.payload, functions).await
        } else {
            Err(Fault::new(
                STATUS_BAD_REQUEST,
                format!("expected request frame, got {}", frame.kind),
            ))
        };

        let frame = match reply {
            Ok(payload) => Frame::new(FrameKind::Reply, payload),
            Err(fault) => {
                debug!(
                    peer_id = %self.handshake.peer_id,
                    status = fault.status,
                    message = %fault.message,
                    "single-shot fault"
                );
                Frame::new(FrameKind::Fault, serde_json::to_vec(&fault)?)
            }
        };
        self.framed.send(frame).await?;
        self.framed.close().await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for SingleShotExchange<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleShotExchange")
            .field("peer_id", &self.handshake.peer_id)
            .field("serialization", &self.handshake.serialization)
            .finish()
    }
}

async fn answer(
    body: &Body,
    payload: &[u8],
    functions: &FunctionTable,
) -> std::result::Result<Bytes, Fault> {
    let request = body
        .decode(payload)
        .map_err(|e| Fault::new(STATUS_BAD_REQUEST, format!("malformed request: {e}")))?;
    let (name, args) = split_request(request)
        .ok_or_else(|| Fault::new(STATUS_BAD_REQUEST, "request must be [name, args]"))?;

    let function = functions
        .get(&name)
        .ok_or_else(|| Fault::new(STATUS_NOT_FOUND, format!("unknown function '{name}'")))?;
    let result = function
        .call(args)
        .await
        .map_err(|reason| Fault::new(STATUS_FAILED, reason.to_string()))?;

    body.encode(result).map_err(|e| {
        warn!(function = %name, error = %e, "single-shot result could not be sent");
        Fault::new(STATUS_FAILED, format!("result could not be sent: {e}"))
    })
}

fn split_request(request: Value) -> Option<(String, Vec<Value>)> {
    let mut items = request.into_array().ok()?;
    if items.len() != 2 {
        return None;
    }
    let args = items.pop()?.into_array().ok()?;
    let name = items.pop()?.into_string().ok()?;
    Some((name, args))
}

/// Run one call over an unconnected stream: handshake, request, reply.
///
/// The request is encoded before the handshake, so arguments that cannot
/// cross a single-shot exchange fail with [`PeerError::Codec`] and nothing is
/// written.
pub async fn call_once_over<S>(
    io: S,
    name: &str,
    args: Vec<Value>,
    config: &ConnectionConfig,
) -> Result<Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = Body::new(config.handshake.serialization, config);
    let request = body.encode(Value::Array(vec![
        Value::from(name),
        Value::Array(args),
    ]))?;

    let mut framed = Framed::new(io, FrameCodec::default());
    let handshake = handshake_client(&mut framed, Mode::SingleShot, &config.handshake).await?;
    framed
        .codec_mut()
        .set_max_payload_size(config.max_payload_size);
    debug!(peer_id = %handshake.peer_id, function = name, "single-shot request");

    framed.send(Frame::new(FrameKind::Request, request)).await?;
    let frame = match framed.next().await {
        Some(frame) => frame?,
        None => {
            return Err(PeerError::Disconnected(
                "closed before replying".to_string(),
            ))
        }
    };
    match frame.kind {
        FrameKind::Reply => body.decode(&frame.payload),
        FrameKind::Fault => {
            let fault: Fault = serde_json::from_slice(&frame.payload)?;
            Err(fault.into())
        }
        other => Err(PeerError::Protocol(format!(
            "expected reply or fault frame, got {other}"
        ))),
    }
}
