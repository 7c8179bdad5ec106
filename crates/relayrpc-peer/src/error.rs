use std::time::Duration;

use relayrpc_codec::Value;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] relayrpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] relayrpc_frame::FrameError),

    /// A value could not be encoded or a payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] relayrpc_codec::CodecError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A well-formed payload that is not a valid protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote side exports no function by this name.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// The remote function or closure failed with this reason.
    #[error("call rejected: {0}")]
    Rejected(Value),

    /// A single-shot exchange answered with a fault.
    #[error("remote failure ({status}): {message}")]
    Remote { status: u16, message: String },

    /// This side ran out of correlation ids.
    #[error("correlation id space exhausted")]
    IdSpaceExhausted,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl PeerError {
    /// The error as a rejection reason for a closure stub.
    pub fn into_reason(self) -> Value {
        match self {
            PeerError::Rejected(reason) => reason,
            other => Value::String(other.to_string()),
        }
    }

    /// The message was refused before it was queued: it could not be encoded
    /// or exceeds the payload limit. The connection itself is unaffected.
    pub(crate) fn is_unsendable(&self) -> bool {
        matches!(
            self,
            PeerError::Codec(_)
                | PeerError::Frame(relayrpc_frame::FrameError::PayloadTooLarge { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
