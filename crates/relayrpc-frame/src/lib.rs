//! Length-prefixed message framing for relayrpc.
//!
//! Every frame on the wire carries:
//! - A 2-byte magic number ("RR") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 1-byte frame kind and a reserved zero byte
//!
//! [`FrameCodec`] plugs the format into `tokio_util::codec::Framed`.

pub mod codec;
pub mod error;
pub mod kind;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAGIC,
};
pub use error::{FrameError, Result};
pub use kind::FrameKind;
