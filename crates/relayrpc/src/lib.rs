//! Bidirectional RPC with relayed streams, promises and closures.
//!
//! Either side of a connection can call functions the other exports, and the
//! values passed around may carry live handles: a stream returned by a
//! function keeps delivering chunks, a pending value settles later, and a
//! closure passed as an argument can be called back.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket and TCP listeners and streams
//! - [`frame`]: length-prefixed frames with a kind byte
//! - [`codec`]: the value model, tagged codec and extension registry
//! - [`peer`]: call channel, relays, handshake, server and connector (behind
//!   the `peer` feature)
//! - [`demo`]: the function set the `relayrpc serve` command exposes

/// Re-export transport types.
pub mod transport {
    pub use relayrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use relayrpc_frame::*;
}

/// Re-export value and codec types.
pub mod codec {
    pub use relayrpc_codec::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use relayrpc_peer::*;
}

#[cfg(feature = "peer")]
pub mod demo;
