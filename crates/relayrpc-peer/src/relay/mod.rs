//! Codec extensions that relay live handles across a connection.
//!
//! Each one turns a local handle into a correlation id on the wire plus a
//! protocol of follow-up messages, and turns a received id back into an
//! equivalent handle on the other side.
//!
//! | Name | Kind | Follow-up messages |
//! |---|---|---|
//! | `readable` | [`ValueStream`](relayrpc_codec::ValueStream) | `enqueue`, `close` |
//! | `writable` | [`ValueSink`](relayrpc_codec::ValueSink) | `enqueue`, `close` |
//! | `promise` | [`PendingValue`](relayrpc_codec::PendingValue) | `promise fulfill` or `promise rejected` |
//! | `function` | [`Closure`](relayrpc_codec::Closure) | `apply`, `apply result` |
//!
//! Encoding never acts directly. Each extension stages what its handle needs
//! (a table entry, a forwarding task). Once the message carrying the ids
//! passes every check the connection registers the entries, queues the
//! message and then starts the tasks; a message that is refused leaves
//! nothing behind. Follow-up messages go out from those spawned tasks, so
//! they are queued behind the message carrying the id.

mod closure;
mod promise;
mod stream;

use relayrpc_codec::{CodecError, PendingValue, Registry, UrlExtension, Value, ValueStream};

pub use closure::FunctionExtension;
pub use promise::PromiseExtension;
pub use stream::{ReadableExtension, WritableExtension};

use crate::connection::Connection;
use crate::error::PeerError;
use crate::table::Entry;

/// Extensions available on a persistent connection, in dispatch order.
pub fn persistent_registry() -> Registry<Connection> {
    Registry::new()
        .with(UrlExtension)
        .with(ReadableExtension)
        .with(WritableExtension)
        .with(PromiseExtension)
        .with(FunctionExtension)
}

/// Extensions available on a single-shot exchange. Only values that need no
/// back-channel qualify.
pub fn single_shot_registry() -> Registry<()> {
    Registry::new().with(UrlExtension)
}

/// Work an encoded handle needs once its message is on the way.
pub(crate) enum Staged {
    /// Continuation for the peer's follow-up messages.
    Entry(i64, Entry),
    /// Forward a local stream as `enqueue` and `close`.
    Forward(i64, ValueStream),
    /// Send the settlement of a local pending value.
    Settle(i64, PendingValue),
}

impl Staged {
    /// Spawn the task sending the follow-up messages. Entries need no task.
    pub(crate) fn start(self, conn: &Connection) {
        match self {
            Staged::Entry(..) => {}
            Staged::Forward(id, stream) => {
                tokio::spawn(stream::forward(conn.clone(), id, stream));
            }
            Staged::Settle(id, pending) => {
                tokio::spawn(promise::settle(conn.clone(), id, pending));
            }
        }
    }
}

/// Id of a handle relayed by the peer. The sender allocates it, so it must
/// come from the peer's half of the id space.
fn relay_id(name: &'static str, payload: &Value, conn: &Connection) -> Result<i64, CodecError> {
    let id = payload.as_i64().ok_or_else(|| {
        CodecError::extension(name, format!("expected integer id, got {}", payload.kind()))
    })?;
    if conn.owns(id) {
        return Err(CodecError::extension(
            name,
            format!("id {id} is not in the sender's partition"),
        ));
    }
    Ok(id)
}

fn relay_error(name: &'static str, err: PeerError) -> CodecError {
    CodecError::extension(name, err.to_string())
}

fn mismatch(name: &'static str, value: &Value) -> CodecError {
    CodecError::extension(name, format!("cannot encode {}", value.kind()))
}
