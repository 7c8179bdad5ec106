use relayrpc_codec::{CodecError, Extension, Value, ValueKind, ValueStream};
use tracing::{debug, warn};

use super::{mismatch, relay_error, relay_id, Staged};
use crate::connection::Connection;
use crate::message::Message;
use crate::table::Entry;

/// Relays a [`ValueStream`]: the owner forwards every chunk as `enqueue`
/// and finishes with `close`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableExtension;

impl ReadableExtension {
    pub const NAME: &'static str = "readable";
}

impl Extension<Connection> for ReadableExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Stream
    }

    fn encode(&self, value: Value, conn: &Connection) -> Result<Value, CodecError> {
        let stream = value
            .into_stream()
            .map_err(|other| mismatch(Self::NAME, &other))?;
        let id = conn.next_id().map_err(|e| relay_error(Self::NAME, e))?;
        conn.stage(Staged::Forward(id, stream));
        Ok(Value::Int(id))
    }

    fn decode(&self, payload: Value, conn: &Connection) -> Result<Value, CodecError> {
        let id = relay_id(Self::NAME, &payload, conn)?;
        let (sink, stream) = ValueStream::channel();
        conn.table()
            .insert(id, Entry::Stream(sink))
            .map_err(|e| relay_error(Self::NAME, e))?;
        Ok(Value::Stream(stream))
    }
}

/// Relays a [`ValueSink`](relayrpc_codec::ValueSink): the receiving side
/// gets a sink whose writes travel back as `enqueue`, and dropping every
/// clone of it sends `close`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WritableExtension;

impl WritableExtension {
    pub const NAME: &'static str = "writable";
}

impl Extension<Connection> for WritableExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Sink
    }

    fn encode(&self, value: Value, conn: &Connection) -> Result<Value, CodecError> {
        let sink = value
            .into_sink()
            .map_err(|other| mismatch(Self::NAME, &other))?;
        let id = conn.next_id().map_err(|e| relay_error(Self::NAME, e))?;
        conn.stage(Staged::Entry(id, Entry::Stream(sink)));
        Ok(Value::Int(id))
    }

    fn decode(&self, payload: Value, conn: &Connection) -> Result<Value, CodecError> {
        let id = relay_id(Self::NAME, &payload, conn)?;
        let (sink, stream) = ValueStream::channel();
        tokio::spawn(forward(conn.clone(), id, stream));
        Ok(Value::Sink(sink))
    }
}

/// Send each chunk of `stream` as `enqueue(id, chunk)`, then `close(id)`.
///
/// A chunk that cannot be sent ends the stream early; the peer still gets
/// its `close`.
pub(super) async fn forward(conn: Connection, id: i64, mut stream: ValueStream) {
    loop {
        let chunk = tokio::select! {
            _ = conn.closed() => return,
            chunk = stream.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        match conn.send(Message::Enqueue { id, chunk }) {
            Ok(()) => {}
            Err(err) if err.is_unsendable() => {
                warn!(id, error = %err, "stream chunk could not be sent; closing stream");
                break;
            }
            Err(err) => {
                debug!(id, error = %err, "stream forwarder stopped");
                return;
            }
        }
    }
    if let Err(err) = conn.send(Message::Close { id }) {
        debug!(id, error = %err, "stream close not sent");
    }
}
