use relayrpc_codec::{CodecError, Extension, PendingValue, Value, ValueKind};
use tracing::{debug, warn};

use super::{mismatch, relay_error, relay_id, Staged};
use crate::connection::Connection;
use crate::message::Message;
use crate::table::Entry;

/// Relays a [`PendingValue`]. The owner sends exactly one terminal message
/// once it settles; a pending value abandoned by its producer is sent as a
/// rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromiseExtension;

impl PromiseExtension {
    pub const NAME: &'static str = "promise";
}

impl Extension<Connection> for PromiseExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Pending
    }

    fn encode(&self, value: Value, conn: &Connection) -> Result<Value, CodecError> {
        let pending = value
            .into_pending()
            .map_err(|other| mismatch(Self::NAME, &other))?;
        let id = conn.next_id().map_err(|e| relay_error(Self::NAME, e))?;
        conn.stage(Staged::Settle(id, pending));
        Ok(Value::Int(id))
    }

    fn decode(&self, payload: Value, conn: &Connection) -> Result<Value, CodecError> {
        let id = relay_id(Self::NAME, &payload, conn)?;
        let (resolver, pending) = PendingValue::channel();
        conn.table()
            .insert(id, Entry::Promise(resolver))
            .map_err(|e| relay_error(Self::NAME, e))?;
        Ok(Value::Pending(pending))
    }
}

pub(super) async fn settle(conn: Connection, id: i64, pending: PendingValue) {
    let outcome = tokio::select! {
        _ = conn.closed() => return,
        outcome = pending => outcome,
    };
    let message = match outcome {
        Ok(value) => Message::PromiseFulfill { id, value },
        Err(rejection) => Message::PromiseRejected {
            id,
            reason: rejection.into_value(),
        },
    };
    match conn.send(message) {
        Ok(()) => {}
        Err(err) if err.is_unsendable() => {
            // Nothing was queued, so this is still the only terminal message.
            warn!(id, error = %err, "promise value could not be sent; rejecting");
            let reason = Value::String(format!("promise value could not be sent: {err}"));
            if let Err(err) = conn.send(Message::PromiseRejected { id, reason }) {
                debug!(id, error = %err, "promise rejection not sent");
            }
        }
        Err(err) => debug!(id, error = %err, "promise settlement not sent"),
    }
}
