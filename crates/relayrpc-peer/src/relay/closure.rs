use relayrpc_codec::{Closure, CodecError, Extension, Value, ValueKind};

use super::{mismatch, relay_error, relay_id, Staged};
use crate::connection::Connection;
use crate::table::Entry;

/// Relays a [`Closure`]. The owner keeps it in the correlation table for the
/// life of the connection and answers every `apply`; the other side gets a
/// stub that sends `apply` and awaits the matching `apply result`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionExtension;

impl FunctionExtension {
    pub const NAME: &'static str = "function";
}

impl Extension<Connection> for FunctionExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Function
    }

    fn encode(&self, value: Value, conn: &Connection) -> Result<Value, CodecError> {
        let closure = value
            .into_function()
            .map_err(|other| mismatch(Self::NAME, &other))?;
        let id = conn.next_id().map_err(|e| relay_error(Self::NAME, e))?;
        conn.stage(Staged::Entry(id, Entry::Closure(closure)));
        Ok(Value::Int(id))
    }

    fn decode(&self, payload: Value, conn: &Connection) -> Result<Value, CodecError> {
        let function = relay_id(Self::NAME, &payload, conn)?;
        let conn = conn.clone();
        let stub = Closure::new(move |args| {
            let conn = conn.clone();
            async move {
                conn.apply(function, args)
                    .await
                    .map_err(|err| err.into_reason())
            }
        });
        Ok(Value::Function(stub))
    }
}
