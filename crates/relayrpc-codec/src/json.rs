//! JSON fallback serialization.
//!
//! Only plain scalars, arrays and string-keyed objects are representable.
//! `Undefined` is written as `null`; maps, sets, byte buffers and every
//! handle kind are rejected as [`CodecError::Unsupported`].

use bytes::Bytes;
use serde_json::{Map, Number};

use crate::error::{CodecError, Result};
use crate::value::Value;

/// Convert a value to a JSON tree.
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(n) => {
            let number = Number::from_f64(*n).ok_or(CodecError::NonFiniteFloat(*n))?;
            serde_json::Value::Number(number)
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_>>()?)
        }
        Value::Object(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.clone(), to_json(item)?);
            }
            serde_json::Value::Object(map)
        }
        other => return Err(CodecError::Unsupported(other.kind())),
    })
}

/// Convert a JSON tree to a value. Numbers that fit an `i64` become `Int`.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

/// Encode a value as JSON bytes.
pub fn encode_json(value: &Value) -> Result<Bytes> {
    let json = to_json(value)?;
    Ok(Bytes::from(serde_json::to_vec(&json)?))
}

/// Decode JSON bytes into a value.
pub fn decode_json(src: &[u8]) -> Result<Value> {
    let json: serde_json::Value = serde_json::from_slice(src)?;
    Ok(from_json(json))
}
