//! Persistent-mode wire messages.
//!
//! Every message is an array whose first element is a string tag:
//!
//! | Tag | Fields |
//! |---|---|
//! | `call` | callId, functionName, args |
//! | `result` | callId, value [, failure] |
//! | `enqueue` | streamId, chunk |
//! | `close` | streamId |
//! | `promise fulfill` | promiseId, value |
//! | `promise rejected` | promiseId, reason |
//! | `apply` | functionId, callId, args |
//! | `apply result` | callId, value [, failure] |
//!
//! A failure is an object `{"kind": "unknown function" | "rejected",
//! "reason": value}`; when present the value slot holds `undefined`.

use std::fmt;

use relayrpc_codec::Value;

use crate::error::{PeerError, Result};

pub const TAG_CALL: &str = "call";
pub const TAG_RESULT: &str = "result";
pub const TAG_ENQUEUE: &str = "enqueue";
pub const TAG_CLOSE: &str = "close";
pub const TAG_PROMISE_FULFILL: &str = "promise fulfill";
pub const TAG_PROMISE_REJECTED: &str = "promise rejected";
pub const TAG_APPLY: &str = "apply";
pub const TAG_APPLY_RESULT: &str = "apply result";

const KIND_UNKNOWN_FUNCTION: &str = "unknown function";
const KIND_REJECTED: &str = "rejected";

/// Outcome of a call or closure application as carried on the wire.
pub type Outcome = std::result::Result<Value, Failure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnknownFunction,
    Rejected,
}

impl FailureKind {
    fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownFunction => KIND_UNKNOWN_FUNCTION,
            FailureKind::Rejected => KIND_REJECTED,
        }
    }
}

/// Explicit error indicator in a `result` or `apply result`.
#[derive(Debug, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: Value,
}

impl Failure {
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::UnknownFunction,
            reason: Value::String(name.into()),
        }
    }

    pub fn rejected(reason: Value) -> Self {
        Self {
            kind: FailureKind::Rejected,
            reason,
        }
    }

    pub fn into_error(self) -> PeerError {
        match self.kind {
            FailureKind::UnknownFunction => PeerError::UnknownFunction(match self.reason {
                Value::String(name) => name,
                other => other.to_string(),
            }),
            FailureKind::Rejected => PeerError::Rejected(self.reason),
        }
    }

    fn into_value(self) -> Value {
        Value::object([
            ("kind", Value::from(self.kind.as_str())),
            ("reason", self.reason),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(protocol("failure must be an object"));
        };
        let mut kind = None;
        let mut reason = Value::Undefined;
        for (key, item) in entries {
            match key.as_str() {
                "kind" => {
                    kind = Some(match item.as_str() {
                        Some(KIND_UNKNOWN_FUNCTION) => FailureKind::UnknownFunction,
                        Some(KIND_REJECTED) => FailureKind::Rejected,
                        _ => return Err(protocol(format!("unknown failure kind {item}"))),
                    })
                }
                "reason" => reason = item,
                _ => {}
            }
        }
        let kind = kind.ok_or_else(|| protocol("failure without kind"))?;
        Ok(Self { kind, reason })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.reason)
    }
}

/// One persistent-mode message.
#[derive(Debug)]
pub enum Message {
    Call {
        id: i64,
        name: String,
        args: Vec<Value>,
    },
    Result {
        id: i64,
        outcome: Outcome,
    },
    Enqueue {
        id: i64,
        chunk: Value,
    },
    Close {
        id: i64,
    },
    PromiseFulfill {
        id: i64,
        value: Value,
    },
    PromiseRejected {
        id: i64,
        reason: Value,
    },
    Apply {
        function: i64,
        id: i64,
        args: Vec<Value>,
    },
    ApplyResult {
        id: i64,
        outcome: Outcome,
    },
}

impl Message {
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Call { .. } => TAG_CALL,
            Message::Result { .. } => TAG_RESULT,
            Message::Enqueue { .. } => TAG_ENQUEUE,
            Message::Close { .. } => TAG_CLOSE,
            Message::PromiseFulfill { .. } => TAG_PROMISE_FULFILL,
            Message::PromiseRejected { .. } => TAG_PROMISE_REJECTED,
            Message::Apply { .. } => TAG_APPLY,
            Message::ApplyResult { .. } => TAG_APPLY_RESULT,
        }
    }

    /// The correlation id the message is addressed to (the function id for
    /// `apply`).
    pub fn id(&self) -> i64 {
        match self {
            Message::Call { id, .. }
            | Message::Result { id, .. }
            | Message::Enqueue { id, .. }
            | Message::Close { id }
            | Message::PromiseFulfill { id, .. }
            | Message::PromiseRejected { id, .. }
            | Message::ApplyResult { id, .. } => *id,
            Message::Apply { function, .. } => *function,
        }
    }

    pub fn into_value(self) -> Value {
        let tag = Value::from(self.tag());
        let fields = match self {
            Message::Call { id, name, args } => {
                vec![Value::Int(id), Value::String(name), Value::Array(args)]
            }
            Message::Result { id, outcome } | Message::ApplyResult { id, outcome } => {
                match outcome {
                    Ok(value) => vec![Value::Int(id), value],
                    Err(failure) => vec![Value::Int(id), Value::Undefined, failure.into_value()],
                }
            }
            Message::Enqueue { id, chunk } => vec![Value::Int(id), chunk],
            Message::Close { id } => vec![Value::Int(id)],
            Message::PromiseFulfill { id, value } => vec![Value::Int(id), value],
            Message::PromiseRejected { id, reason } => vec![Value::Int(id), reason],
            Message::Apply { function, id, args } => {
                vec![Value::Int(function), Value::Int(id), Value::Array(args)]
            }
        };
        let mut items = Vec::with_capacity(fields.len() + 1);
        items.push(tag);
        items.extend(fields);
        Value::Array(items)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let items = value
            .into_array()
            .map_err(|other| protocol(format!("message must be an array, got {}", other.kind())))?;
        let mut items = items.into_iter();
        let tag = match items.next() {
            Some(Value::String(tag)) => tag,
            Some(other) => return Err(protocol(format!("message tag must be a string, got {}", other.kind()))),
            None => return Err(protocol("empty message")),
        };
        let fields: Vec<Value> = items.collect();

        let message = match (tag.as_str(), fields.len()) {
            (TAG_CALL, 3) => {
                let [id, name, args] = take::<3>(fields);
                Message::Call {
                    id: int(&tag, id)?,
                    name: name
                        .into_string()
                        .map_err(|_| protocol("call name must be a string"))?,
                    args: args
                        .into_array()
                        .map_err(|_| protocol("call args must be an array"))?,
                }
            }
            (TAG_RESULT | TAG_APPLY_RESULT, 2 | 3) => {
                let mut fields = fields.into_iter();
                let id = int(&tag, fields.next().unwrap_or(Value::Undefined))?;
                let value = fields.next().unwrap_or(Value::Undefined);
                let outcome = match fields.next() {
                    Some(failure) => Err(Failure::from_value(failure)?),
                    None => Ok(value),
                };
                if tag == TAG_RESULT {
                    Message::Result { id, outcome }
                } else {
                    Message::ApplyResult { id, outcome }
                }
            }
            (TAG_ENQUEUE, 2) => {
                let [id, chunk] = take::<2>(fields);
                Message::Enqueue {
                    id: int(&tag, id)?,
                    chunk,
                }
            }
            (TAG_CLOSE, 1) => {
                let [id] = take::<1>(fields);
                Message::Close { id: int(&tag, id)? }
            }
            (TAG_PROMISE_FULFILL, 2) => {
                let [id, value] = take::<2>(fields);
                Message::PromiseFulfill {
                    id: int(&tag, id)?,
                    value,
                }
            }
            (TAG_PROMISE_REJECTED, 2) => {
                let [id, reason] = take::<2>(fields);
                Message::PromiseRejected {
                    id: int(&tag, id)?,
                    reason,
                }
            }
            (TAG_APPLY, 3) => {
                let [function, id, args] = take::<3>(fields);
                Message::Apply {
                    function: int(&tag, function)?,
                    id: int(&tag, id)?,
                    args: args
                        .into_array()
                        .map_err(|_| protocol("apply args must be an array"))?,
                }
            }
            (
                TAG_CALL | TAG_RESULT | TAG_APPLY_RESULT | TAG_ENQUEUE | TAG_CLOSE
                | TAG_PROMISE_FULFILL | TAG_PROMISE_REJECTED | TAG_APPLY,
                n,
            ) => return Err(protocol(format!("'{tag}' message with {n} fields"))),
            _ => return Err(protocol(format!("unknown message tag '{tag}'"))),
        };
        Ok(message)
    }
}

fn take<const N: usize>(fields: Vec<Value>) -> [Value; N] {
    let mut out: [Value; N] = std::array::from_fn(|_| Value::Undefined);
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field;
    }
    out
}

fn int(tag: &str, value: Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| protocol(format!("'{tag}' id must be an integer, got {}", value.kind())))
}

fn protocol(message: impl Into<String>) -> PeerError {
    PeerError::Protocol(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    #[test]
    fn call_shape() {
        let value = Message::Call {
            id: 4,
            name: "echoReverse".into(),
            args: vec!["abc".into()],
        }
        .into_value();
        assert_eq!(
            value,
            wire(vec![
                "call".into(),
                Value::Int(4),
                "echoReverse".into(),
                wire(vec!["abc".into()]),
            ])
        );

        let Message::Call { id, name, args } = Message::from_value(value).unwrap() else {
            panic!("expected call");
        };
        assert_eq!((id, name.as_str()), (4, "echoReverse"));
        assert_eq!(args, vec![Value::from("abc")]);
    }

    #[test]
    fn result_failure_uses_fourth_slot() {
        let value = Message::Result {
            id: -2,
            outcome: Err(Failure::unknown_function("nope")),
        }
        .into_value();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[2], Value::Undefined);
        assert_eq!(
            items[3].get("kind").and_then(Value::as_str),
            Some("unknown function")
        );

        let Message::Result { id, outcome } = Message::from_value(value).unwrap() else {
            panic!("expected result");
        };
        assert_eq!(id, -2);
        assert!(matches!(
            outcome.unwrap_err().into_error(),
            PeerError::UnknownFunction(name) if name == "nope"
        ));
    }

    #[test]
    fn undefined_result_is_a_value_not_a_failure() {
        let parsed = Message::from_value(wire(vec![
            "apply result".into(),
            Value::Int(9),
            Value::Undefined,
        ]))
        .unwrap();
        assert!(matches!(
            parsed,
            Message::ApplyResult { id: 9, outcome: Ok(Value::Undefined) }
        ));
    }

    #[test]
    fn relay_tags_parse() {
        let apply = Message::from_value(wire(vec![
            "apply".into(),
            Value::Int(3),
            Value::Int(-8),
            wire(vec![1.into()]),
        ]))
        .unwrap();
        assert_eq!(apply.tag(), TAG_APPLY);
        assert_eq!(apply.id(), 3);

        let rejected = Message::from_value(wire(vec![
            "promise rejected".into(),
            Value::Int(5),
            "boom".into(),
        ]))
        .unwrap();
        assert!(matches!(
            rejected,
            Message::PromiseRejected { id: 5, reason: Value::String(ref r) } if r == "boom"
        ));

        let close = Message::from_value(wire(vec!["close".into(), Value::Int(-1)])).unwrap();
        assert!(matches!(close, Message::Close { id: -1 }));
    }

    #[test]
    fn malformed_messages_are_protocol_errors() {
        for bad in [
            Value::from("call"),
            wire(vec![]),
            wire(vec![Value::Int(1)]),
            wire(vec!["bogus".into(), Value::Int(1)]),
            wire(vec!["close".into()]),
            wire(vec!["close".into(), "one".into()]),
            wire(vec!["call".into(), Value::Int(1), Value::Int(2), wire(vec![])]),
            wire(vec![
                "result".into(),
                Value::Int(1),
                Value::Undefined,
                Value::object([("kind", Value::from("weird"))]),
            ]),
        ] {
            assert!(
                matches!(Message::from_value(bad), Err(PeerError::Protocol(_))),
                "expected protocol error"
            );
        }
    }
}
