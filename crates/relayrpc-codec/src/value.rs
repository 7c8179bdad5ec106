use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::handle::{Closure, PendingValue, ValueSink, ValueStream};

/// Type descriptor used to dispatch a [`Value`] to an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Array,
    Object,
    Map,
    Set,
    Url,
    Stream,
    Sink,
    Pending,
    Function,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Map => "map",
            ValueKind::Set => "set",
            ValueKind::Url => "url",
            ValueKind::Stream => "stream",
            ValueKind::Sink => "sink",
            ValueKind::Pending => "pending",
            ValueKind::Function => "function",
        }
    }

    /// Kinds with no structural encoding; they need an extension.
    pub fn is_handle(self) -> bool {
        matches!(
            self,
            ValueKind::Url
                | ValueKind::Stream
                | ValueKind::Sink
                | ValueKind::Pending
                | ValueKind::Function
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that can cross a relayrpc connection.
///
/// Handle variants own live resources (a channel, a future, a callable), so
/// `Value` is not `Clone`. Equality on handles is identity where identity is
/// observable (`Function`, `Sink`) and `false` otherwise.
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    /// String-keyed record; insertion order is preserved.
    Object(Vec<(String, Value)>),
    /// Arbitrary-keyed map; insertion order is preserved.
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Url(Url),
    Stream(ValueStream),
    Sink(ValueSink),
    Pending(PendingValue),
    Function(Closure),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Undefined => ValueKind::Undefined,
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Map(_) => ValueKind::Map,
            Value::Set(_) => ValueKind::Set,
            Value::Url(_) => ValueKind::Url,
            Value::Stream(_) => ValueKind::Stream,
            Value::Sink(_) => ValueKind::Sink,
            Value::Pending(_) => ValueKind::Pending,
            Value::Function(_) => ValueKind::Function,
        }
    }

    /// Build an object from `(key, value)` pairs.
    pub fn object<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key in an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn into_string(self) -> Result<String, Value> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, Value> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other),
        }
    }

    pub fn into_stream(self) -> Result<ValueStream, Value> {
        match self {
            Value::Stream(stream) => Ok(stream),
            other => Err(other),
        }
    }

    pub fn into_sink(self) -> Result<ValueSink, Value> {
        match self {
            Value::Sink(sink) => Ok(sink),
            other => Err(other),
        }
    }

    pub fn into_pending(self) -> Result<PendingValue, Value> {
        match self {
            Value::Pending(pending) => Ok(pending),
            other => Err(other),
        }
    }

    pub fn into_function(self) -> Result<Closure, Value> {
        match self {
            Value::Function(closure) => Ok(closure),
            other => Err(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Url(a), Value::Url(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Sink(a), Value::Sink(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(entries) => f.debug_tuple("Object").field(entries).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Value::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
            Value::Stream(s) => fmt::Debug::fmt(s, f),
            Value::Sink(s) => fmt::Debug::fmt(s, f),
            Value::Pending(p) => fmt::Debug::fmt(p, f),
            Value::Function(c) => fmt::Debug::fmt(c, f),
        }
    }
}

/// JSON-like rendering for logs and terminal output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => write_list(f, "[", items, "]"),
            Value::Set(items) => write_list(f, "Set{", items, "}"),
            Value::Object(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Map(entries) => {
                f.write_str("Map{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                f.write_str("}")
            }
            Value::Url(url) => write!(f, "{url}"),
            Value::Stream(_) => f.write_str("<stream>"),
            Value::Sink(_) => f.write_str("<sink>"),
            Value::Pending(_) => f.write_str("<pending>"),
            Value::Function(_) => f.write_str("<function>"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Url> for Value {
    fn from(url: Url) -> Self {
        Value::Url(url)
    }
}

impl From<ValueStream> for Value {
    fn from(stream: ValueStream) -> Self {
        Value::Stream(stream)
    }
}

impl From<ValueSink> for Value {
    fn from(sink: ValueSink) -> Self {
        Value::Sink(sink)
    }
}

impl From<PendingValue> for Value {
    fn from(pending: PendingValue) -> Self {
        Value::Pending(pending)
    }
}

impl From<Closure> for Value {
    fn from(closure: Closure) -> Self {
        Value::Function(closure)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
