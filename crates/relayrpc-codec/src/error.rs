use crate::value::ValueKind;

/// Errors produced while encoding or decoding values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An extension envelope named an extension this codec does not know.
    #[error("unknown extension '{0}'")]
    UnknownExtension(String),

    /// The input contained a type byte outside the envelope format.
    #[error("unknown type byte 0x{0:02x}")]
    UnknownType(u8),

    /// The input ended in the middle of a value.
    #[error("truncated input (needed {needed} more bytes)")]
    Truncated { needed: usize },

    /// A string or extension name was not valid UTF-8.
    #[error("invalid utf-8 in string")]
    InvalidUtf8,

    /// Bytes remained after the top-level value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// Nesting exceeded the configured maximum depth.
    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),

    /// No extension claims this kind and it has no structural form.
    #[error("{0} values are not supported by this codec")]
    Unsupported(ValueKind),

    /// A length or count does not fit the wire format.
    #[error("length {0} does not fit in the wire format")]
    LengthOverflow(usize),

    /// An extension failed to encode or decode its payload.
    #[error("extension '{name}': {reason}")]
    Extension { name: &'static str, reason: String },

    /// JSON cannot represent NaN or infinities.
    #[error("non-finite float {0} cannot be written as JSON")]
    NonFiniteFloat(f64),

    /// Malformed JSON input.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Shorthand for extensions reporting a bad payload or failed side effect.
    pub fn extension(name: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Extension {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
