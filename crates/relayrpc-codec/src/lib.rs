//! Value model and tagged codec for relayrpc.
//!
//! A [`Value`] is either plain data (scalars, arrays, objects, maps, sets,
//! byte buffers) or a handle that cannot be serialized directly: a URL, a
//! readable [`ValueStream`], a writable [`ValueSink`], a [`PendingValue`] or
//! a callable [`Closure`]. The [`Codec`] writes plain data structurally and
//! hands every other kind to the first [`Extension`] in its [`Registry`]
//! that claims it.
//!
//! ```
//! use relayrpc_codec::{Codec, Registry, UrlExtension, Value};
//!
//! let codec: Codec<()> = Codec::new(Registry::new().with(UrlExtension));
//! let url = url::Url::parse("https://example.com/a?b=c").unwrap();
//! let value = Value::Array(vec![Value::from("link"), Value::Url(url.clone())]);
//!
//! let bytes = codec.encode(value, &()).unwrap();
//! let decoded = codec.decode(&bytes, &()).unwrap();
//! assert_eq!(decoded, Value::Array(vec![Value::from("link"), Value::Url(url)]));
//! ```

pub mod codec;
pub mod error;
pub mod handle;
pub mod json;
pub mod registry;
pub mod url_ext;
pub mod value;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use codec::{Codec, DEFAULT_MAX_DEPTH};
pub use error::{CodecError, Result};
pub use handle::{Closure, PendingValue, Rejection, Resolver, ValueSink, ValueStream};
pub use json::{decode_json, encode_json, from_json, to_json};
pub use registry::{Extension, Registry};
pub use url_ext::UrlExtension;
pub use value::{Value, ValueKind};

/// How values are written on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serialization {
    /// Binary envelope with extensions.
    #[default]
    Tagged,
    /// Plain JSON; no extensions.
    Json,
}

impl Serialization {
    pub fn as_str(self) -> &'static str {
        match self {
            Serialization::Tagged => "tagged",
            Serialization::Json => "json",
        }
    }
}

impl fmt::Display for Serialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Serialization {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tagged" => Ok(Serialization::Tagged),
            "json" => Ok(Serialization::Json),
            other => Err(format!(
                "unknown serialization '{other}' (expected tagged or json)"
            )),
        }
    }
}
