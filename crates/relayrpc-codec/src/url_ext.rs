use url::Url;

use crate::error::{CodecError, Result};
use crate::registry::Extension;
use crate::value::{Value, ValueKind};

/// Writes URLs as their string form. Needs no back-channel, so it works
/// with any context, including single-shot exchanges.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlExtension;

impl UrlExtension {
    pub const NAME: &'static str = "url";
}

impl<C: ?Sized> Extension<C> for UrlExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Url
    }

    fn encode(&self, value: Value, _ctx: &C) -> Result<Value> {
        match value {
            Value::Url(url) => Ok(Value::String(url.into())),
            other => Err(CodecError::extension(
                Self::NAME,
                format!("expected url, got {}", other.kind()),
            )),
        }
    }

    fn decode(&self, payload: Value, _ctx: &C) -> Result<Value> {
        let text = payload.into_string().map_err(|other| {
            CodecError::extension(Self::NAME, format!("expected string payload, got {}", other.kind()))
        })?;
        let url = Url::parse(&text).map_err(|e| CodecError::extension(Self::NAME, e.to_string()))?;
        Ok(Value::Url(url))
    }
}
