use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::value::{Value, ValueKind};

/// A codec extension for one [`ValueKind`].
///
/// `C` is the context handed to every call; relay extensions receive the live
/// connection through it so they can allocate ids, install table entries and
/// queue follow-up frames. Payloads returned by [`encode`](Extension::encode)
/// go back through the codec, so they may themselves contain extension kinds.
pub trait Extension<C: ?Sized>: Send + Sync {
    /// Wire name written in the envelope. At most 255 bytes.
    fn name(&self) -> &'static str;

    /// The kind this extension claims.
    fn kind(&self) -> ValueKind;

    /// Turn a value of [`kind`](Extension::kind) into its payload.
    fn encode(&self, value: Value, ctx: &C) -> Result<Value>;

    /// Rebuild a value from a decoded payload.
    fn decode(&self, payload: Value, ctx: &C) -> Result<Value>;
}

/// Ordered, fixed list of extensions. The first extension claiming a kind
/// wins; names are unique.
pub struct Registry<C: ?Sized> {
    extensions: Vec<Arc<dyn Extension<C>>>,
}

impl<C: ?Sized> Registry<C> {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Append an extension. A second extension reusing a name is ignored.
    pub fn with<E>(mut self, extension: E) -> Self
    where
        E: Extension<C> + 'static,
    {
        if self.by_name(extension.name()).is_some() {
            warn!(
                extension = extension.name(),
                "duplicate extension name ignored"
            );
            return self;
        }
        self.extensions.push(Arc::new(extension));
        self
    }

    /// The first extension claiming `kind`.
    pub fn for_kind(&self, kind: ValueKind) -> Option<&dyn Extension<C>> {
        self.extensions
            .iter()
            .find(|ext| ext.kind() == kind)
            .map(|ext| ext.as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Extension<C>> {
        self.extensions
            .iter()
            .find(|ext| ext.name() == name)
            .map(|ext| ext.as_ref())
    }

    pub fn supports(&self, kind: ValueKind) -> bool {
        self.for_kind(kind).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().map(|ext| ext.name())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl<C: ?Sized> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            extensions: self.extensions.clone(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
