use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::registry::{Extension, Registry};
use crate::value::Value;

/// Default maximum nesting depth for encode and decode.
pub const DEFAULT_MAX_DEPTH: usize = 128;

const T_UNDEFINED: u8 = 0x00;
const T_NULL: u8 = 0x01;
const T_FALSE: u8 = 0x02;
const T_TRUE: u8 = 0x03;
const T_INT: u8 = 0x04;
const T_FLOAT: u8 = 0x05;
const T_STRING: u8 = 0x06;
const T_BYTES: u8 = 0x07;
const T_ARRAY: u8 = 0x08;
const T_OBJECT: u8 = 0x09;
const T_MAP: u8 = 0x0A;
const T_SET: u8 = 0x0B;
const T_EXTENSION: u8 = 0x0C;

/// Tagged binary codec.
///
/// Values whose kind is claimed by an extension in the registry are written
/// as an extension envelope:
///
/// ```text
/// ┌──────┬──────────────┬─────────────┬────────────────────┐
/// │ 0x0C │ name len (1B)│ name (ASCII)│ payload (a value)  │
/// └──────┴──────────────┴─────────────┴────────────────────┘
/// ```
///
/// Everything else is written structurally: one type byte, then a fixed
/// width scalar or a `u32` LE length/count followed by the body.
pub struct Codec<C: ?Sized> {
    registry: Arc<Registry<C>>,
    max_depth: usize,
}

impl<C: ?Sized> Codec<C> {
    pub fn new(registry: Registry<C>) -> Self {
        Self {
            registry: Arc::new(registry),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Encode a value.
    ///
    /// The whole tree is checked first (kinds supported, depth in range), so
    /// a rejected value never reaches an extension.
    pub fn encode(&self, value: Value, ctx: &C) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(value, ctx, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Encode a value, appending to `dst`. On error `dst` may hold a partial
    /// encoding.
    pub fn encode_into(&self, value: Value, ctx: &C, dst: &mut BytesMut) -> Result<()> {
        self.check(&value, 0)?;
        self.write(value, ctx, dst, 0)
    }

    /// Decode exactly one value spanning all of `src`.
    pub fn decode(&self, src: &[u8], ctx: &C) -> Result<Value> {
        let mut reader = Reader { src, pos: 0 };
        let value = self.read(&mut reader, ctx, 0)?;
        let remaining = reader.remaining();
        if remaining > 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(value)
    }

    fn check(&self, value: &Value, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(CodecError::TooDeep(self.max_depth));
        }
        let kind = value.kind();
        if self.registry.supports(kind) {
            return Ok(());
        }
        match value {
            Value::Array(items) | Value::Set(items) => {
                for item in items {
                    self.check(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Object(entries) => {
                for (_, item) in entries {
                    self.check(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                for (key, item) in entries {
                    self.check(key, depth + 1)?;
                    self.check(item, depth + 1)?;
                }
                Ok(())
            }
            _ if kind.is_handle() => Err(CodecError::Unsupported(kind)),
            _ => Ok(()),
        }
    }

    fn write(&self, value: Value, ctx: &C, dst: &mut BytesMut, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(CodecError::TooDeep(self.max_depth));
        }
        if let Some(ext) = self.registry.for_kind(value.kind()) {
            return self.write_extension(ext, value, ctx, dst, depth);
        }
        match value {
            Value::Undefined => dst.put_u8(T_UNDEFINED),
            Value::Null => dst.put_u8(T_NULL),
            Value::Bool(false) => dst.put_u8(T_FALSE),
            Value::Bool(true) => dst.put_u8(T_TRUE),
            Value::Int(n) => {
                dst.put_u8(T_INT);
                dst.put_i64_le(n);
            }
            Value::Float(n) => {
                dst.put_u8(T_FLOAT);
                dst.put_f64_le(n);
            }
            Value::String(s) => {
                dst.put_u8(T_STRING);
                put_str(dst, &s)?;
            }
            Value::Bytes(b) => {
                dst.put_u8(T_BYTES);
                put_len(dst, b.len())?;
                dst.put_slice(&b);
            }
            Value::Array(items) => {
                dst.put_u8(T_ARRAY);
                self.write_seq(items, ctx, dst, depth)?;
            }
            Value::Set(items) => {
                dst.put_u8(T_SET);
                self.write_seq(items, ctx, dst, depth)?;
            }
            Value::Object(entries) => {
                dst.put_u8(T_OBJECT);
                put_len(dst, entries.len())?;
                for (key, item) in entries {
                    put_str(dst, &key)?;
                    self.write(item, ctx, dst, depth + 1)?;
                }
            }
            Value::Map(entries) => {
                dst.put_u8(T_MAP);
                put_len(dst, entries.len())?;
                for (key, item) in entries {
                    self.write(key, ctx, dst, depth + 1)?;
                    self.write(item, ctx, dst, depth + 1)?;
                }
            }
            handle => return Err(CodecError::Unsupported(handle.kind())),
        }
        Ok(())
    }

    fn write_seq(&self, items: Vec<Value>, ctx: &C, dst: &mut BytesMut, depth: usize) -> Result<()> {
        put_len(dst, items.len())?;
        for item in items {
            self.write(item, ctx, dst, depth + 1)?;
        }
        Ok(())
    }

    fn write_extension(
        &self,
        ext: &dyn Extension<C>,
        value: Value,
        ctx: &C,
        dst: &mut BytesMut,
        depth: usize,
    ) -> Result<()> {
        let name = ext.name();
        let name_len = u8::try_from(name.len())
            .map_err(|_| CodecError::extension(name, "name longer than 255 bytes"))?;
        let payload = ext.encode(value, ctx)?;
        dst.put_u8(T_EXTENSION);
        dst.put_u8(name_len);
        dst.put_slice(name.as_bytes());
        self.write(payload, ctx, dst, depth + 1)
    }

    fn read(&self, reader: &mut Reader<'_>, ctx: &C, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(CodecError::TooDeep(self.max_depth));
        }
        let value = match reader.u8()? {
            T_UNDEFINED => Value::Undefined,
            T_NULL => Value::Null,
            T_FALSE => Value::Bool(false),
            T_TRUE => Value::Bool(true),
            T_INT => Value::Int(i64::from_le_bytes(reader.array()?)),
            T_FLOAT => Value::Float(f64::from_le_bytes(reader.array()?)),
            T_STRING => Value::String(reader.string()?),
            T_BYTES => {
                let len = reader.count()?;
                Value::Bytes(Bytes::copy_from_slice(reader.take(len)?))
            }
            T_ARRAY => Value::Array(self.read_seq(reader, ctx, depth)?),
            T_SET => Value::Set(self.read_seq(reader, ctx, depth)?),
            T_OBJECT => {
                let count = reader.count()?;
                let mut entries = Vec::with_capacity(count.min(reader.remaining()));
                for _ in 0..count {
                    let key = reader.string()?;
                    let item = self.read(reader, ctx, depth + 1)?;
                    entries.push((key, item));
                }
                Value::Object(entries)
            }
            T_MAP => {
                let count = reader.count()?;
                let mut entries = Vec::with_capacity(count.min(reader.remaining()));
                for _ in 0..count {
                    let key = self.read(reader, ctx, depth + 1)?;
                    let item = self.read(reader, ctx, depth + 1)?;
                    entries.push((key, item));
                }
                Value::Map(entries)
            }
            T_EXTENSION => {
                let name_len = reader.u8()? as usize;
                let name = std::str::from_utf8(reader.take(name_len)?)
                    .map_err(|_| CodecError::InvalidUtf8)?;
                let ext = self
                    .registry
                    .by_name(name)
                    .ok_or_else(|| CodecError::UnknownExtension(name.to_string()))?;
                let payload = self.read(reader, ctx, depth + 1)?;
                ext.decode(payload, ctx)?
            }
            other => return Err(CodecError::UnknownType(other)),
        };
        Ok(value)
    }

    fn read_seq(&self, reader: &mut Reader<'_>, ctx: &C, depth: usize) -> Result<Vec<Value>> {
        let count = reader.count()?;
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(self.read(reader, ctx, depth + 1)?);
        }
        Ok(items)
    }
}

impl<C: ?Sized> Clone for Codec<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            max_depth: self.max_depth,
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for Codec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("extensions", &self.registry)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

fn put_len(dst: &mut BytesMut, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
    dst.put_u32_le(len);
    Ok(())
}

fn put_str(dst: &mut BytesMut, s: &str) -> Result<()> {
    put_len(dst, s.len())?;
    dst.put_slice(s.as_bytes());
    Ok(())
}

struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::Truncated {
                needed: n - remaining,
            });
        }
        let slice = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn count(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.count()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Closure, ValueStream};
    use crate::url_ext::UrlExtension;
    use crate::value::ValueKind;

    fn plain() -> Codec<()> {
        Codec::new(Registry::new())
    }

    fn roundtrip(codec: &Codec<()>, value: Value) -> Value {
        let bytes = codec.encode(value, &()).unwrap();
        codec.decode(&bytes, &()).unwrap()
    }

    #[test]
    fn scalars_roundtrip() {
        let codec = plain();
        for value in [
            Value::Undefined,
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(-7),
            Value::Int(i64::MAX),
            Value::Float(2.5),
            Value::from(""),
            Value::from("héllo"),
            Value::Bytes(Bytes::from_static(&[0, 1, 255])),
        ] {
            let debug = format!("{value:?}");
            let expected = format!("{:?}", roundtrip(&codec, value));
            assert_eq!(debug, expected);
        }
    }

    #[test]
    fn nested_containers_roundtrip() {
        let codec = plain();
        let build = || {
            Value::object([
                ("list", Value::Array(vec![1.into(), "two".into(), Value::Null])),
                (
                    "map",
                    Value::Map(vec![
                        (Value::Int(1), Value::from("one")),
                        (Value::Array(vec![]), Value::Set(vec![true.into()])),
                    ]),
                ),
                ("empty", Value::Object(vec![])),
            ])
        };
        assert_eq!(roundtrip(&codec, build()), build());
    }

    #[test]
    fn wire_layout_is_stable() {
        let codec = plain();
        let bytes = codec
            .encode(Value::Array(vec![Value::Int(1), Value::from("a")]), &())
            .unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[
                T_ARRAY, 2, 0, 0, 0, //
                T_INT, 1, 0, 0, 0, 0, 0, 0, 0, //
                T_STRING, 1, 0, 0, 0, b'a',
            ]
        );
    }

    #[test]
    fn extension_envelope_carries_name() {
        let codec: Codec<()> = Codec::new(Registry::new().with(UrlExtension));
        let url = url::Url::parse("http://x.test/").unwrap();
        let bytes = codec.encode(Value::Url(url.clone()), &()).unwrap();
        assert_eq!(&bytes[..5], &[T_EXTENSION, 3, b'u', b'r', b'l']);
        assert_eq!(codec.decode(&bytes, &()).unwrap(), Value::Url(url));
    }

    #[test]
    fn handles_without_extension_are_unsupported() {
        let codec = plain();
        let url = url::Url::parse("http://x.test/").unwrap();
        assert!(matches!(
            codec.encode(Value::Url(url), &()),
            Err(CodecError::Unsupported(ValueKind::Url))
        ));

        let nested = Value::Array(vec![
            Value::Int(1),
            Value::Stream(ValueStream::from_values([1])),
        ]);
        assert!(matches!(
            codec.encode(nested, &()),
            Err(CodecError::Unsupported(ValueKind::Stream))
        ));

        let in_map_key = Value::Map(vec![(
            Value::Function(Closure::new(|_| async { Ok(Value::Null) })),
            Value::Null,
        )]);
        assert!(matches!(
            codec.encode(in_map_key, &()),
            Err(CodecError::Unsupported(ValueKind::Function))
        ));
    }

    #[test]
    fn unknown_extension_name_is_an_error() {
        let codec = plain();
        let mut bytes = vec![T_EXTENSION, 4];
        bytes.extend_from_slice(b"nope");
        bytes.push(T_NULL);
        assert!(matches!(
            codec.decode(&bytes, &()),
            Err(CodecError::UnknownExtension(name)) if name == "nope"
        ));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let codec = plain();
        assert!(matches!(
            codec.decode(&[0xEE], &()),
            Err(CodecError::UnknownType(0xEE))
        ));
        assert!(matches!(
            codec.decode(&[T_INT, 1, 2], &()),
            Err(CodecError::Truncated { needed: 6 })
        ));
        assert!(matches!(
            codec.decode(&[T_STRING, 2, 0, 0, 0, 0xC3, 0x28], &()),
            Err(CodecError::InvalidUtf8)
        ));
        assert!(matches!(
            codec.decode(&[T_NULL, T_NULL], &()),
            Err(CodecError::TrailingBytes(1))
        ));
        assert!(matches!(
            codec.decode(&[], &()),
            Err(CodecError::Truncated { needed: 1 })
        ));
    }

    #[test]
    fn huge_declared_count_does_not_preallocate() {
        let codec = plain();
        let bytes = [T_ARRAY, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            codec.decode(&bytes, &()),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn depth_limit_applies_both_ways() {
        let codec = plain().with_max_depth(3);

        let mut deep = Value::Null;
        for _ in 0..5 {
            deep = Value::Array(vec![deep]);
        }
        assert!(matches!(
            codec.encode(deep, &()),
            Err(CodecError::TooDeep(3))
        ));

        let mut bytes = Vec::new();
        for _ in 0..5 {
            bytes.extend_from_slice(&[T_ARRAY, 1, 0, 0, 0]);
        }
        bytes.push(T_NULL);
        assert!(matches!(
            codec.decode(&bytes, &()),
            Err(CodecError::TooDeep(3))
        ));

        let mut shallow = Value::Null;
        for _ in 0..3 {
            shallow = Value::Array(vec![shallow]);
        }
        assert!(codec.encode(shallow, &()).is_ok());
    }
}
