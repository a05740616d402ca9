use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{self, Source};
use crate::error::{RegistryError, Result, WireError};
use crate::value::{TypeTag, Value};

/// Raw fixed-width primitives, copied in native layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int32,
    Float32,
}

/// An encode/decode function pair for one type tag.
///
/// `encode` writes only the body; the tag is written by the registry.
#[derive(Clone, Copy)]
pub struct Codec {
    pub encode: fn(&Value, &mut BytesMut) -> Result<()>,
    pub decode: fn(&mut Source<'_>) -> Result<Value>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

/// How the values of one type tag are put on the wire.
///
/// Chosen once at registration; lookups never re-derive it.
#[derive(Debug, Clone, Copy)]
pub enum Encoding {
    /// Raw native copy.
    Primitive(Primitive),
    /// The type's own [`SelfDescribing`] implementation.
    SelfDescribing(Codec),
    /// A free-function pair for a container (strings, sequences, or a
    /// container registered by the integration layer).
    Container(Codec),
}

/// A type that knows its own tag and wire form.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Point { x: f32, y: f32 }
///
/// impl SelfDescribing for Point {
///     const TYPE_TAG: TypeTag = TypeTag(1);
///     fn encode(&self, dst: &mut BytesMut) -> Result<()> {
///         codec::put_f32(dst, self.x);
///         codec::put_f32(dst, self.y);
///         Ok(())
///     }
///     fn decode(src: &mut Source<'_>) -> Result<Self> {
///         Ok(Point { x: src.read_f32()?, y: src.read_f32()? })
///     }
/// }
/// ```
pub trait SelfDescribing: Any + fmt::Debug + PartialEq + Send + Sync + Sized {
    const TYPE_TAG: TypeTag;

    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    fn decode(src: &mut Source<'_>) -> Result<Self>;
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    encoding: Encoding,
}

/// Encode and decode tables keyed by [`TypeTag`].
///
/// Built once before any session traffic and immutable afterwards. Sessions
/// share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    entries: BTreeMap<TypeTag, Entry>,
}

impl TypeRegistry {
    /// Registry holding only the built-in primitives, built on first use.
    pub fn builtin() -> Arc<TypeRegistry> {
        static BUILTIN: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(TypeRegistryBuilder::new().build()))
            .clone()
    }

    /// Start from the built-in primitives and add integration types.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn encoding(&self, tag: TypeTag) -> Result<Encoding> {
        self.entries
            .get(&tag)
            .map(|entry| entry.encoding)
            .ok_or(WireError::UnregisteredType(tag))
    }

    /// Registered name of a tag, for diagnostics.
    pub fn name(&self, tag: TypeTag) -> Option<&str> {
        self.entries.get(&tag).map(|entry| entry.name.as_str())
    }

    /// All registered tags, ascending.
    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.entries.keys().copied()
    }

    /// Append `value`'s tag and body.
    pub fn encode(&self, value: &Value, dst: &mut BytesMut) -> Result<()> {
        let tag = value.type_tag();
        let encoding = self.encoding(tag)?;
        codec::put_type_tag(dst, tag);
        encode_body(encoding, value, dst)
    }

    /// Append `value` as type `tag`, failing if the value has another type.
    pub fn encode_as(&self, tag: TypeTag, value: &Value, dst: &mut BytesMut) -> Result<()> {
        value.expect_type(tag)?;
        self.encode(value, dst)
    }

    /// Read a tag and the body that follows it.
    pub fn decode(&self, src: &mut Source<'_>) -> Result<Value> {
        let tag = src.read_type_tag()?;
        self.decode_body(tag, src)
    }

    /// Read the body of a value whose tag is already known.
    pub fn decode_body(&self, tag: TypeTag, src: &mut Source<'_>) -> Result<Value> {
        match self.encoding(tag)? {
            Encoding::Primitive(Primitive::Int32) => Ok(Value::Int(src.read_i32()?)),
            Encoding::Primitive(Primitive::Float32) => Ok(Value::Float(src.read_f32()?)),
            Encoding::SelfDescribing(codec) | Encoding::Container(codec) => {
                let value = (codec.decode)(src)?;
                value.expect_type(tag)?;
                Ok(value)
            }
        }
    }
}

fn encode_body(encoding: Encoding, value: &Value, dst: &mut BytesMut) -> Result<()> {
    match (encoding, value) {
        (Encoding::Primitive(Primitive::Int32), Value::Int(v)) => {
            codec::put_i32(dst, *v);
            Ok(())
        }
        (Encoding::Primitive(Primitive::Float32), Value::Float(v)) => {
            codec::put_f32(dst, *v);
            Ok(())
        }
        (Encoding::SelfDescribing(codec) | Encoding::Container(codec), value) => {
            (codec.encode)(value, dst)
        }
        (Encoding::Primitive(_), value) => Err(WireError::Codec {
            tag: value.type_tag(),
            message: "value is not a primitive".to_string(),
        }),
    }
}

/// Builder for a [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct TypeRegistryBuilder {
    entries: BTreeMap<TypeTag, Entry>,
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistryBuilder {
    /// A builder pre-populated with the built-in primitives.
    pub fn new() -> Self {
        let mut builder = Self {
            entries: BTreeMap::new(),
        };
        let builtins = [
            (TypeTag::INT32, Encoding::Primitive(Primitive::Int32)),
            (TypeTag::FLOAT32, Encoding::Primitive(Primitive::Float32)),
            (TypeTag::INT32_VEC, Encoding::Container(INT32_VEC)),
            (TypeTag::FLOAT32_VEC, Encoding::Container(FLOAT32_VEC)),
            (TypeTag::STRING, Encoding::Container(STRING)),
        ];
        for (tag, encoding) in builtins {
            let name = tag.name().unwrap_or("builtin").to_string();
            builder.entries.insert(tag, Entry { name, encoding });
        }
        builder
    }

    /// Register a type that encodes itself.
    pub fn register_self_describing<T: SelfDescribing>(
        mut self,
    ) -> std::result::Result<Self, RegistryError> {
        let codec = Codec {
            encode: encode_self_describing::<T>,
            decode: decode_self_describing::<T>,
        };
        self.insert(
            T::TYPE_TAG,
            short_type_name::<T>(),
            Encoding::SelfDescribing(codec),
        )?;
        Ok(self)
    }

    /// Register a container type through a free-function pair.
    ///
    /// The decode function must produce values whose tag is `tag`.
    pub fn register_container(
        mut self,
        tag: TypeTag,
        name: impl Into<String>,
        codec: Codec,
    ) -> std::result::Result<Self, RegistryError> {
        self.insert(tag, name.into(), Encoding::Container(codec))?;
        Ok(self)
    }

    fn insert(
        &mut self,
        tag: TypeTag,
        name: String,
        encoding: Encoding,
    ) -> std::result::Result<(), RegistryError> {
        if tag.get() <= 0 {
            return Err(RegistryError::Reserved(tag));
        }
        if self.entries.contains_key(&tag) {
            return Err(RegistryError::Duplicate(tag));
        }
        debug!(tag = tag.get(), %name, "registered wire type");
        self.entries.insert(tag, Entry { name, encoding });
        Ok(())
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            entries: self.entries,
        }
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

fn encode_self_describing<T: SelfDescribing>(value: &Value, dst: &mut BytesMut) -> Result<()> {
    let inner = value
        .downcast_ref::<T>()
        .ok_or(WireError::TypeMismatch {
            expected: T::TYPE_TAG,
            found: value.type_tag(),
        })?;
    inner.encode(dst)
}

fn decode_self_describing<T: SelfDescribing>(src: &mut Source<'_>) -> Result<Value> {
    Ok(Value::custom(T::decode(src)?))
}

const INT32_VEC: Codec = Codec {
    encode: encode_i32_seq,
    decode: decode_i32_seq,
};

const FLOAT32_VEC: Codec = Codec {
    encode: encode_f32_seq,
    decode: decode_f32_seq,
};

const STRING: Codec = Codec {
    encode: encode_string,
    decode: decode_string,
};

fn encode_i32_seq(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::IntVec(values) => {
            codec::put_i32_seq(dst, values);
            Ok(())
        }
        other => Err(WireError::TypeMismatch {
            expected: TypeTag::INT32_VEC,
            found: other.type_tag(),
        }),
    }
}

fn decode_i32_seq(src: &mut Source<'_>) -> Result<Value> {
    Ok(Value::IntVec(src.read_i32_seq()?))
}

fn encode_f32_seq(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::FloatVec(values) => {
            codec::put_f32_seq(dst, values);
            Ok(())
        }
        other => Err(WireError::TypeMismatch {
            expected: TypeTag::FLOAT32_VEC,
            found: other.type_tag(),
        }),
    }
}

fn decode_f32_seq(src: &mut Source<'_>) -> Result<Value> {
    Ok(Value::FloatVec(src.read_f32_seq()?))
}

fn encode_string(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::Str(s) => {
            codec::put_str(dst, s);
            Ok(())
        }
        other => Err(WireError::TypeMismatch {
            expected: TypeTag::STRING,
            found: other.type_tag(),
        }),
    }
}

fn decode_string(src: &mut Source<'_>) -> Result<Value> {
    Ok(Value::Str(src.read_string()?))
}
