use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WireError};

/// Identifies a value's wire representation.
///
/// Negative tags are the built-in primitives, 0 is "no value", and
/// non-negative tags belong to types registered by the engine integration.
/// Tags only need to be stable between the two ends of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub i32);

impl TypeTag {
    pub const VOID: TypeTag = TypeTag(0);
    pub const INT32: TypeTag = TypeTag(-1);
    pub const FLOAT32: TypeTag = TypeTag(-2);
    pub const INT32_VEC: TypeTag = TypeTag(-11);
    pub const FLOAT32_VEC: TypeTag = TypeTag(-12);
    pub const STRING: TypeTag = TypeTag(-20);

    pub const BUILTIN: [TypeTag; 5] = [
        TypeTag::INT32,
        TypeTag::FLOAT32,
        TypeTag::INT32_VEC,
        TypeTag::FLOAT32_VEC,
        TypeTag::STRING,
    ];

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn is_void(self) -> bool {
        self.0 == 0
    }

    pub fn is_builtin(self) -> bool {
        self.0 < 0
    }

    /// Short name for logs and error messages.
    pub fn name(self) -> Option<&'static str> {
        match self {
            TypeTag::VOID => Some("void"),
            TypeTag::INT32 => Some("int32"),
            TypeTag::FLOAT32 => Some("float32"),
            TypeTag::INT32_VEC => Some("vector<int32>"),
            TypeTag::FLOAT32_VEC => Some("vector<float32>"),
            TypeTag::STRING => Some("string"),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "#{}", self.0),
        }
    }
}

impl From<i32> for TypeTag {
    fn from(raw: i32) -> Self {
        TypeTag(raw)
    }
}

/// A decoded value. Whoever decodes it owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int(i32),
    Float(f32),
    IntVec(Vec<i32>),
    FloatVec(Vec<f32>),
    Str(String),
    Custom(CustomValue),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Void => TypeTag::VOID,
            Value::Int(_) => TypeTag::INT32,
            Value::Float(_) => TypeTag::FLOAT32,
            Value::IntVec(_) => TypeTag::INT32_VEC,
            Value::FloatVec(_) => TypeTag::FLOAT32_VEC,
            Value::Str(_) => TypeTag::STRING,
            Value::Custom(custom) => custom.type_tag(),
        }
    }

    /// Wrap a registered self-describing type.
    pub fn custom<T>(value: T) -> Self
    where
        T: crate::registry::SelfDescribing + PartialEq,
    {
        Value::Custom(CustomValue::new(T::TYPE_TAG, value))
    }

    /// Borrow the payload of a custom value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(custom) => custom.downcast_ref(),
            _ => None,
        }
    }

    /// Fail with [`WireError::TypeMismatch`] unless the value has type `tag`.
    pub fn expect_type(&self, tag: TypeTag) -> Result<()> {
        let found = self.type_tag();
        if found == tag {
            Ok(())
        } else {
            Err(WireError::TypeMismatch {
                expected: tag,
                found,
            })
        }
    }
}

/// The payload of a value whose type was registered by the integration layer.
///
/// Cheap to clone; the payload is shared.
#[derive(Clone)]
pub struct CustomValue {
    tag: TypeTag,
    payload: Arc<dyn CustomPayload>,
}

impl CustomValue {
    pub fn new<T>(tag: TypeTag, payload: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        Self {
            tag,
            payload: Arc::new(payload),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("tag", &self.tag.0)
            .field("payload", &self.payload)
            .finish()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && (Arc::ptr_eq(&self.payload, &other.payload)
                || self.payload.eq_payload(other.payload.as_any()))
    }
}

trait CustomPayload: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_payload(&self, other: &dyn Any) -> bool;
}

impl<T> CustomPayload for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_payload(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// Rust types with a fixed built-in wire type.
pub trait WireValue: Sized {
    const TYPE_TAG: TypeTag;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: TypeTag, value: &Value) -> Result<T> {
    Err(WireError::TypeMismatch {
        expected,
        found: value.type_tag(),
    })
}

impl WireValue for () {
    const TYPE_TAG: TypeTag = TypeTag::VOID;

    fn into_value(self) -> Value {
        Value::Void
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Void => Ok(()),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl WireValue for i32 {
    const TYPE_TAG: TypeTag = TypeTag::INT32;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl WireValue for f32 {
    const TYPE_TAG: TypeTag = TypeTag::FLOAT32;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl WireValue for Vec<i32> {
    const TYPE_TAG: TypeTag = TypeTag::INT32_VEC;

    fn into_value(self) -> Value {
        Value::IntVec(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::IntVec(v) => Ok(v),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl WireValue for Vec<f32> {
    const TYPE_TAG: TypeTag = TypeTag::FLOAT32_VEC;

    fn into_value(self) -> Value {
        Value::FloatVec(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::FloatVec(v) => Ok(v),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl WireValue for String {
    const TYPE_TAG: TypeTag = TypeTag::STRING;

    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(v) => Ok(v),
            other => mismatch(Self::TYPE_TAG, &other),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntVec(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::FloatVec(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u8);

    #[test]
    fn builtin_tags_are_negative() {
        for tag in TypeTag::BUILTIN {
            assert!(tag.is_builtin(), "{tag} should be built-in");
        }
        assert!(TypeTag::VOID.is_void());
        assert!(!TypeTag(3).is_builtin());
    }

    #[test]
    fn type_tag_display() {
        assert_eq!(TypeTag::INT32.to_string(), "int32 (-1)");
        assert_eq!(TypeTag(7).to_string(), "#7");
    }

    #[test]
    fn value_reports_its_tag() {
        assert_eq!(Value::Int(4).type_tag(), TypeTag::INT32);
        assert_eq!(Value::Str(String::new()).type_tag(), TypeTag::STRING);
        assert_eq!(Value::FloatVec(vec![]).type_tag(), TypeTag::FLOAT32_VEC);
        let custom = Value::Custom(CustomValue::new(TypeTag(9), Marker(1)));
        assert_eq!(custom.type_tag(), TypeTag(9));
    }

    #[test]
    fn custom_values_compare_by_payload() {
        let a = Value::Custom(CustomValue::new(TypeTag(9), Marker(1)));
        let b = Value::Custom(CustomValue::new(TypeTag(9), Marker(1)));
        let c = Value::Custom(CustomValue::new(TypeTag(9), Marker(2)));
        let d = Value::Custom(CustomValue::new(TypeTag(10), Marker(1)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.downcast_ref::<Marker>(), Some(&Marker(1)));
        assert!(a.downcast_ref::<u8>().is_none());
    }

    #[test]
    fn wire_value_conversions() {
        assert_eq!(i32::from_value(7.into_value()).unwrap(), 7);
        assert_eq!(
            String::from_value(Value::from("héllo")).unwrap(),
            "héllo".to_string()
        );
        let err = f32::from_value(Value::Int(1)).unwrap_err();
        assert!(matches!(
            err,
            WireError::TypeMismatch {
                expected: TypeTag::FLOAT32,
                found: TypeTag::INT32
            }
        ));
    }

    #[test]
    fn expect_type_checks_tag() {
        assert!(Value::Int(1).expect_type(TypeTag::INT32).is_ok());
        assert!(Value::Int(1).expect_type(TypeTag::STRING).is_err());
    }
}
