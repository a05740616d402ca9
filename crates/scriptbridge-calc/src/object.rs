use std::fmt;

use scriptbridge_wire::{TypeTag, Value};

use crate::error::{CalcError, Result};
use crate::parser::BinOp;

/// A value living inside a [`CalcEngine`](crate::CalcEngine).
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Int(i32),
    Float(f32),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Str(String),
    /// A registered value the engine cannot look inside.
    Foreign(Value),
}

impl Object {
    pub fn type_name(&self) -> String {
        match self {
            Object::Null => "NULL".to_string(),
            Object::Int(_) => "integer".to_string(),
            Object::Float(_) => "double".to_string(),
            Object::Ints(_) => "integer vector".to_string(),
            Object::Floats(_) => "double vector".to_string(),
            Object::Str(_) => "character".to_string(),
            Object::Foreign(value) => format!("foreign {}", value.type_tag()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Object::Null => 0,
            Object::Ints(v) => v.len(),
            Object::Floats(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a decoded wire value into the engine.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Void => Object::Null,
            Value::Int(v) => Object::Int(v),
            Value::Float(v) => Object::Float(v),
            Value::IntVec(v) => Object::Ints(v),
            Value::FloatVec(v) => Object::Floats(v),
            Value::Str(s) => Object::Str(s),
            custom @ Value::Custom(_) => Object::Foreign(custom),
        }
    }

    /// Convert to a wire value of type `tag`.
    ///
    /// Integers widen to floats and scalars become length-1 vectors; nothing
    /// narrows. Foreign values only pass through under their own tag.
    pub fn export(&self, tag: TypeTag) -> Result<Value> {
        let value = match (self, tag) {
            (_, TypeTag::VOID) => Some(Value::Void),
            (Object::Int(v), TypeTag::INT32) => Some(Value::Int(*v)),
            (Object::Ints(v), TypeTag::INT32) if v.len() == 1 => Some(Value::Int(v[0])),
            (Object::Int(v), TypeTag::FLOAT32) => Some(Value::Float(*v as f32)),
            (Object::Float(v), TypeTag::FLOAT32) => Some(Value::Float(*v)),
            (Object::Ints(v), TypeTag::FLOAT32) if v.len() == 1 => Some(Value::Float(v[0] as f32)),
            (Object::Floats(v), TypeTag::FLOAT32) if v.len() == 1 => Some(Value::Float(v[0])),
            (Object::Int(v), TypeTag::INT32_VEC) => Some(Value::IntVec(vec![*v])),
            (Object::Ints(v), TypeTag::INT32_VEC) => Some(Value::IntVec(v.clone())),
            (Object::Int(v), TypeTag::FLOAT32_VEC) => Some(Value::FloatVec(vec![*v as f32])),
            (Object::Float(v), TypeTag::FLOAT32_VEC) => Some(Value::FloatVec(vec![*v])),
            (Object::Ints(v), TypeTag::FLOAT32_VEC) => {
                Some(Value::FloatVec(v.iter().map(|x| *x as f32).collect()))
            }
            (Object::Floats(v), TypeTag::FLOAT32_VEC) => Some(Value::FloatVec(v.clone())),
            (Object::Str(s), TypeTag::STRING) => Some(Value::Str(s.clone())),
            (Object::Foreign(value), tag) if value.type_tag() == tag => Some(value.clone()),
            _ => None,
        };
        value.ok_or_else(|| {
            CalcError::Type(format!(
                "cannot convert {} to {tag}",
                self.type_name()
            ))
        })
    }

    fn numeric(&self, op: BinOp) -> Result<Numeric> {
        match self {
            Object::Int(v) => Ok(Numeric::Ints(vec![*v], true)),
            Object::Float(v) => Ok(Numeric::Floats(vec![*v], true)),
            Object::Ints(v) => Ok(Numeric::Ints(v.clone(), false)),
            Object::Floats(v) => Ok(Numeric::Floats(v.clone(), false)),
            other => Err(CalcError::Type(format!(
                "non-numeric argument to '{}': {}",
                op.symbol(),
                other.type_name()
            ))),
        }
    }

    /// Apply a binary arithmetic operator.
    ///
    /// Vectors combine element-wise and must have equal lengths unless one
    /// side has length 1. Integer `/` always produces doubles.
    pub fn binary(&self, op: BinOp, rhs: &Object) -> Result<Object> {
        let (lhs, rhs) = (self.numeric(op)?, rhs.numeric(op)?);
        let scalar = lhs.is_scalar() && rhs.is_scalar();
        let result = match (lhs, rhs) {
            (Numeric::Ints(a, _), Numeric::Ints(b, _)) if op != BinOp::Div => {
                let values = zip_with(a.as_slice(), b.as_slice(), |x, y| int_op(op, x, y))?;
                Numeric::Ints(values, scalar)
            }
            (a, b) => {
                let (a, b) = (a.into_floats(), b.into_floats());
                let values = zip_with(a.as_slice(), b.as_slice(), |x, y| Ok(float_op(op, x, y)))?;
                Numeric::Floats(values, scalar)
            }
        };
        Ok(result.into_object())
    }

    pub fn negate(&self) -> Result<Object> {
        Object::Int(0).binary(BinOp::Sub, self)
    }

    /// Flatten into floats, for plotting.
    pub fn as_floats(&self) -> Result<Vec<f32>> {
        match self.numeric(BinOp::Add) {
            Ok(numeric) => Ok(numeric.into_floats()),
            Err(_) => Err(CalcError::Type(format!(
                "expected numeric values, got {}",
                self.type_name()
            ))),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{v}")?;
            }
            Ok(())
        }

        match self {
            Object::Null => f.write_str("NULL"),
            Object::Int(v) => write!(f, "{v}"),
            Object::Float(v) => write!(f, "{v}"),
            Object::Ints(v) => join(f, v),
            Object::Floats(v) => join(f, v),
            Object::Str(s) => f.write_str(s),
            Object::Foreign(value) => write!(f, "<{}>", value.type_tag()),
        }
    }
}

enum Numeric {
    /// Values, and whether they came from a scalar.
    Ints(Vec<i32>, bool),
    Floats(Vec<f32>, bool),
}

impl Numeric {
    fn is_scalar(&self) -> bool {
        match self {
            Numeric::Ints(_, scalar) | Numeric::Floats(_, scalar) => *scalar,
        }
    }

    fn into_floats(self) -> Vec<f32> {
        match self {
            Numeric::Ints(v, _) => v.into_iter().map(|x| x as f32).collect(),
            Numeric::Floats(v, _) => v,
        }
    }

    fn into_object(self) -> Object {
        match self {
            Numeric::Ints(v, true) if v.len() == 1 => Object::Int(v[0]),
            Numeric::Floats(v, true) if v.len() == 1 => Object::Float(v[0]),
            Numeric::Ints(v, _) => Object::Ints(v),
            Numeric::Floats(v, _) => Object::Floats(v),
        }
    }
}

fn zip_with<T: Copy, U>(a: &[T], b: &[T], f: impl Fn(T, T) -> Result<U>) -> Result<Vec<U>> {
    match (a.len(), b.len()) {
        (n, m) if n == m => a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect(),
        (1, _) => b.iter().map(|y| f(a[0], *y)).collect(),
        (_, 1) => a.iter().map(|x| f(*x, b[0])).collect(),
        (n, m) => Err(CalcError::Type(format!(
            "vector lengths differ ({n} and {m})"
        ))),
    }
}

fn int_op(op: BinOp, x: i32, y: i32) -> Result<i32> {
    let result = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(CalcError::Arithmetic("integer division by zero"));
            }
            x.checked_div(y)
        }
    };
    result.ok_or(CalcError::Arithmetic("integer overflow"))
}

fn float_op(op: BinOp, x: f32, y: f32) -> f32 {
    match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_arithmetic_promotes_to_float() {
        assert_eq!(
            Object::Int(2).binary(BinOp::Add, &Object::Int(3)).unwrap(),
            Object::Int(5)
        );
        assert_eq!(
            Object::Int(2).binary(BinOp::Mul, &Object::Float(1.5)).unwrap(),
            Object::Float(3.0)
        );
        assert_eq!(
            Object::Int(7).binary(BinOp::Div, &Object::Int(2)).unwrap(),
            Object::Float(3.5)
        );
        assert_eq!(Object::Float(2.5).negate().unwrap(), Object::Float(-2.5));
    }

    #[test]
    fn vectors_are_element_wise_and_broadcast_length_one() {
        let v = Object::Ints(vec![1, 2, 3]);
        assert_eq!(
            v.binary(BinOp::Mul, &Object::Int(2)).unwrap(),
            Object::Ints(vec![2, 4, 6])
        );
        assert_eq!(
            v.binary(BinOp::Add, &Object::Floats(vec![0.5, 0.5, 0.5]))
                .unwrap(),
            Object::Floats(vec![1.5, 2.5, 3.5])
        );
        assert_eq!(
            Object::Ints(vec![4]).binary(BinOp::Sub, &Object::Int(1)).unwrap(),
            Object::Ints(vec![3])
        );
        assert!(matches!(
            v.binary(BinOp::Add, &Object::Ints(vec![1, 2])),
            Err(CalcError::Type(_))
        ));
    }

    #[test]
    fn arithmetic_errors() {
        assert!(matches!(
            Object::Int(i32::MAX).binary(BinOp::Add, &Object::Int(1)),
            Err(CalcError::Arithmetic("integer overflow"))
        ));
        assert!(matches!(
            Object::Str("a".into()).binary(BinOp::Add, &Object::Int(1)),
            Err(CalcError::Type(_))
        ));
        assert_eq!(
            Object::Float(1.0).binary(BinOp::Div, &Object::Int(0)).unwrap(),
            Object::Float(f32::INFINITY)
        );
    }

    #[test]
    fn export_widens_but_never_narrows() {
        assert_eq!(Object::Int(3).export(TypeTag::FLOAT32).unwrap(), Value::Float(3.0));
        assert_eq!(
            Object::Int(3).export(TypeTag::INT32_VEC).unwrap(),
            Value::IntVec(vec![3])
        );
        assert_eq!(
            Object::Ints(vec![1, 2]).export(TypeTag::FLOAT32_VEC).unwrap(),
            Value::FloatVec(vec![1.0, 2.0])
        );
        assert_eq!(
            Object::Floats(vec![0.25]).export(TypeTag::FLOAT32).unwrap(),
            Value::Float(0.25)
        );
        assert_eq!(
            Object::Float(2.0).export(TypeTag::INT32).unwrap_err(),
            CalcError::Type("cannot convert double to int32 (-1)".into())
        );
        assert!(Object::Ints(vec![1, 2]).export(TypeTag::INT32).is_err());
        assert!(Object::Null.export(TypeTag::STRING).is_err());
        assert_eq!(Object::Null.export(TypeTag::VOID).unwrap(), Value::Void);
    }

    #[test]
    fn display() {
        assert_eq!(Object::Ints(vec![1, 2, 3]).to_string(), "1 2 3");
        assert_eq!(Object::Floats(vec![0.5, 2.0]).to_string(), "0.5 2");
        assert_eq!(Object::Str("hi".into()).to_string(), "hi");
        assert_eq!(Object::Null.to_string(), "NULL");
    }
}
