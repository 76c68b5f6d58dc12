//! Typed scalar values carried by entries.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Double,
    Float,
    Int,
    Long,
    UInt,
    ULong,
}

impl ValueType {
    pub fn is_real(self) -> bool {
        matches!(self, ValueType::Double | ValueType::Float)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, ValueType::UInt | ValueType::ULong)
    }

    /// Wraps an `f64` produced by formula code into a value of this type.
    pub fn from_f64(self, v: f64) -> Value {
        match self {
            ValueType::Double => Value::Double(v),
            ValueType::Float => Value::Float(v as f32),
            ValueType::Int => Value::Int(v as i32),
            ValueType::Long => Value::Long(v as i64),
            ValueType::UInt => Value::UInt(v as u32),
            ValueType::ULong => Value::ULong(v as u64),
        }
    }
}

/// A typed scalar tagged with its own type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    UInt(u32),
    ULong(u64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Double(_) => ValueType::Double,
            Value::Float(_) => ValueType::Float,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::UInt(_) => ValueType::UInt,
            Value::ULong(_) => ValueType::ULong,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Double(v) => v,
            Value::Float(v) => v as f64,
            Value::Int(v) => v as f64,
            Value::Long(v) => v as f64,
            Value::UInt(v) => v as f64,
            Value::ULong(v) => v as f64,
        }
    }

    /// True for non-finite reals and for the per-type "empty value" marker (the type's maximum).
    pub fn is_sentinel(&self) -> bool {
        match *self {
            Value::Double(v) => !v.is_finite() || v == f64::MAX,
            Value::Float(v) => !v.is_finite() || v == f32::MAX,
            Value::Int(v) => v == i32::MAX,
            Value::Long(v) => v == i64::MAX,
            Value::UInt(v) => v == u32::MAX,
            Value::ULong(v) => v == u64::MAX,
        }
    }

    /// Bit-exact comparison; `Double(NaN)` equals itself here.
    pub fn bit_eq(&self, other: &Value) -> bool {
        match (*self, *other) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::ULong(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        assert!(Value::Double(f64::NAN).is_sentinel());
        assert!(Value::Double(f64::INFINITY).is_sentinel());
        assert!(Value::Double(f64::MAX).is_sentinel());
        assert!(Value::Int(i32::MAX).is_sentinel());
        assert!(Value::ULong(u64::MAX).is_sentinel());
        assert!(!Value::Double(1.25).is_sentinel());
        assert!(!Value::Long(-7).is_sentinel());
    }

    #[test]
    fn from_f64_respects_type() {
        assert_eq!(ValueType::Int.from_f64(3.9), Value::Int(3));
        assert_eq!(ValueType::Double.from_f64(3.9), Value::Double(3.9));
        assert_eq!(ValueType::UInt.from_f64(12.0).value_type(), ValueType::UInt);
    }

    #[test]
    fn type_classes() {
        assert!(ValueType::Float.is_real());
        assert!(!ValueType::Long.is_real());
        assert!(ValueType::ULong.is_unsigned());
        assert!(!ValueType::Int.is_unsigned());
    }

    #[test]
    fn bit_eq_handles_nan() {
        let nan = Value::Double(f64::NAN);
        assert!(nan.bit_eq(&nan));
        assert!(!Value::Double(1.0).bit_eq(&Value::Float(1.0)));
    }
}
