//! Tagged values
//!
//! A [`Value`] is either a scalar (null, bool, number, char) or a handle to
//! a heap object. Values are `Copy`; ownership of the object a handle points
//! at is tracked by the heap's reference counts, not by Rust ownership.
//!
//! Integers are not a separate kind: a number is an integer when casting it
//! to `i64` and back gives the same number.

use crate::heap::ObjRef;

/// A VM value
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit float
    Number(f64),
    /// Single byte character
    Char(u8),
    /// Reference-counted heap object
    Object(ObjRef),
}

impl Value {
    /// Null value
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Bool(b)
    }

    /// Numeric value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Integer stored as a number
    #[inline]
    pub fn int(n: i64) -> Self {
        Self::Number(n as f64)
    }

    /// Object handle
    #[inline]
    pub const fn object(r: ObjRef) -> Self {
        Self::Object(r)
    }

    /// Is this null
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// Is this a bool
    #[inline]
    pub fn is_bool(self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// Is this a number
    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Is this a number with an exact integer value
    #[inline]
    pub fn is_int(self) -> bool {
        self.as_int().is_some()
    }

    /// Is this an object handle
    #[inline]
    pub fn is_object(self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Bool payload
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Number payload
    #[inline]
    pub fn as_number(self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Integer payload, if the number is integral
    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Number(n) if (n as i64) as f64 == n => Some(n as i64),
            _ => None,
        }
    }

    /// Char payload
    #[inline]
    pub fn as_char(self) -> Option<u8> {
        match self {
            Self::Char(c) => Some(c),
            _ => None,
        }
    }

    /// Object handle payload
    #[inline]
    pub fn as_object(self) -> Option<ObjRef> {
        match self {
            Self::Object(r) => Some(r),
            _ => None,
        }
    }

    /// `null` and `false` are falsy; everything else is truthy
    #[inline]
    pub fn is_falsy(self) -> bool {
        matches!(self, Self::Null | Self::Bool(false))
    }

    /// Scalar kind name used in error messages
    pub fn kind_name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Char(_) => "char",
            Self::Object(_) => "object",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Self::Object(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_numbers() {
        assert_eq!(Value::number(3.0).as_int(), Some(3));
        assert_eq!(Value::number(-7.0).as_int(), Some(-7));
        assert_eq!(Value::number(2.5).as_int(), None);
        assert_eq!(Value::number(f64::NAN).as_int(), None);
        assert_eq!(Value::Char(b'3').as_int(), None);
    }

    #[test]
    fn test_falsy() {
        assert!(Value::Null.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(!Value::Bool(true).is_falsy());
        assert!(!Value::number(0.0).is_falsy());
    }

    #[test]
    fn test_default_is_null() {
        assert!(Value::default().is_null());
    }
}
