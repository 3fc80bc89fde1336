//! Dynamic value representation
//!
//! Every quantity the substrate moves around is a [`Value`]: either an
//! immediate primitive or a handle into the realm arena ([`ObjectId`] /
//! [`FunctionId`]). Handles are plain indices, so values stay `Clone` and
//! comparisons never chase pointers.

use std::fmt;
use std::rc::Rc;

use crate::realm::{FunctionId, ObjectId};

/// A loosely-typed runtime value.
///
/// `Object` and `Function` are the composite variants; they are the only
/// values that can carry metadata or own an assigned identity. Everything
/// else is primitive and identified structurally.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent value (the default).
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Immutable string (cheap to clone).
    Str(Rc<str>),
    /// Handle to an object in a [`crate::Realm`].
    Object(ObjectId),
    /// Handle to a native function in a [`crate::Realm`].
    Function(FunctionId),
}

impl Value {
    /// Create an undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Value::Undefined
    }

    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Value::Null
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    /// Create an integer value
    #[inline]
    pub const fn int(i: i64) -> Self {
        Value::Int(i)
    }

    /// Create a float value
    #[inline]
    pub const fn float(f: f64) -> Self {
        Value::Float(f)
    }

    /// Create a string value
    #[inline]
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Create an object handle value
    #[inline]
    pub const fn object(id: ObjectId) -> Self {
        Value::Object(id)
    }

    /// Create a function handle value
    #[inline]
    pub const fn function(id: FunctionId) -> Self {
        Value::Function(id)
    }

    /// Check if this value is undefined
    #[inline]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if this value is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a composite (object or function) that can
    /// carry metadata or an assigned identity.
    #[inline]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Function(_))
    }

    /// Extract a boolean
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer
    #[inline]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float
    #[inline]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract a string slice
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an object handle
    #[inline]
    pub const fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Extract a function handle
    #[inline]
    pub const fn as_function(&self) -> Option<FunctionId> {
        match self {
            Value::Function(id) => Some(*id),
            _ => None,
        }
    }

    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            // Handles are always truthy
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Get type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(id) => write!(f, "[object#{}]", id.index()),
            Value::Function(id) => write!(f, "[function#{}]", id.index()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null_and_undefined() {
        assert!(Value::null().is_null());
        assert!(Value::undefined().is_undefined());
        assert!(!Value::null().is_undefined());
        assert_eq!(Value::default(), Value::Undefined);
    }

    #[test]
    fn test_value_extractors() {
        assert_eq!(Value::bool(true).as_bool(), Some(true));
        assert_eq!(Value::int(-7).as_int(), Some(-7));
        assert_eq!(Value::float(1.5).as_float(), Some(1.5));
        assert_eq!(Value::str("hi").as_str(), Some("hi"));
        assert_eq!(Value::int(1).as_bool(), None);
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::undefined().is_truthy());
        assert!(!Value::null().is_truthy());
        assert!(!Value::bool(false).is_truthy());
        assert!(Value::bool(true).is_truthy());
        assert!(!Value::int(0).is_truthy());
        assert!(Value::int(-1).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(Value::null().type_name(), "null");
        assert_eq!(Value::int(3).type_name(), "int");
        assert_eq!(Value::str("s").type_name(), "string");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::null()), "null");
        assert_eq!(format!("{}", Value::bool(true)), "true");
        assert_eq!(format!("{}", Value::int(42)), "42");
        assert_eq!(format!("{}", Value::str("abc")), "abc");
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::int(42), Value::int(42));
        assert_ne!(Value::int(1), Value::int(2));
        assert_ne!(Value::null(), Value::bool(false));
        assert_eq!(Value::str("a"), Value::str("a"));
    }
}
