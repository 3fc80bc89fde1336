//! Identity registry
//!
//! Stable, process-lifetime identity tags for any value the substrate needs
//! to key by identity: mixin units, listener targets, and methods.
//! Primitives get a structural tag (`"(int:3)"`) so identifying them never
//! allocates state; composites are keyed by their arena index, which the
//! realm never reuses.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::realm::Realm;
use crate::value::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Mint a new runtime-unique id.
///
/// Ids are unique for the current process run only; they must not appear in
/// any durably stored data.
pub fn generate_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An opaque identity tag.
///
/// Tags are equal exactly when they denote the same identity. The string
/// form doubles as the key used inside metadata tables.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub(crate) fn new(tag: String) -> Self {
        Ident(tag)
    }

    /// The tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the tag, yielding the metadata key form
    pub fn into_key(self) -> String {
        self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Realm {
    /// Return the identity tag for a value.
    ///
    /// Stable for the value's lifetime; tags for two live composites never
    /// collide because arena indices are never reused. Pure: identifying a
    /// value allocates nothing on it.
    pub fn identify(&self, value: &Value) -> Ident {
        let tag = match value {
            Value::Undefined => "(undefined)".to_string(),
            Value::Null => "(null)".to_string(),
            Value::Bool(b) => format!("(bool:{b})"),
            Value::Int(i) => format!("(int:{i})"),
            Value::Float(x) => format!("(float:{x})"),
            Value::Str(s) => format!("(str:{s})"),
            Value::Object(id) => format!("(object:{})", id.index()),
            Value::Function(id) => format!("(function:{})", id.index()),
        };
        Ident::new(tag)
    }
}
