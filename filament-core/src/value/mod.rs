//! The observable data model.
//!
//! This module defines the values the engine tracks: scalars, plus
//! structured targets (records, ordered lists, key-sets and key-value
//! maps) identified by reference identity.
//!
//! A nested structure shows up in two forms depending on where it came
//! from: `Value::Target` is the raw structure itself, and `Value::Ref`
//! is a reactive wrapper around one. The interception layer unwraps
//! `Ref` back to `Target` before storing, so wrappers never leak into
//! the raw data graph.

mod json;
mod key;
mod target;

pub use key::{DepKey, Key};
pub use target::{Raw, RawKind, Target, TargetId};

use crate::reactive::ReactiveRef;

/// A value in the observable data graph.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A raw nested structure.
    Target(Target),
    /// A reactive wrapper around a nested structure. Never stored;
    /// writes unwrap it to its backing target first.
    Ref(ReactiveRef),
}

impl Value {
    /// True unless the value is `Null`, `false`, zero or an empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Target(_) | Value::Ref(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The wrapper, if this value is one.
    pub fn as_ref(&self) -> Option<&ReactiveRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The backing target, whether this value is raw or wrapped.
    pub fn raw_target(&self) -> Option<Target> {
        match self {
            Value::Target(t) => Some(t.clone()),
            Value::Ref(r) => Some(r.raw()),
            _ => None,
        }
    }

    /// Strip a reactive wrapper down to its raw target. Scalars and raw
    /// targets pass through unchanged.
    pub fn unwrap_ref(self) -> Value {
        match self {
            Value::Ref(r) => Value::Target(r.raw()),
            other => other,
        }
    }

    /// Change detection for writes: like `==`, except two NaN floats
    /// count as the same value, so overwriting NaN with NaN does not
    /// re-trigger.
    pub fn same_value(&self, other: &Value) -> bool {
        if let (Value::Float(a), Value::Float(b)) = (self, other) {
            if a.is_nan() && b.is_nan() {
                return true;
            }
        }
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Structures compare by reference identity.
            (Value::Target(a), Value::Target(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Target(t)
    }
}

impl From<ReactiveRef> for Value {
    fn from(r: ReactiveRef) -> Self {
        Value::Ref(r)
    }
}
