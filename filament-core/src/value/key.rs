//! Key types for the observable data model.
//!
//! Two key spaces exist side by side:
//!
//! - `Key` is what callers address data with: a string field name or an
//!   integer (which doubles as a list index).
//! - `DepKey` is what the dependency store is bucketed by. It extends the
//!   caller-facing keys with list indices and three reserved keys: the
//!   list length, the iterate sentinel (a dependency on the whole
//!   structure's key set or size), and the synthetic key a computed value
//!   publishes itself under.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A caller-facing key into a record, list, key-set or key-value map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s}"),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

/// A key in the dependency store.
///
/// Every tracked read and every triggered write is attributed to exactly
/// one of these buckets per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// An ordinary record field, map key or set member.
    Key(Key),
    /// A list element by position.
    Index(usize),
    /// The length of an ordered list. List enumeration depends on this
    /// key, since enumeration order is a function of the length.
    Length,
    /// The iterate sentinel: a dependency on the whole structure's key
    /// set, membership or size.
    Iterate,
    /// The synthetic key a computed value is tracked and triggered under.
    Value,
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Key(k) => write!(f, "{k}"),
            DepKey::Index(i) => write!(f, "[{i}]"),
            DepKey::Length => write!(f, "<length>"),
            DepKey::Iterate => write!(f, "<iterate>"),
            DepKey::Value => write!(f, "<value>"),
        }
    }
}
