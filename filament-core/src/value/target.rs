//! Observable targets.
//!
//! A `Target` is one observable host value: a record, an ordered list, a
//! key-set or a key-value map. Targets are identified by reference
//! identity, never by value equality: each one carries a stable
//! `TargetId` handed out at creation time, and the dependency store is
//! keyed by that id.
//!
//! The backing storage is a sum type, `Raw`. Operations on a wrapper
//! dispatch statically over the variant; there is no dynamic property
//! trap anywhere in the engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::key::Key;
use super::Value;

/// Stable identity handle for a target.
///
/// Ids are allocated from an atomic counter, so identity survives any
/// amount of cloning of the `Target` handle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate a fresh id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// The shape of a target's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Record,
    List,
    KeySet,
    KeyValueMap,
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RawKind::Record => "record",
            RawKind::List => "list",
            RawKind::KeySet => "key-set",
            RawKind::KeyValueMap => "key-value map",
        };
        f.write_str(s)
    }
}

/// Backing storage for a target.
///
/// Records and key-value maps share a representation (insertion-ordered
/// key to value) but differ in intent; both are kept as distinct variants
/// so wrappers can reject operations that make no sense for the shape.
#[derive(Debug, Clone)]
pub enum Raw {
    Record(IndexMap<Key, Value>),
    List(Vec<Value>),
    KeySet(IndexSet<Key>),
    KeyValueMap(IndexMap<Key, Value>),
}

impl Raw {
    /// An empty record.
    pub fn record() -> Self {
        Raw::Record(IndexMap::new())
    }

    /// An empty ordered list.
    pub fn list() -> Self {
        Raw::List(Vec::new())
    }

    /// An empty key-set.
    pub fn key_set() -> Self {
        Raw::KeySet(IndexSet::new())
    }

    /// An empty key-value map.
    pub fn key_value_map() -> Self {
        Raw::KeyValueMap(IndexMap::new())
    }

    /// Build a record from key/value pairs.
    pub fn record_from<K, V, I>(entries: I) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Raw::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list from values.
    pub fn list_from<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Raw::List(items.into_iter().map(Into::into).collect())
    }

    /// Which shape this storage is.
    pub fn kind(&self) -> RawKind {
        match self {
            Raw::Record(_) => RawKind::Record,
            Raw::List(_) => RawKind::List,
            Raw::KeySet(_) => RawKind::KeySet,
            Raw::KeyValueMap(_) => RawKind::KeyValueMap,
        }
    }
}

struct TargetInner {
    id: TargetId,
    raw: RwLock<Raw>,
}

/// A handle to one observable target.
///
/// Cloning the handle never changes identity: all clones share the same
/// id and the same backing storage.
#[derive(Clone)]
pub struct Target(Arc<TargetInner>);

impl Target {
    /// Create a fresh target around the given storage.
    pub fn new(raw: Raw) -> Self {
        Self(Arc::new(TargetInner {
            id: TargetId::new(),
            raw: RwLock::new(raw),
        }))
    }

    /// The target's identity.
    pub fn id(&self) -> TargetId {
        self.0.id
    }

    /// The shape of the backing storage.
    pub fn kind(&self) -> RawKind {
        self.0.raw.read().kind()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Raw> {
        self.0.raw.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Raw> {
        self.0.raw.write()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.0.id)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique() {
        let a = Target::new(Raw::record());
        let b = Target::new(Raw::record());
        let c = Target::new(Raw::list());

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn identity_survives_clone() {
        let a = Target::new(Raw::record());
        let b = a.clone();

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        // Equal shape, distinct identity.
        let c = Target::new(Raw::record());
        assert_ne!(a, c);
    }

    #[test]
    fn raw_kind_reporting() {
        assert_eq!(Target::new(Raw::record()).kind(), RawKind::Record);
        assert_eq!(Target::new(Raw::list()).kind(), RawKind::List);
        assert_eq!(Target::new(Raw::key_set()).kind(), RawKind::KeySet);
        assert_eq!(
            Target::new(Raw::key_value_map()).kind(),
            RawKind::KeyValueMap
        );
    }
}
