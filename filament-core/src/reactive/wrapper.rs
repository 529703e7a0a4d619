//! Interception Layer
//!
//! A `ReactiveRef` wraps one target so that reads track and writes
//! trigger. Operations dispatch statically over the target's storage
//! variant; there is no dynamic trap anywhere.
//!
//! Wrapper flags are two independent axes:
//!
//! - *shallow*: nested structures come back raw (`Value::Target`)
//!   instead of re-wrapped, and reactivity stops at the first level.
//! - *readonly*: writes are absorbed with a warning and reads do not
//!   track (a value that cannot change through this wrapper is not a
//!   dependency worth recording).
//!
//! Deep reads re-wrap nested targets through the scope's wrapper cache,
//! so wrapping the same target twice yields the reference-identical
//! wrapper. Writes unwrap `Value::Ref` back to the raw target before
//! storing; wrappers never leak into the raw data graph.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{DepKey, Key, Raw, RawKind, Target, Value};

use super::scope::{ReactiveScope, TriggerOp};

/// Which wrapper to build: the shallow and readonly axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapKind {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl WrapKind {
    pub fn is_readonly(self) -> bool {
        matches!(self, WrapKind::Readonly | WrapKind::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, WrapKind::ShallowReactive | WrapKind::ShallowReadonly)
    }

    /// The kind nested values are wrapped with on deep reads: readonly
    /// propagates, shallowness does not recurse.
    fn child(self) -> WrapKind {
        if self.is_readonly() {
            WrapKind::Readonly
        } else {
            WrapKind::Reactive
        }
    }
}

pub(crate) struct RefInner {
    pub(crate) scope: ReactiveScope,
    pub(crate) target: Target,
    pub(crate) kind: WrapKind,
}

/// A reactive wrapper around one target.
///
/// Cloning the handle is cheap and preserves identity; two handles to
/// the same wrapper compare equal with `ptr_eq`.
#[derive(Clone)]
pub struct ReactiveRef(pub(crate) Arc<RefInner>);

impl ReactiveRef {
    /// The reserved raw accessor: the underlying target, untracked.
    pub fn raw(&self) -> Target {
        self.0.target.clone()
    }

    pub fn scope(&self) -> &ReactiveScope {
        &self.0.scope
    }

    pub fn kind(&self) -> WrapKind {
        self.0.kind
    }

    /// The shape of the wrapped target.
    pub fn target_kind(&self) -> RawKind {
        self.0.target.kind()
    }

    /// Whether two handles are the same wrapper instance.
    pub fn ptr_eq(&self, other: &ReactiveRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A readonly view over the same target, cached like any wrap.
    pub fn readonly_view(&self) -> ReactiveRef {
        let kind = if self.0.kind.is_shallow() {
            WrapKind::ShallowReadonly
        } else {
            WrapKind::Readonly
        };
        self.0.scope.wrap(self.0.target.clone(), kind)
    }

    pub(crate) fn track(&self, key: DepKey) {
        if !self.0.kind.is_readonly() {
            self.0.scope.track_key(self.0.target.id(), key);
        }
    }

    pub(crate) fn trigger(&self, key: &DepKey, op: TriggerOp, list_len: Option<usize>) {
        self.0.scope.trigger_key(self.0.target.id(), key, op, list_len);
    }

    /// Re-wrap a nested structure on a deep read; everything else
    /// passes through.
    pub(crate) fn wrap_result(&self, value: Value) -> Value {
        match value {
            Value::Target(t) if !self.0.kind.is_shallow() => {
                Value::Ref(self.0.scope.wrap(t, self.0.kind.child()))
            }
            other => other,
        }
    }

    pub(crate) fn expect_kind(&self, kind: RawKind, op: &'static str) -> Result<()> {
        let actual = self.target_kind();
        if actual == kind {
            Ok(())
        } else {
            Err(Error::UnsupportedOp { op, kind: actual })
        }
    }

    pub(crate) fn list_index(&self, key: &Key) -> Result<usize> {
        match key {
            Key::Int(i) if *i >= 0 => Ok(*i as usize),
            _ => Err(Error::InvalidKey {
                key: key.clone(),
                kind: RawKind::List,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read one key. Missing keys read as `Null`. Tracks the key (lists:
    /// the index) unless readonly; deep wrappers re-wrap nested targets.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let (dep, out) = {
            let raw = self.0.target.read();
            match &*raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => (
                    DepKey::Key(key.clone()),
                    m.get(&key).cloned().unwrap_or(Value::Null),
                ),
                Raw::List(items) => {
                    let i = self.list_index(&key)?;
                    (
                        DepKey::Index(i),
                        items.get(i).cloned().unwrap_or(Value::Null),
                    )
                }
                Raw::KeySet(_) => {
                    return Err(Error::UnsupportedOp {
                        op: "get",
                        kind: RawKind::KeySet,
                    })
                }
            }
        };
        self.track(dep);
        Ok(self.wrap_result(out))
    }

    /// Membership test. Tracks the key directly.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let (dep, present) = {
            let raw = self.0.target.read();
            match &*raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => {
                    (DepKey::Key(key.clone()), m.contains_key(&key))
                }
                Raw::KeySet(s) => (DepKey::Key(key.clone()), s.contains(&key)),
                Raw::List(items) => match self.list_index(&key) {
                    Ok(i) => (DepKey::Index(i), i < items.len()),
                    Err(_) => return false,
                },
            }
        };
        self.track(dep);
        present
    }

    /// The number of entries. Lists track the length key; all other
    /// shapes track the iterate sentinel.
    pub fn len(&self) -> usize {
        let (dep, len) = {
            let raw = self.0.target.read();
            match &*raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => (DepKey::Iterate, m.len()),
                Raw::KeySet(s) => (DepKey::Iterate, s.len()),
                Raw::List(items) => (DepKey::Length, items.len()),
            }
        };
        self.track(dep);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerate keys. Tracks the iterate sentinel (lists: the length
    /// key, since enumeration order depends on it).
    pub fn keys(&self) -> Vec<Key> {
        let (dep, keys) = {
            let raw = self.0.target.read();
            match &*raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => {
                    (DepKey::Iterate, m.keys().cloned().collect::<Vec<_>>())
                }
                Raw::KeySet(s) => (DepKey::Iterate, s.iter().cloned().collect()),
                Raw::List(items) => (
                    DepKey::Length,
                    (0..items.len()).map(Key::from).collect(),
                ),
            }
        };
        self.track(dep);
        keys
    }

    /// Enumerate key/value pairs. The caller observes every value, so
    /// this tracks the iterate sentinel (lists: the length key) plus
    /// each enumerated key, exactly as if every entry had been read
    /// through `get`. Not available on key-sets, which have no values;
    /// use `keys`.
    pub fn entries(&self) -> Result<Vec<(Key, Value)>> {
        let (dep, entries) = {
            let raw = self.0.target.read();
            match &*raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => (
                    DepKey::Iterate,
                    m.iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>(),
                ),
                Raw::List(items) => (
                    DepKey::Length,
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (Key::from(i), v.clone()))
                        .collect(),
                ),
                Raw::KeySet(_) => {
                    return Err(Error::UnsupportedOp {
                        op: "entries",
                        kind: RawKind::KeySet,
                    })
                }
            }
        };
        self.track(dep);
        let is_list = self.target_kind() == RawKind::List;
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, (k, v))| {
                if is_list {
                    self.track(DepKey::Index(i));
                } else {
                    self.track(DepKey::Key(k.clone()));
                }
                (k, self.wrap_result(v))
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write one key. Classified ADD (new key, or index at or beyond the
    /// current length, padding with `Null`) or SET; reactive wrappers in
    /// the value are unwrapped before storing; triggers only when the
    /// stored value actually changed (NaN over NaN does not count).
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if self.0.kind.is_readonly() {
            warn!(target_id = self.0.target.id().raw(), key = %key, "write through readonly wrapper ignored");
            return Ok(());
        }
        let value = value.into().unwrap_ref();

        let (dep, op, changed, list_len) = {
            let mut raw = self.0.target.write();
            match &mut *raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => {
                    let old = m.insert(key.clone(), value.clone());
                    let (op, changed) = match old {
                        Some(old) => (TriggerOp::Set, !old.same_value(&value)),
                        None => (TriggerOp::Add, true),
                    };
                    (DepKey::Key(key), op, changed, None)
                }
                Raw::List(items) => {
                    let i = self.list_index(&key)?;
                    if i < items.len() {
                        let old = std::mem::replace(&mut items[i], value.clone());
                        let changed = !old.same_value(&value);
                        (DepKey::Index(i), TriggerOp::Set, changed, Some(items.len()))
                    } else {
                        items.resize(i, Value::Null);
                        items.push(value);
                        (DepKey::Index(i), TriggerOp::Add, true, Some(items.len()))
                    }
                }
                Raw::KeySet(_) => {
                    return Err(Error::UnsupportedOp {
                        op: "set",
                        kind: RawKind::KeySet,
                    })
                }
            }
        };
        if changed {
            self.trigger(&dep, op, list_len);
        }
        Ok(())
    }

    /// Delete one key. Triggers DELETE only when the key existed.
    /// Lists have no keyed delete; use `splice`.
    pub fn remove(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        if self.0.kind.is_readonly() {
            warn!(target_id = self.0.target.id().raw(), key = %key, "delete through readonly wrapper ignored");
            return Ok(false);
        }
        let existed = {
            let mut raw = self.0.target.write();
            match &mut *raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => m.shift_remove(&key).is_some(),
                Raw::KeySet(s) => s.shift_remove(&key),
                Raw::List(_) => {
                    return Err(Error::UnsupportedOp {
                        op: "remove",
                        kind: RawKind::List,
                    })
                }
            }
        };
        if existed {
            self.trigger(&DepKey::Key(key), TriggerOp::Delete, None);
        }
        Ok(existed)
    }
}

impl PartialEq for ReactiveRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ReactiveRef {}

impl fmt::Debug for ReactiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveRef")
            .field("target", &self.0.target.id())
            .field("kind", &self.0.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let c = Arc::new(AtomicI32::new(0));
        (c.clone(), c)
    }

    #[test]
    fn repeated_wraps_return_the_identical_wrapper() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record());

        let again = scope.wrap(obj.raw(), WrapKind::Reactive);
        assert!(obj.ptr_eq(&again));

        // A different kind over the same target is a different wrapper.
        let ro = obj.readonly_view();
        assert!(!obj.ptr_eq(&ro));
        assert!(ro.ptr_eq(&obj.readonly_view()));
    }

    #[test]
    fn write_reruns_subscriber_exactly_once() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 1i64)]));

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_in.get("n").unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("n", 2i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Writing the value already stored re-runs nothing.
        obj.set("n", 2i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // A write to an untracked key re-runs nothing either.
        obj.set("other", 9i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn branch_switch_drops_the_stale_dependency() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([
            ("ok", Value::from(true)),
            ("text", Value::from("hello")),
        ]));

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            if obj_in.get("ok").unwrap().is_truthy() {
                let _ = obj_in.get("text").unwrap();
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("ok", false).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // The branch no longer reads `text`: writes to it must not
        // re-run the effect.
        obj.set("text", "changed").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        obj.set("ok", true).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        // Taken again, the dependency is live again.
        obj.set("text", "again").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn self_increment_does_not_loop() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("count", 0i64)]));

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let n = obj_in.get("count").unwrap().as_i64().unwrap();
            obj_in.set("count", n + 1).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(obj.get("count").unwrap().as_i64(), Some(1));

        // An external write re-runs the effect exactly once.
        obj.set("count", 10i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(obj.get("count").unwrap().as_i64(), Some(11));
    }

    #[test]
    fn nan_writes_trigger_once_then_never_again() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("foo", 1.0f64)]));

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_in.get("foo").unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("foo", f64::NAN).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // NaN over NaN is not a change.
        obj.set("foo", f64::NAN).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_write_is_absorbed_without_trigger() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 1i64)]));
        let ro = obj.readonly_view();

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_in.get("n").unwrap();
        });

        ro.set("n", 99i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(obj.get("n").unwrap().as_i64(), Some(1));

        assert!(!ro.remove("n").unwrap());
        assert!(obj.has("n"));
    }

    #[test]
    fn readonly_reads_do_not_track() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 1i64)]));
        let ro = obj.readonly_view();

        let ro_in = ro.clone();
        let effect = scope.effect(move || {
            let _ = ro_in.get("n").unwrap();
        });
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn deep_reads_wrap_nested_targets() {
        let scope = ReactiveScope::new();
        let inner = Target::new(Raw::record_from([("x", 1i64)]));
        let obj = scope.reactive(Raw::record_from([("inner", Value::from(inner.clone()))]));

        let nested = obj.get("inner").unwrap();
        let nested = nested.as_ref().expect("deep read wraps");
        assert_eq!(nested.raw(), inner);

        // Mutating through the nested wrapper re-runs an effect that
        // read through the outer one.
        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let v = obj_in.get("inner").unwrap();
            let _ = v.as_ref().unwrap().get("x").unwrap();
        });
        nested.set("x", 2i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shallow_reads_return_raw_targets() {
        let scope = ReactiveScope::new();
        let inner = Target::new(Raw::record_from([("x", 1i64)]));
        let obj = scope.shallow_reactive(Raw::record_from([("inner", Value::from(inner.clone()))]));

        match obj.get("inner").unwrap() {
            Value::Target(t) => assert_eq!(t, inner),
            other => panic!("expected raw target, got {other:?}"),
        }
    }

    #[test]
    fn readonly_propagates_through_deep_reads() {
        let scope = ReactiveScope::new();
        let inner = Target::new(Raw::record_from([("x", 1i64)]));
        let obj = scope.readonly(Raw::record_from([("inner", Value::from(inner))]));

        let nested = obj.get("inner").unwrap();
        let nested = nested.as_ref().unwrap();
        assert!(nested.kind().is_readonly());

        nested.set("x", 2i64).unwrap();
        assert_eq!(nested.get("x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn storing_a_wrapper_unwraps_it_first() {
        let scope = ReactiveScope::new();
        let child = scope.reactive(Raw::record_from([("x", 1i64)]));
        let parent = scope.reactive(Raw::record());

        parent.set("child", child.clone()).unwrap();

        // The raw graph holds the raw target, not the wrapper.
        match &*parent.raw().read() {
            Raw::Record(m) => match &m[&Key::from("child")] {
                Value::Target(t) => assert_eq!(*t, child.raw()),
                other => panic!("wrapper leaked into raw storage: {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn membership_and_enumeration_dependencies() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("a", 1i64)]));

        let (has_runs, has_in) = counter();
        let obj_has = obj.clone();
        let _has_effect = scope.effect(move || {
            has_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_has.has("b");
        });

        let (iter_runs, iter_in) = counter();
        let obj_iter = obj.clone();
        let _iter_effect = scope.effect(move || {
            iter_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_iter.keys();
        });

        // Adding a new key re-runs both the membership test on that key
        // and the enumeration.
        obj.set("b", 2i64).unwrap();
        assert_eq!(has_runs.load(Ordering::SeqCst), 2);
        assert_eq!(iter_runs.load(Ordering::SeqCst), 2);

        // Overwriting an existing key re-runs neither.
        obj.set("a", 5i64).unwrap();
        assert_eq!(has_runs.load(Ordering::SeqCst), 2);
        assert_eq!(iter_runs.load(Ordering::SeqCst), 2);

        // Deleting re-runs the enumeration and the membership test.
        obj.remove("b").unwrap();
        assert_eq!(has_runs.load(Ordering::SeqCst), 3);
        assert_eq!(iter_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn entries_subscribes_to_every_value_read() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("k", 1i64)]));

        let (runs, runs_in) = counter();
        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_in.entries().unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Overwriting an existing key is a SET on the keyed bucket
        // only; the enumeration effect saw the old value, so it must
        // be subscribed there too.
        obj.set("k", 2i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let list = scope.reactive(Raw::list_from([10i64, 20i64]));
        let (list_runs, list_in) = counter();
        let list_read = list.clone();
        let _list_effect = scope.effect(move || {
            list_in.fetch_add(1, Ordering::SeqCst);
            let _ = list_read.entries().unwrap();
        });

        list.set(0usize, 11i64).unwrap();
        assert_eq!(list_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn kind_mismatches_are_errors() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record());
        let set = scope.reactive(Raw::key_set());

        assert!(matches!(
            set.get("x"),
            Err(Error::UnsupportedOp { op: "get", .. })
        ));
        assert!(matches!(
            set.set("x", 1i64),
            Err(Error::UnsupportedOp { op: "set", .. })
        ));
        assert!(matches!(
            obj.push(1i64),
            Err(Error::UnsupportedOp { op: "push", .. })
        ));

        let list = scope.reactive(Raw::list_from([1i64]));
        assert!(matches!(
            list.get("name"),
            Err(Error::InvalidKey { .. })
        ));
        assert!(matches!(
            list.remove(0usize),
            Err(Error::UnsupportedOp { op: "remove", .. })
        ));
    }
}
