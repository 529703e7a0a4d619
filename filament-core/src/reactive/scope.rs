//! Reactive Scope
//!
//! A `ReactiveScope` is one self-contained dependency graph: the
//! dependency store, the effect registry, the effect stack and the
//! wrapper cache all live here. Nothing in the engine is ambient or
//! process-global; constructing two scopes gives two fully independent
//! graphs (one per test, typically) with no cross-contamination.
//!
//! # The track/trigger protocol
//!
//! The store is a two-level mapping from target identity to dependency
//! key to the set of subscribed effects (one such set is a "bucket").
//!
//! - `track_key` is called by wrappers on every read. If an effect is
//!   currently running, it joins the bucket for that (target, key) pair
//!   and remembers the bucket so it can leave it again before its next
//!   run.
//! - `trigger_key` is called by wrappers after every mutation. It
//!   assembles the candidate set for the change, excludes the effect
//!   that performed the write (so `x = x + 1` inside an effect cannot
//!   re-enter itself), and dispatches the rest through their schedulers.
//!
//! Effects are registered weakly: the store can never keep an effect
//! alive, so dropping the last `Effect` handle ends the subscription.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::trace;

use crate::value::{DepKey, Raw, Target, TargetId, Value};

use super::computed::Computed;
use super::effect::{Effect, EffectId, EffectInner, EffectOptions};
use super::watch::{Watch, WatchCallback, WatchOptions, WatchSource};
use super::wrapper::{ReactiveRef, RefInner, WrapKind};

/// How a mutation changed its target.
///
/// The change type decides which extra buckets join the candidate set:
/// ADD and DELETE reshape the structure, so they pull in the iterate
/// sentinel; ADD on an ordered list also grows the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key's value changed.
    Set,
    /// A new key or list slot appeared.
    Add,
    /// An existing key disappeared.
    Delete,
}

pub(crate) struct ScopeInner {
    /// Target id -> dependency key -> subscribed effect ids.
    pub(crate) deps: DashMap<TargetId, HashMap<DepKey, HashSet<EffectId>>>,
    /// Weak effect registry; buckets hold ids, this resolves them.
    pub(crate) registry: DashMap<EffectId, Weak<EffectInner>>,
    /// Currently-executing effects, innermost last.
    pub(crate) stack: Mutex<Vec<Effect>>,
    /// Wrapper cache: repeated wraps of one target yield the identical
    /// wrapper while anyone still holds it.
    pub(crate) wrappers: DashMap<(TargetId, WrapKind), Weak<RefInner>>,
    /// Tracking pause depth; reads are not attributed while nonzero.
    paused: AtomicUsize,
}

/// One reactive dependency graph.
#[derive(Clone)]
pub struct ReactiveScope(pub(crate) Arc<ScopeInner>);

impl ReactiveScope {
    pub fn new() -> Self {
        Self(Arc::new(ScopeInner {
            deps: DashMap::new(),
            registry: DashMap::new(),
            stack: Mutex::new(Vec::new()),
            wrappers: DashMap::new(),
            paused: AtomicUsize::new(0),
        }))
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    /// Wrap storage as a deep reactive target.
    pub fn reactive(&self, raw: Raw) -> ReactiveRef {
        self.wrap(Target::new(raw), WrapKind::Reactive)
    }

    /// Wrap storage reactively without recursing into nested values.
    pub fn shallow_reactive(&self, raw: Raw) -> ReactiveRef {
        self.wrap(Target::new(raw), WrapKind::ShallowReactive)
    }

    /// Wrap storage as a deep readonly view.
    pub fn readonly(&self, raw: Raw) -> ReactiveRef {
        self.wrap(Target::new(raw), WrapKind::Readonly)
    }

    /// Wrap storage as a readonly view without recursing.
    pub fn shallow_readonly(&self, raw: Raw) -> ReactiveRef {
        self.wrap(Target::new(raw), WrapKind::ShallowReadonly)
    }

    /// Wrap an existing target. Wrapping the same target with the same
    /// kind returns the reference-identical wrapper for as long as the
    /// previous one is alive.
    pub fn wrap(&self, target: Target, kind: WrapKind) -> ReactiveRef {
        let cache_key = (target.id(), kind);
        if let Some(existing) = self
            .0
            .wrappers
            .get(&cache_key)
            .and_then(|weak| weak.upgrade())
        {
            return ReactiveRef(existing);
        }
        let inner = Arc::new(RefInner {
            scope: self.clone(),
            target,
            kind,
        });
        self.0.wrappers.insert(cache_key, Arc::downgrade(&inner));
        ReactiveRef(inner)
    }

    // ------------------------------------------------------------------
    // Effects and derived values
    // ------------------------------------------------------------------

    /// Register an effect and run it once to establish its dependencies.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.effect_with(f, EffectOptions::default())
    }

    /// Register an effect with explicit options (lazy start, scheduler).
    pub fn effect_with<F>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new(
            self,
            Box::new(move || {
                f();
                Value::Null
            }),
            options,
        )
    }

    /// Register an effect whose computation produces a value. Computed
    /// and watch are built on this.
    pub(crate) fn value_effect(
        &self,
        f: Box<dyn Fn() -> Value + Send + Sync>,
        options: EffectOptions,
    ) -> Effect {
        Effect::new(self, f, options)
    }

    /// A lazily-evaluated, cached derived value.
    pub fn computed<F>(&self, getter: F) -> Computed
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter))
    }

    /// Watch a source for change, delivering old and new values to the
    /// callback.
    pub fn watch<C>(&self, source: impl Into<WatchSource>, callback: C, options: WatchOptions) -> Watch
    where
        C: Fn(&Value, &Value, &super::watch::OnInvalidate<'_>) + Send + Sync + 'static,
    {
        Watch::new(
            self,
            source.into(),
            Box::new(callback) as WatchCallback,
            options,
        )
    }

    // ------------------------------------------------------------------
    // Track / trigger
    // ------------------------------------------------------------------

    /// Record that the currently-active effect depends on (target, key).
    /// No-op when no effect is running or tracking is paused.
    pub fn track_key(&self, target: TargetId, key: DepKey) {
        if self.0.paused.load(Ordering::Relaxed) > 0 {
            return;
        }
        let Some(active) = self.active_effect() else {
            return;
        };
        trace!(target_id = target.raw(), key = %key, effect = active.id().raw(), "track");
        let mut buckets = self.0.deps.entry(target).or_default();
        let bucket = buckets.entry(key.clone()).or_default();
        if bucket.insert(active.id()) {
            drop(buckets);
            active.note_bucket(target, key);
        }
    }

    /// Notify every effect subscribed to (target, key) after a mutation.
    ///
    /// `list_len` is `Some` when the target is an ordered list, carrying
    /// the length after the write; a trigger on the length key fans out
    /// to every index bucket at or beyond it (truncation drops those
    /// elements).
    pub fn trigger_key(
        &self,
        target: TargetId,
        key: &DepKey,
        op: TriggerOp,
        list_len: Option<usize>,
    ) {
        trace!(target_id = target.raw(), key = %key, ?op, "trigger");

        let mut candidates: IndexSet<EffectId> = IndexSet::new();
        if let Some(buckets) = self.0.deps.get(&target) {
            if let Some(bucket) = buckets.get(key) {
                candidates.extend(bucket.iter().copied());
            }
            if matches!(op, TriggerOp::Add | TriggerOp::Delete) {
                if let Some(bucket) = buckets.get(&DepKey::Iterate) {
                    candidates.extend(bucket.iter().copied());
                }
            }
            if op == TriggerOp::Add && list_len.is_some() {
                if let Some(bucket) = buckets.get(&DepKey::Length) {
                    candidates.extend(bucket.iter().copied());
                }
            }
            if *key == DepKey::Length {
                if let Some(new_len) = list_len {
                    for (dep_key, bucket) in buckets.iter() {
                        if let DepKey::Index(i) = dep_key {
                            if *i >= new_len {
                                candidates.extend(bucket.iter().copied());
                            }
                        }
                    }
                }
            }
        }
        if candidates.is_empty() {
            return;
        }

        // An effect that writes a key it also reads must not re-enter
        // itself through its own trigger.
        let active_id = self.active_effect().map(|e| e.id());

        let mut to_dispatch = Vec::with_capacity(candidates.len());
        let mut dead: Vec<EffectId> = Vec::new();
        for id in candidates {
            if Some(id) == active_id {
                continue;
            }
            let upgraded = self
                .0
                .registry
                .get(&id)
                .and_then(|weak| weak.upgrade());
            match upgraded {
                Some(inner) => to_dispatch.push(Effect(inner)),
                None => {
                    self.0.registry.remove(&id);
                    dead.push(id);
                }
            }
        }
        // A dead id also leaves every bucket it occupied under this
        // target; otherwise buckets grow until teardown and each later
        // trigger re-pays the failed lookup.
        if !dead.is_empty() {
            if let Some(mut buckets) = self.0.deps.get_mut(&target) {
                buckets.retain(|_, bucket| {
                    for id in &dead {
                        bucket.remove(id);
                    }
                    !bucket.is_empty()
                });
            }
            self.0.deps.remove_if(&target, |_, buckets| buckets.is_empty());
        }

        // All store guards are released; re-entrant track/trigger from
        // the dispatched effects is fine.
        for effect in to_dispatch {
            effect.dispatch();
        }
    }

    /// The innermost currently-running effect, if any.
    pub(crate) fn active_effect(&self) -> Option<Effect> {
        self.0.stack.lock().last().cloned()
    }

    // ------------------------------------------------------------------
    // Tracking suspension and teardown
    // ------------------------------------------------------------------

    /// Run `f` with dependency tracking suspended. Reads inside are not
    /// attributed to any effect.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = self.pause_tracking();
        f()
    }

    pub(crate) fn pause_tracking(&self) -> PauseGuard {
        self.0.paused.fetch_add(1, Ordering::Relaxed);
        PauseGuard {
            scope: self.clone(),
        }
    }

    /// Drop every bucket, registration and cached wrapper. Explicit
    /// teardown replaces garbage collection of unreachable targets: the
    /// scope is reusable but empty afterwards.
    pub fn teardown(&self) {
        self.0.deps.clear();
        self.0.registry.clear();
        self.0.wrappers.clear();
        self.0.stack.lock().clear();
    }

    /// Number of live buckets, across all targets. Diagnostic.
    pub fn bucket_count(&self) -> usize {
        self.0.deps.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for ReactiveScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactiveScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveScope")
            .field("targets", &self.0.deps.len())
            .field("effects", &self.0.registry.len())
            .field("stack_depth", &self.0.stack.lock().len())
            .finish()
    }
}

/// Guard that resumes tracking when dropped.
pub(crate) struct PauseGuard {
    scope: ReactiveScope,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.scope.0.paused.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn track_outside_effect_is_a_no_op() {
        let scope = ReactiveScope::new();
        let id = TargetId::new();

        scope.track_key(id, DepKey::Key("a".into()));
        assert_eq!(scope.bucket_count(), 0);
    }

    #[test]
    fn trigger_with_no_subscribers_is_a_no_op() {
        let scope = ReactiveScope::new();
        let id = TargetId::new();

        scope.trigger_key(id, &DepKey::Key("a".into()), TriggerOp::Set, None);
    }

    #[test]
    fn untracked_reads_are_not_attributed() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let scope_in = scope.clone();
        let _effect = scope.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            scope_in.untracked(|| {
                let _ = obj_in.get("n").unwrap();
            });
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        obj.set("n", 5i64).unwrap();
        // The read was untracked, so the write finds no subscriber.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_prunes_dead_subscribers_from_buckets() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

        let obj_in = obj.clone();
        let effect = scope.effect(move || {
            let _ = obj_in.get("n").unwrap();
        });
        assert_eq!(scope.bucket_count(), 1);
        drop(effect);

        // The first trigger after the drop fails to upgrade the stale
        // id and evicts it from the bucket, not just the registry.
        obj.set("n", 1i64).unwrap();
        assert_eq!(scope.bucket_count(), 0);
        assert_eq!(scope.0.registry.len(), 0);
    }

    #[test]
    fn teardown_clears_everything() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

        let obj_in = obj.clone();
        let _effect = scope.effect(move || {
            let _ = obj_in.get("n").unwrap();
        });
        assert!(scope.bucket_count() > 0);

        scope.teardown();
        assert_eq!(scope.bucket_count(), 0);
        assert_eq!(scope.0.registry.len(), 0);
    }

    #[test]
    fn scopes_are_independent() {
        let a = ReactiveScope::new();
        let b = ReactiveScope::new();

        let obj_a = a.reactive(Raw::record_from([("n", 0i64)]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj_a.clone();
        let _effect = a.effect(move || {
            runs_in.fetch_add(1, Ordering::SeqCst);
            let _ = obj_in.get("n").unwrap();
        });

        // Tearing down an unrelated scope must not disturb the first.
        b.teardown();
        obj_a.set("n", 1i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
