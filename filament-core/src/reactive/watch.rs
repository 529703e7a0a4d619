//! Change watching with old/new value delivery.
//!
//! A watch wraps a lazy effect around a source (either a getter closure
//! or a wrapper to traverse deeply), holds the previous result, and on
//! each invalidation re-reads the source and calls the callback with the
//! new and old values. Callbacks may register an invalidation hook that
//! runs before the next callback, so work started by a superseded
//! callback can be cancelled.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::value::{RawKind, TargetId, Value};

use super::effect::{Effect, EffectOptions};
use super::scope::ReactiveScope;
use super::wrapper::ReactiveRef;

/// What a watch observes.
pub enum WatchSource {
    /// An arbitrary getter; the watch subscribes to whatever it reads.
    Getter(Box<dyn Fn() -> Value + Send + Sync>),
    /// A wrapper, traversed deeply so any nested mutation fires.
    Source(ReactiveRef),
}

impl From<ReactiveRef> for WatchSource {
    fn from(r: ReactiveRef) -> WatchSource {
        WatchSource::Source(r)
    }
}

impl<F> From<F> for WatchSource
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    fn from(f: F) -> WatchSource {
        WatchSource::Getter(Box::new(f))
    }
}

#[derive(Default, Clone, Copy)]
pub struct WatchOptions {
    /// Fire the callback immediately on registration, with a null old
    /// value, instead of waiting for the first change.
    pub immediate: bool,
}

pub type WatchCallback = Box<dyn Fn(&Value, &Value, &OnInvalidate<'_>) + Send + Sync>;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Handed to the watch callback; lets it register cleanup to run before
/// the callback fires again (or when the watch stops).
pub struct OnInvalidate<'a> {
    slot: &'a Mutex<Option<CleanupFn>>,
}

impl OnInvalidate<'_> {
    pub fn register(&self, f: impl FnOnce() + Send + 'static) {
        *self.slot.lock() = Some(Box::new(f));
    }
}

struct WatchState {
    prev: Mutex<Value>,
    cleanup: Mutex<Option<CleanupFn>>,
    callback: WatchCallback,
    effect: OnceLock<Effect>,
}

impl WatchState {
    /// Re-read the source and deliver the change. Pending cleanup from
    /// the previous callback runs first.
    fn job(&self) {
        let Some(effect) = self.effect.get() else {
            return;
        };
        let new = effect.run();
        if let Some(cleanup) = self.cleanup.lock().take() {
            cleanup();
        }
        let old = {
            let mut prev = self.prev.lock();
            std::mem::replace(&mut *prev, new.clone())
        };
        (self.callback)(&new, &old, &OnInvalidate { slot: &self.cleanup });
    }
}

/// A running watch. Hold the handle for as long as deliveries should
/// continue; `stop` additionally runs any pending invalidation hook.
#[must_use = "dropping the watch handle stops change delivery"]
pub struct Watch {
    effect: Effect,
    state: Arc<WatchState>,
}

impl Watch {
    pub(crate) fn new(
        scope: &ReactiveScope,
        source: WatchSource,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Watch {
        let getter: Box<dyn Fn() -> Value + Send + Sync> = match source {
            WatchSource::Getter(f) => f,
            WatchSource::Source(r) => Box::new(move || {
                let mut seen = HashSet::new();
                traverse(&r, &mut seen);
                Value::Ref(r.clone())
            }),
        };

        let state = Arc::new(WatchState {
            prev: Mutex::new(Value::Null),
            cleanup: Mutex::new(None),
            callback,
            effect: OnceLock::new(),
        });

        // The scheduler holds the state weakly; the state owns the
        // effect. Dropping the last watch handle therefore ends the
        // subscription instead of leaving an immortal cycle.
        let job_state = Arc::downgrade(&state);
        let options_for_effect = EffectOptions {
            lazy: true,
            scheduler: Some(Arc::new(move |_effect: &Effect| {
                if let Some(state) = job_state.upgrade() {
                    state.job();
                }
            })),
        };
        let effect = scope.value_effect(getter, options_for_effect);
        let _ = state.effect.set(effect.clone());

        if options.immediate {
            state.job();
        } else {
            *state.prev.lock() = effect.run();
        }

        Watch { effect, state }
    }

    /// Stop delivering changes. Pending cleanup runs one last time.
    pub fn stop(&self) {
        self.effect.dispose();
        if let Some(cleanup) = self.state.cleanup.lock().take() {
            cleanup();
        }
    }
}

/// Visit every reachable key so the enclosing effect subscribes to the
/// whole structure. The visited set breaks cycles by target identity.
fn traverse(r: &ReactiveRef, seen: &mut HashSet<TargetId>) {
    if !seen.insert(r.raw().id()) {
        return;
    }
    match r.target_kind() {
        RawKind::Record | RawKind::KeyValueMap => {
            for key in r.keys() {
                if let Ok(v) = r.get(key) {
                    if let Some(child) = v.as_ref() {
                        traverse(child, seen);
                    }
                }
            }
        }
        RawKind::List => {
            for i in 0..r.len() {
                if let Ok(v) = r.get(i as i64) {
                    if let Some(child) = v.as_ref() {
                        traverse(child, seen);
                    }
                }
            }
        }
        RawKind::KeySet => {
            // Keys are plain values; iteration tracking is enough.
            let _ = r.keys();
        }
    }
}
