//! Lazy derived values.
//!
//! A computed pairs a lazy effect with a cached value and a dirty flag.
//! The getter does not run at construction and does not re-run when a
//! dependency changes; the change only marks the cache dirty and
//! notifies the computed's own subscribers. The next `get` recomputes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::value::{DepKey, TargetId, Value};

use super::effect::{Effect, EffectOptions};
use super::scope::{ReactiveScope, TriggerOp};

struct ComputedInner {
    /// Identity under which readers of this computed are tracked.
    id: TargetId,
    scope: ReactiveScope,
    effect: Effect,
    value: RwLock<Value>,
    dirty: AtomicBool,
}

/// A cached derived value. Cloning shares the cache.
#[derive(Clone)]
pub struct Computed(Arc<ComputedInner>);

impl Computed {
    pub(crate) fn new(scope: &ReactiveScope, getter: Box<dyn Fn() -> Value + Send + Sync>) -> Computed {
        let id = TargetId::new();
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let weak = weak.clone();
            let options = EffectOptions {
                lazy: true,
                // Invalidation does not recompute. It flips the dirty
                // flag and fans out to whoever read this computed, and
                // only on the first invalidation since the last get.
                scheduler: Some(Arc::new(move |_effect: &Effect| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if !inner.dirty.swap(true, Ordering::SeqCst) {
                        inner
                            .scope
                            .trigger_key(inner.id, &DepKey::Value, TriggerOp::Set, None);
                    }
                })),
            };
            ComputedInner {
                id,
                scope: scope.clone(),
                effect: scope.value_effect(getter, options),
                value: RwLock::new(Value::Null),
                dirty: AtomicBool::new(true),
            }
        });
        Computed(inner)
    }

    /// Read the derived value, recomputing only if a dependency changed
    /// since the last read. Reading inside an effect subscribes that
    /// effect to this computed.
    pub fn get(&self) -> Value {
        if self.0.dirty.swap(false, Ordering::SeqCst) {
            let fresh = self.0.effect.run();
            *self.0.value.write() = fresh;
        }
        self.0.scope.track_key(self.0.id, DepKey::Value);
        self.0.value.read().clone()
    }

    /// Stop reacting to dependency changes. Subsequent `get` calls
    /// return the cached value as-is.
    pub fn dispose(&self) {
        self.0.effect.dispose();
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.0.id)
            .field("dirty", &self.0.dirty.load(Ordering::SeqCst))
            .finish()
    }
}
