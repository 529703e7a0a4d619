//! Effect Implementation
//!
//! An effect is a re-runnable computation whose reads are automatically
//! tracked. Before every run, the effect leaves every bucket it joined
//! during the previous run (cleanup-then-rerun); this is what makes
//! conditional dependencies correct. If a prior run read `a` then `b`
//! and the new run's branch only reads `a`, the stale subscription to
//! `b` is gone before the run starts, so a later write to `b` cannot
//! cause a spurious re-run.
//!
//! While the computation runs, the effect sits on its scope's effect
//! stack; the innermost stack entry is the one reads are attributed to.
//! The stack is popped by a drop guard, so a panicking computation
//! cannot corrupt the active-effect context for unrelated effects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::{DepKey, TargetId, Value};

use super::scheduler::SchedulerFn;
use super::scope::ReactiveScope;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for effect registration.
#[derive(Default, Clone)]
pub struct EffectOptions {
    /// Skip the initial run at registration time. The caller invokes
    /// the handle manually (computed values do this).
    pub lazy: bool,
    /// Dispatch policy invoked at trigger time instead of running the
    /// effect inline. Absent means "run synchronously, now".
    pub scheduler: Option<SchedulerFn>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler(scheduler: SchedulerFn) -> Self {
        Self {
            lazy: false,
            scheduler: Some(scheduler),
        }
    }
}

pub(crate) struct EffectInner {
    pub(crate) id: EffectId,
    scope: ReactiveScope,
    run_fn: Box<dyn Fn() -> Value + Send + Sync>,
    /// The buckets this effect currently belongs to, rebuilt every run.
    buckets: Mutex<SmallVec<[(TargetId, DepKey); 8]>>,
    scheduler: Option<SchedulerFn>,
    disposed: AtomicBool,
}

/// Handle to a registered effect.
///
/// The scope registers effects weakly: once every handle is dropped the
/// effect silently stops reacting. Hold the handle for as long as the
/// effect should live (a computed or watch owns its internal one).
#[must_use = "an effect stops reacting once its last handle is dropped"]
#[derive(Clone)]
pub struct Effect(pub(crate) Arc<EffectInner>);

impl Effect {
    pub(crate) fn new(
        scope: &ReactiveScope,
        run_fn: Box<dyn Fn() -> Value + Send + Sync>,
        options: EffectOptions,
    ) -> Effect {
        let inner = Arc::new(EffectInner {
            id: EffectId::new(),
            scope: scope.clone(),
            run_fn,
            buckets: Mutex::new(SmallVec::new()),
            scheduler: options.scheduler,
            disposed: AtomicBool::new(false),
        });
        scope.0.registry.insert(inner.id, Arc::downgrade(&inner));

        let effect = Effect(inner);
        if !options.lazy {
            let _ = effect.run();
        }
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.0.id
    }

    /// Run the computation now, rebuilding its subscriptions from
    /// scratch, and return its result.
    pub fn run(&self) -> Value {
        if self.is_disposed() {
            return Value::Null;
        }
        self.cleanup();

        let _frame = StackFrame::push(&self.0.scope, self.clone());
        (self.0.run_fn)()
    }

    /// Route through the scheduler if one is attached, otherwise run
    /// synchronously. This is what trigger calls.
    pub(crate) fn dispatch(&self) {
        if self.is_disposed() {
            return;
        }
        match &self.0.scheduler {
            Some(scheduler) => scheduler(self),
            None => {
                let _ = self.run();
            }
        }
    }

    /// Stop the effect: it leaves every bucket and ignores all future
    /// runs and triggers.
    pub fn dispose(&self) {
        if self.0.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleanup();
        self.0.scope.0.registry.remove(&self.0.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.load(Ordering::SeqCst)
    }

    /// Number of buckets the effect currently subscribes to.
    pub fn dependency_count(&self) -> usize {
        self.0.buckets.lock().len()
    }

    /// Remove the effect from every bucket it joined and clear the
    /// bucket list.
    fn cleanup(&self) {
        let buckets = std::mem::take(&mut *self.0.buckets.lock());
        for (target, key) in buckets {
            if let Some(mut entry) = self.0.scope.0.deps.get_mut(&target) {
                if let Some(bucket) = entry.get_mut(&key) {
                    bucket.remove(&self.0.id);
                    if bucket.is_empty() {
                        entry.remove(&key);
                    }
                }
            }
        }
    }

    /// Called by track when the effect newly joined a bucket.
    pub(crate) fn note_bucket(&self, target: TargetId, key: DepKey) {
        self.0.buckets.lock().push((target, key));
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.0.id)
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Guard that pops the effect stack when dropped, even if the
/// computation panicked.
struct StackFrame {
    scope: ReactiveScope,
    id: EffectId,
}

impl StackFrame {
    fn push(scope: &ReactiveScope, effect: Effect) -> Self {
        let id = effect.id();
        scope.0.stack.lock().push(effect);
        Self {
            scope: scope.clone(),
            id,
        }
    }
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        let popped = self.scope.0.stack.lock().pop();
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.id,
                "effect stack out of balance: expected {:?}, got {:?}",
                self.id,
                effect.id()
            );
        }
    }
}
