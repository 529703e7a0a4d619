//! Effect Scheduling
//!
//! Trigger never decides when an effect actually re-runs; the effect's
//! scheduler does. An effect without one runs synchronously, inline, at
//! trigger time. Everything else (deferring, batching, de-duplicating,
//! dropping superseded work) is a scheduler policy layered on top; the
//! engine imposes no batching of its own.
//!
//! `FlushQueue` is the batteries-included policy: an insertion-ordered,
//! de-duplicating task queue. Hand its scheduler to any number of
//! effects, mutate as much as you like, then `flush` once: each queued
//! effect re-runs exactly once, in the order it was first triggered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::{Effect, EffectId};

/// Per-effect dispatch policy, invoked by trigger with the effect
/// handle instead of running it inline.
pub type SchedulerFn = Arc<dyn Fn(&Effect) + Send + Sync>;

struct QueueInner {
    /// Pending effects, keyed by id so repeated triggers coalesce.
    pending: Mutex<IndexMap<EffectId, Effect>>,
    flushing: AtomicBool,
}

/// An insertion-ordered, de-duplicating effect queue.
#[derive(Clone)]
pub struct FlushQueue(Arc<QueueInner>);

impl FlushQueue {
    pub fn new() -> Self {
        Self(Arc::new(QueueInner {
            pending: Mutex::new(IndexMap::new()),
            flushing: AtomicBool::new(false),
        }))
    }

    /// A scheduler that enqueues instead of running. Attach it to an
    /// effect via `EffectOptions`.
    pub fn scheduler(&self) -> SchedulerFn {
        let queue = self.0.clone();
        Arc::new(move |effect: &Effect| {
            queue
                .pending
                .lock()
                .entry(effect.id())
                .or_insert_with(|| effect.clone());
        })
    }

    /// Number of effects currently queued.
    pub fn len(&self) -> usize {
        self.0.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.pending.lock().is_empty()
    }

    /// Run every queued effect once, in first-triggered order. Effects
    /// queued while flushing run in the same pass. Re-entrant flushes
    /// are no-ops; the outer pass drains them.
    pub fn flush(&self) {
        if self.0.flushing.swap(true, Ordering::SeqCst) {
            return;
        }
        // Cleared by guard: a panicking effect must not leave the queue
        // permanently refusing to flush. Entries still pending at that
        // point stay queued for the next flush.
        let _guard = FlushGuard(&self.0.flushing);
        loop {
            let next = {
                let mut pending = self.0.pending.lock();
                pending.shift_remove_index(0)
            };
            match next {
                Some((_, effect)) => {
                    let _ = effect.run();
                }
                None => break,
            }
        }
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for FlushQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, ReactiveScope};
    use crate::value::Raw;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn queue_coalesces_multiple_triggers() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));
        let queue = FlushQueue::new();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = scope.effect_with(
            move || {
                runs_in.fetch_add(1, Ordering::SeqCst);
                let _ = obj_in.get("n").unwrap();
            },
            EffectOptions {
                lazy: false,
                scheduler: Some(queue.scheduler()),
            },
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Three synchronous mutations, one deferred re-run.
        obj.set("n", 1i64).unwrap();
        obj.set("n", 2i64).unwrap();
        obj.set("n", 3i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);

        queue.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_preserves_first_trigger_order() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("a", 0i64), ("b", 0i64)]));
        let queue = FlushQueue::new();

        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = order.clone();
        let obj_a = obj.clone();
        let _first = scope.effect_with(
            move || {
                let _ = obj_a.get("a").unwrap();
                order_a.lock().push("a");
            },
            EffectOptions {
                lazy: false,
                scheduler: Some(queue.scheduler()),
            },
        );

        let order_b = order.clone();
        let obj_b = obj.clone();
        let _second = scope.effect_with(
            move || {
                let _ = obj_b.get("b").unwrap();
                order_b.lock().push("b");
            },
            EffectOptions {
                lazy: false,
                scheduler: Some(queue.scheduler()),
            },
        );
        order.lock().clear();

        // Trigger b first, then a: flush order follows trigger order.
        obj.set("b", 1i64).unwrap();
        obj.set("a", 1i64).unwrap();
        queue.flush();
        assert_eq!(*order.lock(), vec!["b", "a"]);
    }

    #[test]
    fn flush_recovers_after_a_panicking_effect() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));
        let queue = FlushQueue::new();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = scope.effect_with(
            move || {
                let n = obj_in.get("n").unwrap().as_i64().unwrap();
                assert_ne!(n, 1, "poison value");
                runs_in.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::with_scheduler(queue.scheduler()),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("n", 1i64).unwrap();
        let flushed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| queue.flush()));
        assert!(flushed.is_err());

        // The queue must still accept and flush work afterwards.
        obj.set("n", 2i64).unwrap();
        assert_eq!(queue.len(), 1);
        queue.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn a_scheduler_may_drop_work() {
        let scope = ReactiveScope::new();
        let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = scope.effect_with(
            move || {
                runs_in.fetch_add(1, Ordering::SeqCst);
                let _ = obj_in.get("n").unwrap();
            },
            EffectOptions {
                lazy: false,
                // Never invokes the pending effect: cancellation is just
                // a scheduler that declines to run.
                scheduler: Some(Arc::new(|_effect: &Effect| {})),
            },
        );

        obj.set("n", 1i64).unwrap();
        obj.set("n", 2i64).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
