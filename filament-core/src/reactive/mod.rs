//! Reactive Primitives
//!
//! This module implements the core reactive system: scopes, wrapped
//! structures, effects, computed values, and watches.
//!
//! # Concepts
//!
//! ## Scopes
//!
//! A `ReactiveScope` owns one dependency store. Everything created
//! through a scope tracks and triggers against that store only, so two
//! scopes never observe each other. Cloning a scope shares the store.
//!
//! ## Wrappers
//!
//! A `ReactiveRef` is a handle onto a shared structure (record, list,
//! key-set, or key-value map). Reads through it record a dependency on
//! the exact key read; writes through it notify the effects that read
//! that key. Wrapping the same structure twice in the same flavor
//! returns the same handle.
//!
//! ## Effects
//!
//! An `Effect` is a computation that re-runs when anything it read
//! changes. Before every run it drops all of its previous
//! subscriptions, so dependencies from branches no longer taken cannot
//! cause spurious re-runs.
//!
//! ## Computed and Watch
//!
//! A `Computed` is a cached derived value that recomputes lazily on
//! first read after invalidation. A `Watch` observes a source and
//! delivers old and new values to a callback, with an invalidation
//! hook for cancelling superseded work.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: when a key is read, the scope
//! checks for a currently running effect and, if there is one,
//! registers the dependency. This approach (sometimes called
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod collections;
mod computed;
mod effect;
mod list;
mod scheduler;
mod scope;
mod watch;
mod wrapper;

pub use computed::Computed;
pub use effect::{Effect, EffectId, EffectOptions};
pub use scheduler::{FlushQueue, SchedulerFn};
pub use scope::{ReactiveScope, TriggerOp};
pub use watch::{OnInvalidate, Watch, WatchCallback, WatchOptions, WatchSource};
pub use wrapper::{ReactiveRef, WrapKind};
