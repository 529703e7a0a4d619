//! Filament Core
//!
//! This crate provides the core engine for the Filament reactive state
//! system. It implements:
//!
//! - Fine-grained dependency tracking (effects, computed values, watches)
//! - Reactive wrappers for records, lists, key-sets, and key-value maps
//! - Scheduling hooks for batching and coalescing re-runs
//! - A JSON bridge for ingesting and snapshotting reactive state
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Scopes, wrappers, effects, computed values, watches
//! - `value`: The dynamic value model and its JSON conversions
//!
//! # Example
//!
//! ```rust
//! use filament_core::reactive::ReactiveScope;
//! use filament_core::value::Raw;
//!
//! let scope = ReactiveScope::new();
//! let state = scope.reactive(Raw::record_from([("count", 0i64)]));
//!
//! // Re-runs whenever `count` changes.
//! let state_in = state.clone();
//! let _effect = scope.effect(move || {
//!     let count = state_in.get("count").unwrap();
//!     println!("count is {count:?}");
//! });
//!
//! state.set("count", 5i64).unwrap();
//! ```

pub mod reactive;
pub mod value;

mod error;

pub use error::{Error, Result};
