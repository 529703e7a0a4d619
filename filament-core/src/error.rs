//! Error types.
//!
//! The engine recovers locally from everything it reasonably can: a
//! write through a readonly wrapper is absorbed with a warning rather
//! than reported here. What remains are caller mistakes about shape,
//! e.g. pushing onto a record.

use thiserror::Error;

use crate::value::{Key, RawKind};

#[derive(Debug, Error)]
pub enum Error {
    /// The operation does not exist for this target shape.
    #[error("`{op}` is not supported on a {kind} target")]
    UnsupportedOp { op: &'static str, kind: RawKind },

    /// The key cannot address this target shape, e.g. a string key or a
    /// negative index on an ordered list.
    #[error("key `{key}` cannot address a {kind} target")]
    InvalidKey { key: Key, kind: RawKind },
}

pub type Result<T> = std::result::Result<T, Error>;
