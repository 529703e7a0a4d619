//! Key-set and key-value-map instrumentation.
//!
//! Keyed lookups (`get`, `set`, `has`, `remove`) and enumeration share
//! the generic interception path; membership mutation for key-sets and
//! whole-structure clearing live here. All mutation goes against the
//! raw underlying collection reached through the raw accessor, so a
//! wrapper can never end up as a stored key.

use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{DepKey, Key, Raw, RawKind};

use super::scope::TriggerOp;
use super::wrapper::ReactiveRef;

impl ReactiveRef {
    /// Insert a key into a key-set. Returns whether it was new;
    /// triggers ADD only then.
    pub fn add(&self, key: impl Into<Key>) -> Result<bool> {
        self.expect_kind(RawKind::KeySet, "add")?;
        let key = key.into();
        if self.kind().is_readonly() {
            warn!(target_id = self.raw().id().raw(), key = %key, "write through readonly wrapper ignored");
            return Ok(false);
        }
        let added = {
            let target = self.raw();
            let mut raw = target.write();
            match &mut *raw {
                Raw::KeySet(s) => s.insert(key.clone()),
                _ => unreachable!("shape checked above"),
            }
        };
        if added {
            self.trigger(&DepKey::Key(key), TriggerOp::Add, None);
        }
        Ok(added)
    }

    /// Remove every entry. Each removed key triggers DELETE, so both
    /// keyed subscribers and iteration subscribers re-run.
    pub fn clear(&self) -> Result<()> {
        if self.target_kind() == RawKind::List {
            return Err(Error::UnsupportedOp {
                op: "clear",
                kind: RawKind::List,
            });
        }
        if self.kind().is_readonly() {
            warn!(target_id = self.raw().id().raw(), "clear through readonly wrapper ignored");
            return Ok(());
        }
        let removed: Vec<Key> = {
            let target = self.raw();
            let mut raw = target.write();
            match &mut *raw {
                Raw::Record(m) | Raw::KeyValueMap(m) => {
                    let keys = m.keys().cloned().collect();
                    m.clear();
                    keys
                }
                Raw::KeySet(s) => {
                    let keys = s.iter().cloned().collect();
                    s.clear();
                    keys
                }
                Raw::List(_) => unreachable!("rejected above"),
            }
        };
        for key in removed {
            self.trigger(&DepKey::Key(key), TriggerOp::Delete, None);
        }
        Ok(())
    }
}
