//! Ordered-list instrumentation.
//!
//! Index reads and writes go through the generic `get`/`set` path in
//! the interception layer; this module adds the structural methods and
//! the length semantics.
//!
//! Structural methods run with tracking suspended. A call like `push`
//! both reads and writes the length internally; if those internal reads
//! tracked, the effect issuing the call would re-subscribe to its own
//! mutation. The suspension guard is dropped before triggering, so the
//! effects that re-run in response track normally.
//!
//! Shrinking the length drops tail elements, so a length trigger fans
//! out to every index bucket at or beyond the new length; growing pads
//! with `Null` and disturbs no existing index.

use tracing::warn;

use crate::error::Result;
use crate::value::{DepKey, Raw, RawKind, Value};

use super::scope::TriggerOp;
use super::wrapper::ReactiveRef;

impl ReactiveRef {
    fn list_guard(&self, op: &'static str) -> Result<bool> {
        self.expect_kind(RawKind::List, op)?;
        if self.kind().is_readonly() {
            warn!(target_id = self.raw().id().raw(), op, "structural write through readonly wrapper ignored");
            return Ok(false);
        }
        Ok(true)
    }

    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let target = self.raw();
        let mut raw = target.write();
        match &mut *raw {
            Raw::List(items) => f(items),
            _ => unreachable!("shape checked by caller"),
        }
    }

    /// Append one value.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        if !self.list_guard("push")? {
            return Ok(());
        }
        let value = value.into().unwrap_ref();
        let (index, new_len) = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|items| {
                items.push(value);
                (items.len() - 1, items.len())
            })
        };
        self.trigger(&DepKey::Index(index), TriggerOp::Add, Some(new_len));
        Ok(())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>> {
        if !self.list_guard("pop")? {
            return Ok(None);
        }
        let (removed, new_len) = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|items| {
                let removed = items.pop();
                (removed, items.len())
            })
        };
        if removed.is_some() {
            // Truncation by one: the length fan-out reaches the dropped
            // tail index.
            self.trigger(&DepKey::Length, TriggerOp::Set, Some(new_len));
        }
        Ok(removed.map(|v| self.wrap_result(v)))
    }

    /// Remove and return the first element; the rest shift down.
    pub fn shift(&self) -> Result<Option<Value>> {
        if !self.list_guard("shift")? {
            return Ok(None);
        }
        let (removed, changed, new_len) = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|items| {
                if items.is_empty() {
                    return (None, Vec::new(), 0);
                }
                let before = items.clone();
                let removed = items.remove(0);
                let changed = changed_indices(&before, items);
                (Some(removed), changed, items.len())
            })
        };
        let Some(removed) = removed else {
            return Ok(None);
        };
        for i in changed {
            self.trigger(&DepKey::Index(i), TriggerOp::Set, Some(new_len));
        }
        self.trigger(&DepKey::Length, TriggerOp::Set, Some(new_len));
        Ok(Some(self.wrap_result(removed)))
    }

    /// Insert one value at the front; the rest shift up.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<()> {
        if !self.list_guard("unshift")? {
            return Ok(());
        }
        let value = value.into().unwrap_ref();
        let (changed, old_len, new_len) = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|items| {
                let before = items.clone();
                items.insert(0, value);
                (changed_indices(&before, items), before.len(), items.len())
            })
        };
        for i in changed {
            if i < old_len {
                self.trigger(&DepKey::Index(i), TriggerOp::Set, Some(new_len));
            }
        }
        self.trigger(&DepKey::Index(old_len), TriggerOp::Add, Some(new_len));
        Ok(())
    }

    /// Remove `delete_count` elements at `start` (clamped to the list)
    /// and insert `items` in their place. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        if !self.list_guard("splice")? {
            return Ok(Vec::new());
        }
        let items: Vec<Value> = items.into_iter().map(Value::unwrap_ref).collect();
        let (removed, changed, old_len, new_len) = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|list| {
                let before = list.clone();
                let start = start.min(list.len());
                let end = start.saturating_add(delete_count).min(list.len());
                let removed: Vec<Value> = list.splice(start..end, items).collect();
                (removed, changed_indices(&before, list), before.len(), list.len())
            })
        };
        for i in &changed {
            if *i < old_len && *i < new_len {
                self.trigger(&DepKey::Index(*i), TriggerOp::Set, Some(new_len));
            }
        }
        for i in old_len..new_len {
            self.trigger(&DepKey::Index(i), TriggerOp::Add, Some(new_len));
        }
        if new_len < old_len {
            self.trigger(&DepKey::Length, TriggerOp::Set, Some(new_len));
        }
        Ok(removed.into_iter().map(|v| self.wrap_result(v)).collect())
    }

    /// Resize the list. Shrinking drops tail elements and re-runs their
    /// subscribers via the length fan-out; growing pads with `Null`.
    pub fn set_len(&self, new_len: usize) -> Result<()> {
        if !self.list_guard("set_len")? {
            return Ok(());
        }
        let old_len = {
            let _pause = self.scope().pause_tracking();
            self.with_items(|items| {
                let old_len = items.len();
                if new_len < old_len {
                    items.truncate(new_len);
                } else {
                    items.resize(new_len, Value::Null);
                }
                old_len
            })
        };
        if old_len != new_len {
            self.trigger(&DepKey::Length, TriggerOp::Set, Some(new_len));
        }
        Ok(())
    }

    /// Whether the list contains a value equal to `query`.
    ///
    /// The scan tracks the length and every index it visits. When the
    /// query is a reactive wrapper and the direct comparison misses,
    /// the scan repeats against the unwrapped target: stored elements
    /// are always raw, so wrapper identity alone must not hide a match.
    pub fn contains(&self, query: &Value) -> Result<bool> {
        Ok(self.index_of(query)?.is_some())
    }

    /// Position of the first element equal to `query`, if any.
    pub fn index_of(&self, query: &Value) -> Result<Option<usize>> {
        self.expect_kind(RawKind::List, "index_of")?;
        let target = self.raw();
        let items: Vec<Value> = match &*target.read() {
            Raw::List(items) => items.clone(),
            _ => unreachable!(),
        };
        self.track(DepKey::Length);
        for (i, item) in items.iter().enumerate() {
            self.track(DepKey::Index(i));
            if item.same_value(query) {
                return Ok(Some(i));
            }
        }
        if let Value::Ref(r) = query {
            let unwrapped = Value::Target(r.raw());
            for (i, item) in items.iter().enumerate() {
                if item.same_value(&unwrapped) {
                    return Ok(Some(i));
                }
            }
        }
        Ok(None)
    }
}

/// Indices whose value differs between two snapshots, up to the shorter
/// length.
fn changed_indices(before: &[Value], after: &[Value]) -> Vec<usize> {
    let shared = before.len().min(after.len());
    (0..shared)
        .filter(|&i| !before[i].same_value(&after[i]))
        .collect()
}
