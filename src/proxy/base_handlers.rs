// ============================================================================
// spark-weave - Record and Array Access
// Tracked property access plus the instrumented array methods
// ============================================================================
//
// Reads track the key (readonly wrappers don't), unwrap refs stored in
// records and wrap nested composites in the wrapper's mode. Writes store raw
// values, write through refs held by record properties, and trigger ADD or
// SET depending on whether the key existed.
//
// The identity-sensitive search methods track every index and retry with a
// raw needle. The length-mutating methods run with tracking paused and are
// spelled out in terms of get/set/delete, so every slot they touch triggers.
// ============================================================================

use crate::core::error_handling::warn;
use crate::core::types::{PropKey, TrackKey, TrackOpTypes, TriggerOpTypes, Value};
use crate::proxy::reactive::{is_readonly, is_shallow, to_raw, to_readonly, Reactive};
use crate::reactivity::equality::has_changed;
use crate::reactivity::tracking::{track, trigger, untrack};

fn key_display(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        other => format!("{other:?}"),
    }
}

impl Reactive {
    // =========================================================================
    // PROPERTY ACCESS
    // =========================================================================

    pub(crate) fn base_get(&self, key: &Value) -> Value {
        if let Some(base) = self.base() {
            let res = base.get(key.clone());
            return if self.is_shallow() { res } else { to_readonly(res) };
        }

        let target = self.raw_target();
        let is_array = target.is_array();
        let Some(prop) = PropKey::resolve(key, is_array) else {
            return Value::Undefined;
        };
        let res = target.get_prop(&prop);

        if !self.is_readonly() {
            track(target, TrackOpTypes::Get, prop.track_key());
        }
        if self.is_shallow() {
            return res;
        }
        if let Value::Ref(r) = &res {
            // Array elements keep their refs
            if !(is_array && matches!(prop, PropKey::Index(_))) {
                return r.get();
            }
            return res;
        }
        self.wrap(res)
    }

    pub(crate) fn base_set(&self, key: Value, value: Value) -> bool {
        if self.is_readonly() {
            warn(format!(
                "Set operation on key \"{}\" failed: target is readonly.",
                key_display(&key)
            ));
            return true;
        }

        let target = self.raw_target();
        let is_array = target.is_array();
        let Some(prop) = PropKey::resolve(&key, is_array) else {
            return false;
        };

        let mut value = value;
        let mut old = target.get_prop(&prop);
        if let Value::Ref(r) = &old {
            if r.is_readonly() && !matches!(value, Value::Ref(_)) {
                return false;
            }
        }

        if !self.is_shallow() && !is_readonly(&value) {
            if !is_shallow(&value) {
                value = to_raw(&value);
                old = to_raw(&old);
            }
            if !is_array {
                if let Value::Ref(r) = &old {
                    if !matches!(value, Value::Ref(_)) {
                        r.set(value);
                        return true;
                    }
                }
            }
        }

        let had_key = target.has_prop(&prop);
        if !target.set_prop(&prop, value.clone()) {
            return false;
        }

        if !had_key {
            trigger(target, TriggerOpTypes::Add, Some(prop.track_key()), Some(&value), None);
        } else if has_changed(&value, &old) {
            trigger(
                target,
                TriggerOpTypes::Set,
                Some(prop.track_key()),
                Some(&value),
                Some(&old),
            );
        }
        true
    }

    pub(crate) fn base_delete(&self, key: &Value) -> bool {
        if self.is_readonly() {
            warn(format!(
                "Delete operation on key \"{}\" failed: target is readonly.",
                key_display(key)
            ));
            return true;
        }

        let target = self.raw_target();
        let Some(prop) = PropKey::resolve(key, target.is_array()) else {
            return false;
        };
        let had_key = target.has_prop(&prop);
        let old = target.get_prop(&prop);
        let result = target.delete_prop(&prop);
        if result && had_key {
            trigger(target, TriggerOpTypes::Delete, Some(prop.track_key()), None, Some(&old));
        }
        result
    }

    pub(crate) fn base_has(&self, key: &Value) -> bool {
        if let Some(base) = self.base() {
            return base.has(key.clone());
        }
        let target = self.raw_target();
        let Some(prop) = PropKey::resolve(key, target.is_array()) else {
            return false;
        };
        let result = target.has_prop(&prop);
        if !self.is_readonly() {
            track(target, TrackOpTypes::Has, prop.track_key());
        }
        result
    }

    /// Enumerable keys: property names of a record, indices of an array.
    /// Tracks the target's iterate key (`length` for arrays).
    pub fn own_keys(&self) -> Vec<Value> {
        if let Some(base) = self.base() {
            return base.own_keys();
        }
        let target = self.raw_target();
        if self.is_collection() {
            return Vec::new();
        }
        if !self.is_readonly() {
            let key = if target.is_array() {
                TrackKey::Length
            } else {
                TrackKey::Iterate
            };
            track(target, TrackOpTypes::Iterate, key);
        }
        target.prop_keys().iter().map(PropKey::to_value).collect()
    }

    // =========================================================================
    // IDENTITY-SENSITIVE SEARCH
    // =========================================================================

    fn search(&self, needle: &Value, from_end: bool) -> Option<usize> {
        let target = self.raw_target();
        if !target.is_array() {
            return None;
        }
        let items = target.array_snapshot();
        if self.tracks() {
            for i in 0..items.len() {
                track(target, TrackOpTypes::Get, TrackKey::Index(i));
            }
        }

        let find = |needle: &Value| {
            let matches = |v: &Value| v == needle;
            if from_end {
                items.iter().rposition(matches)
            } else {
                items.iter().position(matches)
            }
        };
        find(needle).or_else(|| find(&to_raw(needle)))
    }

    /// Strict-equality search that also finds the raw form of a wrapped
    /// needle. Tracks every index.
    pub fn includes(&self, needle: impl Into<Value>) -> bool {
        let needle = needle.into();
        let found = self.search(&needle, false).is_some();
        // SameValueZero: NaN finds NaN here, unlike in index_of
        found
            || needle.as_number().is_some_and(f64::is_nan)
                && self
                    .raw_target()
                    .array_snapshot()
                    .iter()
                    .any(|v| v.as_number().is_some_and(f64::is_nan))
    }

    pub fn index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), false)
    }

    pub fn last_index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), true)
    }

    // =========================================================================
    // LENGTH-MUTATING METHODS
    // =========================================================================

    fn refuse_mutation(&self, method: &str) -> bool {
        if self.is_readonly() {
            warn(format!("{method} operation failed: target is readonly."));
            return true;
        }
        !self.raw_target().is_array()
    }

    fn length(&self) -> usize {
        self.get("length").as_number().unwrap_or(0.0) as usize
    }

    /// Move slot `from` to `to`, or clear `to` when `from` is a hole.
    fn move_slot(&self, from: usize, to: usize) {
        if self.has(from) {
            let v = self.get(from);
            self.set(to, v);
        } else {
            self.delete(to);
        }
    }

    /// Append items, returning the new length.
    pub fn push<V: Into<Value>>(&self, items: impl IntoIterator<Item = V>) -> usize {
        if self.refuse_mutation("Push") {
            return self.raw_target().len();
        }
        untrack(|| {
            let mut len = self.length();
            for item in items {
                self.set(len, item.into());
                len += 1;
            }
            self.set("length", len);
            len
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        if self.refuse_mutation("Pop") {
            return Value::Undefined;
        }
        untrack(|| {
            let len = self.length();
            if len == 0 {
                self.set("length", 0);
                return Value::Undefined;
            }
            let last = self.get(len - 1);
            self.delete(len - 1);
            self.set("length", len - 1);
            last
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        if self.refuse_mutation("Shift") {
            return Value::Undefined;
        }
        untrack(|| {
            let len = self.length();
            if len == 0 {
                self.set("length", 0);
                return Value::Undefined;
            }
            let first = self.get(0);
            for k in 1..len {
                self.move_slot(k, k - 1);
            }
            self.delete(len - 1);
            self.set("length", len - 1);
            first
        })
    }

    /// Prepend items, returning the new length.
    pub fn unshift<V: Into<Value>>(&self, items: impl IntoIterator<Item = V>) -> usize {
        if self.refuse_mutation("Unshift") {
            return self.raw_target().len();
        }
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        untrack(|| {
            let len = self.length();
            let count = items.len();
            if count > 0 {
                for k in (1..=len).rev() {
                    self.move_slot(k - 1, k + count - 1);
                }
                for (j, item) in items.into_iter().enumerate() {
                    self.set(j, item);
                }
            }
            self.set("length", len + count);
            len + count
        })
    }

    /// Remove `delete_count` elements at `start` (all of the tail when
    /// `None`), insert `items` there and return the removed elements.
    /// A negative `start` counts from the end.
    pub fn splice<V: Into<Value>>(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = V>,
    ) -> Vec<Value> {
        if self.refuse_mutation("Splice") {
            return Vec::new();
        }
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        untrack(|| {
            let len = self.length();
            let start = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                (start as usize).min(len)
            };
            let delete_count = delete_count.unwrap_or(len - start).min(len - start);
            let item_count = items.len();

            let removed: Vec<Value> = (0..delete_count)
                .filter(|k| self.has(start + k))
                .map(|k| self.get(start + k))
                .collect();

            if item_count < delete_count {
                for k in start..len - delete_count {
                    self.move_slot(k + delete_count, k + item_count);
                }
                for k in (len - delete_count + item_count + 1..=len).rev() {
                    self.delete(k - 1);
                }
            } else if item_count > delete_count {
                for k in (start + 1..=len - delete_count).rev() {
                    self.move_slot(k + delete_count - 1, k + item_count - 1);
                }
            }

            for (j, item) in items.into_iter().enumerate() {
                self.set(start + j, item);
            }
            self.set("length", len - delete_count + item_count);
            removed
        })
    }
}
