// ============================================================================
// spark-weave - Keyed Collection Access
// Tracked Map / Set / WeakMap / WeakSet methods
// ============================================================================
//
// Entries are stored raw. Because a caller may hold either the raw or the
// wrapped form of an object key, lookups try the key as given and then its
// raw form; a collection that ends up holding both forms is reported.
// Values come back wrapped in the wrapper's mode. A readonly view layered
// over a mutable wrapper reads through it so the reads are still tracked.
// ============================================================================

use crate::core::error_handling::warn;
use crate::core::types::{Target, TargetKind, TrackKey, TrackOpTypes, TriggerOpTypes, Value, ValueKey};
use crate::proxy::reactive::{to_raw, Reactive};
use crate::reactivity::equality::has_changed;
use crate::reactivity::tracking::{track, trigger};

fn entry(key: &Value) -> TrackKey {
    TrackKey::Entry(ValueKey::of(key))
}

fn check_identity_keys(target: &Target, key: &Value) {
    let raw_key = to_raw(key);
    if ValueKey::of(&raw_key) != ValueKey::of(key) && target.collection_has(&raw_key) {
        let kind = target.kind();
        warn(format!(
            "Reactive {} contains both the raw and reactive versions of the same object{}, \
             which can lead to inconsistencies. Avoid differentiating between the raw and \
             reactive versions of an object and only use the reactive version if possible.",
            kind.name(),
            if kind.is_map_like() { " as keys" } else { "" }
        ));
    }
}

impl Reactive {
    fn refuse_collection_write(&self, op: &str, key: Option<&Value>) -> bool {
        if !self.is_readonly() {
            return false;
        }
        let key = key.map_or(String::new(), |k| format!("on key \"{k:?}\" "));
        warn(format!("{op} operation {key}failed: target is readonly."));
        true
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub(crate) fn collection_get(&self, key: &Value) -> Value {
        if let Some(base) = self.base() {
            return self.wrap(base.get(key.clone()));
        }
        let target = self.raw_target();
        let raw_key = to_raw(key);
        if !self.is_readonly() {
            if ValueKey::of(key) != ValueKey::of(&raw_key) {
                track(target, TrackOpTypes::Get, entry(key));
            }
            track(target, TrackOpTypes::Get, entry(&raw_key));
        }
        if target.collection_has(key) {
            self.wrap(target.collection_get(key))
        } else if target.collection_has(&raw_key) {
            self.wrap(target.collection_get(&raw_key))
        } else {
            Value::Undefined
        }
    }

    pub(crate) fn collection_has(&self, key: &Value) -> bool {
        if let Some(base) = self.base() {
            return base.has(key.clone());
        }
        let target = self.raw_target();
        let raw_key = to_raw(key);
        let distinct = ValueKey::of(key) != ValueKey::of(&raw_key);
        if !self.is_readonly() {
            if distinct {
                track(target, TrackOpTypes::Has, entry(key));
            }
            track(target, TrackOpTypes::Has, entry(&raw_key));
        }
        target.collection_has(key) || distinct && target.collection_has(&raw_key)
    }

    /// Entry count of a map or set. Weak collections report 0.
    pub fn size(&self) -> usize {
        if let Some(base) = self.base() {
            return base.size();
        }
        let target = self.raw_target();
        if !self.is_readonly() {
            track(target, TrackOpTypes::Iterate, TrackKey::Iterate);
        }
        target.collection_entries().len()
    }

    /// Call `f(value, key)` for every entry (sets pass the value twice).
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }

    /// Map keys, or set values. Only key changes re-run a map-keys reader.
    pub fn keys(&self) -> Vec<Value> {
        if let Some(base) = self.base() {
            return base.keys().into_iter().map(|k| self.wrap(k)).collect();
        }
        let target = self.raw_target();
        let key_only = target.kind().is_map_like();
        if !self.is_readonly() {
            let key = if key_only {
                TrackKey::MapKeyIterate
            } else {
                TrackKey::Iterate
            };
            track(target, TrackOpTypes::Iterate, key);
        }
        target
            .collection_entries()
            .into_iter()
            .map(|(k, _)| self.wrap(k))
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// `(key, value)` pairs in insertion order; sets yield `(value, value)`.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        if let Some(base) = self.base() {
            return base
                .entries()
                .into_iter()
                .map(|(k, v)| (self.wrap(k), self.wrap(v)))
                .collect();
        }
        let target = self.raw_target();
        if !self.is_readonly() {
            track(target, TrackOpTypes::Iterate, TrackKey::Iterate);
        }
        target
            .collection_entries()
            .into_iter()
            .map(|(k, v)| (self.wrap(k), self.wrap(v)))
            .collect()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    pub(crate) fn collection_set(&self, key: Value, value: Value) -> bool {
        if self.refuse_collection_write("Set", Some(&key)) {
            return false;
        }
        let target = self.raw_target();
        if !target.kind().is_map_like() {
            warn(format!("set() is not supported on a {} target", target.kind().name()));
            return false;
        }
        let value = to_raw(&value);

        let mut key = key;
        let mut had_key = target.collection_has(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = target.collection_has(&key);
        } else {
            check_identity_keys(target, &key);
        }

        let old = target.collection_get(&key);
        if !target.collection_set(key.clone(), value.clone()) {
            warn("Invalid value used as weak map key");
            return false;
        }
        if !had_key {
            trigger(target, TriggerOpTypes::Add, Some(entry(&key)), Some(&value), None);
        } else if has_changed(&value, &old) {
            trigger(target, TriggerOpTypes::Set, Some(entry(&key)), Some(&value), Some(&old));
        }
        true
    }

    /// Add a value to a set. Returns false when it was already present.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.refuse_collection_write("Add", Some(&value)) {
            return false;
        }
        let target = self.raw_target();
        let value = to_raw(&value);
        if target.collection_has(&value) {
            return false;
        }
        if !target.collection_add(value.clone()) {
            match target.kind() {
                TargetKind::WeakSet => warn("Invalid value used in weak set"),
                kind => warn(format!("add() is not supported on a {} target", kind.name())),
            }
            return false;
        }
        trigger(target, TriggerOpTypes::Add, Some(entry(&value)), Some(&value), None);
        true
    }

    pub(crate) fn collection_delete(&self, key: &Value) -> bool {
        if self.refuse_collection_write("Delete", Some(key)) {
            return false;
        }
        let target = self.raw_target();
        let mut key = key.clone();
        let mut had_key = target.collection_has(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = target.collection_has(&key);
        } else {
            check_identity_keys(target, &key);
        }

        let old = target.collection_get(&key);
        let result = target.collection_delete(&key);
        if had_key {
            trigger(target, TriggerOpTypes::Delete, Some(entry(&key)), None, Some(&old));
        }
        result
    }

    /// Remove every entry, notifying every reader of the collection.
    pub fn clear(&self) {
        if self.refuse_collection_write("Clear", None) {
            return;
        }
        let target = self.raw_target();
        let had_items = !target.collection_entries().is_empty();
        target.collection_clear();
        if had_items {
            trigger(target, TriggerOpTypes::Clear, None, None, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::error_handling::set_warn_handler;
    use crate::core::types::{Target, Value};
    use crate::primitives::effect::effect;
    use crate::proxy::reactive::{is_reactive, is_readonly, reactive, readonly, Reactive};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn proxy(value: Value) -> Reactive {
        value.into_proxy().unwrap()
    }

    fn counting(source: &Reactive, read: impl Fn(&Reactive) + 'static) -> (Rc<Cell<u32>>, crate::primitives::effect::ReactiveEffect) {
        let runs = Rc::new(Cell::new(0));
        let e = effect({
            let (source, runs) = (source.clone(), runs.clone());
            move || {
                read(&source);
                runs.set(runs.get() + 1);
            }
        });
        (runs, e)
    }

    #[test]
    fn map_get_tracks_key() {
        let map = proxy(reactive(Target::map()));
        let (runs, _e) = counting(&map, |m| {
            m.get("a");
        });
        map.set("b", 1);
        assert_eq!(runs.get(), 1);
        map.set("a", 1);
        assert_eq!(runs.get(), 2);
        map.set("a", 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn map_value_change_reruns_iteration_but_not_keys() {
        let map = proxy(reactive(Target::map_from([("a", 1)])));
        let (entry_runs, _e1) = counting(&map, |m| {
            m.entries();
        });
        let (key_runs, _e2) = counting(&map, |m| {
            m.keys();
        });
        map.set("a", 2);
        assert_eq!(entry_runs.get(), 2);
        assert_eq!(key_runs.get(), 1);
        map.set("b", 3);
        assert_eq!(key_runs.get(), 2);
        map.delete("a");
        assert_eq!(key_runs.get(), 3);
    }

    #[test]
    fn set_add_delete_and_size() {
        let set = proxy(reactive(Target::set()));
        let (runs, _e) = counting(&set, |s| {
            s.size();
        });
        assert!(set.add(1));
        assert!(!set.add(1));
        assert_eq!(runs.get(), 2);
        assert!(set.has(1));
        assert!(set.delete(1));
        assert_eq!(runs.get(), 3);
        assert_eq!(set.size(), 0);
    }

    #[test]
    fn clear_notifies_every_reader() {
        let map = proxy(reactive(Target::map_from([("a", 1), ("b", 2)])));
        let (runs, _e) = counting(&map, |m| {
            m.get("a");
        });
        map.clear();
        assert_eq!(runs.get(), 2);
        map.clear();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn values_are_wrapped_and_keys_reconciled() {
        let key = Target::record();
        let map = proxy(reactive(Target::map()));
        map.set(Value::from(&key), Target::record());
        assert!(is_reactive(&map.get(Value::from(&key))));

        // the wrapped key finds the raw entry
        let wrapped_key = reactive(&key);
        assert!(map.has(wrapped_key.clone()));
        assert!(is_reactive(&map.get(wrapped_key)));
    }

    #[test]
    fn mixed_raw_and_wrapped_keys_warn() {
        let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
        let prev = set_warn_handler(Some(Rc::new({
            let warnings = warnings.clone();
            move |m: &str| warnings.borrow_mut().push(m.to_string())
        })));
        let key = Target::record();
        let raw = Target::map();
        raw.collection_set(Value::from(&key), Value::from(1));
        raw.collection_set(reactive(&key), Value::from(2));
        let map = proxy(reactive(&raw));
        map.set(reactive(&key), 3);
        assert!(warnings.borrow().iter().any(|w| w.contains("both the raw and reactive")));
        set_warn_handler(prev);
    }

    #[test]
    fn readonly_collection_refuses_writes() {
        let prev = set_warn_handler(Some(Rc::new(|_: &str| {})));
        let ro = proxy(readonly(Target::set_from([1])));
        assert!(!ro.add(2));
        assert!(!ro.delete(1));
        ro.clear();
        assert_eq!(ro.size(), 1);
        set_warn_handler(prev);
    }

    #[test]
    fn readonly_over_reactive_map_tracks() {
        let map = proxy(reactive(Target::map()));
        let ro = proxy(readonly(Value::from(&map)));
        let (runs, _e) = counting(&ro, |m| {
            m.get("a");
        });
        map.set("a", Target::record());
        assert_eq!(runs.get(), 2);
        assert!(is_readonly(&ro.get("a")));
    }

    #[test]
    fn for_each_passes_value_then_key() {
        let map = proxy(reactive(Target::map_from([("k", "v")])));
        let mut seen = Vec::new();
        map.for_each(|v, k| seen.push((v, k)));
        assert_eq!(seen, vec![(Value::from("v"), Value::from("k"))]);
    }

    #[test]
    fn weak_map_uses_object_keys() {
        let prev = set_warn_handler(Some(Rc::new(|_: &str| {})));
        let wm = proxy(reactive(Target::weak_map()));
        let key = Target::record();
        assert!(wm.set(Value::from(&key), 1));
        assert!(!wm.set(1, 1));
        assert_eq!(wm.get(Value::from(&key)), Value::from(1));
        set_warn_handler(prev);
    }

    #[test]
    fn unsupported_writes_name_the_target_kind() {
        let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
        let prev = set_warn_handler(Some(Rc::new({
            let warnings = warnings.clone();
            move |m: &str| warnings.borrow_mut().push(m.to_string())
        })));

        assert!(!proxy(reactive(Target::map())).add(1));
        assert!(!proxy(reactive(Target::set())).set("k", 1));
        assert!(!proxy(reactive(Target::weak_set())).add(1));
        set_warn_handler(prev);

        assert_eq!(
            *warnings.borrow(),
            vec![
                "add() is not supported on a Map target",
                "set() is not supported on a Set target",
                "Invalid value used in weak set",
            ]
        );
    }
}
