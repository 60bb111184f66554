// ============================================================================
// spark-weave - Refs
// Single-value reactive cells and the ref utilities
// ============================================================================
//
// A ref owns one Dep, created on the first tracked read. Writes compare the
// new raw value against the stored raw value with `Object.is` semantics and
// only notify on a real change. Deep refs hand out a reactive wrapper for
// composite values; shallow refs hand out exactly what was stored.
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::context::is_tracking;
use crate::core::error_handling::warn;
use crate::core::types::{AnyRef, RefLike, Target, Value};
use crate::proxy::reactive::{is_proxy, to_raw, to_reactive};
use crate::reactivity::dep::Dep;
use crate::reactivity::equality::has_changed;
use crate::reactivity::tracking::{track_dep, trigger_dep, untrack};

/// A ref handle. Plain refs, computeds, property refs and custom refs all
/// share this type once stored in a [`Value`].
pub type Ref = AnyRef;

// =============================================================================
// REF DEP
// =============================================================================

/// Lazily created dep of a ref-like cell.
#[derive(Default)]
pub(crate) struct RefDep(RefCell<Option<Dep>>);

impl RefDep {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&self) {
        if !is_tracking() {
            return;
        }
        let dep = self.0.borrow_mut().get_or_insert_with(Dep::new).clone();
        track_dep(&dep);
    }

    pub(crate) fn trigger(&self) {
        let dep = self.0.borrow().clone();
        if let Some(dep) = dep {
            trigger_dep(&dep);
        }
    }

    /// The dep, if anything ever subscribed.
    pub(crate) fn get(&self) -> Option<Dep> {
        self.0.borrow().clone()
    }
}

// =============================================================================
// PLAIN REF
// =============================================================================

struct RefImpl {
    raw: RefCell<Value>,
    value: RefCell<Value>,
    dep: RefDep,
    shallow: bool,
}

impl RefImpl {
    fn new(value: Value, shallow: bool) -> Self {
        let (raw, value) = if shallow {
            (value.clone(), value)
        } else {
            (to_raw(&value), to_reactive(value))
        };
        Self {
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            dep: RefDep::new(),
            shallow,
        }
    }
}

impl RefLike for RefImpl {
    fn get(&self) -> Value {
        self.dep.track();
        self.value.borrow().clone()
    }

    fn set(&self, value: Value) {
        let new_raw = if self.shallow { value.clone() } else { to_raw(&value) };
        if !has_changed(&new_raw, &self.raw.borrow()) {
            return;
        }
        *self.value.borrow_mut() = if self.shallow {
            value
        } else {
            to_reactive(new_raw.clone())
        };
        *self.raw.borrow_mut() = new_raw;
        self.dep.trigger();
    }

    fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }

    fn trigger(&self) {
        self.dep.trigger();
    }
}

fn create_ref(value: Value, shallow: bool) -> Ref {
    if let Value::Ref(r) = value {
        return r;
    }
    AnyRef::new(Rc::new(RefImpl::new(value, shallow)))
}

/// Create a deep ref. Composite values are read back as reactive wrappers.
/// Passing a ref returns that same ref.
///
/// # Example
///
/// ```
/// use spark_weave::{is_reactive, reference, Target};
///
/// let count = reference(0);
/// count.set(1);
/// assert_eq!(count.get().as_number(), Some(1.0));
///
/// let obj = reference(Target::record());
/// assert!(is_reactive(&obj.get()));
/// ```
pub fn reference(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), false)
}

/// Create a ref that only tracks replacing its value.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), true)
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The ref's value (tracked) or the value itself.
pub fn unref(value: Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other,
    }
}

/// Notify a ref's subscribers, typically after mutating a shallow ref's
/// contents in place.
pub fn trigger_ref(r: &Ref) {
    r.trigger();
}

// =============================================================================
// PROPERTY REFS
// =============================================================================

/// A ref that reads and writes one property of an object.
struct ObjectRefImpl {
    object: Value,
    key: Value,
    default: Option<Value>,
}

impl ObjectRefImpl {
    fn read(&self) -> Value {
        let value = match &self.object {
            Value::Proxy(p) => p.get(self.key.clone()),
            Value::Object(t) => t.get(self.key.clone()),
            _ => Value::Undefined,
        };
        match (&value, &self.default) {
            (Value::Undefined, Some(default)) => default.clone(),
            _ => value,
        }
    }
}

impl RefLike for ObjectRefImpl {
    fn get(&self) -> Value {
        self.read()
    }

    fn set(&self, value: Value) {
        match &self.object {
            Value::Proxy(p) => {
                p.set(self.key.clone(), value);
            }
            Value::Object(t) => {
                t.insert(self.key.clone(), value);
            }
            _ => {}
        }
    }

    fn peek(&self) -> Value {
        untrack(|| self.read())
    }
}

/// A ref bound to `object[key]`. Reads and writes go through the object,
/// so a reactive object keeps tracking. A ref already stored at the key is
/// returned as is.
///
/// # Example
///
/// ```
/// use spark_weave::{reactive, to_ref, Target};
///
/// let state = reactive(Target::record_from([("foo", 1)]));
/// let foo = to_ref(&state, "foo");
/// foo.set(2);
/// assert_eq!(state.as_proxy().unwrap().get("foo").as_number(), Some(2.0));
/// ```
pub fn to_ref(object: &Value, key: impl Into<Value>) -> Ref {
    object_ref(object, key.into(), None)
}

/// Like [`to_ref`], reading `default` while the property is undefined.
pub fn to_ref_with_default(object: &Value, key: impl Into<Value>, default: impl Into<Value>) -> Ref {
    object_ref(object, key.into(), Some(default.into()))
}

fn object_ref(object: &Value, key: Value, default: Option<Value>) -> Ref {
    let stored = match object {
        Value::Object(t) => t.get(key.clone()),
        Value::Proxy(p) => p.raw_target().get(key.clone()),
        _ => Value::Undefined,
    };
    if let Value::Ref(r) = stored {
        return r;
    }
    AnyRef::new(Rc::new(ObjectRefImpl {
        object: object.clone(),
        key,
        default,
    }))
}

/// Turn every property of a reactive record (or every index of a reactive
/// array) into a property ref, collected in a plain record (or array).
pub fn to_refs(object: &Value) -> Value {
    if !is_proxy(object) {
        warn("toRefs() expects a reactive object but received a plain one.");
    }
    let target = match object {
        Value::Proxy(p) => p.raw_target().clone(),
        Value::Object(t) => t.clone(),
        _ => return Value::Undefined,
    };
    let keys: Vec<Value> = target.prop_keys().iter().map(|k| k.to_value()).collect();
    if target.is_array() {
        Value::from(Target::array(
            keys.into_iter().map(|k| Value::Ref(to_ref(object, k))),
        ))
    } else {
        let out = Target::record();
        for key in keys {
            out.insert(key.clone(), Value::Ref(to_ref(object, key)));
        }
        Value::from(out)
    }
}

// =============================================================================
// CUSTOM REFS
// =============================================================================

/// Handle passed to a custom ref factory: `track` subscribes the running
/// effect, `trigger` notifies subscribers.
pub type RefTrackFn = Rc<dyn Fn()>;
pub type CustomRefGetter = Box<dyn Fn() -> Value>;
pub type CustomRefSetter = Box<dyn Fn(Value)>;

struct CustomRefImpl {
    dep: Rc<RefDep>,
    getter: CustomRefGetter,
    setter: CustomRefSetter,
}

impl RefLike for CustomRefImpl {
    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, value: Value) {
        (self.setter)(value);
    }

    fn peek(&self) -> Value {
        untrack(|| (self.getter)())
    }

    fn trigger(&self) {
        self.dep.trigger();
    }
}

/// Build a ref whose tracking and notification are controlled by the
/// caller, e.g. to debounce writes.
///
/// # Example
///
/// ```
/// use spark_weave::{custom_ref, Value};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = Rc::new(RefCell::new(Value::from(0)));
/// let r = custom_ref(|track, trigger| {
///     let (read, write) = (store.clone(), store.clone());
///     (
///         Box::new(move || {
///             track();
///             read.borrow().clone()
///         }),
///         Box::new(move |v| {
///             *write.borrow_mut() = v;
///             trigger();
///         }),
///     )
/// });
/// r.set(3);
/// assert_eq!(r.get().as_number(), Some(3.0));
/// ```
pub fn custom_ref(
    factory: impl FnOnce(RefTrackFn, RefTrackFn) -> (CustomRefGetter, CustomRefSetter),
) -> Ref {
    let dep = Rc::new(RefDep::new());
    let track: RefTrackFn = {
        let dep = dep.clone();
        Rc::new(move || dep.track())
    };
    let trigger: RefTrackFn = {
        let dep = dep.clone();
        Rc::new(move || dep.trigger())
    };
    let (getter, setter) = factory(track, trigger);
    AnyRef::new(Rc::new(CustomRefImpl { dep, getter, setter }))
}
