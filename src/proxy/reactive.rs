// ============================================================================
// spark-weave - Wrapper Construction
// reactive / readonly / shallow factories and the wrapper identity rules
// ============================================================================
//
// Every target has four non-owning wrapper slots (plain/shallow x
// mutable/readonly), so wrapping the same target twice in the same mode
// yields the same wrapper while it is alive. A readonly view of a mutable
// wrapper is layered on top of it: reads go through the mutable wrapper
// (and are therefore tracked), writes are refused.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::error_handling::warn;
use crate::core::types::{Target, Value};

// =============================================================================
// MODES
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ProxyMode {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl ProxyMode {
    fn new(readonly: bool, shallow: bool) -> Self {
        match (readonly, shallow) {
            (false, false) => ProxyMode::Reactive,
            (false, true) => ProxyMode::ShallowReactive,
            (true, false) => ProxyMode::Readonly,
            (true, true) => ProxyMode::ShallowReadonly,
        }
    }

    /// Index of this mode's wrapper slot on a target
    pub(crate) fn slot(self) -> usize {
        match self {
            ProxyMode::Reactive => 0,
            ProxyMode::ShallowReactive => 1,
            ProxyMode::Readonly => 2,
            ProxyMode::ShallowReadonly => 3,
        }
    }

    pub(crate) fn is_readonly(self) -> bool {
        matches!(self, ProxyMode::Readonly | ProxyMode::ShallowReadonly)
    }

    pub(crate) fn is_shallow(self) -> bool {
        matches!(self, ProxyMode::ShallowReactive | ProxyMode::ShallowReadonly)
    }
}

// =============================================================================
// WRAPPER
// =============================================================================

pub struct ProxyInner {
    /// The raw target (never a wrapper)
    pub(crate) target: Target,
    pub(crate) mode: ProxyMode,
    /// Mutable wrapper under a layered readonly view
    pub(crate) base: Option<Reactive>,
    /// Layered readonly views of this wrapper (deep, shallow)
    readonly_views: [RefCell<Weak<ProxyInner>>; 2],
}

/// A reactive, shallow-reactive, readonly or shallow-readonly view of a
/// [`Target`].
///
/// Record and array access lives in `base_handlers`, keyed collection access
/// in `collection_handlers`. Methods that share a name (`get`, `set`, `has`,
/// `delete`) dispatch on the target kind.
#[derive(Clone)]
pub struct Reactive {
    pub(crate) inner: Rc<ProxyInner>,
}

impl Reactive {
    fn create(target: Target, mode: ProxyMode, base: Option<Reactive>) -> Self {
        Reactive {
            inner: Rc::new(ProxyInner {
                target,
                mode,
                base,
                readonly_views: Default::default(),
            }),
        }
    }

    /// The underlying raw target
    pub fn raw_target(&self) -> &Target {
        &self.inner.target
    }

    /// Wrapper identity (distinct from the target's)
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.is_shallow()
    }

    /// True for mutable wrappers and for readonly views layered over one.
    pub fn is_reactive(&self) -> bool {
        match &self.inner.base {
            Some(base) => base.is_reactive(),
            None => !self.is_readonly(),
        }
    }

    /// Whether reads through this wrapper subscribe the running effect
    pub(crate) fn tracks(&self) -> bool {
        !self.is_readonly() || self.inner.base.is_some()
    }

    pub(crate) fn base(&self) -> Option<&Reactive> {
        self.inner.base.as_ref()
    }

    pub(crate) fn is_collection(&self) -> bool {
        self.inner.target.kind().is_collection()
    }

    /// Wrap a value read through this wrapper: shallow wrappers return it
    /// as is, deep ones wrap composites in their own mode.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        if self.is_shallow() {
            value
        } else if self.is_readonly() {
            to_readonly(value)
        } else {
            to_reactive(value)
        }
    }

    // =========================================================================
    // KIND-DISPATCHED ACCESSORS
    // =========================================================================

    /// Property read (records, arrays) or entry read (maps).
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        if self.is_collection() {
            self.collection_get(&key)
        } else {
            self.base_get(&key)
        }
    }

    /// Property write (records, arrays) or entry write (maps). Returns false
    /// when the write is impossible.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let (key, value) = (key.into(), value.into());
        if self.is_collection() {
            self.collection_set(key, value)
        } else {
            self.base_set(key, value)
        }
    }

    /// Property or entry presence check.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_collection() {
            self.collection_has(&key)
        } else {
            self.base_has(&key)
        }
    }

    /// Property or entry removal.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_collection() {
            self.collection_delete(&key)
        } else {
            self.base_delete(&key)
        }
    }

    /// Key count of a record, length of an array, size of a collection.
    pub fn len(&self) -> usize {
        if self.is_collection() {
            self.size()
        } else if self.inner.target.is_array() {
            self.get("length").as_number().unwrap_or(0.0) as usize
        } else {
            self.own_keys().len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.inner.mode, self.inner.target)
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

fn create_reactive_object(value: Value, readonly: bool, shallow: bool) -> Value {
    let mode = ProxyMode::new(readonly, shallow);
    match value {
        Value::Object(target) => {
            let slot = &target.inner.proxies[mode.slot()];
            if let Some(inner) = slot.borrow().upgrade() {
                return Value::Proxy(Reactive { inner });
            }
            if target.is_skipped() || !target.is_extensible() {
                return Value::Object(target);
            }
            let proxy = Reactive::create(target.clone(), mode, None);
            *slot.borrow_mut() = Rc::downgrade(&proxy.inner);
            Value::Proxy(proxy)
        }
        Value::Proxy(proxy) => {
            // Already wrapped; only a readonly view of a mutable wrapper is new
            if !(readonly && proxy.is_reactive() && !proxy.is_readonly()) {
                return Value::Proxy(proxy);
            }
            let slot = &proxy.inner.readonly_views[usize::from(shallow)];
            if let Some(inner) = slot.borrow().upgrade() {
                return Value::Proxy(Reactive { inner });
            }
            let view = Reactive::create(proxy.inner.target.clone(), mode, Some(proxy.clone()));
            *slot.borrow_mut() = Rc::downgrade(&view.inner);
            Value::Proxy(view)
        }
        other => {
            warn(format!("value cannot be made reactive: {other:?}"));
            other
        }
    }
}

/// Deep mutable wrapper. Readonly wrappers are returned unchanged.
///
/// # Example
///
/// ```
/// use spark_weave::{reactive, to_raw, Target, Value};
///
/// let raw = Target::record_from([("count", 0)]);
/// let a = reactive(&raw);
/// let b = reactive(&raw);
/// assert_eq!(a, b);
/// assert_eq!(to_raw(&a), Value::from(&raw));
/// ```
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    if is_readonly(&value) {
        return value;
    }
    create_reactive_object(value, false, false)
}

/// Wrapper that only tracks and triggers its own top-level keys.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), false, true)
}

/// Deep readonly wrapper. Over a mutable wrapper, a layered view.
pub fn readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), true, false)
}

/// Readonly for top-level keys only; nested values are returned as stored.
pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), true, true)
}

// =============================================================================
// QUERIES
// =============================================================================

pub fn is_reactive(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.is_shallow(),
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || value.as_proxy().is_some_and(Reactive::is_readonly)
}

/// The raw target behind a wrapper; anything else unchanged.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(p) => Value::Object(p.raw_target().clone()),
        other => other.clone(),
    }
}

/// Opt a target out of wrapping. Returns the value for chaining.
pub fn mark_raw(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Value::Object(target) = &value {
        target.mark_skip();
    }
    value
}

/// `reactive(value)` for composites, the value itself otherwise.
pub fn to_reactive(value: Value) -> Value {
    if value.is_object() {
        reactive(value)
    } else {
        value
    }
}

/// `readonly(value)` for composites, the value itself otherwise.
pub fn to_readonly(value: Value) -> Value {
    if value.is_object() {
        readonly(value)
    } else {
        value
    }
}
