// ============================================================================
// spark-weave - Type Definitions
// Dynamic values, reactive targets, tracking keys and operation kinds
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use super::constants::{MAX_ARRAY_INDEX, NON_EXTENSIBLE, SKIP};
use super::error_handling::warn;
use crate::proxy::reactive::{ProxyInner, Reactive};
use crate::reactivity::dep::Dep;

/// Insertion-ordered map with the fast non-cryptographic hasher.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

// =============================================================================
// VALUE
// =============================================================================
//
// The reactive layer observes a dynamic object graph: records, arrays and
// keyed collections whose slots hold any `Value`. Composite values are shared
// handles (`Target`), so two slots holding the same `Target` alias one object
// exactly like references do in the host language of a UI runtime.
// =============================================================================

/// A dynamically typed value stored in (or read from) a reactive target.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw, unwrapped composite
    Object(Target),
    /// A reactive or readonly wrapper around a composite
    Proxy(Reactive),
    /// A ref cell (plain ref, computed, object-property ref, custom ref)
    Ref(AnyRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for raw composites and wrappers (the values that can be wrapped).
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Reactive> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// The wrapper, if this value is one.
    pub fn into_proxy(self) -> Option<Reactive> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ref_cell(&self) -> Option<&AnyRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// JavaScript truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Proxy(_) | Value::Ref(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(t) => t.kind().name(),
            Value::Proxy(p) => p.raw_target().kind().name(),
            Value::Ref(_) => "ref",
        }
    }

    /// Identity key used by maps, sets and the proxy caches.
    pub fn key(&self) -> ValueKey {
        ValueKey::of(self)
    }

    /// Non-owning handle to an object-like value.
    pub(crate) fn downgrade(&self) -> Option<WeakObject> {
        match self {
            Value::Object(t) => Some(WeakObject::Target(Rc::downgrade(&t.inner))),
            Value::Proxy(p) => Some(WeakObject::Proxy(Rc::downgrade(&p.inner))),
            Value::Ref(r) => Some(WeakObject::Ref(Rc::downgrade(&r.0))),
            _ => None,
        }
    }
}

/// Strict equality (`===`): NaN is never equal, objects compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:?})", self.peek())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(t) => write!(f, "{t:?}"),
            Value::Proxy(p) => write!(f, "{p:?}"),
            Value::Ref(r) => write!(f, "Ref({:?})", r.peek()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Object(t)
    }
}

impl From<&Target> for Value {
    fn from(t: &Target) -> Self {
        Value::Object(t.clone())
    }
}

impl From<Reactive> for Value {
    fn from(p: Reactive) -> Self {
        Value::Proxy(p)
    }
}

impl From<&Reactive> for Value {
    fn from(p: &Reactive) -> Self {
        Value::Proxy(p.clone())
    }
}

impl From<AnyRef> for Value {
    fn from(r: AnyRef) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Undefined, Into::into)
    }
}

/// Format a number the way it reads as a property name (`1`, not `1.0`).
pub fn number_to_key(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        if n == 0.0 {
            "0".to_string()
        } else {
            format!("{}", n as i64)
        }
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{n}")
    }
}

// =============================================================================
// IDENTITY KEYS
// =============================================================================

/// SameValueZero identity of a value: primitives by value (NaN equals NaN,
/// -0 equals +0), composites by address.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Object(usize),
}

impl ValueKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => {
                let n = if n.is_nan() {
                    f64::NAN
                } else if *n == 0.0 {
                    0.0
                } else {
                    *n
                };
                ValueKey::Number(n.to_bits())
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Object(t) => ValueKey::Object(t.id()),
            Value::Proxy(p) => ValueKey::Object(p.id()),
            Value::Ref(r) => ValueKey::Object(r.id()),
        }
    }
}

/// Non-owning handle to an object-like value, used for weak collection keys.
#[derive(Clone)]
pub(crate) enum WeakObject {
    Target(Weak<TargetInner>),
    Proxy(Weak<ProxyInner>),
    Ref(Weak<dyn RefLike>),
}

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<Value> {
        match self {
            WeakObject::Target(w) => w.upgrade().map(|inner| Value::Object(Target { inner })),
            WeakObject::Proxy(w) => w.upgrade().map(|inner| Value::Proxy(Reactive { inner })),
            WeakObject::Ref(w) => w.upgrade().map(|r| Value::Ref(AnyRef(r))),
        }
    }
}

// =============================================================================
// TRACKING KEYS AND OPERATIONS
// =============================================================================

/// Key of one reactive cell on a target.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TrackKey {
    /// Record property
    Prop(Rc<str>),
    /// Array index
    Index(usize),
    /// Array length
    Length,
    /// Map/Set entry
    Entry(ValueKey),
    /// Any enumeration of the target
    Iterate,
    /// Enumeration of map keys only
    MapKeyIterate,
}

impl TrackKey {
    pub fn prop(name: &str) -> Self {
        TrackKey::Prop(Rc::from(name))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrackOpTypes {
    Get,
    Has,
    Iterate,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerOpTypes {
    Set,
    Add,
    Delete,
    Clear,
}

/// Resolved property key for record and array access.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum PropKey {
    Name(Rc<str>),
    Index(usize),
    Length,
}

impl PropKey {
    /// Interpret `key` against a record (`is_array == false`) or an array.
    pub(crate) fn resolve(key: &Value, is_array: bool) -> Option<Self> {
        match key {
            Value::Number(n) => {
                if is_array && n.fract() == 0.0 && *n >= 0.0 && *n <= MAX_ARRAY_INDEX as f64 {
                    Some(PropKey::Index(*n as usize))
                } else {
                    Some(PropKey::Name(Rc::from(number_to_key(*n))))
                }
            }
            Value::Str(s) => {
                if is_array {
                    if &**s == "length" {
                        return Some(PropKey::Length);
                    }
                    if let Some(index) = is_integer_key(s)
                        .then(|| s.parse::<usize>().ok())
                        .flatten()
                        .filter(|i| *i <= MAX_ARRAY_INDEX)
                    {
                        return Some(PropKey::Index(index));
                    }
                }
                Some(PropKey::Name(s.clone()))
            }
            Value::Bool(b) => Some(PropKey::Name(Rc::from(if *b { "true" } else { "false" }))),
            Value::Null => Some(PropKey::Name(Rc::from("null"))),
            Value::Undefined => Some(PropKey::Name(Rc::from("undefined"))),
            _ => None,
        }
    }

    pub(crate) fn track_key(&self) -> TrackKey {
        match self {
            PropKey::Name(n) => TrackKey::Prop(n.clone()),
            PropKey::Index(i) => TrackKey::Index(*i),
            PropKey::Length => TrackKey::Length,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            PropKey::Name(n) => Value::Str(n.clone()),
            PropKey::Index(i) => Value::Number(*i as f64),
            PropKey::Length => Value::str("length"),
        }
    }
}

/// Canonical non-negative integer string (`"0"`, `"12"`, not `"012"`).
/// Pad `items` with holes up to `len`. Fails with a warning instead of
/// aborting when the allocation cannot be made.
/// Extend `items` with holes up to `len`. On allocation failure the array is
/// left as it was and the requested length is returned as the error.
fn grow_array(items: &mut Vec<Value>, len: usize) -> Result<(), usize> {
    items.try_reserve_exact(len - items.len()).map_err(|_| len)?;
    items.resize(len, Value::Undefined);
    Ok(())
}

pub fn is_integer_key(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'))
}

// =============================================================================
// REF CELLS (type-erased)
// =============================================================================

/// Type-erased interface shared by every ref-like cell.
///
/// `get` tracks, `peek` does not. Readonly refs warn and ignore `set`.
pub trait RefLike {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
    fn peek(&self) -> Value;
    fn is_readonly(&self) -> bool {
        false
    }
    fn is_shallow(&self) -> bool {
        false
    }
    /// Force-notify subscribers. Refs without their own dep ignore it.
    fn trigger(&self) {}
}

/// Shared handle to any ref-like cell, storable inside a `Value`.
#[derive(Clone)]
pub struct AnyRef(pub(crate) Rc<dyn RefLike>);

impl AnyRef {
    pub fn new(inner: Rc<dyn RefLike>) -> Self {
        AnyRef(inner)
    }

    /// Read the value (tracked).
    pub fn get(&self) -> Value {
        self.0.get()
    }

    /// Write the value. Readonly refs warn and ignore the write.
    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    /// Notify subscribers without a write (after mutating a shallow ref's
    /// contents in place).
    pub fn trigger(&self) {
        self.0.trigger();
    }

    pub fn peek(&self) -> Value {
        self.0.peek()
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.is_shallow()
    }

    pub fn ptr_eq(&self, other: &AnyRef) -> bool {
        self.id() == other.id()
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

// =============================================================================
// TARGET
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetKind {
    Record,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Record => "Object",
            TargetKind::Array => "Array",
            TargetKind::Map => "Map",
            TargetKind::Set => "Set",
            TargetKind::WeakMap => "WeakMap",
            TargetKind::WeakSet => "WeakSet",
        }
    }

    pub fn is_collection(self) -> bool {
        !matches!(self, TargetKind::Record | TargetKind::Array)
    }

    pub fn is_map_like(self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::WeakMap)
    }
}

/// Raw storage of a target.
pub(crate) enum TargetData {
    Record(FxIndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(FxIndexMap<ValueKey, (Value, Value)>),
    Set(FxIndexMap<ValueKey, Value>),
    WeakMap(FxIndexMap<ValueKey, (WeakObject, Value)>),
    WeakSet(FxIndexMap<ValueKey, WeakObject>),
}

pub struct TargetInner {
    pub(crate) data: RefCell<TargetData>,
    pub(crate) flags: Cell<u8>,
    /// key -> Dep registry; lives and dies with the target
    pub(crate) deps: RefCell<FxHashMap<TrackKey, Dep>>,
    /// Non-owning wrapper cache, indexed by `ProxyMode::slot`
    pub(crate) proxies: [RefCell<Weak<ProxyInner>>; 4],
}

/// A raw composite owned by the reactive system: a record, array, map, set
/// or weak collection. Cloning the handle aliases the same object.
///
/// Reads and writes through `Target` are untracked; wrap the target with
/// [`reactive`](crate::reactive) to observe it.
#[derive(Clone)]
pub struct Target {
    pub(crate) inner: Rc<TargetInner>,
}

impl Target {
    fn with_data(data: TargetData) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                data: RefCell::new(data),
                flags: Cell::new(0),
                deps: RefCell::new(FxHashMap::default()),
                proxies: Default::default(),
            }),
        }
    }

    pub fn record() -> Self {
        Self::with_data(TargetData::Record(FxIndexMap::default()))
    }

    pub fn record_from<K: AsRef<str>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (Rc::from(k.as_ref()), v.into()))
            .collect();
        Self::with_data(TargetData::Record(map))
    }

    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::with_data(TargetData::Array(items.into_iter().map(Into::into).collect()))
    }

    pub fn map() -> Self {
        Self::with_data(TargetData::Map(FxIndexMap::default()))
    }

    pub fn map_from<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let t = Self::map();
        for (k, v) in entries {
            t.collection_set(k.into(), v.into());
        }
        t
    }

    pub fn set() -> Self {
        Self::with_data(TargetData::Set(FxIndexMap::default()))
    }

    pub fn set_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        let t = Self::set();
        for v in items {
            t.collection_add(v.into());
        }
        t
    }

    pub fn weak_map() -> Self {
        Self::with_data(TargetData::WeakMap(FxIndexMap::default()))
    }

    pub fn weak_set() -> Self {
        Self::with_data(TargetData::WeakSet(FxIndexMap::default()))
    }

    pub fn kind(&self) -> TargetKind {
        match &*self.inner.data.borrow() {
            TargetData::Record(_) => TargetKind::Record,
            TargetData::Array(_) => TargetKind::Array,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
            TargetData::WeakMap(_) => TargetKind::WeakMap,
            TargetData::WeakSet(_) => TargetKind::WeakSet,
        }
    }

    pub fn is_array(&self) -> bool {
        self.kind() == TargetKind::Array
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // FLAGS
    // =========================================================================

    pub fn is_skipped(&self) -> bool {
        self.inner.flags.get() & SKIP != 0
    }

    pub(crate) fn mark_skip(&self) {
        self.inner.flags.set(self.inner.flags.get() | SKIP);
    }

    /// Forbid adding new keys (`Object.preventExtensions`). Non-extensible
    /// targets are never wrapped.
    pub fn prevent_extensions(&self) {
        self.inner.flags.set(self.inner.flags.get() | NON_EXTENSIBLE);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.flags.get() & NON_EXTENSIBLE == 0
    }

    // =========================================================================
    // RAW RECORD / ARRAY ACCESS (untracked)
    // =========================================================================

    pub(crate) fn get_prop(&self, key: &PropKey) -> Value {
        match (&*self.inner.data.borrow(), key) {
            (TargetData::Record(map), PropKey::Name(name)) => map.get(name).cloned().unwrap_or_default(),
            (TargetData::Array(items), PropKey::Index(i)) => items.get(*i).cloned().unwrap_or_default(),
            (TargetData::Array(items), PropKey::Length) => Value::Number(items.len() as f64),
            _ => Value::Undefined,
        }
    }

    pub(crate) fn has_prop(&self, key: &PropKey) -> bool {
        match (&*self.inner.data.borrow(), key) {
            (TargetData::Record(map), PropKey::Name(name)) => map.contains_key(name),
            (TargetData::Array(items), PropKey::Index(i)) => *i < items.len(),
            (TargetData::Array(_), PropKey::Length) => true,
            _ => false,
        }
    }

    /// Store a property. Returns false when the write is impossible
    /// (new key on a non-extensible target, or a non-index key on an array).
    pub(crate) fn set_prop(&self, key: &PropKey, value: Value) -> bool {
        let extensible = self.is_extensible();
        let grown = match (&mut *self.inner.data.borrow_mut(), key) {
            (TargetData::Record(map), PropKey::Name(name)) => {
                if let Some(slot) = map.get_mut(name) {
                    *slot = value;
                    Ok(true)
                } else if extensible {
                    map.insert(name.clone(), value);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            (TargetData::Array(items), PropKey::Index(i)) => {
                if *i < items.len() {
                    items[*i] = value;
                    Ok(true)
                } else if extensible {
                    grow_array(items, *i + 1).map(|()| {
                        items[*i] = value;
                        true
                    })
                } else {
                    Ok(false)
                }
            }
            (TargetData::Array(items), PropKey::Length) => match value {
                Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= (MAX_ARRAY_INDEX + 1) as f64 => {
                    let len = n as usize;
                    if len <= items.len() {
                        items.truncate(len);
                        Ok(true)
                    } else {
                        grow_array(items, len).map(|()| true)
                    }
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        };
        // The warn handler may read this target, so the borrow must be gone
        grown.unwrap_or_else(|len| {
            warn(format!("Array growth to length {len} failed: allocation refused."));
            false
        })
    }

    /// Remove a property. Array deletion leaves a hole (`undefined`) and keeps
    /// the length, as `delete arr[i]` does.
    pub(crate) fn delete_prop(&self, key: &PropKey) -> bool {
        match (&mut *self.inner.data.borrow_mut(), key) {
            (TargetData::Record(map), PropKey::Name(name)) => {
                map.shift_remove(name);
                true
            }
            (TargetData::Array(items), PropKey::Index(i)) => {
                if let Some(slot) = items.get_mut(*i) {
                    *slot = Value::Undefined;
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) fn prop_keys(&self) -> Vec<PropKey> {
        match &*self.inner.data.borrow() {
            TargetData::Record(map) => map.keys().map(|k| PropKey::Name(k.clone())).collect(),
            TargetData::Array(items) => (0..items.len()).map(PropKey::Index).collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn array_snapshot(&self) -> Vec<Value> {
        match &*self.inner.data.borrow() {
            TargetData::Array(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Untracked property read.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        PropKey::resolve(&key.into(), self.is_array())
            .map(|k| self.get_prop(&k))
            .unwrap_or_default()
    }

    /// Untracked property write (no observers are notified).
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        match PropKey::resolve(&key.into(), self.is_array()) {
            Some(k) => self.set_prop(&k, value.into()),
            None => false,
        }
    }

    /// Record key count, array length or collection size.
    pub fn len(&self) -> usize {
        match &*self.inner.data.borrow() {
            TargetData::Record(map) => map.len(),
            TargetData::Array(items) => items.len(),
            TargetData::Map(m) => m.len(),
            TargetData::Set(s) => s.len(),
            TargetData::WeakMap(m) => m.len(),
            TargetData::WeakSet(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // RAW COLLECTION ACCESS (untracked)
    // =========================================================================

    fn prune_weak(&self) {
        match &mut *self.inner.data.borrow_mut() {
            TargetData::WeakMap(m) => m.retain(|_, (k, _)| k.upgrade().is_some()),
            TargetData::WeakSet(s) => s.retain(|_, k| k.upgrade().is_some()),
            _ => {}
        }
    }

    pub fn collection_has(&self, key: &Value) -> bool {
        self.prune_weak();
        let k = ValueKey::of(key);
        match &*self.inner.data.borrow() {
            TargetData::Map(m) => m.contains_key(&k),
            TargetData::Set(s) => s.contains_key(&k),
            TargetData::WeakMap(m) => m.contains_key(&k),
            TargetData::WeakSet(s) => s.contains_key(&k),
            _ => false,
        }
    }

    pub fn collection_get(&self, key: &Value) -> Value {
        self.prune_weak();
        let k = ValueKey::of(key);
        match &*self.inner.data.borrow() {
            TargetData::Map(m) => m.get(&k).map(|(_, v)| v.clone()).unwrap_or_default(),
            TargetData::WeakMap(m) => m.get(&k).map(|(_, v)| v.clone()).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Insert or overwrite a map entry. Weak maps reject primitive keys.
    pub fn collection_set(&self, key: Value, value: Value) -> bool {
        self.prune_weak();
        let k = ValueKey::of(&key);
        match &mut *self.inner.data.borrow_mut() {
            TargetData::Map(m) => {
                match m.get_mut(&k) {
                    Some(entry) => entry.1 = value,
                    None => {
                        m.insert(k, (key, value));
                    }
                }
                true
            }
            TargetData::WeakMap(m) => match key.downgrade() {
                Some(weak) => {
                    match m.get_mut(&k) {
                        Some(entry) => entry.1 = value,
                        None => {
                            m.insert(k, (weak, value));
                        }
                    }
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn collection_add(&self, value: Value) -> bool {
        self.prune_weak();
        let k = ValueKey::of(&value);
        match &mut *self.inner.data.borrow_mut() {
            TargetData::Set(s) => {
                s.entry(k).or_insert(value);
                true
            }
            TargetData::WeakSet(s) => match value.downgrade() {
                Some(weak) => {
                    s.entry(k).or_insert(weak);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn collection_delete(&self, key: &Value) -> bool {
        self.prune_weak();
        let k = ValueKey::of(key);
        match &mut *self.inner.data.borrow_mut() {
            TargetData::Map(m) => m.shift_remove(&k).is_some(),
            TargetData::Set(s) => s.shift_remove(&k).is_some(),
            TargetData::WeakMap(m) => m.shift_remove(&k).is_some(),
            TargetData::WeakSet(s) => s.shift_remove(&k).is_some(),
            _ => false,
        }
    }

    pub fn collection_clear(&self) {
        match &mut *self.inner.data.borrow_mut() {
            TargetData::Map(m) => m.clear(),
            TargetData::Set(s) => s.clear(),
            TargetData::WeakMap(m) => m.clear(),
            TargetData::WeakSet(s) => s.clear(),
            _ => {}
        }
    }

    /// `(key, value)` pairs in insertion order. Sets yield `(value, value)`.
    /// Weak collections are not enumerable and yield nothing.
    pub fn collection_entries(&self) -> Vec<(Value, Value)> {
        match &*self.inner.data.borrow() {
            TargetData::Map(m) => m.values().map(|(k, v)| (k.clone(), v.clone())).collect(),
            TargetData::Set(s) => s.values().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.data.borrow() {
            TargetData::Record(map) => f.debug_map().entries(map.iter()).finish(),
            TargetData::Array(items) => f.debug_list().entries(items.iter()).finish(),
            TargetData::Map(m) => f
                .debug_map()
                .entries(m.values().map(|(k, v)| (k, v)))
                .finish(),
            TargetData::Set(s) => f.debug_set().entries(s.values()).finish(),
            TargetData::WeakMap(m) => write!(f, "WeakMap({})", m.len()),
            TargetData::WeakSet(s) => write!(f, "WeakSet({})", s.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_key_same_value_zero() {
        assert_eq!(ValueKey::of(&Value::Number(f64::NAN)), ValueKey::of(&Value::Number(f64::NAN)));
        assert_eq!(ValueKey::of(&Value::Number(0.0)), ValueKey::of(&Value::Number(-0.0)));
        assert_ne!(ValueKey::of(&Value::from(1)), ValueKey::of(&Value::from("1")));
    }

    #[test]
    fn strict_equality_uses_identity_for_objects() {
        let a = Target::record();
        let b = Target::record();
        assert_eq!(Value::from(&a), Value::from(&a));
        assert_ne!(Value::from(&a), Value::from(&b));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn array_keys_resolve_to_indices() {
        assert_eq!(PropKey::resolve(&Value::from("2"), true), Some(PropKey::Index(2)));
        assert_eq!(PropKey::resolve(&Value::from("02"), true), Some(PropKey::Name(Rc::from("02"))));
        assert_eq!(PropKey::resolve(&Value::from("length"), true), Some(PropKey::Length));
        assert_eq!(PropKey::resolve(&Value::from(3), false), Some(PropKey::Name(Rc::from("3"))));
    }

    #[test]
    fn raw_array_writes_extend_with_holes() {
        let arr = Target::array([1, 2]);
        assert!(arr.insert(4, 5));
        assert_eq!(arr.len(), 5);
        assert!(arr.get(3).is_undefined());
        assert!(arr.insert("length", 1));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn integers_past_the_index_range_are_names() {
        let max = MAX_ARRAY_INDEX as f64;
        assert_eq!(PropKey::resolve(&Value::from(max), true), Some(PropKey::Index(MAX_ARRAY_INDEX)));
        assert_eq!(
            PropKey::resolve(&Value::from(max + 1.0), true),
            Some(PropKey::Name(Rc::from("4294967295")))
        );
        assert_eq!(
            PropKey::resolve(&Value::from("4294967296"), true),
            Some(PropKey::Name(Rc::from("4294967296")))
        );
    }

    #[test]
    fn out_of_range_array_writes_are_refused() {
        let arr = Target::array([1, 2]);
        assert!(!arr.insert(4_294_967_296.0, 1));
        assert!(!arr.insert("length", 4_294_967_296.0));
        assert!(!arr.insert("length", -1));
        assert_eq!(arr.len(), 2);
        assert!(arr.get(4_294_967_296.0).is_undefined());
    }

    #[test]
    fn non_extensible_record_rejects_new_keys() {
        let rec = Target::record_from([("a", 1)]);
        rec.prevent_extensions();
        assert!(rec.insert("a", 2));
        assert!(!rec.insert("b", 2));
    }

    #[test]
    fn weak_map_rejects_primitive_keys_and_prunes_dead_ones() {
        let wm = Target::weak_map();
        assert!(!wm.collection_set(Value::from(1), Value::from(1)));
        {
            let key = Target::record();
            assert!(wm.collection_set(Value::from(&key), Value::from(2)));
            assert!(wm.collection_has(&Value::from(&key)));
        }
        assert!(!wm.collection_has(&Value::Null));
        assert_eq!(wm.len(), 0);
    }
}
