// ============================================================================
// spark-weave - Deferred Computed
// Computeds that only notify plain observers when their value really changed
// ============================================================================
//
// On upstream change a deferred computed marks itself dirty and queues one
// check microtask per burst. The check re-evaluates the getter and notifies
// subscribers only if the result differs from the last value they could have
// observed. Deferred computeds that read this one are invalidated
// synchronously through their `computed_trigger` hook, so a synchronous read
// further down a chain never sees a stale value.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::error_handling::{call_with_error_handling, warn, ErrorCode};
use crate::core::types::{AnyRef, RefLike, Value};
use crate::primitives::effect::{EffectInner, ReactiveEffect};
use crate::primitives::reference::RefDep;
use crate::primitives::scope::record_effect_scope;
use crate::reactivity::scheduling::queue_microtask;

pub(crate) struct DeferredInner {
    value: RefCell<Value>,
    dirty: Cell<bool>,
    dep: RefDep,
    effect: Rc<EffectInner>,
    /// Value seen by subscribers before a chained invalidation
    compare_target: RefCell<Option<Value>>,
    /// A check microtask is pending
    scheduled: Cell<bool>,
}

impl DeferredInner {
    fn new<V: Into<Value>>(getter: impl Fn() -> V + 'static) -> Rc<Self> {
        let inner = Rc::new_cyclic(|weak: &Weak<DeferredInner>| {
            let run = {
                let weak = weak.clone();
                move || {
                    let value = getter().into();
                    if let Some(this) = weak.upgrade() {
                        *this.value.borrow_mut() = value;
                    }
                }
            };
            let scheduler = {
                let weak = weak.clone();
                move || {
                    if let Some(this) = weak.upgrade() {
                        this.invalidate(false);
                    }
                }
            };
            let effect = EffectInner::new(Box::new(run), Some(Rc::new(scheduler)));
            effect.mark_computed();
            let chained = weak.clone();
            *effect.computed_trigger.borrow_mut() = Some(Rc::new(move || {
                if let Some(this) = chained.upgrade() {
                    this.invalidate(true);
                }
            }));
            DeferredInner {
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(true),
                dep: RefDep::new(),
                effect,
                compare_target: RefCell::new(None),
                scheduled: Cell::new(false),
            }
        });
        record_effect_scope(&inner.effect, None);
        inner
    }

    /// `from_chain` is true when an upstream deferred computed invalidates
    /// this one synchronously.
    fn invalidate(self: &Rc<Self>, from_chain: bool) {
        if let Some(dep) = self.dep.get() {
            if from_chain {
                *self.compare_target.borrow_mut() = Some(self.value.borrow().clone());
            } else if !self.scheduled.get() {
                let value_to_compare = self
                    .compare_target
                    .borrow_mut()
                    .take()
                    .unwrap_or_else(|| self.value.borrow().clone());
                self.scheduled.set(true);
                let weak = Rc::downgrade(self);
                queue_microtask(move || {
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    this.scheduled.set(false);
                    if !this.effect.is_active() {
                        return;
                    }
                    // A panicking getter stays dirty and notifies nobody
                    let value = call_with_error_handling(ErrorCode::ComputedGetter, || this.evaluate());
                    if value.is_some_and(|value| value != value_to_compare) {
                        this.dep.trigger();
                    }
                });
            }

            let chained: Vec<_> = dep
                .effects()
                .iter()
                .filter_map(|e| e.computed_trigger.borrow().clone())
                .collect();
            for hook in chained {
                hook();
            }
        }
        self.dirty.set(true);
    }

    fn evaluate(&self) -> Value {
        if self.dirty.get() {
            self.effect.run();
            self.dirty.set(false);
        }
        self.value.borrow().clone()
    }
}

impl RefLike for DeferredInner {
    fn get(&self) -> Value {
        self.dep.track();
        self.evaluate()
    }

    fn set(&self, _value: Value) {
        warn("Write operation failed: computed value is readonly");
    }

    fn peek(&self) -> Value {
        self.evaluate()
    }

    fn is_readonly(&self) -> bool {
        true
    }

    fn trigger(&self) {
        self.dep.trigger();
    }
}

/// A read-only computed whose plain subscribers are notified at most once
/// per microtask, and only when the value changed.
#[derive(Clone)]
pub struct DeferredComputedRef {
    inner: Rc<DeferredInner>,
}

impl DeferredComputedRef {
    pub fn get(&self) -> Value {
        self.inner.get()
    }

    pub fn peek(&self) -> Value {
        self.inner.peek()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn effect(&self) -> ReactiveEffect {
        ReactiveEffect::from_inner(self.inner.effect.clone())
    }

    pub fn to_any_ref(&self) -> AnyRef {
        AnyRef::new(self.inner.clone())
    }
}

impl From<DeferredComputedRef> for Value {
    fn from(c: DeferredComputedRef) -> Self {
        Value::Ref(c.to_any_ref())
    }
}

impl From<&DeferredComputedRef> for Value {
    fn from(c: &DeferredComputedRef) -> Self {
        Value::Ref(c.to_any_ref())
    }
}

impl fmt::Debug for DeferredComputedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredComputedRef")
            .field("dirty", &self.is_dirty())
            .field("scheduled", &self.inner.scheduled.get())
            .finish()
    }
}

/// Create a deferred computed.
///
/// # Example
///
/// ```
/// use spark_weave::{deferred_computed, effect, reference, tick};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let src = reference(0);
/// let parity = deferred_computed({
///     let src = src.clone();
///     move || src.get().as_number().unwrap_or(0.0) % 2.0
/// });
/// let runs = Rc::new(Cell::new(0));
/// let _e = effect({
///     let (parity, runs) = (parity.clone(), runs.clone());
///     move || {
///         parity.get();
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// src.set(2);
/// tick();
/// assert_eq!(runs.get(), 1);
/// ```
pub fn deferred_computed<V: Into<Value>>(getter: impl Fn() -> V + 'static) -> DeferredComputedRef {
    DeferredComputedRef {
        inner: DeferredInner::new(getter),
    }
}
