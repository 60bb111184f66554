// ============================================================================
// spark-weave - Computed
// Cached derived values backed by a lazy effect
// ============================================================================
//
// A computed wraps its getter in an effect whose scheduler never re-runs it:
// on upstream change the scheduler only marks the value dirty and, on the
// clean -> dirty transition, notifies the computed's own subscribers. The
// next read re-runs the getter. A getter that panics leaves the value dirty.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::error_handling::warn;
use crate::core::types::{AnyRef, RefLike, Value};
use crate::primitives::effect::{EffectInner, ReactiveEffect};
use crate::primitives::reference::RefDep;
use crate::primitives::scope::record_effect_scope;

pub type ComputedSetter = Box<dyn Fn(Value)>;

pub(crate) struct ComputedInner {
    value: RefCell<Value>,
    dirty: Cell<bool>,
    dep: RefDep,
    effect: Rc<EffectInner>,
    setter: Option<ComputedSetter>,
}

impl ComputedInner {
    fn new<V: Into<Value>>(getter: impl Fn() -> V + 'static, setter: Option<ComputedSetter>) -> Rc<Self> {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner>| {
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
                        if !this.dirty.get() {
                            this.dirty.set(true);
                            this.dep.trigger();
                        }
                    }
                }
            };
            let effect = EffectInner::new(Box::new(run), Some(Rc::new(scheduler)));
            effect.mark_computed();
            ComputedInner {
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(true),
                dep: RefDep::new(),
                effect,
                setter,
            }
        });
        record_effect_scope(&inner.effect, None);
        inner
    }

    fn evaluate(&self) -> Value {
        if self.dirty.get() {
            self.effect.run();
            self.dirty.set(false);
        }
        self.value.borrow().clone()
    }
}

impl RefLike for ComputedInner {
    fn get(&self) -> Value {
        self.dep.track();
        self.evaluate()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => warn("Write operation failed: computed value is readonly"),
        }
    }

    fn peek(&self) -> Value {
        self.evaluate()
    }

    fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }

    fn trigger(&self) {
        self.dep.trigger();
    }
}

/// A cached derived value. Cloning shares the same computed.
#[derive(Clone)]
pub struct ComputedRef {
    inner: Rc<ComputedInner>,
}

impl ComputedRef {
    /// Current value (tracked); re-evaluates when dirty.
    pub fn get(&self) -> Value {
        self.inner.get()
    }

    /// Current value without subscribing the running effect.
    pub fn peek(&self) -> Value {
        self.inner.peek()
    }

    /// Call the setter; read-only computeds warn.
    pub fn set(&self, value: impl Into<Value>) {
        self.inner.set(value.into());
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.is_readonly()
    }

    /// The backing effect. Stopping it freezes the cached value.
    pub fn effect(&self) -> ReactiveEffect {
        ReactiveEffect::from_inner(self.inner.effect.clone())
    }

    /// Type-erased ref handle sharing this computed.
    pub fn to_any_ref(&self) -> AnyRef {
        AnyRef::new(self.inner.clone())
    }
}

impl From<ComputedRef> for Value {
    fn from(c: ComputedRef) -> Self {
        Value::Ref(c.to_any_ref())
    }
}

impl From<&ComputedRef> for Value {
    fn from(c: &ComputedRef) -> Self {
        Value::Ref(c.to_any_ref())
    }
}

impl fmt::Debug for ComputedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedRef")
            .field("dirty", &self.is_dirty())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Create a read-only computed.
///
/// # Example
///
/// ```
/// use spark_weave::{computed, reference};
///
/// let count = reference(1);
/// let double = computed({
///     let count = count.clone();
///     move || count.get().as_number().unwrap_or(0.0) * 2.0
/// });
/// assert_eq!(double.get().as_number(), Some(2.0));
/// count.set(4);
/// assert_eq!(double.get().as_number(), Some(8.0));
/// ```
pub fn computed<V: Into<Value>>(getter: impl Fn() -> V + 'static) -> ComputedRef {
    ComputedRef {
        inner: ComputedInner::new(getter, None),
    }
}

/// Create a writable computed: writes call `setter`.
pub fn computed_with_setter<V: Into<Value>>(
    getter: impl Fn() -> V + 'static,
    setter: impl Fn(Value) + 'static,
) -> ComputedRef {
    ComputedRef {
        inner: ComputedInner::new(getter, Some(Box::new(setter))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_handling::set_warn_handler;
    use crate::primitives::effect::effect;
    use crate::primitives::reference::reference;
    use crate::primitives::scope::effect_scope;

    fn num(v: Value) -> f64 {
        v.as_number().unwrap_or(f64::NAN)
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        let src = reference(1);
        let calls = Rc::new(Cell::new(0));
        let c = computed({
            let (src, calls) = (src.clone(), calls.clone());
            move || {
                calls.set(calls.get() + 1);
                num(src.get()) + 1.0
            }
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(num(c.get()), 2.0);
        assert_eq!(num(c.get()), 2.0);
        assert_eq!(calls.get(), 1);

        src.set(5);
        assert_eq!(calls.get(), 1);
        assert!(c.is_dirty());
        assert_eq!(num(c.get()), 6.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn effect_over_computed_reruns_once_per_change_burst() {
        let a = reference(1);
        let b = reference(1);
        let sum = computed({
            let (a, b) = (a.clone(), b.clone());
            move || num(a.get()) + num(b.get())
        });
        let runs = Rc::new(Cell::new(0));
        let _e = effect({
            let (sum, runs) = (sum.clone(), runs.clone());
            move || {
                sum.get();
                runs.set(runs.get() + 1);
            }
        });
        a.set(2);
        assert_eq!(runs.get(), 2);
        b.set(2);
        assert_eq!(runs.get(), 3);
        assert_eq!(num(sum.peek()), 4.0);
    }

    #[test]
    fn dirty_notifies_only_on_first_transition() {
        let src = reference(0);
        let c = computed({
            let src = src.clone();
            move || src.get()
        });
        let notified = Rc::new(Cell::new(0));
        let _e = effect({
            let (c, notified) = (c.clone(), notified.clone());
            move || {
                // subscribe without clearing the dirty flag on re-runs
                if notified.get() == 0 {
                    c.get();
                }
                notified.set(notified.get() + 1);
            }
        });
        src.set(1);
        assert_eq!(notified.get(), 2);
        // still dirty and no longer subscribed: nothing further
        src.set(2);
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn writable_computed_calls_setter() {
        let src = reference(1);
        let plus_one = computed_with_setter(
            {
                let src = src.clone();
                move || num(src.get()) + 1.0
            },
            {
                let src = src.clone();
                move |v: Value| src.set(num(v) - 1.0)
            },
        );
        plus_one.set(10);
        assert_eq!(num(src.get()), 9.0);
        assert!(!plus_one.is_readonly());
    }

    #[test]
    fn readonly_computed_warns_on_write() {
        let warned = Rc::new(Cell::new(false));
        let prev = set_warn_handler(Some(Rc::new({
            let warned = warned.clone();
            move |m: &str| warned.set(m == "Write operation failed: computed value is readonly")
        })));
        let c = computed(|| 1);
        c.set(2);
        assert!(warned.get());
        assert_eq!(num(c.get()), 1.0);
        set_warn_handler(prev);
    }

    #[test]
    fn panicking_getter_stays_dirty() {
        let fail = reference(true);
        let c = computed({
            let fail = fail.clone();
            move || {
                if fail.get().truthy() {
                    panic!("getter failed");
                }
                Value::from("ok")
            }
        });
        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.get()));
        assert!(first.is_err());
        assert!(c.is_dirty());

        fail.set(false);
        assert_eq!(c.get(), Value::from("ok"));
    }

    #[test]
    fn computed_stops_with_its_scope() {
        let src = reference(1);
        let scope = effect_scope(false);
        let c = scope
            .run(|| {
                computed({
                    let src = src.clone();
                    move || src.get()
                })
            })
            .unwrap();
        assert_eq!(num(c.get()), 1.0);
        scope.stop();
        src.set(2);
        assert!(!c.effect().is_active());
        assert_eq!(num(c.get()), 1.0);
    }

    #[test]
    fn computed_stored_as_value_reads_through() {
        let c = computed(|| 3);
        let v = Value::from(&c);
        assert_eq!(v.as_ref_cell().map(|r| r.get()), Some(Value::from(3)));
    }
}
