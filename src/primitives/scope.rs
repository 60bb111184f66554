// ============================================================================
// spark-weave - Effect Scope
//
// Group effects for bulk disposal.
// ============================================================================
//
// An EffectScope owns the effects created while it is active, the cleanups
// registered with `on_scope_dispose`, and its non-detached child scopes.
// Children sit in the parent's `scopes` array and remember their index, so
// detaching one is a swap-with-last.
//
// Key features:
// - run(fn) - Execute function with this scope active
// - on()/off() - Manual activation (the renderer's setup pattern)
// - stop() - Dispose all effects, run cleanups, stop children
// - Detached scopes (opt out of parent collection)
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::error_handling::{call_with_error_handling, warn, ErrorCode};
use crate::primitives::effect::EffectInner;

// =============================================================================
// THREAD-LOCAL SCOPE STATE
// =============================================================================

thread_local! {
    /// Currently active scope (if any)
    static ACTIVE_SCOPE: RefCell<Option<Rc<EffectScopeInner>>> = const { RefCell::new(None) };
}

fn get_active_scope() -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.borrow().clone())
}

fn set_active_scope(scope: Option<Rc<EffectScopeInner>>) -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.replace(scope))
}

/// Cleanup function type for scope disposal
pub type ScopeCleanupFn = Box<dyn FnOnce()>;

// =============================================================================
// EFFECT SCOPE INNER
// =============================================================================

pub struct EffectScopeInner {
    active: Cell<bool>,

    /// Effects created within this scope
    effects: RefCell<Vec<Rc<EffectInner>>>,

    /// Cleanup functions to run on stop, in registration order
    cleanups: RefCell<Vec<ScopeCleanupFn>>,

    parent: Option<Weak<EffectScopeInner>>,

    /// Non-detached child scopes
    scopes: RefCell<Vec<Rc<EffectScopeInner>>>,

    /// Position in `parent.scopes`
    index: Cell<usize>,

    self_weak: Weak<EffectScopeInner>,
}

impl EffectScopeInner {
    fn new(detached: bool) -> Rc<Self> {
        let parent = get_active_scope();
        let attach = !detached && parent.is_some();

        let scope = Rc::new_cyclic(|self_weak| Self {
            active: Cell::new(true),
            effects: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            parent: parent.as_ref().map(Rc::downgrade),
            scopes: RefCell::new(Vec::new()),
            index: Cell::new(0),
            self_weak: self_weak.clone(),
        });

        if let (true, Some(parent)) = (attach, parent) {
            let mut siblings = parent.scopes.borrow_mut();
            scope.index.set(siblings.len());
            siblings.push(scope.clone());
        }

        scope
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.active.get() {
            warn("cannot run an inactive effect scope.");
            return None;
        }
        let self_rc = self.self_weak.upgrade()?;

        struct Restore(Option<Option<Rc<EffectScopeInner>>>);

        impl Drop for Restore {
            fn drop(&mut self) {
                if let Some(prev) = self.0.take() {
                    set_active_scope(prev);
                }
            }
        }

        let _restore = Restore(Some(set_active_scope(Some(self_rc))));
        Some(f())
    }

    fn on(&self) {
        set_active_scope(self.self_weak.upgrade());
    }

    fn off(&self) {
        set_active_scope(self.parent.as_ref().and_then(Weak::upgrade));
    }

    /// Stop effects, run cleanups, stop children, then detach from the parent
    /// unless the parent is the one doing the stopping.
    fn stop(&self, from_parent: bool) {
        if !self.active.get() {
            return;
        }
        // Mark first so re-entrant stops from cleanups are no-ops
        self.active.set(false);

        let effects = std::mem::take(&mut *self.effects.borrow_mut());
        for effect in &effects {
            effect.stop();
        }

        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            call_with_error_handling(ErrorCode::ScopeCleanup, cleanup);
        }

        let children = std::mem::take(&mut *self.scopes.borrow_mut());
        for child in &children {
            child.stop(true);
        }

        if !from_parent {
            self.detach_from_parent();
        }
        tracing::trace!(target: "spark_weave", effects = effects.len(), "effect scope stopped");
    }

    fn detach_from_parent(&self) {
        let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut siblings = parent.scopes.borrow_mut();
        let index = self.index.get();
        let is_self = siblings
            .get(index)
            .is_some_and(|s| std::ptr::eq(Rc::as_ptr(s), self));
        if !is_self {
            return;
        }
        let last = siblings.len() - 1;
        siblings.swap(index, last);
        siblings[index].index.set(index);
        // The popped Rc may be the last owner of `self`; release it after the borrow
        let removed = siblings.pop();
        drop(siblings);
        drop(removed);
    }

    pub(crate) fn add_effect(&self, effect: Rc<EffectInner>) {
        self.effects.borrow_mut().push(effect);
    }

    fn add_cleanup(&self, cleanup: ScopeCleanupFn) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl Drop for EffectScopeInner {
    fn drop(&mut self) {
        // Nothing owns us any more, so there is nothing to detach from
        self.stop(true);
    }
}

// =============================================================================
// EFFECT SCOPE (Public wrapper)
// =============================================================================

/// An effect scope that groups effects for bulk disposal.
///
/// A non-detached scope is owned by its parent. A detached (or root) scope
/// stops when its last handle is dropped.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<EffectScopeInner>,
}

impl EffectScope {
    fn from_inner(inner: Rc<EffectScopeInner>) -> Self {
        Self { inner }
    }

    /// Whether the scope is still active (not stopped)
    pub fn active(&self) -> bool {
        self.inner.is_active()
    }

    /// Run `f` with this scope active. Effects created meanwhile join the
    /// scope. Returns `None` (with a warning) if the scope was stopped.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_weave::effect_scope;
    ///
    /// let scope = effect_scope(false);
    /// assert_eq!(scope.run(|| 42), Some(42));
    /// scope.stop();
    /// assert_eq!(scope.run(|| 42), None);
    /// ```
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.inner.run(f)
    }

    /// Make this scope the active one until `off()`.
    pub fn on(&self) {
        self.inner.on();
    }

    /// Restore the parent scope as the active one.
    pub fn off(&self) {
        self.inner.off();
    }

    /// Stop every owned effect, run cleanups, stop child scopes. Idempotent.
    pub fn stop(&self) {
        self.inner.stop(false);
    }

    /// Number of directly owned effects
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Number of attached child scopes
    pub fn child_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }

    pub fn ptr_eq(&self, other: &EffectScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for EffectScope {
    fn drop(&mut self) {
        // Last handle of an unowned scope
        if Rc::strong_count(&self.inner) == 1 {
            self.inner.stop(true);
        }
    }
}

impl std::fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.active())
            .field("effects", &self.effect_count())
            .field("scopes", &self.child_count())
            .finish()
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect scope. Unless `detached`, it becomes a child of the
/// active scope and is stopped with it.
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::from_inner(EffectScopeInner::new(detached))
}

/// The currently active scope, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    get_active_scope().map(EffectScope::from_inner)
}

/// Register a cleanup on the active scope. Warns outside of a scope.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    match get_active_scope() {
        Some(scope) => scope.add_cleanup(Box::new(f)),
        None => warn(
            "on_scope_dispose() is called when there is no active effect scope to be associated with.",
        ),
    }
}

/// Attach `effect` to `scope`, or to the active scope when `scope` is None.
/// Inactive scopes ignore it.
pub fn record_effect_scope(effect: &Rc<EffectInner>, scope: Option<&EffectScope>) {
    let scope = match scope {
        Some(scope) => Some(scope.inner.clone()),
        None => get_active_scope(),
    };
    if let Some(scope) = scope {
        if scope.is_active() {
            scope.add_effect(effect.clone());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_handling::set_warn_handler;
    use crate::primitives::effect::effect;
    use crate::primitives::reference::reference;
    use std::cell::Cell;

    fn counting_effect(source: &crate::primitives::reference::Ref, runs: &Rc<Cell<u32>>) {
        let (source, runs) = (source.clone(), runs.clone());
        // Handle dropped: the scope keeps the effect alive
        let _ = effect(move || {
            source.get();
            runs.set(runs.get() + 1);
        });
    }

    #[test]
    fn scope_groups_and_stops_effects() {
        let count = reference(0);
        let runs = Rc::new(Cell::new(0));
        let scope = effect_scope(false);

        scope.run(|| {
            counting_effect(&count, &runs);
            counting_effect(&count, &runs);
        });
        assert_eq!(scope.effect_count(), 2);
        assert_eq!(runs.get(), 2);

        count.set(1);
        assert_eq!(runs.get(), 4);

        scope.stop();
        assert!(!scope.active());
        count.set(2);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn current_scope_follows_run() {
        assert!(get_current_scope().is_none());
        let scope = effect_scope(false);
        let inside = scope.run(|| get_current_scope().is_some_and(|s| s.ptr_eq(&scope)));
        assert_eq!(inside, Some(true));
        assert!(get_current_scope().is_none());
    }

    #[test]
    fn run_restores_scope_after_panic() {
        let scope = effect_scope(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scope.run(|| panic!("inside scope"))
        }));
        assert!(result.is_err());
        assert!(get_current_scope().is_none());
    }

    #[test]
    fn on_and_off_switch_active_scope() {
        let parent = effect_scope(false);
        let child = parent.run(|| effect_scope(false)).unwrap();
        child.on();
        assert!(get_current_scope().is_some_and(|s| s.ptr_eq(&child)));
        child.off();
        assert!(get_current_scope().is_some_and(|s| s.ptr_eq(&parent)));
        parent.off();
        assert!(get_current_scope().is_none());
    }

    #[test]
    fn cleanups_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let scope = effect_scope(false);
        scope.run(|| {
            for i in 1..=3 {
                let order = order.clone();
                on_scope_dispose(move || order.borrow_mut().push(i));
            }
        });
        scope.stop();
        scope.stop();
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn stop_cascades_to_children_once() {
        let stops = Rc::new(Cell::new(0));
        let outer = effect_scope(false);
        outer.run(|| {
            let inner = effect_scope(false);
            inner.run(|| {
                let stops = stops.clone();
                on_scope_dispose(move || stops.set(stops.get() + 1));
            });
        });
        assert_eq!(outer.child_count(), 1);
        outer.stop();
        assert_eq!(stops.get(), 1);
        assert_eq!(outer.child_count(), 0);
    }

    #[test]
    fn child_stop_detaches_with_swap_remove() {
        let parent = effect_scope(false);
        let children: Vec<EffectScope> =
            parent.run(|| (0..3).map(|_| effect_scope(false)).collect()).unwrap();

        children[0].stop();
        assert_eq!(parent.child_count(), 2);

        // The moved sibling can still detach itself
        children[2].stop();
        assert_eq!(parent.child_count(), 1);
        children[1].stop();
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn detached_scope_survives_parent() {
        let cleaned = Rc::new(Cell::new(false));
        let parent = effect_scope(false);
        let detached = parent
            .run(|| {
                let detached = effect_scope(true);
                detached.run(|| {
                    let cleaned = cleaned.clone();
                    on_scope_dispose(move || cleaned.set(true));
                });
                detached
            })
            .unwrap();

        parent.stop();
        assert!(detached.active());
        assert!(!cleaned.get());
        drop(detached);
        assert!(cleaned.get());
    }

    #[test]
    fn dispose_outside_scope_warns() {
        let warned = Rc::new(Cell::new(false));
        let prev = set_warn_handler(Some(Rc::new({
            let warned = warned.clone();
            move |_: &str| warned.set(true)
        })));
        on_scope_dispose(|| {});
        assert!(warned.get());
        set_warn_handler(prev);
    }

    #[test]
    fn inactive_scope_run_warns_and_returns_none() {
        let warned = Rc::new(Cell::new(false));
        let prev = set_warn_handler(Some(Rc::new({
            let warned = warned.clone();
            move |_: &str| warned.set(true)
        })));
        let scope = effect_scope(true);
        scope.stop();
        assert_eq!(scope.run(|| 1), None);
        assert!(warned.get());
        set_warn_handler(prev);
    }
}
