// ============================================================================
// spark-weave - Effect System
// Tracked computations that re-run (or get scheduled) when their deps change
// ============================================================================
//
// An effect runs its function with itself installed as the active effect, so
// every tracked read subscribes it. Dep membership is diffed per run with the
// bit markers of `reactivity::dep`: after a run, the effect is subscribed to
// exactly the cells it read during that run.
//
// Key features:
// - Re-entrancy guard: an effect already on the running chain is not re-run
// - Optional scheduler: triggers call it instead of running the effect
// - Deferred stop when an effect stops itself mid-run
// - Scope registration for bulk disposal
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::core::config::max_marker_bits;
use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error_handling::{call_with_error_handling, ErrorCode};
use crate::core::types::{Target, TrackKey, TrackOpTypes, TriggerOpTypes, Value};
use crate::primitives::scope::{record_effect_scope, EffectScope};
use crate::reactivity::dep::{finalize_dep_markers, init_dep_markers, Dep};

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Effect function signature
pub type EffectFn = Box<dyn FnMut()>;

/// Called on trigger instead of running the effect
pub type SchedulerFn = Rc<dyn Fn()>;

/// Called once when the effect stops
pub type StopFn = Box<dyn FnOnce()>;

/// Debug hook for track/trigger events
pub type DebuggerHook = Rc<dyn Fn(&DebuggerEvent)>;

thread_local! {
    static NEXT_EFFECT_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_effect_id() -> u64 {
    NEXT_EFFECT_ID.with(|id| {
        let next = id.get() + 1;
        id.set(next);
        next
    })
}

// =============================================================================
// DEBUGGER EVENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebuggerOp {
    Track(TrackOpTypes),
    Trigger(TriggerOpTypes),
}

/// Passed to `on_track` / `on_trigger`. `target` and `key` are absent for
/// refs and computeds.
#[derive(Clone, Debug)]
pub struct DebuggerEvent {
    pub effect_id: u64,
    pub target: Option<Target>,
    pub op: DebuggerOp,
    pub key: Option<TrackKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The inner effect implementation, shared between the public handle, the
/// deps it subscribes to (weakly) and its scope (strongly).
pub struct EffectInner {
    /// Stable identity used as the subscriber key in deps
    pub(crate) id: u64,

    /// Flags bitmask (ACTIVE, RUNNING, ALLOW_RECURSE, DEFER_STOP, COMPUTED)
    flags: Cell<u32>,

    /// The effect function; taken out while running
    func: RefCell<Option<EffectFn>>,

    /// Deps read during the last run
    pub(crate) deps: RefCell<Vec<Dep>>,

    /// Effect that was active when this one started running
    parent: RefCell<Option<Rc<EffectInner>>>,

    scheduler: RefCell<Option<SchedulerFn>>,
    on_stop: RefCell<Option<StopFn>>,
    pub(crate) on_track: Option<DebuggerHook>,
    pub(crate) on_trigger: Option<DebuggerHook>,

    /// Synchronous invalidation hook of a deferred computed, called by an
    /// upstream deferred computed before its own notification is deferred
    pub(crate) computed_trigger: RefCell<Option<Rc<dyn Fn()>>>,

    /// Diagnostic label of the owning component or watcher
    pub(crate) owner: Option<Rc<str>>,
}

impl EffectInner {
    pub(crate) fn new(func: EffectFn, scheduler: Option<SchedulerFn>) -> Rc<Self> {
        Rc::new(Self {
            id: next_effect_id(),
            flags: Cell::new(ACTIVE),
            func: RefCell::new(Some(func)),
            deps: RefCell::new(Vec::new()),
            parent: RefCell::new(None),
            scheduler: RefCell::new(scheduler),
            on_stop: RefCell::new(None),
            on_track: None,
            on_trigger: None,
            computed_trigger: RefCell::new(None),
            owner: None,
        })
    }

    fn with_options(func: EffectFn, options: &mut EffectOptions) -> Rc<Self> {
        let mut flags = ACTIVE;
        if options.allow_recurse {
            flags |= ALLOW_RECURSE;
        }
        Rc::new(Self {
            id: next_effect_id(),
            flags: Cell::new(flags),
            func: RefCell::new(Some(func)),
            deps: RefCell::new(Vec::new()),
            parent: RefCell::new(None),
            scheduler: RefCell::new(options.scheduler.take()),
            on_stop: RefCell::new(options.on_stop.take()),
            on_track: options.on_track.take(),
            on_trigger: options.on_trigger.take(),
            computed_trigger: RefCell::new(None),
            owner: options.owner.take(),
        })
    }

    // =========================================================================
    // FLAGS
    // =========================================================================

    pub fn is_active(&self) -> bool {
        self.flags.get() & ACTIVE != 0
    }

    pub fn is_running(&self) -> bool {
        self.flags.get() & RUNNING != 0
    }

    pub fn allow_recurse(&self) -> bool {
        self.flags.get() & ALLOW_RECURSE != 0
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.set_flag(ALLOW_RECURSE, allow);
    }

    pub fn is_computed(&self) -> bool {
        self.flags.get() & COMPUTED != 0
    }

    pub(crate) fn mark_computed(&self) {
        self.set_flag(COMPUTED, true);
    }

    fn set_flag(&self, flag: u32, on: bool) {
        let flags = self.flags.get();
        self.flags.set(if on { flags | flag } else { flags & !flag });
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.set_flag(ACTIVE, active);
    }

    pub fn scheduler(&self) -> Option<SchedulerFn> {
        self.scheduler.borrow().clone()
    }

    pub(crate) fn set_scheduler(&self, scheduler: Option<SchedulerFn>) {
        *self.scheduler.borrow_mut() = scheduler;
    }

    pub(crate) fn set_on_stop(&self, on_stop: Option<StopFn>) {
        *self.on_stop.borrow_mut() = on_stop;
    }

    pub fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn is_on_running_chain(self: &Rc<Self>) -> bool {
        let mut current = with_context(|ctx| ctx.get_active_effect());
        while let Some(effect) = current {
            if Rc::ptr_eq(&effect, self) {
                return true;
            }
            current = effect.parent.borrow().clone();
        }
        false
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Run the effect function, collecting its dependencies.
    ///
    /// A stopped effect just calls its function. An effect that is already
    /// running somewhere up the chain returns immediately.
    pub fn run(self: &Rc<Self>) {
        if self.is_active() && self.is_on_running_chain() {
            return;
        }
        let Some(func) = self.func.borrow_mut().take() else {
            return;
        };

        // Puts the function back, even on panic (declared first, dropped last)
        let mut slot = FuncSlot {
            effect: self,
            func: Some(func),
        };

        if !self.is_active() {
            if let Some(f) = slot.func.as_mut() {
                f();
            }
            return;
        }

        let _run = RunGuard::enter(self);
        if let Some(f) = slot.func.as_mut() {
            f();
        }
    }

    // =========================================================================
    // STOP
    // =========================================================================

    /// Unsubscribe from every dep and become a plain function. Idempotent.
    /// Called from inside its own run, the stop happens when the run ends.
    pub fn stop(self: &Rc<Self>) {
        let is_current = with_context(|ctx| {
            ctx.active_effect
                .borrow()
                .as_ref()
                .is_some_and(|active| Rc::ptr_eq(active, self))
        });
        if is_current {
            self.set_flag(DEFER_STOP, true);
            return;
        }
        if self.is_active() {
            cleanup_effect(self);
            let on_stop = self.on_stop.borrow_mut().take();
            if let Some(on_stop) = on_stop {
                call_with_error_handling(ErrorCode::Effect, on_stop);
            }
            self.set_active(false);
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Unreachable effects stop: unsubscribe and run on_stop
        if self.flags.get() & ACTIVE != 0 {
            let deps = std::mem::take(self.deps.get_mut());
            for dep in &deps {
                dep.remove(self);
            }
            if let Some(on_stop) = self.on_stop.get_mut().take() {
                call_with_error_handling(ErrorCode::Effect, on_stop);
            }
        }
    }
}

impl fmt::Debug for EffectInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectInner")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("deps", &self.dep_count())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Remove the effect from every dep and forget them.
pub(crate) fn cleanup_effect(effect: &EffectInner) {
    let deps = std::mem::take(&mut *effect.deps.borrow_mut());
    for dep in &deps {
        dep.remove(effect);
    }
}

struct FuncSlot<'a> {
    effect: &'a Rc<EffectInner>,
    func: Option<EffectFn>,
}

impl Drop for FuncSlot<'_> {
    fn drop(&mut self) {
        if let Some(func) = self.func.take() {
            *self.effect.func.borrow_mut() = Some(func);
        }
    }
}

/// Context changes for one tracked run, undone on drop.
struct RunGuard {
    effect: Rc<EffectInner>,
    last_should_track: bool,
    bit: u32,
    marked: bool,
}

impl RunGuard {
    fn enter(effect: &Rc<EffectInner>) -> Self {
        let (parent, last_should_track, depth, bit) = with_context(|ctx| {
            let parent = ctx.set_active_effect(Some(effect.clone()));
            let last_should_track = ctx.set_should_track(true);
            let depth = ctx.enter_depth();
            (parent, last_should_track, depth, ctx.op_bit())
        });
        *effect.parent.borrow_mut() = parent;

        let marked = depth <= max_marker_bits();
        if marked {
            init_dep_markers(&effect.deps.borrow(), bit);
        } else {
            cleanup_effect(effect);
        }
        effect.set_flag(RUNNING, true);

        Self {
            effect: effect.clone(),
            last_should_track,
            bit,
            marked,
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.marked {
            finalize_dep_markers(&self.effect, self.bit);
        }
        let parent = self.effect.parent.borrow_mut().take();
        with_context(|ctx| {
            ctx.exit_depth();
            ctx.set_active_effect(parent);
            ctx.set_should_track(self.last_should_track);
        });
        self.effect.set_flag(RUNNING, false);

        if self.effect.flags.get() & DEFER_STOP != 0 {
            self.effect.set_flag(DEFER_STOP, false);
            self.effect.stop();
        }
    }
}

// =============================================================================
// EFFECT OPTIONS
// =============================================================================

/// Options of [`effect_with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Don't run on creation
    pub lazy: bool,
    /// Called on trigger instead of re-running
    pub scheduler: Option<SchedulerFn>,
    /// Scope to register with (defaults to the active scope)
    pub scope: Option<EffectScope>,
    /// Let the effect trigger itself while running
    pub allow_recurse: bool,
    pub on_stop: Option<StopFn>,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
    /// Diagnostic owner label
    pub owner: Option<Rc<str>>,
}

// =============================================================================
// PUBLIC HANDLE
// =============================================================================

/// Handle to an effect (the "runner" returned by [`effect`]).
///
/// Deps only hold effects weakly: the effect lives as long as a handle or
/// its scope does. Dropping the last owner stops it.
#[derive(Clone)]
pub struct ReactiveEffect {
    inner: Rc<EffectInner>,
}

impl ReactiveEffect {
    /// Create an effect without running it. It joins the active scope.
    pub fn new(f: impl FnMut() + 'static, scheduler: Option<SchedulerFn>) -> Self {
        let inner = EffectInner::new(Box::new(f), scheduler);
        record_effect_scope(&inner, None);
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Rc<EffectInner> {
        &self.inner
    }

    /// Run now, re-collecting dependencies.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Stop the effect. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn dep_count(&self) -> usize {
        self.inner.dep_count()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &ReactiveEffect) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// The handle returned by [`effect`].
pub type EffectRunner = ReactiveEffect;

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect that runs `f` now and again synchronously whenever
/// anything it read changes.
///
/// # Example
///
/// ```
/// use spark_weave::{effect, reactive, Target};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = reactive(Target::record_from([("count", 0)])).into_proxy().unwrap();
/// let seen = Rc::new(Cell::new(0.0));
///
/// let _runner = effect({
///     let (state, seen) = (state.clone(), seen.clone());
///     move || seen.set(state.get("count").as_number().unwrap())
/// });
///
/// state.set("count", 5);
/// assert_eq!(seen.get(), 5.0);
/// ```
pub fn effect(f: impl FnMut() + 'static) -> ReactiveEffect {
    effect_with_options(f, EffectOptions::default())
}

/// Create an effect with options (lazy, scheduler, scope, hooks).
pub fn effect_with_options(f: impl FnMut() + 'static, mut options: EffectOptions) -> ReactiveEffect {
    let inner = EffectInner::with_options(Box::new(f), &mut options);
    record_effect_scope(&inner, options.scope.as_ref());
    if !options.lazy {
        inner.run();
    }
    ReactiveEffect::from_inner(inner)
}

/// Stop an effect created by [`effect`].
pub fn stop(runner: &ReactiveEffect) {
    runner.stop();
}

/// The effect currently collecting dependencies, if any.
pub fn active_effect() -> Option<ReactiveEffect> {
    with_context(|ctx| ctx.get_active_effect()).map(ReactiveEffect::from_inner)
}
