// ============================================================================
// spark-weave - Watchers
// watch / watch_effect on top of effects and the job scheduler
// ============================================================================
//
// A watcher is an effect whose scheduler queues a job instead of re-running
// it. The flush mode picks the queue: `Pre` runs before main jobs, `Post`
// after them, `Sync` runs the job inline on trigger. With a callback, the
// job re-runs the getter and calls back when the value changed (always for
// deep or forced sources). Getter, callback and cleanup panics are caught
// and reported with their own error codes.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;

use crate::core::error_handling::{call_with_error_handling, warn, ErrorCode};
use crate::core::types::{AnyRef, Target, Value};
use crate::primitives::effect::{EffectInner, ReactiveEffect, SchedulerFn};
use crate::proxy::reactive::{is_reactive, is_shallow, Reactive};
use crate::reactivity::equality::has_changed;
use crate::reactivity::scheduling::{queue_post_flush_cb, queue_pre_flush_cb, SchedulerJob};

// =============================================================================
// SOURCES AND OPTIONS
// =============================================================================

pub type WatchGetter = Rc<dyn Fn() -> Value>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A ref; shallow refs fire on every trigger
    Ref(AnyRef),
    /// A reactive wrapper, watched deeply
    Reactive(Reactive),
    /// A getter run inside the watcher's effect
    Getter(WatchGetter),
    /// Several sources; the callback receives arrays of values
    Multi(Vec<WatchSource>),
    /// Anything else; reported and never fires
    Invalid(Value),
}

impl WatchSource {
    pub fn getter<V: Into<Value>>(f: impl Fn() -> V + 'static) -> Self {
        WatchSource::Getter(Rc::new(move || f().into()))
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Ref(r) => WatchSource::Ref(r),
            Value::Proxy(p) => WatchSource::Reactive(p),
            other => WatchSource::Invalid(other),
        }
    }
}

impl From<AnyRef> for WatchSource {
    fn from(r: AnyRef) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&AnyRef> for WatchSource {
    fn from(r: &AnyRef) -> Self {
        WatchSource::Ref(r.clone())
    }
}

impl From<Reactive> for WatchSource {
    fn from(p: Reactive) -> Self {
        WatchSource::Reactive(p)
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSource::Multi(sources)
    }
}

/// When a triggered watcher runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushMode {
    #[default]
    Pre,
    Post,
    Sync,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
    /// Call back once right away with an undefined old value
    pub immediate: bool,
    /// Traverse the source so nested changes fire
    pub deep: bool,
    pub flush: FlushMode,
}

// =============================================================================
// CLEANUP REGISTRATION
// =============================================================================

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Passed to watcher callbacks to register a cleanup that runs before the
/// next callback and when the watcher stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: CleanupSlot,
}

impl OnCleanup {
    pub fn register(&self, f: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }

    fn run(&self) {
        let cleanup = self.slot.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            call_with_error_handling(ErrorCode::WatchCleanup, cleanup);
        }
    }
}

/// Handle of a running watcher. Dropping the last handle of a watcher that
/// no scope owns stops it.
#[derive(Clone, Debug)]
pub struct WatchHandle {
    effect: ReactiveEffect,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Read every nested value of `value` so the running effect depends on all
/// of them.
pub fn traverse(value: &Value) {
    let mut seen = FxHashSet::default();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut FxHashSet<usize>) {
    match value {
        Value::Ref(r) => {
            if seen.insert(r.id()) {
                traverse_inner(&r.get(), seen);
            }
        }
        Value::Proxy(p) => {
            let target = p.raw_target();
            if target.is_skipped() || !seen.insert(target.id()) {
                return;
            }
            if p.is_collection() {
                for (_, v) in p.entries() {
                    traverse_inner(&v, seen);
                }
            } else {
                for key in p.own_keys() {
                    traverse_inner(&p.get(key), seen);
                }
            }
        }
        Value::Object(target) => {
            if target.is_skipped() || !seen.insert(target.id()) {
                return;
            }
            traverse_raw(target, seen);
        }
        _ => {}
    }
}

fn traverse_raw(target: &Target, seen: &mut FxHashSet<usize>) {
    let children: Vec<Value> = if target.kind().is_collection() {
        target.collection_entries().into_iter().map(|(_, v)| v).collect()
    } else {
        target.prop_keys().iter().map(|k| target.get_prop(k)).collect()
    };
    for child in &children {
        traverse_inner(child, seen);
    }
}

// =============================================================================
// WATCH
// =============================================================================

type WatchCallback = Box<dyn FnMut(Value, Value, &OnCleanup)>;

fn source_getter(source: &WatchSource) -> WatchGetter {
    match source {
        WatchSource::Ref(r) => {
            let r = r.clone();
            Rc::new(move || r.get())
        }
        WatchSource::Reactive(p) => {
            let p = Value::Proxy(p.clone());
            Rc::new(move || p.clone())
        }
        WatchSource::Getter(f) => {
            let f = f.clone();
            Rc::new(move || call_with_error_handling(ErrorCode::WatchGetter, || f()).unwrap_or_default())
        }
        WatchSource::Multi(sources) => {
            let getters: Vec<WatchGetter> = sources
                .iter()
                .map(|s| {
                    let getter = source_getter(s);
                    if !matches!(s, WatchSource::Reactive(_)) {
                        return getter;
                    }
                    Rc::new(move || {
                        let value = getter();
                        traverse(&value);
                        value
                    }) as WatchGetter
                })
                .collect();
            Rc::new(move || Value::from(Target::array(getters.iter().map(|g| g()))))
        }
        WatchSource::Invalid(value) => {
            warn(format!(
                "Invalid watch source: {value:?} A watch source can only be a getter/effect \
                 function, a ref, a reactive object, or an array of these types."
            ));
            Rc::new(|| Value::Undefined)
        }
    }
}

fn forces_trigger(source: &WatchSource) -> bool {
    match source {
        WatchSource::Ref(r) => r.is_shallow(),
        WatchSource::Multi(sources) => sources.iter().any(|s| match s {
            WatchSource::Reactive(p) => {
                let v = Value::Proxy(p.clone());
                is_reactive(&v) || is_shallow(&v)
            }
            WatchSource::Ref(r) => r.is_shallow(),
            _ => false,
        }),
        _ => false,
    }
}

fn multi_changed(new: &Value, old: &Value) -> bool {
    let items = |v: &Value| v.as_target().map(Target::array_snapshot).unwrap_or_default();
    let (new, old) = (items(new), items(old));
    new.iter()
        .enumerate()
        .any(|(i, v)| has_changed(v, old.get(i).unwrap_or(&Value::Undefined)))
}

/// The watcher effect (joined to the active scope) and the cell its runs
/// store the getter result in. Stopping it runs the pending cleanup.
fn create_watcher(getter: WatchGetter, on_cleanup: &OnCleanup) -> (Rc<EffectInner>, Rc<RefCell<Value>>) {
    let latest = Rc::new(RefCell::new(Value::Undefined));
    let run = {
        let latest = latest.clone();
        move || {
            let value = getter();
            *latest.borrow_mut() = value;
        }
    };
    let effect = ReactiveEffect::new(run, None);
    let inner = effect.inner().clone();
    let cleanup = on_cleanup.clone();
    inner.set_on_stop(Some(Box::new(move || cleanup.run())));
    (inner, latest)
}

fn install_scheduler(effect: &Rc<EffectInner>, job: SchedulerJob, flush: FlushMode) {
    let scheduler: SchedulerFn = match flush {
        FlushMode::Sync => Rc::new(move || job.run()),
        FlushMode::Post => Rc::new(move || queue_post_flush_cb(&job)),
        FlushMode::Pre => Rc::new(move || queue_pre_flush_cb(&job)),
    };
    effect.set_scheduler(Some(scheduler));
}

/// Watch `source` and call `cb(new, old, on_cleanup)` when it changes.
///
/// # Example
///
/// ```
/// use spark_weave::{reference, tick, watch, Value, WatchOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = reference(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let _w = watch(&count, {
///     let seen = seen.clone();
///     move |new: Value, old: Value, _| seen.borrow_mut().push((new, old))
/// }, WatchOptions::default());
///
/// count.set(1);
/// assert!(seen.borrow().is_empty());
/// tick();
/// assert_eq!(*seen.borrow(), vec![(Value::from(1), Value::from(0))]);
/// ```
pub fn watch(
    source: impl Into<WatchSource>,
    cb: impl FnMut(Value, Value, &OnCleanup) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let source = source.into();
    let is_multi = matches!(source, WatchSource::Multi(_));
    let deep = options.deep || matches!(source, WatchSource::Reactive(_));
    let force = forces_trigger(&source);

    let base = source_getter(&source);
    let getter: WatchGetter = if deep {
        Rc::new(move || {
            let value = base();
            traverse(&value);
            value
        })
    } else {
        base
    };

    let on_cleanup = OnCleanup::default();
    let (effect, latest) = create_watcher(getter, &on_cleanup);

    // None until the first run; multi sources start from an empty array
    let old_value: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(if is_multi {
        Some(Value::from(Target::array(Vec::<Value>::new())))
    } else {
        None
    }));
    let cb: Rc<RefCell<WatchCallback>> = Rc::new(RefCell::new(Box::new(cb)));

    let weak: Weak<EffectInner> = Rc::downgrade(&effect);
    let job = SchedulerJob::new({
        let (latest, old_value, on_cleanup) = (latest.clone(), old_value.clone(), on_cleanup.clone());
        move || {
            let Some(effect) = weak.upgrade() else {
                return;
            };
            if !effect.is_active() {
                return;
            }
            effect.run();
            let new_value = latest.borrow().clone();
            let changed = match &*old_value.borrow() {
                None => true,
                Some(old) if is_multi => multi_changed(&new_value, old),
                Some(old) => has_changed(&new_value, old),
            };
            if !(deep || force || changed) {
                return;
            }
            on_cleanup.run();
            let old = old_value.borrow().clone().unwrap_or_default();
            // a sync watcher re-triggered from its own callback is skipped
            if let Ok(mut cb) = cb.try_borrow_mut() {
                let cb = &mut **cb;
                let on_cleanup = &on_cleanup;
                call_with_error_handling(ErrorCode::WatchCallback, || {
                    cb(new_value.clone(), old, on_cleanup)
                });
            }
            *old_value.borrow_mut() = Some(new_value);
        }
    });
    job.set_allow_recurse(true);
    install_scheduler(&effect, job.clone(), options.flush);

    if options.immediate {
        job.run();
    } else {
        effect.run();
        *old_value.borrow_mut() = Some(latest.borrow().clone());
    }

    tracing::trace!(target: "spark_weave", effect = effect.id, flush = ?options.flush, "watcher created");
    WatchHandle {
        effect: ReactiveEffect::from_inner(effect),
    }
}

// =============================================================================
// WATCH EFFECT
// =============================================================================

fn do_watch_effect(f: impl FnMut(&OnCleanup) + 'static, flush: FlushMode) -> WatchHandle {
    let on_cleanup = OnCleanup::default();
    let f = Rc::new(RefCell::new(f));
    let getter: WatchGetter = {
        let on_cleanup = on_cleanup.clone();
        Rc::new(move || {
            on_cleanup.run();
            if let Ok(mut f) = f.try_borrow_mut() {
                let f = &mut *f;
                call_with_error_handling(ErrorCode::WatchCallback, || f(&on_cleanup));
            }
            Value::Undefined
        })
    };
    let (effect, _latest) = create_watcher(getter, &on_cleanup);

    let weak: Weak<EffectInner> = Rc::downgrade(&effect);
    let job = SchedulerJob::new(move || {
        if let Some(effect) = weak.upgrade() {
            if effect.is_active() {
                effect.run();
            }
        }
    });
    install_scheduler(&effect, job.clone(), flush);

    if flush == FlushMode::Post {
        queue_post_flush_cb(&job);
    } else {
        effect.run();
    }
    WatchHandle {
        effect: ReactiveEffect::from_inner(effect),
    }
}

/// Run `f` now and again (before the next flush) whenever what it read
/// changes.
pub fn watch_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    do_watch_effect(f, FlushMode::Pre)
}

/// Like [`watch_effect`], first run and re-runs after the flush.
pub fn watch_post_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    do_watch_effect(f, FlushMode::Post)
}

/// Like [`watch_effect`], re-running synchronously on every trigger.
pub fn watch_sync_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    do_watch_effect(f, FlushMode::Sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_handling::{set_error_handler, set_warn_handler, ReactivityError};
    use crate::primitives::computed::computed;
    use crate::primitives::reference::{reference, shallow_ref};
    use crate::primitives::scope::effect_scope;
    use crate::proxy::reactive::reactive;
    use crate::reactivity::scheduling::tick;
    use std::cell::Cell;

    fn num(v: &Value) -> f64 {
        v.as_number().unwrap_or(f64::NAN)
    }

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl FnMut(Value, Value, &OnCleanup) + 'static) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |new: Value, old: Value, _: &OnCleanup| sink.borrow_mut().push((new, old)))
    }

    // =========================================================================
    // watch
    // =========================================================================

    #[test]
    fn watch_ref_batches_until_tick() {
        let r = reference(0);
        let (calls, cb) = recorder();
        let _w = watch(&r, cb, WatchOptions::default());
        r.set(1);
        r.set(2);
        assert!(calls.borrow().is_empty());
        tick();
        assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(0))]);
    }

    #[test]
    fn watch_getter_skips_unchanged_values() {
        let r = reference(1);
        let (calls, cb) = recorder();
        let _w = watch(
            WatchSource::getter({
                let r = r.clone();
                move || num(&r.get()) > 0.0
            }),
            cb,
            WatchOptions::default(),
        );
        r.set(2);
        tick();
        assert!(calls.borrow().is_empty());
        r.set(-1);
        tick();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn immediate_calls_back_with_undefined_old_value() {
        let r = reference("a");
        let (calls, cb) = recorder();
        let _w = watch(
            &r,
            cb,
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );
        assert_eq!(*calls.borrow(), vec![(Value::from("a"), Value::Undefined)]);
    }

    #[test]
    fn reactive_source_is_deep() {
        let state = reactive(Target::record_from([("nested", Target::record_from([("n", 0)]))]));
        let (calls, cb) = recorder();
        let _w = watch(state.clone(), cb, WatchOptions::default());
        let nested = state.as_proxy().unwrap().get("nested");
        nested.as_proxy().unwrap().set("n", 1);
        tick();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn deep_option_traverses_getter_result() {
        let state = reactive(Target::record_from([("list", Target::array([1]))]));
        let (calls, cb) = recorder();
        let _w = watch(
            WatchSource::getter({
                let state = state.clone();
                move || state.as_proxy().map(|p| p.get("list")).unwrap_or_default()
            }),
            cb,
            WatchOptions {
                deep: true,
                ..Default::default()
            },
        );
        let list = state.as_proxy().unwrap().get("list");
        list.as_proxy().unwrap().push([2]);
        tick();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn multi_source_compares_each_entry() {
        let a = reference(1);
        let b = reference(2);
        let (calls, cb) = recorder();
        let _w = watch(
            vec![WatchSource::from(&a), WatchSource::from(&b)],
            cb,
            WatchOptions::default(),
        );
        b.set(3);
        tick();
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        let new = calls[0].0.as_target().map(Target::array_snapshot).unwrap_or_default();
        assert_eq!(new, vec![Value::from(1), Value::from(3)]);
    }

    #[test]
    fn shallow_ref_source_fires_on_trigger_ref() {
        let raw = Target::record();
        let r = shallow_ref(&raw);
        let (calls, cb) = recorder();
        let _w = watch(&r, cb, WatchOptions::default());
        r.trigger();
        tick();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn sync_flush_calls_back_inline() {
        let r = reference(0);
        let (calls, cb) = recorder();
        let _w = watch(
            &r,
            cb,
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );
        r.set(1);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let r = reference(0);
        let cleanups = Rc::new(Cell::new(0));
        let w = watch(
            &r,
            {
                let cleanups = cleanups.clone();
                move |_, _, on_cleanup: &OnCleanup| {
                    let cleanups = cleanups.clone();
                    on_cleanup.register(move || cleanups.set(cleanups.get() + 1));
                }
            },
            WatchOptions::default(),
        );
        r.set(1);
        tick();
        assert_eq!(cleanups.get(), 0);
        r.set(2);
        tick();
        assert_eq!(cleanups.get(), 1);
        w.stop();
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn stopped_watcher_never_fires() {
        let r = reference(0);
        let (calls, cb) = recorder();
        let w = watch(&r, cb, WatchOptions::default());
        r.set(1);
        w.stop();
        tick();
        assert!(calls.borrow().is_empty());
        assert!(!w.is_active());
    }

    #[test]
    fn watch_computed_source() {
        let r = reference(1);
        let double = computed({
            let r = r.clone();
            move || num(&r.get()) * 2.0
        });
        let (calls, cb) = recorder();
        let _w = watch(double.to_any_ref(), cb, WatchOptions::default());
        r.set(2);
        tick();
        assert_eq!(*calls.borrow(), vec![(Value::from(4.0), Value::from(2.0))]);
    }

    #[test]
    fn invalid_source_warns() {
        let warned = Rc::new(Cell::new(false));
        let prev = set_warn_handler(Some(Rc::new({
            let warned = warned.clone();
            move |m: &str| warned.set(m.starts_with("Invalid watch source"))
        })));
        let (calls, cb) = recorder();
        let _w = watch(Value::from(1), cb, WatchOptions::default());
        assert!(warned.get());
        assert!(calls.borrow().is_empty());
        set_warn_handler(prev);
    }

    #[test]
    fn callback_panic_is_reported() {
        let codes = Rc::new(RefCell::new(Vec::new()));
        let prev = set_error_handler(Some(Rc::new({
            let codes = codes.clone();
            move |e: &ReactivityError| codes.borrow_mut().push(e.code)
        })));
        let r = reference(0);
        let _w = watch(&r, |_, _, _: &OnCleanup| panic!("callback failed"), WatchOptions::default());
        r.set(1);
        tick();
        assert_eq!(*codes.borrow(), vec![ErrorCode::WatchCallback]);
        set_error_handler(prev);
    }

    // =========================================================================
    // watch_effect
    // =========================================================================

    #[test]
    fn watch_effect_runs_now_and_batches() {
        let a = reference(0);
        let b = reference(0);
        let runs = Rc::new(Cell::new(0));
        let _w = watch_effect({
            let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
            move |_| {
                a.get();
                b.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);
        a.set(1);
        b.set(1);
        assert_eq!(runs.get(), 1);
        tick();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn watch_post_effect_waits_for_flush() {
        let r = reference(0);
        let runs = Rc::new(Cell::new(0));
        let _w = watch_post_effect({
            let (r, runs) = (r.clone(), runs.clone());
            move |_| {
                r.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 0);
        tick();
        assert_eq!(runs.get(), 1);
        r.set(1);
        tick();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn watch_sync_effect_reruns_inline() {
        let r = reference(0);
        let seen = Rc::new(Cell::new(0.0));
        let _w = watch_sync_effect({
            let (r, seen) = (r.clone(), seen.clone());
            move |_| seen.set(num(&r.get()))
        });
        r.set(3);
        assert_eq!(seen.get(), 3.0);
    }

    #[test]
    fn watch_effect_stops_with_scope() {
        let r = reference(0);
        let runs = Rc::new(Cell::new(0));
        let scope = effect_scope(false);
        scope.run(|| {
            watch_effect({
                let (r, runs) = (r.clone(), runs.clone());
                move |_| {
                    r.get();
                    runs.set(runs.get() + 1);
                }
            })
        });
        scope.stop();
        r.set(1);
        tick();
        assert_eq!(runs.get(), 1);
    }
}
