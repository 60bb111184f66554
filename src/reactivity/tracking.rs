// ============================================================================
// spark-weave - Dependency Tracking
// track() on reads, trigger() on writes, and tracking suspension
// ============================================================================
//
// Every target owns a key -> Dep table (see `TargetInner::deps`), so the
// registry needs no global map and is freed together with the target.
// Borrows of the dep table are released before any effect runs, using the
// "collect-then-mutate" pattern: affected deps are gathered first, their
// subscribers merged into one deduplicated batch, then the batch runs.
// ============================================================================

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::core::config::max_marker_bits;
use crate::core::context::with_context;
use crate::core::types::{Target, TargetKind, TrackKey, TrackOpTypes, TriggerOpTypes, Value};
use crate::primitives::effect::{DebuggerEvent, DebuggerOp, EffectInner};
use crate::reactivity::dep::Dep;

// =============================================================================
// TRACK - Subscribe the active effect on read
// =============================================================================

/// Subscribe the running effect to `(target, key)`.
///
/// No-op when no effect is running or tracking is paused.
pub fn track(target: &Target, op: TrackOpTypes, key: TrackKey) {
    let Some(effect) = active_tracking_effect() else {
        return;
    };

    let dep = target
        .inner
        .deps
        .borrow_mut()
        .entry(key.clone())
        .or_default()
        .clone();

    track_effects(&effect, &dep, || DebuggerEvent {
        effect_id: effect.id,
        target: Some(target.clone()),
        op: DebuggerOp::Track(op),
        key: Some(key),
        new_value: None,
        old_value: None,
    });
}

/// Subscribe the running effect to a standalone dep (refs, computeds).
pub fn track_dep(dep: &Dep) {
    if let Some(effect) = active_tracking_effect() {
        track_effects(&effect, dep, || DebuggerEvent {
            effect_id: effect.id,
            target: None,
            op: DebuggerOp::Track(TrackOpTypes::Get),
            key: None,
            new_value: None,
            old_value: None,
        });
    }
}

fn active_tracking_effect() -> Option<Rc<EffectInner>> {
    with_context(|ctx| {
        if ctx.should_track.get() {
            ctx.get_active_effect()
        } else {
            None
        }
    })
}

/// Record that `effect` read `dep` during its current run.
///
/// Within the marker depth this is O(1): the "newly tracked" bit dedupes
/// repeated reads and the "was tracked" bit skips re-subscribing to a dep
/// the effect already holds. Beyond it, membership is checked directly.
pub(crate) fn track_effects(
    effect: &Rc<EffectInner>,
    dep: &Dep,
    event: impl FnOnce() -> DebuggerEvent,
) {
    let (depth, bit) = with_context(|ctx| (ctx.depth(), ctx.op_bit()));

    let should_track = if depth <= max_marker_bits() {
        if dep.new_tracked(bit) {
            false
        } else {
            dep.mark_new_tracked(bit);
            !dep.was_tracked(bit)
        }
    } else {
        !dep.contains(effect)
    };

    if should_track {
        dep.add(effect);
        effect.deps.borrow_mut().push(dep.clone());
        if let Some(hook) = effect.on_track.clone() {
            hook(&event());
        }
    }
}

// =============================================================================
// TRIGGER - Notify subscribers on write
// =============================================================================

/// Notify every effect affected by a mutation of `(target, key)`.
///
/// Fan-out rules:
/// - `Clear` reaches every dep of the target
/// - writing an array's `length` reaches `length` and every index at or
///   past the new length
/// - `Add` also reaches the iterate dep (records, collections) or the
///   `length` dep (array index)
/// - `Delete` also reaches the iterate dep of non-arrays
/// - `Set` on a map also reaches the iterate dep
pub fn trigger(
    target: &Target,
    op: TriggerOpTypes,
    key: Option<TrackKey>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    let kind = target.kind();
    let deps: SmallVec<[Dep; 4]> = {
        let deps_map = target.inner.deps.borrow();
        if deps_map.is_empty() {
            return;
        }

        let get = |k: &TrackKey| deps_map.get(k).cloned();
        let mut deps = SmallVec::new();

        if op == TriggerOpTypes::Clear {
            for dep in deps_map.values() {
                deps.push(dep.clone());
            }
        } else if key == Some(TrackKey::Length) && kind == TargetKind::Array {
            let new_length = new_value.and_then(Value::as_number).unwrap_or(0.0) as usize;
            for (k, dep) in deps_map.iter() {
                match k {
                    TrackKey::Length => deps.push(dep.clone()),
                    TrackKey::Index(i) if *i >= new_length => deps.push(dep.clone()),
                    _ => {}
                }
            }
        } else {
            if let Some(k) = &key {
                deps.extend(get(k));
            }
            match op {
                TriggerOpTypes::Add => {
                    if kind != TargetKind::Array {
                        deps.extend(get(&TrackKey::Iterate));
                        if kind.is_map_like() {
                            deps.extend(get(&TrackKey::MapKeyIterate));
                        }
                    } else if matches!(key, Some(TrackKey::Index(_))) {
                        deps.extend(get(&TrackKey::Length));
                    }
                }
                TriggerOpTypes::Delete => {
                    if kind != TargetKind::Array {
                        deps.extend(get(&TrackKey::Iterate));
                        if kind.is_map_like() {
                            deps.extend(get(&TrackKey::MapKeyIterate));
                        }
                    }
                }
                TriggerOpTypes::Set => {
                    if kind.is_map_like() {
                        deps.extend(get(&TrackKey::Iterate));
                    }
                }
                TriggerOpTypes::Clear => {}
            }
        }
        deps
    };

    let effects = merge_subscribers(&deps);
    if effects.is_empty() {
        return;
    }

    let event = |effect: &EffectInner| DebuggerEvent {
        effect_id: effect.id,
        target: Some(target.clone()),
        op: DebuggerOp::Trigger(op),
        key: key.clone(),
        new_value: new_value.cloned(),
        old_value: old_value.cloned(),
    };
    trigger_effects(&effects, &event);
}

/// Notify every subscriber of a standalone dep (refs, computeds).
pub fn trigger_dep(dep: &Dep) {
    let effects = dep.effects();
    let event = |effect: &EffectInner| DebuggerEvent {
        effect_id: effect.id,
        target: None,
        op: DebuggerOp::Trigger(TriggerOpTypes::Set),
        key: None,
        new_value: None,
        old_value: None,
    };
    trigger_effects(&effects, &event);
}

/// Subscribers of several deps as one batch, each effect once.
fn merge_subscribers(deps: &[Dep]) -> Vec<Rc<EffectInner>> {
    if deps.len() == 1 {
        return deps[0].effects();
    }
    let mut seen = FxHashSet::default();
    let mut effects = Vec::new();
    for dep in deps {
        for effect in dep.effects() {
            if seen.insert(effect.id) {
                effects.push(effect);
            }
        }
    }
    effects
}

/// Run or schedule a batch. Computed effects go first so that plain effects
/// triggered in the same batch observe already-invalidated computeds.
fn trigger_effects(effects: &[Rc<EffectInner>], event: &dyn Fn(&EffectInner) -> DebuggerEvent) {
    for effect in effects.iter().filter(|e| e.is_computed()) {
        trigger_effect(effect, event);
    }
    for effect in effects.iter().filter(|e| !e.is_computed()) {
        trigger_effect(effect, event);
    }
}

fn trigger_effect(effect: &Rc<EffectInner>, event: &dyn Fn(&EffectInner) -> DebuggerEvent) {
    let is_active_effect = with_context(|ctx| {
        ctx.active_effect
            .borrow()
            .as_ref()
            .is_some_and(|active| Rc::ptr_eq(active, effect))
    });
    if is_active_effect && !effect.allow_recurse() {
        return;
    }

    if let Some(hook) = effect.on_trigger.clone() {
        hook(&event(effect));
    }
    match effect.scheduler() {
        Some(scheduler) => scheduler(),
        None => effect.run(),
    }
}

// =============================================================================
// TRACKING SUSPENSION
// =============================================================================

/// Stop tracking reads until the matching `reset_tracking`.
pub fn pause_tracking() {
    with_context(|ctx| {
        let prev = ctx.set_should_track(false);
        ctx.track_stack.borrow_mut().push(prev);
    });
}

/// Force tracking on until the matching `reset_tracking`.
pub fn enable_tracking() {
    with_context(|ctx| {
        let prev = ctx.set_should_track(true);
        ctx.track_stack.borrow_mut().push(prev);
    });
}

/// Restore the tracking state saved by the last pause/enable.
pub fn reset_tracking() {
    with_context(|ctx| {
        let last = ctx.track_stack.borrow_mut().pop();
        ctx.set_should_track(last.unwrap_or(true));
    });
}

/// Run `f` without tracking any reads.
///
/// # Example
///
/// ```
/// use spark_weave::{effect, reactive, untrack, Target};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let state = reactive(Target::record_from([("a", 1), ("b", 1)])).into_proxy().unwrap();
/// let runs = Rc::new(Cell::new(0));
///
/// let _e = effect({
///     let (state, runs) = (state.clone(), runs.clone());
///     move || {
///         state.get("a");
///         untrack(|| state.get("b"));
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// state.set("b", 2);
/// assert_eq!(runs.get(), 1);
/// state.set("a", 2);
/// assert_eq!(runs.get(), 2);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    pause_tracking();

    // Restore even if `f` panics
    struct UntrackGuard;

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            reset_tracking();
        }
    }

    let _guard = UntrackGuard;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::is_tracking;

    #[test]
    fn nested_pause_and_enable_restore_in_order() {
        pause_tracking();
        enable_tracking();
        assert!(with_context(|ctx| ctx.should_track.get()));
        reset_tracking();
        assert!(!with_context(|ctx| ctx.should_track.get()));
        reset_tracking();
        assert!(with_context(|ctx| ctx.should_track.get()));
    }

    #[test]
    fn untrack_restores_after_panic() {
        let result = std::panic::catch_unwind(|| untrack(|| panic!("inside")));
        assert!(result.is_err());
        assert!(with_context(|ctx| ctx.should_track.get()));
        assert!(!is_tracking());
    }

    #[test]
    fn trigger_without_deps_is_noop() {
        let t = Target::record();
        trigger(&t, TriggerOpTypes::Add, Some(TrackKey::prop("x")), None, None);
    }
}
