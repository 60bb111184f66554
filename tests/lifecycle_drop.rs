use spark_weave::{
    effect, effect_scope, effect_with_options, on_scope_dispose, reference, tick, watch, EffectOptions,
    OnCleanup, Value, WatchOptions,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_effect_drop_stops_and_runs_on_stop() {
    let runs = Rc::new(Cell::new(0));
    let stopped = Rc::new(Cell::new(false));
    let count = reference(0);

    {
        let runs_in = runs.clone();
        let stopped = stopped.clone();
        let count = count.clone();
        let _runner = effect_with_options(
            move || {
                count.get();
                runs_in.set(runs_in.get() + 1);
            },
            EffectOptions {
                on_stop: Some(Box::new(move || stopped.set(true))),
                ..EffectOptions::default()
            },
        );
        assert_eq!(runs.get(), 1);
        // _runner drops here; no scope owns the effect
    }

    assert!(stopped.get(), "dropping the last runner should stop the effect");
    count.set(1);
    assert_eq!(runs.get(), 1, "a dropped effect must not re-run");
}

#[test]
fn test_watch_handle_drop_stops_callbacks() {
    let count = reference(0);
    let calls = Rc::new(Cell::new(0));

    {
        let calls_in = calls.clone();
        let _handle = watch(
            &count,
            move |_new: Value, _old: Value, _cleanup: &OnCleanup| calls_in.set(calls_in.get() + 1),
            WatchOptions::default(),
        );
        count.set(1);
        tick();
        assert_eq!(calls.get(), 1);
    }

    count.set(2);
    tick();
    assert_eq!(calls.get(), 1, "watcher should stop when its handle drops");
}

#[test]
fn test_detached_scope_drop_disposes_effects_and_cleanups() {
    let count = reference(0);
    let runs = Rc::new(Cell::new(0));
    let order = Rc::new(RefCell::new(Vec::new()));

    {
        let scope = effect_scope(true);
        let (count, runs, order) = (count.clone(), runs.clone(), order.clone());
        scope.run(move || {
            // runner dropped right away; the scope keeps the effect alive
            effect(move || {
                count.get();
                runs.set(runs.get() + 1);
            });
            let first = order.clone();
            on_scope_dispose(move || first.borrow_mut().push("first"));
            on_scope_dispose(move || order.borrow_mut().push("second"));
        });
    }

    assert_eq!(runs.get(), 1);
    count.set(1);
    assert_eq!(runs.get(), 1, "scope drop should stop owned effects");
    assert_eq!(*order.borrow(), vec!["first", "second"]);
}

#[test]
fn test_child_scope_lives_with_its_parent() {
    let count = reference(0);
    let runs = Rc::new(Cell::new(0));
    let parent = effect_scope(false);

    {
        let (count, runs) = (count.clone(), runs.clone());
        parent.run(move || {
            let child = effect_scope(false);
            child.run(move || {
                effect(move || {
                    count.get();
                    runs.set(runs.get() + 1);
                });
            });
            // child handle drops here; the parent still owns the scope
        });
    }
    assert_eq!(parent.child_count(), 1);

    count.set(1);
    assert_eq!(runs.get(), 2, "child scope should survive its handle");

    parent.stop();
    count.set(2);
    assert_eq!(runs.get(), 2, "stopping the parent stops the child");
}
