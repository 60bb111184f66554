// ============================================================================
// spark-weave - Primitives Module
// Effects, scopes, refs, computeds and watchers
// ============================================================================

pub mod computed;
pub mod deferred;
pub mod effect;
pub mod reference;
pub mod scope;
pub mod watch;

// Re-export for convenience
pub use computed::{computed, computed_with_setter, ComputedRef, ComputedSetter};
pub use deferred::{deferred_computed, DeferredComputedRef};
pub use effect::{
    active_effect, effect, effect_with_options, stop, DebuggerEvent, DebuggerHook, DebuggerOp,
    EffectFn, EffectInner, EffectOptions, EffectRunner, ReactiveEffect, SchedulerFn, StopFn,
};
pub use reference::{
    custom_ref, is_ref, reference, shallow_ref, to_ref, to_ref_with_default, to_refs, trigger_ref,
    unref, CustomRefGetter, CustomRefSetter, Ref, RefTrackFn,
};
pub use scope::{
    effect_scope, get_current_scope, on_scope_dispose, EffectScope, ScopeCleanupFn,
};
pub use watch::{
    traverse, watch, watch_effect, watch_post_effect, watch_sync_effect, FlushMode, OnCleanup,
    WatchGetter, WatchHandle, WatchOptions, WatchSource,
};
