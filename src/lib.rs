// ============================================================================
// spark-weave - Fine-Grained Reactivity and a Template Compiler Front End
// ============================================================================
//
// Two halves sharing one crate:
// - the reactive core: tracked wrappers, refs, computeds, effects, scopes,
//   watchers and a job scheduler driven by an explicit microtask queue
// - the template compiler: parser, transform pipeline and static hoisting,
//   producing an AST annotated with codegen nodes
// ============================================================================

pub mod compiler;
pub mod core;
pub mod macros;
pub mod primitives;
pub mod proxy;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::config::{config, configure, ReactivityConfig};
pub use crate::core::error_handling::{
    call_with_error_handling, set_error_handler, set_warn_handler, warn, ErrorCode, ReactivityError,
};
pub use crate::core::types::{AnyRef, Target, TargetKind, TrackOpTypes, TriggerOpTypes, Value};

// Re-export primitives at crate root (Vue-like API)
pub use primitives::computed::{computed, computed_with_setter, ComputedRef};
pub use primitives::deferred::{deferred_computed, DeferredComputedRef};
pub use primitives::effect::{effect, effect_with_options, stop, EffectOptions, ReactiveEffect};
pub use primitives::reference::{
    custom_ref, is_ref, reference, shallow_ref, to_ref, to_ref_with_default, to_refs, trigger_ref, unref, Ref,
};
pub use primitives::scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use primitives::watch::{
    watch, watch_effect, watch_post_effect, watch_sync_effect, FlushMode, OnCleanup, WatchHandle, WatchOptions,
    WatchSource,
};

// Re-export wrappers
pub use proxy::reactive::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly, shallow_reactive,
    shallow_readonly, to_raw, Reactive,
};

// Re-export reactivity functions
pub use reactivity::scheduling::{
    next_tick, queue_job, queue_post_flush_cb, queue_pre_flush_cb, tick, SchedulerJob,
};
pub use reactivity::tracking::{pause_tracking, reset_tracking, track, trigger, untrack};

// Re-export the compiler entry points
pub use compiler::{base_compile, base_parse, transform, CompileResult, CompilerError};
pub use compiler::ErrorCode as CompilerErrorCode;

// =============================================================================
// TESTS
// =============================================================================
