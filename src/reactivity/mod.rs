// ============================================================================
// spark-weave - Reactivity Module
// Dependency sets, track/trigger, change detection and job scheduling
// ============================================================================

pub mod dep;
pub mod equality;
pub mod scheduling;
pub mod tracking;

// Re-export main tracking functions
pub use tracking::{
    enable_tracking, pause_tracking, reset_tracking, track, track_dep, trigger, trigger_dep,
    untrack,
};

// Re-export scheduling functions
pub use scheduling::{
    flush_post_flush_cbs, flush_pre_flush_cbs, has_pending_microtasks, invalidate_job,
    is_flush_pending, is_flushing, next_tick, queue_job, queue_microtask, queue_post_flush_cb,
    queue_post_flush_cbs, queue_pre_flush_cb, tick, SchedulerJob,
};

pub use dep::Dep;
pub use equality::{has_changed, same_value};
