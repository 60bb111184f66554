// ============================================================================
// spark-weave - Reactive Context
// Thread-local state for tracking the currently running effect
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::primitives::effect::EffectInner;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local reactive context holding the global state of dependency
/// collection: which effect is running, whether reads are tracked, and the
/// marker bit of the current nesting depth.
pub struct ReactiveContext {
    // =========================================================================
    // EFFECT TRACKING
    // =========================================================================
    /// Currently executing effect (reads subscribe it)
    pub active_effect: RefCell<Option<Rc<EffectInner>>>,

    /// Whether reads are currently tracked
    pub should_track: Cell<bool>,

    /// Saved `should_track` values of `pause_tracking`/`enable_tracking`
    pub track_stack: RefCell<Vec<bool>>,

    // =========================================================================
    // DEP MARKERS
    // =========================================================================
    /// Number of effects currently running inside one another
    pub effect_track_depth: Cell<u32>,

    /// Marker bit of the innermost running effect (`1 << depth`)
    pub track_op_bit: Cell<u32>,
}

impl ReactiveContext {
    /// Create a new reactive context with default values
    pub fn new() -> Self {
        Self {
            active_effect: RefCell::new(None),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            effect_track_depth: Cell::new(0),
            track_op_bit: Cell::new(1),
        }
    }

    // =========================================================================
    // EFFECT TRACKING
    // =========================================================================

    /// Set the active effect, returning the previous one
    pub fn set_active_effect(&self, effect: Option<Rc<EffectInner>>) -> Option<Rc<EffectInner>> {
        self.active_effect.replace(effect)
    }

    /// Get the active effect
    pub fn get_active_effect(&self) -> Option<Rc<EffectInner>> {
        self.active_effect.borrow().clone()
    }

    /// Set tracking enablement, returning the previous value
    pub fn set_should_track(&self, value: bool) -> bool {
        self.should_track.replace(value)
    }

    /// True when a read right now would subscribe the active effect
    pub fn is_tracking(&self) -> bool {
        self.should_track.get() && self.active_effect.borrow().is_some()
    }

    // =========================================================================
    // DEP MARKERS
    // =========================================================================

    /// Enter one nesting level, returning the new depth
    pub fn enter_depth(&self) -> u32 {
        let depth = self.effect_track_depth.get() + 1;
        self.effect_track_depth.set(depth);
        self.track_op_bit.set(1u32.checked_shl(depth).unwrap_or(0));
        depth
    }

    /// Leave one nesting level, returning the new depth
    pub fn exit_depth(&self) -> u32 {
        let depth = self.effect_track_depth.get().saturating_sub(1);
        self.effect_track_depth.set(depth);
        self.track_op_bit.set(1u32.checked_shl(depth).unwrap_or(0));
        depth
    }

    pub fn depth(&self) -> u32 {
        self.effect_track_depth.get()
    }

    pub fn op_bit(&self) -> u32 {
        self.track_op_bit.get()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local reactive context
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
///
/// # Example
///
/// ```ignore
/// let tracking = with_context(|ctx| ctx.is_tracking());
/// ```
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Check if a read right now would be tracked.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.is_tracking())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_selects_marker_bit() {
        let ctx = ReactiveContext::new();
        assert_eq!(ctx.op_bit(), 1);
        assert_eq!(ctx.enter_depth(), 1);
        assert_eq!(ctx.op_bit(), 2);
        ctx.enter_depth();
        assert_eq!(ctx.op_bit(), 4);
        ctx.exit_depth();
        ctx.exit_depth();
        assert_eq!(ctx.op_bit(), 1);
    }

    #[test]
    fn not_tracking_without_effect() {
        let ctx = ReactiveContext::new();
        assert!(!ctx.is_tracking());
        ctx.set_should_track(false);
        assert!(!ctx.is_tracking());
    }
}
