// ============================================================================
// spark-weave - Constants
// Flag constants for effects and default limits of the reactive core
// ============================================================================

// =============================================================================
// EFFECT FLAGS
// =============================================================================

/// Effect is subscribed and will be re-run when its deps change
pub const ACTIVE: u32 = 1 << 0;

/// Effect is currently executing its function
pub const RUNNING: u32 = 1 << 1;

/// Effect may trigger itself while running
pub const ALLOW_RECURSE: u32 = 1 << 2;

/// `stop()` was requested while the effect was running
pub const DEFER_STOP: u32 = 1 << 3;

/// Effect backs a computed value (triggered before plain effects)
pub const COMPUTED: u32 = 1 << 4;

// =============================================================================
// TARGET FLAGS
// =============================================================================

/// Target opted out of wrapping via `mark_raw`
pub const SKIP: u8 = 1 << 0;

/// Target no longer accepts new keys
pub const NON_EXTENSIBLE: u8 = 1 << 1;

// =============================================================================
// DEFAULT LIMITS
// =============================================================================

/// Deepest effect nesting that still uses bit markers for dep diffing.
/// Deeper runs fall back to a full cleanup before running.
pub const MAX_MARKER_BITS: u32 = 30;

/// Maximum runs of one scheduler job inside a single flush.
pub const RECURSION_LIMIT: u32 = 100;

/// Largest integer key an array treats as an index. Larger integers are
/// plain property names, as in `Array` exotic objects.
pub const MAX_ARRAY_INDEX: usize = 4_294_967_294;
