// ============================================================================
// spark-weave - Reactive Wrappers
// Tracked views over records, arrays and keyed collections
// ============================================================================
//
// A `Reactive` is an explicit wrapper around a `Target`. Its accessor
// methods do the bookkeeping a transparent proxy would do in its traps:
// reads call `track`, writes call `trigger`, nested composites are wrapped
// on first access and refs stored in records are unwrapped on read.
//
// - `reactive` wires the wrapper and its identity caches
// - `base_handlers` implements record and array access
// - `collection_handlers` implements map, set and weak collection access
// ============================================================================

pub mod base_handlers;
pub mod collection_handlers;
pub mod reactive;

pub use reactive::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, Reactive,
};
