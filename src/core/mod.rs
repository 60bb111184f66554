// ============================================================================
// spark-weave - Core Module
// Fundamental types, configuration, context and error reporting
// ============================================================================

pub mod config;
pub mod constants;
pub mod context;
pub mod error_handling;
pub mod types;

// Re-export commonly used items
pub use config::{config, configure, ReactivityConfig};
pub use constants::*;
pub use context::{is_tracking, with_context, ReactiveContext};
pub use error_handling::{
    call_with_error_handling, handle_error, set_error_handler, set_warn_handler, warn, ErrorCode,
    ErrorHandler, ReactivityError, WarnHandler,
};
pub use types::{
    number_to_key, AnyRef, FxIndexMap, RefLike, Target, TargetKind, TrackKey, TrackOpTypes,
    TriggerOpTypes, Value, ValueKey,
};
