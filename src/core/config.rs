// ============================================================================
// spark-weave - Runtime Configuration
// Tunable limits of the reactive core, stored per thread
// ============================================================================

use std::cell::RefCell;

use super::constants::{MAX_MARKER_BITS, RECURSION_LIMIT};

/// Tunable limits of the reactive core.
///
/// Both values keep their role (fallback threshold and loop breaker) but
/// are not load-bearing: tests lower them to exercise the fallback paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactivityConfig {
    /// Effect nesting depth up to which deps are diffed with bit markers.
    /// Capped at 30 so the marker bit fits a `u32`.
    pub max_marker_bits: u32,
    /// Runs allowed per scheduler job per flush before it is skipped.
    pub recursion_limit: u32,
}

impl Default for ReactivityConfig {
    fn default() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
            recursion_limit: RECURSION_LIMIT,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<ReactivityConfig> = RefCell::new(ReactivityConfig::default());
}

/// Snapshot of the current thread's configuration.
pub fn config() -> ReactivityConfig {
    CONFIG.with(|c| c.borrow().clone())
}

/// Update the current thread's configuration.
///
/// # Example
///
/// ```
/// use spark_weave::core::config::{config, configure};
///
/// configure(|c| c.recursion_limit = 10);
/// assert_eq!(config().recursion_limit, 10);
/// ```
pub fn configure(f: impl FnOnce(&mut ReactivityConfig)) {
    CONFIG.with(|c| {
        let mut cfg = c.borrow_mut();
        f(&mut cfg);
        cfg.max_marker_bits = cfg.max_marker_bits.min(MAX_MARKER_BITS);
    });
}

pub(crate) fn max_marker_bits() -> u32 {
    CONFIG.with(|c| c.borrow().max_marker_bits)
}

pub(crate) fn recursion_limit() -> u32 {
    CONFIG.with(|c| c.borrow().recursion_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_bits_are_capped() {
        configure(|c| c.max_marker_bits = 64);
        assert_eq!(config().max_marker_bits, MAX_MARKER_BITS);
        configure(|c| *c = ReactivityConfig::default());
    }
}
