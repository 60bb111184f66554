// ============================================================================
// spark-weave - Error Handling
// Warning channel and the call wrapper every user callback runs through
// ============================================================================
//
// Misuse of the reactive API (wrapping a primitive, writing a readonly
// wrapper, watching something that cannot be watched) is reported through
// `warn` and then ignored. Panics raised by user code at the defined
// boundaries are caught by `call_with_error_handling`, tagged with an
// `ErrorCode` and handed to the installed error handler.
// =============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Call site classification of a caught user error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    WatchGetter,
    WatchCallback,
    WatchCleanup,
    Scheduler,
    ComputedGetter,
    Effect,
    ScopeCleanup,
}

impl ErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::WatchGetter => "watcher getter",
            ErrorCode::WatchCallback => "watcher callback",
            ErrorCode::WatchCleanup => "watcher cleanup function",
            ErrorCode::Scheduler => "scheduler flush",
            ErrorCode::ComputedGetter => "computed getter",
            ErrorCode::Effect => "effect",
            ErrorCode::ScopeCleanup => "effect scope cleanup",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A user error caught at a reactive boundary.
#[derive(Error, Debug, Clone)]
#[error("unhandled error during execution of {code}: {message}")]
pub struct ReactivityError {
    pub code: ErrorCode,
    pub message: String,
}

pub type ErrorHandler = Rc<dyn Fn(&ReactivityError)>;
pub type WarnHandler = Rc<dyn Fn(&str)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Install the handler for caught user errors, returning the previous one.
/// Without a handler, errors are logged at error level.
pub fn set_error_handler(handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
    ERROR_HANDLER.with(|h| h.replace(handler))
}

/// Install a warning observer, returning the previous one. Warnings are
/// always emitted as `tracing` events as well.
pub fn set_warn_handler(handler: Option<WarnHandler>) -> Option<WarnHandler> {
    WARN_HANDLER.with(|h| h.replace(handler))
}

/// Report API misuse. Never panics.
pub fn warn(message: impl AsRef<str>) {
    let message = message.as_ref();
    tracing::warn!(target: "spark_weave", "{message}");
    if let Some(handler) = WARN_HANDLER.with(|h| h.borrow().clone()) {
        handler(message);
    }
}

/// Route a caught error to the installed handler.
pub fn handle_error(error: ReactivityError) {
    match ERROR_HANDLER.with(|h| h.borrow().clone()) {
        Some(handler) => handler(&error),
        None => tracing::error!(target: "spark_weave", code = ?error.code, "{error}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run user code, catching a panic and reporting it under `code`.
///
/// Returns `None` when `f` panicked.
///
/// # Example
///
/// ```
/// use spark_weave::core::error_handling::{call_with_error_handling, ErrorCode};
///
/// assert_eq!(call_with_error_handling(ErrorCode::Scheduler, || 2 + 2), Some(4));
/// ```
pub fn call_with_error_handling<R>(code: ErrorCode, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            handle_error(ReactivityError {
                code,
                message: panic_message(payload.as_ref()),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn caught_panic_reaches_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let prev = set_error_handler(Some(Rc::new({
            let seen = seen.clone();
            move |e: &ReactivityError| seen.borrow_mut().push((e.code, e.message.clone()))
        })));

        let result: Option<()> = call_with_error_handling(ErrorCode::WatchCallback, || panic!("boom"));

        assert!(result.is_none());
        assert_eq!(*seen.borrow(), vec![(ErrorCode::WatchCallback, "boom".to_string())]);
        set_error_handler(prev);
    }

    #[test]
    fn warn_reaches_handler() {
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        let prev = set_warn_handler(Some(Rc::new({
            let seen = seen.clone();
            move |m: &str| seen.borrow_mut().push(m.to_string())
        })));
        warn("careful");
        assert_eq!(*seen.borrow(), vec!["careful".to_string()]);
        set_warn_handler(prev);
    }

    #[test]
    fn error_display_names_call_site() {
        let e = ReactivityError {
            code: ErrorCode::Scheduler,
            message: "x".into(),
        };
        assert_eq!(e.to_string(), "unhandled error during execution of scheduler flush: x");
    }
}
