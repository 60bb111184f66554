// ============================================================================
// spark-weave - Ergonomic Macros
// ============================================================================

/// Clone variables into a move closure.
///
/// Saves cloning each `Ref` or `Rc` by hand before moving it into a
/// closure.
///
/// # Usage
///
/// ```rust
/// use spark_weave::{cloned, computed, reference};
///
/// let a = reference(1);
/// let b = reference(2);
///
/// let sum = computed(cloned!(a, b => move || {
///     a.get().as_number().unwrap_or_default() + b.get().as_number().unwrap_or_default()
/// }));
/// assert_eq!(sum.get(), 3.into());
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a computed value with automatic variable capturing.
///
/// Wraps `computed(cloned!(... => move || ...))`.
///
/// ```rust
/// use spark_weave::{computed, reference, Value};
///
/// let count = reference(2);
/// let doubled = computed!(count => count.get().as_number().unwrap_or_default() * 2.0);
/// assert_eq!(doubled.get(), Value::from(4));
/// ```
#[macro_export]
macro_rules! computed {
    ($($deps:ident),+ => $body:expr) => {
        $crate::computed($crate::cloned!($($deps),+ => move || $body))
    };
    ($body:expr) => {
        $crate::computed(move || $body)
    };
}

/// Create an effect with automatic variable capturing.
///
/// Wraps `effect(cloned!(... => move || ...))`. Keep the returned runner:
/// dropping it stops the effect unless a scope owns it.
///
/// ```rust
/// use spark_weave::{effect, reference};
///
/// let count = reference(0);
/// let _runner = effect!(count => {
///     println!("count is {:?}", count.get());
/// });
/// count.set(1);
/// ```
#[macro_export]
macro_rules! effect {
    ($($deps:ident),+ => $body:expr) => {
        $crate::effect($crate::cloned!($($deps),+ => move || { $body; }))
    };
    ($body:expr) => {
        $crate::effect(move || { $body; })
    };
}

/// Build a plain record `Target` from `key => value` pairs.
///
/// ```rust
/// use spark_weave::{reactive, record, Value};
///
/// let state = reactive(record! { "name" => "weave", "count" => 1 });
/// let proxy = state.as_proxy().cloned();
/// assert_eq!(proxy.map(|p| p.get("count")), Some(Value::from(1)));
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Target::record()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Target::record_from([$(($key, $crate::Value::from($value))),+])
    };
}
