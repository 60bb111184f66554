// ============================================================================
// spark-weave - Equality Functions
// Change detection for refs, wrappers and watchers
// ============================================================================

use crate::core::types::Value;

// =============================================================================
// SAME VALUE (Object.is)
// =============================================================================

/// `Object.is` equality: like strict equality except that NaN equals NaN and
/// +0 differs from -0. Composites compare by identity.
///
/// # Example
/// ```
/// use spark_weave::reactivity::equality::same_value;
/// use spark_weave::Value;
///
/// assert!(same_value(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
/// assert!(!same_value(&Value::Number(0.0), &Value::Number(-0.0)));
/// assert!(!same_value(&Value::from(1), &Value::from("1")));
/// ```
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        _ => a == b,
    }
}

/// Whether a write of `new` over `old` is an observable change.
///
/// # Example
/// ```
/// use spark_weave::reactivity::equality::has_changed;
/// use spark_weave::Value;
///
/// assert!(has_changed(&Value::from(1), &Value::from(2)));
/// assert!(!has_changed(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
/// ```
pub fn has_changed(new: &Value, old: &Value) -> bool {
    !same_value(new, old)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Target;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Undefined, Value::Undefined, true)]
    #[case(Value::Null, Value::Undefined, false)]
    #[case(Value::from("a"), Value::from("a"), true)]
    #[case(Value::from(true), Value::from(1), false)]
    #[case(Value::Number(0.0), Value::Number(0.0), true)]
    #[case(Value::Number(-0.0), Value::Number(0.0), false)]
    #[case(Value::Number(f64::NAN), Value::Number(f64::NAN), true)]
    fn same_value_cases(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(same_value(&a, &b), expected);
    }

    #[test]
    fn objects_compare_by_identity() {
        let t = Target::record();
        assert!(!has_changed(&Value::from(&t), &Value::from(&t)));
        assert!(has_changed(&Value::from(&t), &Value::from(Target::record())));
    }
}
