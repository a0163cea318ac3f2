//! Test assertion macros and helpers.

use crate::error::FixtureError;

/// Assert that a result is Ok.
///
/// # Example
///
/// ```ignore
/// assert_ok!(volume.sample_workflow_workspace("w"));
/// assert_ok!(result, "workspace should be created");
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: {}: expected Err, got Ok({:?})", format_args!($($arg)+), v),
        }
    };
}

/// Assert that an error matches a specific variant.
///
/// # Example
///
/// ```ignore
/// let result = catalog.acquisition_order(&["missing"]);
/// assert_err_variant!(result, FixtureError::NotFound(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Assert that a recording message handler received a body.
///
/// # Example
///
/// ```ignore
/// assert_handled!(handler, json!({"id": 1}));
/// assert_handled!(handler, json!({"id": 1}), once);
/// ```
#[macro_export]
macro_rules! assert_handled {
    ($handler:expr, $body:expr) => {
        $handler.assert_called_with(&$body);
    };
    ($handler:expr, $body:expr, once) => {
        $handler.assert_called_once_with(&$body);
    };
}

/// Assert that a recording message handler received nothing.
#[macro_export]
macro_rules! assert_not_handled {
    ($handler:expr) => {
        $handler.assert_call_count(0);
    };
}

// =========================================================================
// HELPER FUNCTIONS
// =========================================================================

/// Check if an error message contains a substring.
pub fn error_contains(error: &FixtureError, substring: &str) -> bool {
    error.to_string().contains(substring)
}

/// Check whether a value matches a JSON pattern (partial matching).
///
/// The pattern only needs to contain the fields you want to verify.
/// Extra fields in the actual value are ignored.
pub fn assert_json_matches(actual: &serde_json::Value, pattern: &serde_json::Value) -> bool {
    match (actual, pattern) {
        (serde_json::Value::Object(a), serde_json::Value::Object(p)) => {
            for (key, expected_value) in p {
                match a.get(key) {
                    Some(actual_value) => {
                        if !assert_json_matches(actual_value, expected_value) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        }
        (serde_json::Value::Array(a), serde_json::Value::Array(p)) => {
            if a.len() != p.len() {
                return false;
            }
            a.iter()
                .zip(p.iter())
                .all(|(a, p)| assert_json_matches(a, p))
        }
        (a, p) => a == p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FixtureError;

    #[test]
    fn test_assert_ok_macro() {
        let result: Result<i32, String> = Ok(42);
        assert_ok!(result);
    }

    #[test]
    #[should_panic(expected = "expected Ok")]
    fn test_assert_ok_macro_fails() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_ok!(result);
    }

    #[test]
    fn test_assert_err_macro() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_err!(result);
    }

    #[test]
    fn test_assert_err_variant_macro() {
        let result: Result<(), FixtureError> = Err(FixtureError::NotFound("user".into()));
        assert_err_variant!(result, FixtureError::NotFound(_));
    }

    #[test]
    #[should_panic(expected = "expected FixtureError::Queue")]
    fn test_assert_err_variant_macro_fails() {
        let result: Result<(), FixtureError> = Err(FixtureError::NotFound("user".into()));
        assert_err_variant!(result, FixtureError::Queue(_));
    }

    #[test]
    fn test_error_contains() {
        let error = FixtureError::Secret("invalid base64".to_string());
        assert!(error_contains(&error, "base64"));
        assert!(!error_contains(&error, "password"));
    }

    #[test]
    fn test_assert_json_matches() {
        let actual = serde_json::json!({
            "reana_specification": {"type": "cwl", "workflow": {"type": "cwl"}},
            "workflow_name": "my_test_workflow"
        });

        assert!(assert_json_matches(
            &actual,
            &serde_json::json!({"workflow_name": "my_test_workflow"})
        ));
        assert!(assert_json_matches(
            &actual,
            &serde_json::json!({"reana_specification": {"workflow": {"type": "cwl"}}})
        ));
        assert!(!assert_json_matches(
            &actual,
            &serde_json::json!({"reana_specification": {"type": "yadage"}})
        ));
        assert!(!assert_json_matches(&actual, &serde_json::json!({"name": ""})));
    }

    #[test]
    fn test_assert_json_matches_arrays() {
        let actual = serde_json::json!([1, 2, 3]);
        assert!(assert_json_matches(&actual, &serde_json::json!([1, 2, 3])));
        assert!(!assert_json_matches(&actual, &serde_json::json!([1, 2])));
    }
}
