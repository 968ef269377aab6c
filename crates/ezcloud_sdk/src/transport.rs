//! The abstract GraphQL transport the facade executes against.

use ezcloud_core::{CloudError, CloudResult};
use serde_json::{json, Value};

/// The `runGql` capability: takes a composed document plus its variables
/// and returns the raw GraphQL response (`{ data, errors? }`).
///
/// No retry or timeout behavior is assumed; any failure is surfaced as a
/// [`CloudError`] and never retried here.
pub trait GqlTransport {
    fn run_gql(&self, document: &str, variables: &Value) -> CloudResult<Value>;
}

impl<T: GqlTransport + ?Sized> GqlTransport for std::rc::Rc<T> {
    fn run_gql(&self, document: &str, variables: &Value) -> CloudResult<Value> {
        (**self).run_gql(document, variables)
    }
}

/// Unwraps a raw GraphQL response.
///
/// A top-level `errors` array is a call failure surfaced with the first
/// error's message and locations; otherwise the `data` sub-tree (or the
/// value itself, when the transport already unwrapped it) is returned.
pub fn unwrap_response(raw: Value, document: &str) -> CloudResult<Value> {
    if let Some(errors) = raw.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let first = &errors[0];
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("graphql error")
                .to_string();
            return Err(CloudError::transport(message).with_info(json!({
                "locations": first.get("locations"),
                "errors": errors,
                "document": document,
            })));
        }
    }
    match raw {
        Value::Object(mut map) if map.contains_key("data") => {
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezcloud_core::ErrorCode;

    #[test]
    fn test_unwrap_data() {
        let out = unwrap_response(json!({ "data": { "response": [] } }), "query Q { x }");
        assert_eq!(out.unwrap(), json!({ "response": [] }));
    }

    #[test]
    fn test_unwrap_passthrough_without_data_key() {
        let out = unwrap_response(json!({ "response": 1 }), "query Q { x }");
        assert_eq!(out.unwrap(), json!({ "response": 1 }));
    }

    #[test]
    fn test_errors_array_is_a_failure() {
        let raw = json!({
            "errors": [{ "message": "boom", "locations": [{ "line": 1, "column": 2 }] }]
        });
        let err = unwrap_response(raw, "query Q { x }").unwrap_err();
        assert_eq!(err.code, ErrorCode::Transport);
        assert_eq!(err.message, "boom");
        let info = err.info.unwrap();
        assert_eq!(info["locations"][0]["line"], json!(1));
        assert_eq!(info["document"], json!("query Q { x }"));
    }

    #[test]
    fn test_empty_errors_array_is_not_a_failure() {
        let out = unwrap_response(json!({ "errors": [], "data": 1 }), "q");
        assert_eq!(out.unwrap(), json!(1));
    }
}
