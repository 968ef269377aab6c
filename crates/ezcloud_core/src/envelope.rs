//! The per-request response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The single response shape every request terminates with.
///
/// `code == 0` is success; any negative code is a caller-visible failure.
/// The split between `-1` (user code) and `-2` (framework) matters for the
/// audit log shape, not for the transport envelope itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

/// Envelope code for errors raised by user-authored function code.
pub const CODE_USER_ERROR: i64 = -1;
/// Envelope code for errors originating inside built-in dispatch.
pub const CODE_FRAMEWORK_ERROR: i64 = -2;

impl Default for Envelope {
    fn default() -> Self {
        Self::success()
    }
}

impl Envelope {
    /// The zero-value success envelope every request starts from.
    pub fn success() -> Self {
        Self {
            code: 0,
            msg: "success".to_string(),
            data: Value::Null,
        }
    }

    /// A success envelope carrying data.
    pub fn ok(data: Value) -> Self {
        Self {
            code: 0,
            msg: "success".to_string(),
            data,
        }
    }

    /// A failure envelope.
    pub fn fail(code: i64, msg: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            msg: msg.into(),
            data,
        }
    }

    /// Builds an envelope from a loose JSON value, defaulting missing keys.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|_| Self::success())
    }

    /// Returns true while the request is still on the success path.
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Merges diagnostic side-channels into `data`.
    ///
    /// Non-object `data` is first wrapped as `{"data": <old>}`; empty
    /// channels are not attached. Diagnostics never alter `code`.
    pub fn attach_diagnostics(&mut self, errors: &[Value], clogs: &[Value]) {
        if errors.is_empty() && clogs.is_empty() {
            return;
        }
        if !self.data.is_object() {
            self.data = json!({ "data": self.data.take() });
        }
        if let Value::Object(map) = &mut self.data {
            if !errors.is_empty() {
                map.insert("_errors".to_string(), Value::Array(errors.to_vec()));
            }
            if !clogs.is_empty() {
                map.insert("_clogs".to_string(), Value::Array(clogs.to_vec()));
            }
        }
    }
}
