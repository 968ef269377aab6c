//! Typed error system for ezcloud.
//!
//! Every failure carries a closed error code plus an optional structured
//! `info` payload that survives into response envelopes and audit logs.

use crate::envelope::{Envelope, CODE_FRAMEWORK_ERROR, CODE_USER_ERROR};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Typed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Document building
    Descriptor,
    ArgumentNaming,

    // Wire
    Transport,
    Response,

    // Lifecycle
    PermissionDenied,
    ResolutionMiss,
    Payload,

    // Execution
    UserCode,
    Framework,
    Host,
    Crypto,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Descriptor => "DESCRIPTOR",
            Self::ArgumentNaming => "ARGUMENT_NAMING",
            Self::Transport => "TRANSPORT",
            Self::Response => "RESPONSE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResolutionMiss => "RESOLUTION_MISS",
            Self::Payload => "PAYLOAD",
            Self::UserCode => "USER_CODE",
            Self::Framework => "FRAMEWORK",
            Self::Host => "HOST",
            Self::Crypto => "CRYPTO",
        }
    }

    /// Returns true if the failure is attributed to caller-supplied input
    /// or code (`-1` in the response envelope).
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Descriptor
                | Self::ArgumentNaming
                | Self::PermissionDenied
                | Self::ResolutionMiss
                | Self::Payload
                | Self::UserCode
        )
    }

    /// Returns true if the failure originated inside built-in dispatch or
    /// a downstream capability (`-2` in the response envelope).
    pub const fn is_framework_error(&self) -> bool {
        !self.is_user_error()
    }

    /// The envelope code this error class maps to.
    pub const fn envelope_code(&self) -> i64 {
        if self.is_user_error() {
            CODE_USER_ERROR
        } else {
            CODE_FRAMEWORK_ERROR
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error type used across the workspace.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct CloudError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Structured diagnostic payload.
    pub info: Option<Value>,
}

impl CloudError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            info: None,
        }
    }

    /// Attaches a structured diagnostic payload.
    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }

    // Convenience constructors

    /// A malformed field/argument descriptor.
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Descriptor, message)
    }

    /// A declared operation argument not prefixed with `$`.
    pub fn argument_naming(key: &str) -> Self {
        Self::new(
            ErrorCode::ArgumentNaming,
            format!("invalid operation argument `{key}`, must start with `$`"),
        )
    }

    /// A failed GraphQL transport call.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    /// An unexpected response shape from the transport.
    pub fn response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Response, message)
    }

    /// The generic permission denial. Deliberately detail-free.
    pub fn permission_denied() -> Self {
        Self::new(ErrorCode::PermissionDenied, "permission denied")
    }

    /// A malformed built-in payload.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Payload, message)
    }

    /// A host capability call that failed.
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Host, message)
    }

    /// A failure inside the crypto helpers.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crypto, message)
    }

    /// A failure inside built-in dispatch.
    pub fn framework(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Framework, message)
    }

    /// Returns true if this maps to `-1` in the envelope.
    pub fn is_user_error(&self) -> bool {
        self.code.is_user_error()
    }

    /// Converts the error into a terminal response envelope.
    pub fn to_envelope(&self) -> Envelope {
        let mut info = match &self.info {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(other) => json!({ "detail": other }),
            None => json!({}),
        };
        if let Some(map) = info.as_object_mut() {
            map.insert("message".to_string(), Value::String(self.message.clone()));
            map.insert(
                "code".to_string(),
                Value::String(self.code.as_str().to_string()),
            );
        }
        Envelope::fail(
            self.code.envelope_code(),
            self.message.clone(),
            json!({ "info": info }),
        )
    }
}

impl Serialize for CloudError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("CloudError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref info) = self.info {
            state.serialize_field("info", info)?;
        }
        state.end()
    }
}

/// Type alias for results across the workspace.
pub type CloudResult<T> = std::result::Result<T, CloudError>;
