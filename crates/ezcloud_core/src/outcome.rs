//! Outcome signals.
//!
//! Sandboxed code ends a request early by recording one of these tagged
//! values; the sandbox runner consumes them when classifying how a script
//! terminated. They are ordinary values, never errors in their own right.

use crate::envelope::Envelope;
use serde_json::Value;

/// A non-local control-transfer value produced during sandboxed execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// An explicit "finish with success" call; the envelope is final.
    Success(Envelope),
    /// An explicit "finish with failure" call; the envelope is final.
    Fail(Envelope),
    /// A downstream capability failure inside built-in facade code.
    Internal { message: String, info: Value },
}

impl Signal {
    /// The internal-error signal for a failed downstream call.
    pub fn internal(message: impl Into<String>, info: Value) -> Self {
        Self::Internal {
            message: message.into(),
            info,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_predicates() {
        let ok = Signal::Success(Envelope::ok(json!({ "x": 1 })));
        assert!(ok.is_success());
        assert!(!ok.is_internal());

        let internal = Signal::internal("gql failed", json!({ "errors": [] }));
        assert!(internal.is_internal());
    }
}
