//! The per-invocation request record.
//!
//! One [`RequestContext`] is constructed fresh for each inbound
//! invocation, mutated in place as the lifecycle advances, and discarded
//! once the single response has been emitted. It is never shared across
//! requests.

use crate::builtin::Builtin;
use ezcloud_core::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The directory that holds built-in operations.
pub const ROOT_SCF_DIR: &str = ".";

/// Inbound request parameters, as read from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestInfo {
    pub scf_name: String,
    pub scf_dir: String,
    pub payload: Value,
    pub clientinfo: Value,
    pub callback_body: Value,
    pub callback_input: Value,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            scf_name: String::new(),
            scf_dir: ROOT_SCF_DIR.to_string(),
            payload: json!({}),
            clientinfo: json!({}),
            callback_body: Value::Null,
            callback_input: Value::Null,
        }
    }
}

/// Resolved system configuration, from the newest `ez_system` row.
///
/// Stays at its zero values when resolution fails; a request never aborts
/// for want of configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub name: String,
    pub is_logs: bool,
    pub is_developer_auth: bool,
    pub pre_hook_code: String,
    pub post_hook_code: String,
    pub global_config: Value,
    pub thirdapi_id: String,
    pub af_id: String,
}

/// The resolved function record: either a stored code row or a bound
/// built-in operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScfRecord {
    pub scf_dir: String,
    pub scf_name: String,
    pub scf_code: String,
    #[serde(skip)]
    pub scf_fn: Option<Builtin>,
    pub parameters: Value,
    pub returns: Value,
    pub description: String,
}

/// The mutable per-invocation record threaded through the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request: RequestInfo,
    pub system: SystemConfig,
    pub scf: ScfRecord,
    pub response: Envelope,
    /// Recovered failures (parameter reads, resolution, logging).
    pub errors: Vec<Value>,
    /// Ad hoc diagnostic entries recorded by sandboxed code.
    pub clogs: Vec<Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recovered failure without altering the response.
    pub fn record_error(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(source, %message, "recovered failure");
        self.errors.push(json!({ "source": source, "message": message }));
    }

    /// Records a diagnostic entry from sandboxed code.
    pub fn record_clog(&mut self, entry: Value) {
        self.clogs.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.request.scf_dir, ROOT_SCF_DIR);
        assert!(ctx.response.is_ok());
        assert!(ctx.errors.is_empty());
        assert!(!ctx.system.is_logs);
    }

    #[test]
    fn test_system_config_from_row() {
        let row = json!({
            "name": "demo",
            "is_logs": true,
            "pre_hook_code": "ezcloud.clog(1);",
            "unknown_column": 9,
        });
        let system: SystemConfig = serde_json::from_value(row).unwrap();
        assert_eq!(system.name, "demo");
        assert!(system.is_logs);
        assert!(!system.is_developer_auth);
        assert_eq!(system.pre_hook_code, "ezcloud.clog(1);");
    }

    #[test]
    fn test_record_error_keeps_response() {
        let mut ctx = RequestContext::new();
        ctx.record_error("get_arg", "missing scf_name");
        assert!(ctx.response.is_ok());
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0]["source"], json!("get_arg"));
    }
}
