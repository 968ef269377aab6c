//! The host capability boundary.
//!
//! Everything the runtime needs from its surrounding platform comes
//! through [`HostCapabilities`], injected at controller construction. No
//! retry or timeout behavior is assumed from any of these calls.

use ezcloud_core::CloudResult;
use ezcloud_sdk::GqlTransport;
use serde_json::Value;
use std::rc::Rc;

/// Permission attached to a host-side GraphQL execution.
#[derive(Debug, Clone)]
pub struct GqlPermission {
    pub role: String,
}

impl Default for GqlPermission {
    fn default() -> Self {
        Self {
            role: "admin".to_string(),
        }
    }
}

/// The capability object provided by the host runtime.
pub trait HostCapabilities {
    /// Reads one inbound request argument.
    fn get_arg(&self, name: &str) -> CloudResult<Value>;

    /// Writes one key of the outbound response.
    fn set_return(&self, name: &str, value: &Value) -> CloudResult<()>;

    /// Executes a GraphQL document, returning the raw response
    /// (`{ data, errors? }`).
    fn run_gql(
        &self,
        operation_name: Option<&str>,
        document: &str,
        variables: &Value,
        permission: &GqlPermission,
    ) -> CloudResult<Value>;

    /// Invokes a configured third-party API operation.
    fn call_third_party_api(&self, operation_id: &str, args: &Value) -> CloudResult<Value>;

    /// Invokes an action flow by id and optional version.
    fn call_action_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
        args: &Value,
    ) -> CloudResult<Value>;

    /// Uploads media from a URL.
    fn upload_media(&self, url: &str, headers: &Value) -> CloudResult<Value>;
}

/// [`GqlTransport`] over the host's `runGql` capability, with the
/// admin role the runtime executes under.
#[derive(Clone)]
pub struct HostTransport {
    host: Rc<dyn HostCapabilities>,
}

impl HostTransport {
    pub fn new(host: Rc<dyn HostCapabilities>) -> Self {
        Self { host }
    }
}

impl GqlTransport for HostTransport {
    fn run_gql(&self, document: &str, variables: &Value) -> CloudResult<Value> {
        self.host
            .run_gql(None, document, variables, &GqlPermission::default())
    }
}
