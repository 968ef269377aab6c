//! Typed operation inputs.
//!
//! These structs deserialize from the payload JSON shape used by
//! cloud-function calls (`name` / `args` / `fields` / `opArgs` / …), so
//! the public Rust API and payload-driven built-in dispatch share one
//! input surface.

use ezcloud_gql::{ArgMap, Directive, Fields, OperationKind};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Raw operation descriptor, the lowest-level entry point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OperateInput {
    #[serde(rename = "opMethod")]
    pub op_method: OperationKind,
    #[serde(rename = "opName")]
    pub op_name: String,
    #[serde(rename = "opArgs")]
    pub op_args: IndexMap<String, String>,
    #[serde(rename = "opFields")]
    pub op_fields: Option<Fields>,
    pub variables: IndexMap<String, Value>,
}

/// Input for `query`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryInput {
    pub name: String,
    pub args: ArgMap,
    pub directives: Vec<Directive>,
    pub fields: Option<Fields>,
    #[serde(rename = "opName")]
    pub op_name: String,
    #[serde(rename = "opArgs")]
    pub op_args: IndexMap<String, String>,
    pub variables: IndexMap<String, Value>,
}

/// Input for `mutation`. Same shape as [`QueryInput`].
pub type MutationInput = QueryInput;

/// Input for `find`: a paged row selection plus an aggregate count over
/// the same filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FindInput {
    pub name: String,
    pub args: ArgMap,
    pub directives: Vec<Directive>,
    pub fields: Option<Fields>,
    pub page_number: Option<u64>,
    pub page_size: Option<u64>,
    pub aggregate_fields: Option<Fields>,
    #[serde(rename = "opName")]
    pub op_name: String,
    #[serde(rename = "opArgs")]
    pub op_args: IndexMap<String, String>,
    pub variables: IndexMap<String, Value>,
}

/// Input for `aggregate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateInput {
    pub name: String,
    pub args: ArgMap,
    pub aggregate_fields: Option<Fields>,
    #[serde(rename = "opName")]
    pub op_name: String,
    #[serde(rename = "opArgs")]
    pub op_args: IndexMap<String, String>,
    pub variables: IndexMap<String, Value>,
}

/// Input for `mutationGetFirstOne`: selects `returning { … }` and unwraps
/// the first row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutationGetFirstOneInput {
    pub name: String,
    pub args: ArgMap,
    pub directives: Vec<Directive>,
    pub returning_fields: Option<Fields>,
    #[serde(rename = "opName")]
    pub op_name: String,
    #[serde(rename = "opArgs")]
    pub op_args: IndexMap<String, String>,
    pub variables: IndexMap<String, Value>,
}

/// Input for `runGql`: an already-composed document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunGqlInput {
    #[serde(alias = "gql")]
    pub document: String,
    pub variables: IndexMap<String, Value>,
}
