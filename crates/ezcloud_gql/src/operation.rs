//! Operation composition.
//!
//! Builds a complete GraphQL document from a single descriptor and
//! extracts the subset of caller-supplied variables the operation
//! actually declares.

use crate::fields::{render_fields, Fields};
use ezcloud_core::{CloudError, CloudResult};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// Fallback operation name when the caller does not provide one.
pub const DEFAULT_OPERATION_NAME: &str = "GenGql";

/// A single operation descriptor.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: String,
    /// Declared arguments: `$name` → GraphQL type text.
    pub args: IndexMap<String, String>,
    pub fields: Option<Fields>,
    /// Caller-supplied runtime variables, keyed without the `$` sigil.
    pub variables: IndexMap<String, Value>,
}

/// A composed document plus the variables it references.
#[derive(Debug, Clone, PartialEq)]
pub struct GqlDocument {
    pub document: String,
    pub variables: IndexMap<String, Value>,
}

impl Operation {
    pub fn new(kind: OperationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(OperationKind::Query, name)
    }

    pub fn mutation(name: impl Into<String>) -> Self {
        Self::new(OperationKind::Mutation, name)
    }

    /// Declares an operation argument, e.g. `("$payload", "jsonb")`.
    pub fn arg(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.args.insert(name.into(), ty.into());
        self
    }

    pub fn fields(mut self, fields: impl Into<Fields>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Composes the document text and extracts referenced variables.
    ///
    /// Every declared-argument key must start with `$`. The returned
    /// variables are exactly the declared names (stripped of `$`); names
    /// absent from the supplied variables are dropped, so unrelated
    /// variables never leak into the wire payload.
    pub fn compose(&self) -> CloudResult<GqlDocument> {
        for key in self.args.keys() {
            if !key.starts_with('$') {
                return Err(CloudError::argument_naming(key));
            }
        }

        let name = if self.name.is_empty() {
            DEFAULT_OPERATION_NAME
        } else {
            self.name.as_str()
        };

        let mut head = format!("{} {name}", self.kind.as_str());
        if !self.args.is_empty() {
            let decls: Vec<String> = self
                .args
                .iter()
                .map(|(key, ty)| format!("{key}: {ty}"))
                .collect();
            head.push('(');
            head.push_str(&decls.join(", "));
            head.push(')');
        }

        let selection = match &self.fields {
            Some(fields) => render_fields(fields, "  "),
            None => "__typename".to_string(),
        };

        let mut variables = IndexMap::new();
        for key in self.args.keys() {
            let bare = &key[1..];
            if let Some(value) = self.variables.get(bare) {
                variables.insert(bare.to_string(), value.clone());
            }
        }

        Ok(GqlDocument {
            document: format!("{head} {{\n  {selection}\n}}"),
            variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldNode;
    use ezcloud_core::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_compose_mutation_with_declared_args() {
        let doc = Operation::mutation("Ins")
            .arg("$x", "Int!")
            .fields(FieldNode::new("doThing"))
            .variable("x", json!(3))
            .compose()
            .unwrap();
        assert_eq!(doc.document, "mutation Ins($x: Int!) {\n  doThing\n}");
        assert_eq!(doc.variables.get("x"), Some(&json!(3)));
        assert_eq!(doc.variables.len(), 1);
    }

    #[test]
    fn test_compose_defaults() {
        let doc = Operation::default().compose().unwrap();
        assert_eq!(doc.document, "query GenGql {\n  __typename\n}");
        assert!(doc.variables.is_empty());
    }

    #[test]
    fn test_argument_naming_enforced() {
        let err = Operation::query("Q")
            .arg("payload", "jsonb")
            .compose()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentNaming);
    }

    #[test]
    fn test_variable_subset_extraction() {
        let doc = Operation::query("Q")
            .arg("$a", "Int")
            .arg("$b", "Int")
            .fields("x")
            .variable("a", json!(1))
            .variable("unrelated", json!(true))
            .compose()
            .unwrap();
        // `a` extracted, `b` dropped (absent), `unrelated` never leaks.
        assert_eq!(doc.variables.len(), 1);
        assert_eq!(doc.variables.get("a"), Some(&json!(1)));
        assert_eq!(
            doc.document,
            "query Q($a: Int, $b: Int) {\n  x\n}"
        );
    }

    #[test]
    fn test_compose_is_idempotent() {
        let op = Operation::query("Q")
            .arg("$a", "Int")
            .fields(FieldNode::new("user").arg("id", crate::value::ArgValue::var("a")))
            .variable("a", json!(1));
        let first = op.compose().unwrap();
        let second = op.compose().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_selection_indent() {
        let doc = Operation::query("Q")
            .fields(FieldNode::new("user").fields(vec!["id", "name"]))
            .compose()
            .unwrap();
        assert_eq!(
            doc.document,
            "query Q {\n  user {\n    id\n    name\n  }\n}"
        );
    }
}
