//! Field descriptors and selection-set serialization.

use crate::value::{render_args, ArgMap, ArgValue};
use ezcloud_core::{CloudError, CloudResult};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A directive attached to a field, e.g. `@include(if: $flag)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Directive {
    pub name: String,
    pub args: ArgMap,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: ArgMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A single field selection with optional alias, arguments, directives and
/// a nested sub-selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub alias: Option<String>,
    pub name: String,
    pub args: ArgMap,
    pub directives: Vec<Directive>,
    pub fields: Option<Fields>,
}

impl FieldNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            args: ArgMap::new(),
            directives: Vec::new(),
            fields: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn args(mut self, args: ArgMap) -> Self {
        self.args = args;
        self
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn fields(mut self, fields: impl Into<Fields>) -> Self {
        self.fields = Some(fields.into());
        self
    }
}

/// A selection-set descriptor: raw fragment text, a single field, or an
/// ordered list of descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    /// Already-valid GraphQL fragment text, emitted verbatim.
    Leaf(String),
    Node(Box<FieldNode>),
    Items(Vec<Fields>),
}

impl Fields {
    /// Builds a descriptor from the JSON payload shape
    /// (`string | object | array`).
    pub fn from_value(value: &Value) -> CloudResult<Self> {
        match value {
            Value::Null => Ok(Self::Items(Vec::new())),
            Value::String(s) => Ok(Self::Leaf(s.clone())),
            Value::Array(items) => {
                let parsed: CloudResult<Vec<Fields>> =
                    items.iter().map(Self::from_value).collect();
                Ok(Self::Items(parsed?))
            }
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CloudError::descriptor("field descriptor requires a `name`"))?;
                let mut node = FieldNode::new(name);
                if let Some(alias) = map.get("alias").and_then(Value::as_str) {
                    node.alias = Some(alias.to_string());
                }
                if let Some(args) = map.get("args") {
                    node.args = arg_map_from_value(args)?;
                }
                if let Some(directives) = map.get("directives") {
                    node.directives = directives_from_value(directives)?;
                }
                if let Some(fields) = map.get("fields") {
                    if !fields.is_null() {
                        node.fields = Some(Self::from_value(fields)?);
                    }
                }
                Ok(node.into())
            }
            other => Err(CloudError::descriptor(format!(
                "invalid field descriptor: {other}"
            ))),
        }
    }
}

fn arg_map_from_value(value: &Value) -> CloudResult<ArgMap> {
    match value {
        Value::Null => Ok(ArgMap::new()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), ArgValue::from(v)))
            .collect()),
        other => Err(CloudError::descriptor(format!(
            "field arguments must be an object, got {other}"
        ))),
    }
}

fn directives_from_value(value: &Value) -> CloudResult<Vec<Directive>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let map = item.as_object().ok_or_else(|| {
                    CloudError::descriptor("directive descriptor must be an object")
                })?;
                let name = map.get("name").and_then(Value::as_str).ok_or_else(|| {
                    CloudError::descriptor("directive descriptor requires a `name`")
                })?;
                Ok(Directive {
                    name: name.to_string(),
                    args: map.get("args").map_or(Ok(ArgMap::new()), arg_map_from_value)?,
                })
            })
            .collect(),
        other => Err(CloudError::descriptor(format!(
            "directives must be a list, got {other}"
        ))),
    }
}

/// Serializes a selection-set descriptor to GraphQL fragment text.
///
/// Siblings join with a newline at the current indent; nested selections
/// open a block indented two spaces deeper. An empty descriptor renders
/// as empty text.
pub fn render_fields(fields: &Fields, indent: &str) -> String {
    match fields {
        Fields::Leaf(text) => text.clone(),
        Fields::Items(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| render_fields(item, indent).trim().to_string())
                .collect();
            rendered.join(&format!("\n{indent}"))
        }
        Fields::Node(node) => {
            let mut out = match &node.alias {
                Some(alias) => format!("{alias}: {}", node.name),
                None => node.name.clone(),
            };
            if !node.args.is_empty() {
                out.push('(');
                out.push_str(&render_args(&node.args));
                out.push(')');
            }
            if !node.directives.is_empty() {
                let rendered: Vec<String> =
                    node.directives.iter().map(render_directive).collect();
                out.push(' ');
                out.push_str(&rendered.join(" "));
            }
            if let Some(sub) = &node.fields {
                let child_indent = format!("{indent}  ");
                let body = render_fields(sub, &child_indent);
                if !body.is_empty() {
                    out.push_str(&format!(" {{\n{child_indent}{body}\n{indent}}}"));
                }
            }
            out
        }
    }
}

fn render_directive(directive: &Directive) -> String {
    if directive.args.is_empty() {
        format!("@{}", directive.name)
    } else {
        format!("@{}({})", directive.name, render_args(&directive.args))
    }
}

impl From<&str> for Fields {
    fn from(value: &str) -> Self {
        Self::Leaf(value.to_string())
    }
}

impl From<String> for Fields {
    fn from(value: String) -> Self {
        Self::Leaf(value)
    }
}

impl From<FieldNode> for Fields {
    fn from(value: FieldNode) -> Self {
        Self::Node(Box::new(value))
    }
}

impl<T: Into<Fields>> From<Vec<T>> for Fields {
    fn from(value: Vec<T>) -> Self {
        Self::Items(value.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Directive {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let parsed = directives_from_value(&Value::Array(vec![value]))
            .map_err(serde::de::Error::custom)?;
        parsed
            .into_iter()
            .next()
            .ok_or_else(|| serde::de::Error::custom("empty directive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezcloud_core::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_leaf_verbatim() {
        let fields: Fields = "id name".into();
        assert_eq!(render_fields(&fields, ""), "id name");
    }

    #[test]
    fn test_node_with_args_and_sub_selection() {
        let fields: Fields = FieldNode::new("user")
            .arg("id", 5i64)
            .fields(vec!["id", "name"])
            .into();
        assert_eq!(
            render_fields(&fields, ""),
            "user(id: 5) {\n  id\n  name\n}"
        );
    }

    #[test]
    fn test_alias() {
        let fields: Fields = FieldNode::new("ez_system")
            .alias("response")
            .fields("id")
            .into();
        assert_eq!(render_fields(&fields, ""), "response: ez_system {\n  id\n}");
    }

    #[test]
    fn test_sibling_order_preserved() {
        let fields: Fields = vec![
            Fields::from("b"),
            Fields::from("a"),
            FieldNode::new("c").fields("id").into(),
        ]
        .into();
        assert_eq!(render_fields(&fields, ""), "b\na\nc {\n  id\n}");
    }

    #[test]
    fn test_nested_indentation() {
        let fields: Fields = FieldNode::new("user")
            .fields(Fields::from(vec![
                Fields::from("id"),
                FieldNode::new("posts").fields(vec!["title"]).into(),
            ]))
            .into();
        assert_eq!(
            render_fields(&fields, ""),
            "user {\n  id\n  posts {\n    title\n  }\n}"
        );
    }

    #[test]
    fn test_directives() {
        let fields: Fields = FieldNode::new("name")
            .directive(Directive::new("include").arg("if", ArgValue::var("flag")))
            .directive(Directive::new("client"))
            .into();
        assert_eq!(render_fields(&fields, ""), "name @include(if: $flag) @client");
    }

    #[test]
    fn test_empty_descriptor_renders_empty() {
        assert_eq!(render_fields(&Fields::Items(Vec::new()), ""), "");
        let node: Fields = FieldNode::new("user")
            .fields(Fields::Items(Vec::new()))
            .into();
        assert_eq!(render_fields(&node, ""), "user");
    }

    #[test]
    fn test_from_value_shapes() {
        let fields = Fields::from_value(&json!({
            "alias": "rows",
            "name": "account",
            "args": { "limit": 1 },
            "fields": ["id", { "name": "owner", "fields": "name" }]
        }))
        .unwrap();
        assert_eq!(
            render_fields(&fields, ""),
            "rows: account(limit: 1) {\n  id\n  owner {\n    name\n  }\n}"
        );
    }

    #[test]
    fn test_from_value_rejects_invalid_shapes() {
        let err = Fields::from_value(&json!(42)).unwrap_err();
        assert_eq!(err.code, ErrorCode::Descriptor);

        let err = Fields::from_value(&json!({ "args": {} })).unwrap_err();
        assert_eq!(err.code, ErrorCode::Descriptor);
    }

    #[test]
    fn test_no_unescaped_quotes_outside_literals() {
        let fields: Fields = FieldNode::new("user")
            .arg("note", "say \"hi\"")
            .fields("id")
            .into();
        let text = render_fields(&fields, "");
        // Every raw quote in the output belongs to a quoted string literal.
        assert_eq!(text, "user(note: \"say \\\"hi\\\"\") {\n  id\n}");
    }
}
