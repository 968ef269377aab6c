//! Argument values and their text rendering.
//!
//! Values render as GraphQL argument literals. Strings are quoted unless
//! they travel through the raw path (`ArgValue::Raw`, or entries nested
//! under the reserved `__QUOTOFF__` key), which is how variable references
//! like `$payload` and enum identifiers are spliced into argument position
//! without quoting.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

/// An ordered mapping of argument names to values.
pub type ArgMap = IndexMap<String, ArgValue>;

/// Reserved key whose (object) value is flattened into the parent
/// argument list with quoting disabled.
pub const QUOTOFF_KEY: &str = "__QUOTOFF__";

/// A GraphQL argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(Number),
    /// A string literal, quoted on render.
    Str(String),
    /// A raw literal, spliced verbatim: variable references, enum names.
    Raw(String),
    List(Vec<ArgValue>),
    Object(ArgMap),
}

impl ArgValue {
    /// A raw literal.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// A reference to the declared variable `$<name>`.
    pub fn var(name: &str) -> Self {
        Self::Raw(format!("${name}"))
    }
}

/// Renders a value as GraphQL argument text.
///
/// In raw mode a string is emitted bare when it contains none of
/// `"`, `:`, `{`, `}`; anything unsafe falls back to a quoted literal.
pub fn render_value(value: &ArgValue, raw: bool) -> String {
    match value {
        ArgValue::Null => "null".to_string(),
        ArgValue::Bool(b) => b.to_string(),
        ArgValue::Number(n) => n.to_string(),
        ArgValue::Str(s) => {
            if raw && is_raw_safe(s) {
                s.clone()
            } else {
                quote(s)
            }
        }
        ArgValue::Raw(s) => {
            if is_raw_safe(s) {
                s.clone()
            } else {
                quote(s)
            }
        }
        ArgValue::List(items) => {
            let inner: Vec<String> = items.iter().map(|item| render_value(item, raw)).collect();
            format!("[{}]", inner.join(", "))
        }
        ArgValue::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(key, value)| {
                    if raw {
                        format!("{key}: {}", render_value(value, true))
                    } else {
                        render_key_value(key, value)
                    }
                })
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Renders one `key: value` argument entry.
///
/// The reserved `__QUOTOFF__` key flattens its object value's entries into
/// the parent list in raw mode, without wrapping braces.
pub fn render_key_value(key: &str, value: &ArgValue) -> String {
    if key == QUOTOFF_KEY {
        if let ArgValue::Object(map) = value {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_value(v, true)))
                .collect();
            return inner.join(", ");
        }
    }
    format!("{key}: {}", render_value(value, false))
}

/// Renders a whole argument map as `k1: v1, k2: v2`.
pub fn render_args(args: &ArgMap) -> String {
    let entries: Vec<String> = args
        .iter()
        .map(|(key, value)| render_key_value(key, value))
        .collect();
    entries.join(", ")
}

fn is_raw_safe(s: &str) -> bool {
    !s.contains(['"', ':', '{', '}'])
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&Value> for ArgValue {
    fn from(value: &Value) -> Self {
        value.clone().into()
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Value::deserialize(deserializer)?.into())
    }
}
