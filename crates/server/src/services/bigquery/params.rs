//! Named query parameters.
//!
//! Parameters are typed up front. Untyped JSON (tool arguments, ad-hoc
//! callers) is converted exactly once through [`QueryParam::from`] using
//! these rules:
//!
//! - booleans, integers, floats and strings map to their scalar kinds;
//! - an array takes its element type from its first element, and an empty
//!   array becomes a string array;
//! - anything else (objects, null) is sent as its JSON text.

use std::collections::BTreeMap;

use serde_json::{Value, json};

/// Name under which the current tenant id is always bound.
pub const SHOP_ID_PARAM: &str = "shop_id";

/// A typed query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl QueryParam {
    /// `BigQuery` type name of the value (or of the elements, for arrays).
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "BOOL",
            Self::Int(_) | Self::IntArray(_) => "INT64",
            Self::Float(_) | Self::FloatArray(_) => "FLOAT64",
            Self::String(_) | Self::StringArray(_) => "STRING",
        }
    }

    /// Whether the value is an array.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(
            self,
            Self::IntArray(_) | Self::FloatArray(_) | Self::StringArray(_)
        )
    }

    /// Encode as a `QueryParameter` for the REST API.
    ///
    /// The API carries every scalar as a string.
    #[must_use]
    pub fn to_api(&self, name: &str) -> Value {
        let parameter_type = if self.is_array() {
            json!({"type": "ARRAY", "arrayType": {"type": self.type_name()}})
        } else {
            json!({"type": self.type_name()})
        };

        let parameter_value = match self {
            Self::Bool(v) => json!({"value": v.to_string()}),
            Self::Int(v) => json!({"value": v.to_string()}),
            Self::Float(v) => json!({"value": v.to_string()}),
            Self::String(v) => json!({"value": v}),
            Self::IntArray(vs) => array_value(vs.iter().map(ToString::to_string)),
            Self::FloatArray(vs) => array_value(vs.iter().map(ToString::to_string)),
            Self::StringArray(vs) => array_value(vs.iter().cloned()),
        };

        json!({
            "name": name,
            "parameterType": parameter_type,
            "parameterValue": parameter_value,
        })
    }
}

fn array_value(values: impl Iterator<Item = String>) -> Value {
    let values: Vec<Value> = values.map(|v| json!({"value": v})).collect();
    json!({"arrayValues": values})
}

fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<Value> for QueryParam {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            Value::String(s) => Self::String(s),
            Value::Array(items) => match items.first() {
                Some(Value::Number(first)) if first.is_f64() => {
                    Self::FloatArray(items.iter().filter_map(Value::as_f64).collect())
                }
                Some(Value::Number(_)) if items.iter().all(|v| v.as_i64().is_some()) => {
                    Self::IntArray(items.iter().filter_map(Value::as_i64).collect())
                }
                Some(Value::Number(_)) => {
                    Self::FloatArray(items.iter().filter_map(Value::as_f64).collect())
                }
                _ => Self::StringArray(items.iter().map(json_to_string).collect()),
            },
            other @ (Value::Null | Value::Object(_)) => Self::String(other.to_string()),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<i64>> for QueryParam {
    fn from(v: Vec<i64>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<f64>> for QueryParam {
    fn from(v: Vec<f64>) -> Self {
        Self::FloatArray(v)
    }
}

impl From<Vec<f32>> for QueryParam {
    fn from(v: Vec<f32>) -> Self {
        Self::FloatArray(v.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<String>> for QueryParam {
    fn from(v: Vec<String>) -> Self {
        Self::StringArray(v)
    }
}

/// A set of named parameters, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, QueryParam>);

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a parameter, returning the previous value under that name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<QueryParam>,
    ) -> Option<QueryParam> {
        self.0.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParam)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode every parameter for the REST API.
    #[must_use]
    pub fn to_api(&self) -> Vec<Value> {
        self.iter().map(|(name, value)| value.to_api(name)).collect()
    }
}

impl From<serde_json::Map<String, Value>> for QueryParams {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, QueryParam::from(v)))
                .collect(),
        )
    }
}
