//! Query arguments.
//!
//! Call sites may pass one list, several scalars, or one map. All of these
//! are normalized into an [`Args`] value as soon as they enter the crate:
//! either an ordered positional sequence or a named map.

use std::collections::BTreeMap;

use serde_json::Map;

use crate::error::{Error, Result};

/// A bindable argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
    /// List or map, bound as its JSON encoding.
    Array(serde_json::Value),
}

impl Value {
    /// Renders the value for debug interpolation.
    ///
    /// Strings are quoted without escaping. Never execute the result.
    #[must_use]
    pub fn to_debug_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Text(s) => format!("'{s}'"),
            Self::Array(v) => format!("'{v}'"),
        }
    }

    /// Converts the value into template scope.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Array(v) => v.clone(),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| Error::UnsupportedArgumentType(format!("number {n}"))),
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            v @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => Ok(Self::Array(v)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Whether a positional or named set of arguments was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// `?` placeholders, bound in order.
    Positional,
    /// `:name` placeholders, bound by name.
    Named,
}

/// A normalized set of query arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    /// Ordered values for `?` placeholders.
    Positional(Vec<Value>),
    /// Values for `:name` placeholders.
    Named(BTreeMap<String, Value>),
}

impl Default for Args {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Args {
    /// No arguments.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments from any sequence of values.
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named arguments from `(name, value)` pairs.
    pub fn named<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Normalizes a variadic argument list.
    ///
    /// A single list or map is unpacked: a map becomes named arguments
    /// unless its keys are exactly `0..n-1`, everything else is positional.
    /// Several values are always positional.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedArgumentType`] for non-integer numbers.
    pub fn from_variadic(mut values: Vec<serde_json::Value>) -> Result<Self> {
        if values.len() == 1 {
            match values.pop() {
                Some(serde_json::Value::Array(items)) => return Self::from_list(items),
                Some(serde_json::Value::Object(map)) => return Self::from_map(map),
                Some(other) => values.push(other),
                None => {}
            }
        }
        Self::from_list(values)
    }

    /// Normalizes a single JSON value holding all arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedArgumentType`] for non-integer numbers.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Self::from_variadic(vec![value])
    }

    fn from_list(items: Vec<serde_json::Value>) -> Result<Self> {
        items
            .into_iter()
            .map(Value::try_from)
            .collect::<Result<Vec<_>>>()
            .map(Self::Positional)
    }

    fn from_map(map: Map<String, serde_json::Value>) -> Result<Self> {
        if is_assoc(&map) {
            map.into_iter()
                .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Self::Named)
        } else {
            let mut entries: Vec<(usize, serde_json::Value)> = map
                .into_iter()
                .filter_map(|(k, v)| k.parse().ok().map(|i| (i, v)))
                .collect();
            entries.sort_by_key(|(i, _)| *i);
            Self::from_list(entries.into_iter().map(|(_, v)| v).collect())
        }
    }

    /// The kind of arguments held.
    #[must_use]
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Positional(_) => ArgType::Positional,
            Self::Named(_) => ArgType::Named,
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(map) => map.len(),
        }
    }

    /// Whether no values were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<BTreeMap<String, Value>> for Args {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Named(map)
    }
}

impl From<()> for Args {
    fn from((): ()) -> Self {
        Self::none()
    }
}

/// Returns whether a map must be treated as named arguments.
///
/// False for an empty map and for maps whose keys are exactly `0..n-1`.
#[must_use]
pub fn is_assoc(map: &Map<String, serde_json::Value>) -> bool {
    if map.is_empty() {
        return false;
    }
    let mut indices: Vec<usize> = Vec::with_capacity(map.len());
    for key in map.keys() {
        match key.parse::<usize>() {
            Ok(i) if i.to_string() == *key => indices.push(i),
            _ => return true,
        }
    }
    indices.sort_unstable();
    indices.iter().enumerate().any(|(pos, i)| pos != *i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: serde_json::Value) -> Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_is_assoc() {
        assert!(!is_assoc(&as_map(json!({}))));
        assert!(!is_assoc(&as_map(json!({"0": 1, "1": 2, "2": 3}))));
        assert!(!is_assoc(&as_map(json!({"1": 2, "0": 1}))));
        assert!(is_assoc(&as_map(json!({"1": 2, "2": 3}))));
        assert!(is_assoc(&as_map(json!({"0": 1, "name": 2}))));
        assert!(is_assoc(&as_map(json!({"00": 1}))));
    }

    #[test]
    fn test_variadic_forms() {
        let spread = Args::from_variadic(vec![json!(1), json!("two")]).unwrap();
        let list = Args::from_variadic(vec![json!([1, "two"])]).unwrap();
        assert_eq!(spread, list);
        assert_eq!(spread.arg_type(), ArgType::Positional);

        let named = Args::from_variadic(vec![json!({"id": 1, "name": "two"})]).unwrap();
        assert_eq!(named.arg_type(), ArgType::Named);
        assert_eq!(named.len(), 2);

        let indexed = Args::from_variadic(vec![json!({"1": "two", "0": 1})]).unwrap();
        assert_eq!(indexed, list);
    }

    #[test]
    fn test_single_scalar_is_positional() {
        let args = Args::from_variadic(vec![json!(4)]).unwrap();
        assert_eq!(args, Args::Positional(vec![Value::Int(4)]));
    }

    #[test]
    fn test_nested_array_value() {
        let args = Args::from_variadic(vec![json!({"tags": ["a", "b"]})]).unwrap();
        let Args::Named(map) = args else {
            panic!("expected named args");
        };
        assert_eq!(map["tags"], Value::Array(json!(["a", "b"])));
    }

    #[test]
    fn test_unsupported_float() {
        let err = Args::from_variadic(vec![json!(1.5)]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedArgumentType(_)));
    }

    #[test]
    fn test_debug_rendering() {
        assert_eq!(Value::Null.to_debug_sql(), "NULL");
        assert_eq!(Value::Bool(true).to_debug_sql(), "true");
        assert_eq!(Value::Int(7).to_debug_sql(), "7");
        assert_eq!(Value::from("Death").to_debug_sql(), "'Death'");
        assert_eq!(
            Value::Array(json!([1, 2])).to_debug_sql(),
            "'[1,2]'"
        );
    }
}
