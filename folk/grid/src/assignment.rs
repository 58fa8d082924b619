use std::fmt;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// A mapping from parameter name to value, produced one at a time by a grid.
///
/// Assignments are open records: consumers pull out the keys they understand
/// (see [`Assignment::extract`]) and ignore the rest. Keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(IndexMap<String, Value>);

impl Assignment {
    /// Creates an empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Whether the key is assigned.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of assigned parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Returns `self` overridden by `other`: keys of `other` win on collision.
    ///
    /// Keys of `self` keep their position, keys only present in `other` are
    /// appended in `other`'s order.
    #[must_use]
    pub fn overridden_by(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Whether this assignment is consistent with a (possibly partial) one.
    ///
    /// Keys of `partial` missing from `self` are ignored. An array value in
    /// `partial` accepts any of its elements.
    #[must_use]
    pub fn agrees_with(&self, partial: &Self) -> bool {
        partial.iter().all(|(key, wanted)| match self.get(key) {
            None => true,
            Some(actual) => accepts(wanted, actual),
        })
    }

    /// Deserializes the keys a consumer cares about into a typed record.
    ///
    /// Unknown keys are dropped unless `T` opts into `deny_unknown_fields`.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let object: serde_json::Map<String, Value> = self
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        serde_json::from_value(Value::Object(object))
    }

    /// Consumes the assignment into its underlying map.
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

/// Whether a constraint value (scalar or array of candidates) admits `actual`.
pub(crate) fn accepts(wanted: &Value, actual: &Value) -> bool {
    match wanted {
        Value::Array(candidates) => candidates.iter().any(|candidate| same_value(candidate, actual)),
        scalar => same_value(scalar, actual),
    }
}

/// Value equality where numbers compare by magnitude, so `1` matches `1.0`.
#[allow(clippy::float_cmp)]
fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) if a.is_f64() || b.is_f64() => {
            a.as_f64() == b.as_f64()
        }
        _ => left == right,
    }
}

/// Renders a parameter value for ids and messages: strings bare, the rest as JSON.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {}", render_value(value))?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Assignment {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<IndexMap<String, Value>> for Assignment {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}
