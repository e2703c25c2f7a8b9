//! Record model shared by every pipeline stage
//!
//! A [`RawRecord`] is what a record source produces for one line, row or
//! binary record: an insertion-ordered mapping from field name to
//! [`FieldValue`]. Field presence is never guaranteed, so stages look fields
//! up by name and report absences as typed errors.

use indexmap::IndexMap;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// A single decoded field value
///
/// Nested structures (JSON objects and arrays, Avro records, arrays and maps)
/// are carried as their compact JSON text.
///
/// Numbers compare by value across `Int`, `UInt` and `Float`, so `1`, `1u64`
/// and `1.0` are equal and hash alike. Numbers never equal text.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    Text(String),
}

/// Canonical form of a number for equality and hashing
#[derive(PartialEq, Eq, Hash)]
enum NumberKey {
    Integral(i128),
    /// Bit pattern of a non-integral (or out of range) float
    Fractional(u64),
}

// i128 covers every i64, every u64 and every integral f64 below 2^127
const I128_FLOAT_BOUND: f64 = 1.7014118346046923e38;

impl FieldValue {
    /// Borrow the value as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn number_key(&self) -> Option<NumberKey> {
        match *self {
            FieldValue::Int(i) => Some(NumberKey::Integral(i128::from(i))),
            FieldValue::UInt(u) => Some(NumberKey::Integral(i128::from(u))),
            FieldValue::Float(x) if x.fract() == 0.0 && x.abs() < I128_FLOAT_BOUND => {
                Some(NumberKey::Integral(x as i128))
            },
            FieldValue::Float(x) => Some(NumberKey::Fractional(x.to_bits())),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            _ => match (self.number_key(), other.number_key()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldValue::Null => 0u8.hash(state),
            FieldValue::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            },
            FieldValue::Text(s) => {
                2u8.hash(state);
                s.hash(state);
            },
            number => {
                3u8.hash(state);
                number.number_key().hash(state);
            },
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::UInt(u) => write!(f, "{}", u),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            },
            Value::String(s) => FieldValue::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => FieldValue::Text(nested.to_string()),
        }
    }
}

/// One decoded record: field name to value, in source order
///
/// Equality and hashing ignore field order: two records are equal when they
/// have the same keys mapped to equal values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: IndexMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(name, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }

    /// Build a record from a JSON object, keeping key order
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from(v)))
            .collect()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Insert or replace a field; a replaced field keeps its position
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Compact JSON rendering, used in error messages and the dump output
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.fields))
    }
}

impl Hash for RawRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut entries: Vec<(&String, &FieldValue)> = self.fields.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries.len().hash(state);
        for (k, v) in entries {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl FromIterator<(String, FieldValue)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
