//! Dynamic value model for decoded column data.
//!
//! Query results carry values whose shape is only known from the textual
//! column schema of each response, so decoded data is represented as an
//! explicit tagged union ([`KsqlValue`]) rather than static Rust types.
//! Nested `STRUCT` and `MAP` columns decode to [`KsqlObject`], which keeps
//! field insertion order.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// A dynamically-typed value decoded from (or encoded to) the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum KsqlValue {
    /// SQL NULL, a JSON null, or a value that failed to decode as its
    /// declared type.
    Null,
    /// `STRING` / `VARCHAR`
    String(String),
    /// `INTEGER`
    Integer(i32),
    /// `BIGINT`
    Bigint(i64),
    /// `DOUBLE`
    Double(f64),
    /// `DECIMAL(p, s)`
    Decimal(Decimal),
    /// `BOOLEAN`
    Bool(bool),
    /// `ARRAY<T>`
    Array(Vec<KsqlValue>),
    /// `MAP<K, V>` or `STRUCT<...>`
    Object(KsqlObject),
}

impl KsqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, KsqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KsqlValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            KsqlValue::Integer(v) => Some(*v),
            KsqlValue::Bigint(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KsqlValue::Integer(v) => Some(i64::from(*v)),
            KsqlValue::Bigint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KsqlValue::Integer(v) => Some(f64::from(*v)),
            KsqlValue::Bigint(v) => Some(*v as f64),
            KsqlValue::Double(v) => Some(*v),
            KsqlValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            KsqlValue::Decimal(d) => Some(*d),
            KsqlValue::Integer(v) => Some(Decimal::from(*v)),
            KsqlValue::Bigint(v) => Some(Decimal::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KsqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[KsqlValue]> {
        match self {
            KsqlValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&KsqlObject> {
        match self {
            KsqlValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Converts into the `serde_json` representation used on the wire.
    ///
    /// `DECIMAL` values are emitted as JSON numbers; a decimal that cannot
    /// be represented as a finite double becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KsqlValue::Null => serde_json::Value::Null,
            KsqlValue::String(s) => serde_json::Value::String(s.clone()),
            KsqlValue::Integer(v) => serde_json::Value::from(*v),
            KsqlValue::Bigint(v) => serde_json::Value::from(*v),
            KsqlValue::Double(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            KsqlValue::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            KsqlValue::Bool(b) => serde_json::Value::Bool(*b),
            KsqlValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(KsqlValue::to_json).collect())
            }
            KsqlValue::Object(obj) => serde_json::Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for KsqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KsqlValue::Null => write!(f, "NULL"),
            KsqlValue::String(s) => write!(f, "\"{s}\""),
            KsqlValue::Integer(v) => write!(f, "{v}"),
            KsqlValue::Bigint(v) => write!(f, "{v}"),
            KsqlValue::Double(v) => write!(f, "{v}"),
            KsqlValue::Decimal(d) => write!(f, "{d}"),
            KsqlValue::Bool(b) => write!(f, "{b}"),
            KsqlValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            KsqlValue::Object(obj) => {
                write!(f, "{{")?;
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for KsqlValue {
    fn from(s: &str) -> Self {
        KsqlValue::String(s.to_string())
    }
}

impl From<String> for KsqlValue {
    fn from(s: String) -> Self {
        KsqlValue::String(s)
    }
}

impl From<i32> for KsqlValue {
    fn from(v: i32) -> Self {
        KsqlValue::Integer(v)
    }
}

impl From<i64> for KsqlValue {
    fn from(v: i64) -> Self {
        KsqlValue::Bigint(v)
    }
}

impl From<f64> for KsqlValue {
    fn from(v: f64) -> Self {
        KsqlValue::Double(v)
    }
}

impl From<Decimal> for KsqlValue {
    fn from(d: Decimal) -> Self {
        KsqlValue::Decimal(d)
    }
}

impl From<bool> for KsqlValue {
    fn from(b: bool) -> Self {
        KsqlValue::Bool(b)
    }
}

impl From<Vec<KsqlValue>> for KsqlValue {
    fn from(items: Vec<KsqlValue>) -> Self {
        KsqlValue::Array(items)
    }
}

impl From<KsqlObject> for KsqlValue {
    fn from(obj: KsqlObject) -> Self {
        KsqlValue::Object(obj)
    }
}

/// An insertion-ordered string-keyed map of [`KsqlValue`].
///
/// Backed by a plain vector: decoded structs and maps have few fields, and
/// preserving wire order matters more than lookup speed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KsqlObject {
    entries: Vec<(String, KsqlValue)>,
}

impl KsqlObject {
    pub fn new() -> Self {
        KsqlObject::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a value, replacing any existing value under the same key.
    /// The key keeps its original insertion position on replacement.
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<KsqlValue>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Inserts an explicit NULL under `key`.
    pub fn insert_null(self, key: impl Into<String>) -> Self {
        self.insert(key, KsqlValue::Null)
    }

    pub fn get(&self, key: &str) -> Option<&KsqlValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KsqlValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// True when `key` is present and holds NULL. Absent keys are not null.
    pub fn is_null(&self, key: &str) -> bool {
        matches!(self.get(key), Some(KsqlValue::Null))
    }

    pub(crate) fn push_entry(&mut self, key: String, value: KsqlValue) {
        self.entries.push((key, value));
    }
}

impl FromIterator<(String, KsqlValue)> for KsqlObject {
    fn from_iter<I: IntoIterator<Item = (String, KsqlValue)>>(iter: I) -> Self {
        let mut obj = KsqlObject::new();
        for (key, value) in iter {
            obj = obj.insert(key, value);
        }
        obj
    }
}

/// Converts a raw JSON number to the closest dynamic value: integers that
/// fit i32 become `Integer`, larger integers `Bigint`, everything else
/// `Double`.
pub(crate) fn number_to_value(n: &serde_json::Number) -> KsqlValue {
    if let Some(v) = n.as_i64() {
        return match i32::try_from(v) {
            Ok(small) => KsqlValue::Integer(small),
            Err(_) => KsqlValue::Bigint(v),
        };
    }
    n.as_f64().map_or(KsqlValue::Null, KsqlValue::Double)
}

/// Parses a JSON number as a decimal from its display text, keeping the
/// digits the server sent instead of forcing an f64 round-trip.
pub(crate) fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
    Decimal::from_str(&n.to_string()).ok()
}
