//! The tagged-tree document value model.
//!
//! Documents in VellumDB are opaque tagged trees: self-describing values with
//! typed leaves, arrays and objects. The façade never interprets user
//! attributes beyond the reserved identity attributes (`_key`, `_id`, `_rev`);
//! everything else is carried through verbatim.
//!
//! # Example
//!
//! ```
//! use vellumdb_core::Value;
//!
//! let doc = Value::object([
//!     ("_key", Value::from("42")),
//!     ("name", Value::from("Alice")),
//! ]);
//!
//! assert_eq!(doc.get("name").and_then(Value::as_str), Some("Alice"));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{Error, ErrorCode};

/// Key under which custom-tagged blobs survive a JSON round-trip.
///
/// JSON has no representation for the custom leaf type, so a custom blob is
/// encoded as a single-attribute object `{"$custom": "<hex>"}` on the wire.
const CUSTOM_MARKER: &str = "$custom";

/// A tagged-tree value.
///
/// Numbers are either 64-bit signed integers or 64-bit floats; the two are
/// unified for comparison purposes. Objects keep their attributes sorted by
/// name, which makes equality and iteration deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null / missing value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Object with named attributes.
    Object(BTreeMap<String, Value>),
    /// Custom-tagged binary leaf (first byte is the tag).
    Custom(Vec<u8>),
}

impl Value {
    /// Build an object value from attribute pairs.
    pub fn object<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(attrs: I) -> Self {
        Self::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns `true` if this is an object.
    #[must_use]
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Returns `true` if this is an array.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns `true` if this is a string.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns `true` if this is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is a custom-tagged blob.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Get an object attribute by name.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        match self {
            Self::Object(attrs) => attrs.get(attribute),
            _ => None,
        }
    }

    /// Follow an attribute path into nested objects.
    #[must_use]
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for part in path {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload widened to `f64`, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The element list, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The attribute map, if this is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// The raw bytes, if this is a custom-tagged blob.
    #[must_use]
    pub fn as_custom(&self) -> Option<&[u8]> {
        match self {
            Self::Custom(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Name of the value type, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Custom(_) => "custom",
        }
    }

    /// Rank used to order values of different types.
    ///
    /// null < bool < number < string < array < object < custom. Integers and
    /// floats share a rank and compare numerically.
    const fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
            Self::Array(_) => 4,
            Self::Object(_) => 5,
            Self::Custom(_) => 6,
        }
    }

    /// Total order over values.
    ///
    /// This is the order indexes and the condition normaliser use; it must be
    /// deterministic for every pair of values, so floats are compared with
    /// `total_cmp`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (a @ (Self::Int(_) | Self::Float(_)), b) => {
                let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
                    return Ordering::Equal;
                };
                x.total_cmp(&y)
            }
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let cmp = x.compare(y);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Object(a), Self::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let cmp = ka.cmp(kb);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                    let cmp = va.compare(vb);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Custom(a), Self::Custom(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        // Values past i64::MAX lose integer-ness but stay comparable.
        i64::try_from(i).map_or(Self::Float(i as f64), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(attrs) => {
                let mut map = serializer.serialize_map(Some(attrs.len()))?;
                for (key, value) in attrs {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Custom(bytes) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(CUSTOM_MARKER, &hex_encode(bytes))?;
                map.end()
            }
        }
    }
}

/// Render a value as a JSON string for the wire.
pub fn to_json_string(value: &Value) -> Result<String, Error> {
    serde_json::to_string(value)
        .map_err(|e| Error::with_message(ErrorCode::Internal, e.to_string()))
}

/// Parse a JSON wire string into a value.
///
/// Parse failures surface the parser message; callers in the coordinator
/// pipeline report these as `Internal` together with the raw body.
pub fn from_json_str(body: &str) -> Result<Value, String> {
    let json: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    Ok(from_json(&json))
}

/// Convert a parsed JSON tree into a value.
#[must_use]
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(attrs) => {
            // A single $custom attribute denotes a custom-tagged blob.
            if attrs.len() == 1 {
                if let Some(serde_json::Value::String(hex)) = attrs.get(CUSTOM_MARKER) {
                    if let Some(bytes) = hex_decode(hex) {
                        return Value::Custom(bytes);
                    }
                }
            }
            Value::Object(attrs.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
