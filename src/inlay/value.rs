//! # Values
//!
//! [`Value`] is the closed set of things an attribute slot can hold: the raw
//! input a caller wrote, the canonical result of a typecast, and the
//! JSON-compatible tree an embedded record serializes into. One enum covers
//! all three roles so the typecast pipeline and the association layer can pass
//! data around without generics.
//!
//! ## JSON bridge
//!
//! [`Value::from_json`] / [`Value::to_json`] convert to and from
//! `serde_json::Value`. The bridge is lossy in one direction: `Uuid`, `Time`
//! and `Record` serialize to strings/objects and come back as `Str`/`Map`.
//! The typecast pipeline re-canonicalizes them on the next read, so
//! attribute-level round-trips still hold.

use crate::record::Instance;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A dynamically typed attribute value.
///
/// `Map` keeps insertion order (it is a pair list, not a hash map) so
/// serialized forms list attributes in declaration order; equality between
/// maps is order-insensitive.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Uuid(Uuid),
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
    Record(Instance),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rails-flavored presence: `Null`, `false`, the empty string and empty
    /// containers are not present, everything else is.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(pairs) => !pairs.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Instance> {
        match self {
            Value::Record(instance) => Some(instance),
            _ => None,
        }
    }

    /// Looks a key up in a `Map` value.
    pub fn map_get(&self, key: &str) -> Option<&Value> {
        self.as_map()
            .and_then(|pairs| pairs.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v)
    }

    /// The value's own string representation, used by the `String` typecast.
    /// Sequences, maps and records have none.
    pub fn display_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Uuid(u) => Some(u.to_string()),
            Value::Time(t) => Some(t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Array(_) | Value::Map(_) | Value::Record(_) => None,
        }
    }

    /// The name used in type mismatch messages: the model name for records,
    /// the variant name for everything else.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "nil".to_string(),
            Value::Bool(_) => "Boolean".to_string(),
            Value::Int(_) => "Integer".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Uuid(_) => "UUID".to_string(),
            Value::Time(_) => "Time".to_string(),
            Value::Array(_) => "Array".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::Record(instance) => instance.model_name(),
        }
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(pairs) => Value::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Time(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(pairs) => serde_json::Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Record(instance) => instance.attributes().to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
            }
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Record(instance) => write!(f, "{}", instance),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Value {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Value {
        Value::Time(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::Array(items)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Value {
        Value::Record(instance)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Value {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_follows_blankness_rules() {
        assert!(!Value::Null.is_present());
        assert!(!Value::Bool(false).is_present());
        assert!(!Value::Str(String::new()).is_present());
        assert!(!Value::Array(vec![]).is_present());
        assert!(Value::Int(0).is_present());
        assert!(Value::from("x").is_present());
    }

    #[test]
    fn map_equality_ignores_pair_order() {
        let a = Value::from_json(json!({"title": "Genesis", "kind": "album"}));
        let b = Value::Map(vec![
            ("kind".into(), Value::from("album")),
            ("title".into(), Value::from("Genesis")),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn json_round_trip_preserves_scalars_and_nesting() {
        let source = json!({"a": [1, 2.5, "x", null, true], "b": {"c": 3}});
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn display_text_exists_only_for_scalars() {
        assert_eq!(Value::Int(42).display_text().as_deref(), Some("42"));
        assert_eq!(Value::Bool(false).display_text().as_deref(), Some("false"));
        assert_eq!(Value::from("").display_text().as_deref(), Some(""));
        assert_eq!(Value::Array(vec![]).display_text(), None);
        assert_eq!(Value::Null.display_text(), None);
    }

    #[test]
    fn map_get_finds_values_by_key() {
        let value = Value::from_json(json!({"title": "Genesis"}));
        assert_eq!(value.map_get("title"), Some(&Value::from("Genesis")));
        assert_eq!(value.map_get("missing"), None);
    }
}
