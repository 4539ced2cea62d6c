//! # Typecasting
//!
//! Built-in cast rules for the scalar type tags plus two process-wide
//! registries: typecasters (looked up by type name) and normalizers (looked up
//! by the name given in an attribute declaration). Lookups happen once, when a
//! model is declared; a miss is a configuration error surfaced by the registry
//! builder, never at read time.
//!
//! A cast returns `None` when the input has no sensible conversion. The
//! attribute pipeline turns that into a `nil` read, it is not an error:
//! correctness enforcement belongs to validations layered on top.

use crate::error::{InlayError, Result};
use crate::value::Value;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// A scalar cast rule. `None` means the value cannot be cast.
pub type CastFn = fn(&Value) -> Option<Value>;

/// A normalizer runs after casting and enum filtering; for collection
/// attributes it receives the whole cast `Value::Array`.
pub type NormalizerFn = fn(Value) -> Value;

static TYPECASTERS: Lazy<RwLock<HashMap<String, CastFn>>> = Lazy::new(|| {
    let mut map: HashMap<String, CastFn> = HashMap::new();
    map.insert("Object".to_string(), cast_object);
    map.insert("String".to_string(), cast_string);
    map.insert("Integer".to_string(), cast_integer);
    map.insert("Float".to_string(), cast_float);
    map.insert("Boolean".to_string(), cast_boolean);
    map.insert("UUID".to_string(), cast_uuid);
    map.insert("Time".to_string(), cast_time);
    RwLock::new(map)
});

static NORMALIZERS: Lazy<RwLock<HashMap<String, NormalizerFn>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers (or replaces) a typecaster under a type name. Attributes declared
/// with `AttrType::Custom(name)` resolve against this registry.
pub fn register_typecaster(name: &str, cast: CastFn) {
    if let Ok(mut map) = TYPECASTERS.write() {
        map.insert(name.to_string(), cast);
    }
}

/// Registers (or replaces) a named normalizer.
pub fn register_normalizer(name: &str, normalize: NormalizerFn) {
    if let Ok(mut map) = NORMALIZERS.write() {
        map.insert(name.to_string(), normalize);
    }
}

pub fn typecaster(name: &str) -> Result<CastFn> {
    TYPECASTERS
        .read()
        .ok()
        .and_then(|map| map.get(name).copied())
        .ok_or_else(|| InlayError::TypecasterMissing(name.to_string()))
}

pub fn normalizer(name: &str) -> Result<NormalizerFn> {
    NORMALIZERS
        .read()
        .ok()
        .and_then(|map| map.get(name).copied())
        .ok_or_else(|| InlayError::NormalizerMissing(name.to_string()))
}

fn cast_object(value: &Value) -> Option<Value> {
    Some(value.clone())
}

fn cast_string(value: &Value) -> Option<Value> {
    value.display_text().map(Value::Str)
}

fn cast_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Int(n) => Some(Value::Int(*n)),
        Value::Float(f) if f.is_finite() => Some(Value::Int(f.trunc() as i64)),
        Value::Str(s) => {
            if let Ok(n) = s.parse::<i64>() {
                Some(Value::Int(n))
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| Value::Int(f.trunc() as i64))
            }
        }
        _ => None,
    }
}

fn cast_float(value: &Value) -> Option<Value> {
    match value {
        Value::Float(f) => Some(Value::Float(*f)),
        Value::Int(n) => Some(Value::Float(*n as f64)),
        Value::Str(s) => s.parse::<f64>().ok().map(Value::Float),
        _ => None,
    }
}

// The literal set is fixed; anything outside it fails rather than being
// truthy-coerced.
fn cast_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Int(1) => Some(Value::Bool(true)),
        Value::Int(0) => Some(Value::Bool(false)),
        Value::Str(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "t" | "yes" | "y" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "f" | "no" | "n" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn cast_uuid(value: &Value) -> Option<Value> {
    match value {
        Value::Uuid(u) => Some(Value::Uuid(*u)),
        Value::Str(s) => Uuid::parse_str(s).ok().map(Value::Uuid),
        Value::Int(n) if *n >= 0 => Some(Value::Uuid(Uuid::from_u128(*n as u128))),
        _ => None,
    }
}

fn cast_time(value: &Value) -> Option<Value> {
    match value {
        Value::Time(t) => Some(Value::Time(*t)),
        Value::Str(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| Value::Time(t.with_timezone(&Utc))),
        Value::Int(n) => Utc.timestamp_opt(*n, 0).single().map(Value::Time),
        _ => None,
    }
}
