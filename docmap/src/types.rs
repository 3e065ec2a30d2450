// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attribute types: casting raw document values and representing them again.
//!
//! There are two representations besides [`Value`] itself:
//!
//! *   the dict representation, a [`serde_json::Value`], shared by the hash,
//!     JSON, YAML, and TOML formats;
//! *   the text representation used for XML attribute values and character
//!     data.
//!
//! Composite (model) types are handled by the traversal in [`crate::de`] and
//! [`crate::ser`]; here they only pass through.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as Json;

use crate::error::CastError;
use crate::model::Model;
use crate::value::Value;

/// Inputs which cast to `false`; every other non-nil value is `true`.
const FALSY: &[&str] = &["0", "f", "F", "false", "FALSE", "off", "OFF"];

/// A user-defined scalar type.
///
/// The provided methods handle the dict and text representations of the
/// scalar [`Value`] variants; override them when the cast produces something
/// else or needs a particular rendering.
pub trait ValueType: Send + Sync {
    fn name(&self) -> &str;

    /// Coerces a raw (already format-extracted) value; never called with `Nil`.
    fn cast(&self, value: Value) -> Result<Value, CastError>;

    fn to_dict(&self, value: &Value) -> Result<Json, CastError> {
        scalar_to_dict(value)
    }

    fn to_text(&self, value: &Value) -> Result<String, CastError> {
        scalar_to_text(value)
    }
}

/// The type of an attribute.
#[derive(Clone)]
pub enum Type {
    String,
    Integer,
    Float,
    Boolean,
    Date,

    /// A point in time with a UTC offset.
    Time,
    Decimal,

    Custom(Arc<dyn ValueType>),

    /// A nested mapped class.
    ///
    /// This is a function rather than a reference so models can refer to
    /// themselves or to each other before they are constructed.
    Model(fn() -> &'static Model),
}

impl Type {
    pub fn name(&self) -> &str {
        match self {
            Type::String => "String",
            Type::Integer => "Integer",
            Type::Float => "Float",
            Type::Boolean => "Boolean",
            Type::Date => "Date",
            Type::Time => "Time",
            Type::Decimal => "Decimal",
            Type::Custom(t) => t.name(),
            Type::Model(m) => m().name(),
        }
    }

    /// Returns the nested model, if this is a composite type.
    #[inline]
    pub fn model(&self) -> Option<&'static Model> {
        match self {
            Type::Model(m) => Some(m()),
            _ => None,
        }
    }

    /// Coerces `value` to this type.
    ///
    /// `Nil` always casts to `Nil`. Collections cast element-wise.
    pub fn cast(&self, value: Value) -> Result<Value, CastError> {
        match value {
            Value::Nil => return Ok(Value::Nil),
            Value::Collection(items) => {
                return items
                    .into_iter()
                    .map(|v| self.cast(v))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Collection)
            }
            _ => {}
        }
        match self {
            Type::String => cast_string(value),
            Type::Integer => cast_integer(value),
            Type::Float => cast_float(value),
            Type::Boolean => Ok(cast_boolean(value)),
            Type::Date => cast_date(value),
            Type::Time => cast_time(value),
            Type::Decimal => cast_decimal(value),
            Type::Custom(t) => t.cast(value),
            Type::Model(m) => match value {
                v @ Value::Model(_) => Ok(v),
                other => Err(CastError::new(m().name(), &other, "expected a nested object")),
            },
        }
    }

    /// Extracts a raw scalar from its dict representation and casts it.
    pub fn of_dict(&self, raw: &Json) -> Result<Value, CastError> {
        self.cast(json_to_value(raw))
    }

    /// Represents a scalar for the dict formats.
    pub fn to_dict(&self, value: &Value) -> Result<Json, CastError> {
        match self {
            Type::Custom(t) => t.to_dict(value),
            _ => scalar_to_dict(value),
        }
    }

    /// Extracts a raw scalar from XML text and casts it.
    pub fn of_text(&self, text: &str) -> Result<Value, CastError> {
        self.cast(Value::String(text.to_owned()))
    }

    /// Represents a scalar as XML text.
    pub fn to_text(&self, value: &Value) -> Result<String, CastError> {
        match self {
            Type::Custom(t) => t.to_text(value),
            _ => scalar_to_text(value),
        }
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Converts a dict scalar into a raw value, prior to casting.
///
/// Arrays become collections; objects have no scalar meaning and become their
/// JSON text.
fn json_to_value(raw: &Json) -> Value {
    match raw {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(a) => Value::Collection(a.iter().map(json_to_value).collect()),
        Json::Object(_) => Value::String(raw.to_string()),
    }
}

fn scalar_to_dict(value: &Value) -> Result<Json, CastError> {
    Ok(match value {
        Value::Nil => Json::Null,
        Value::String(s) => Json::String(s.clone()),
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => float_to_json(*f, value)?,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Decimal(d) => float_to_json(
            d.to_f64()
                .ok_or_else(|| CastError::new("Decimal", d, "out of float range"))?,
            value,
        )?,
        Value::Collection(items) => Json::Array(
            items
                .iter()
                .filter(|v| !v.is_nil())
                .map(scalar_to_dict)
                .collect::<Result<_, _>>()?,
        ),
        Value::Model(_) => {
            return Err(CastError::new("scalar", value, "nested objects aren't scalars"))
        }
    })
}

fn float_to_json(f: f64, original: &Value) -> Result<Json, CastError> {
    serde_json::Number::from_f64(f)
        .map(Json::Number)
        .ok_or_else(|| CastError::new("Float", original, "not representable in JSON"))
}

fn scalar_to_text(value: &Value) -> Result<String, CastError> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Value::Decimal(d) => d.normalize().to_string(),
        Value::Collection(items) => items
            .iter()
            .filter(|v| !v.is_nil())
            .map(scalar_to_text)
            .collect::<Result<Vec<_>, _>>()?
            .join(" "),
        Value::Model(_) => {
            return Err(CastError::new("scalar", value, "nested objects aren't scalars"))
        }
    })
}

fn cast_string(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::String(_) => Ok(v),
        other => scalar_to_text(&other).map(Value::String),
    }
}

fn cast_integer(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::Integer(_) => Ok(v),
        Value::Float(f) => truncate(f)
            .map(Value::Integer)
            .ok_or_else(|| CastError::new("Integer", f, "out of range")),
        Value::Decimal(d) => d
            .trunc()
            .to_i64()
            .map(Value::Integer)
            .ok_or_else(|| CastError::new("Integer", d, "out of range")),
        Value::String(s) => {
            let t = s.trim();
            match i64::from_str(t) {
                Ok(i) => Ok(Value::Integer(i)),
                // "1.5" and "1e3" are acceptable integers, truncated.
                Err(e) => match f64::from_str(t) {
                    Ok(f) => truncate(f)
                        .map(Value::Integer)
                        .ok_or_else(|| CastError::new("Integer", &s, "out of range")),
                    Err(_) => Err(CastError::new("Integer", &s, e)),
                },
            }
        }
        other => Err(CastError::new("Integer", &other, "not numeric")),
    }
}

/// Truncates toward zero; `None` if the result doesn't fit an `i64`.
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    // `i64::MAX as f64` rounds up to 2^63, the first value out of range.
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn cast_float(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::Float(_) => Ok(v),
        Value::Integer(i) => Ok(Value::Float(i as f64)),
        Value::Decimal(d) => d
            .to_f64()
            .map(Value::Float)
            .ok_or_else(|| CastError::new("Float", d, "out of range")),
        Value::String(s) => f64::from_str(s.trim())
            .map(Value::Float)
            .map_err(|e| CastError::new("Float", &s, e)),
        other => Err(CastError::new("Float", &other, "not numeric")),
    }
}

/// Casts to a boolean: anything but the fixed falsy set is true, including
/// the empty string.
fn cast_boolean(value: Value) -> Value {
    let b = match &value {
        Value::Boolean(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Decimal(d) => !d.is_zero(),
        Value::String(s) => !FALSY.contains(&s.as_str()),
        _ => true,
    };
    Value::Boolean(b)
}

fn cast_date(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::Date(_) => Ok(v),
        Value::Time(t) => Ok(Value::Date(t.date_naive())),
        Value::String(s) => {
            let t = s.trim();
            NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .or_else(|e| {
                    DateTime::parse_from_rfc3339(t)
                        .map(|dt| dt.date_naive())
                        .map_err(|_| e)
                })
                .map(Value::Date)
                .map_err(|e| CastError::new("Date", &s, e))
        }
        other => Err(CastError::new("Date", &other, "not a date")),
    }
}

fn cast_time(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::Time(_) => Ok(v),
        Value::Date(d) => Ok(Value::Time(d.and_time(NaiveTime::MIN).and_utc().fixed_offset())),
        Value::String(s) => {
            let t = s.trim();
            DateTime::parse_from_rfc3339(t)
                .or_else(|e| {
                    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
                        .map(|n| n.and_utc().fixed_offset())
                        .map_err(|_| e)
                })
                .map(Value::Time)
                .map_err(|e| CastError::new("Time", &s, e))
        }
        other => Err(CastError::new("Time", &other, "not a time")),
    }
}

fn cast_decimal(value: Value) -> Result<Value, CastError> {
    match value {
        v @ Value::Decimal(_) => Ok(v),
        Value::Integer(i) => Ok(Value::Decimal(Decimal::from(i))),
        // Going through the shortest round-trip text keeps 12.34 from turning
        // into 12.339999999999999857891452847979962825775146484375.
        Value::Float(f) => Decimal::from_str(&f.to_string())
            .or_else(|_| Decimal::from_scientific(&format!("{:e}", f)))
            .map(Value::Decimal)
            .map_err(|e| CastError::new("Decimal", f, e)),
        Value::String(s) => {
            let t = s.trim();
            Decimal::from_str(t)
                .or_else(|e| Decimal::from_scientific(t).map_err(|_| e))
                .map(Value::Decimal)
                .map_err(|e| CastError::new("Decimal", &s, e))
        }
        other => Err(CastError::new("Decimal", &other, "not numeric")),
    }
}
