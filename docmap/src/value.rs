// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime values held by mapped objects.

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use log::trace;
use rust_decimal::Decimal;

use crate::model::Model;

/// A single attribute value.
///
/// `Nil` means "absent"; it is never the result of casting a present value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(DateTime<FixedOffset>),
    Decimal(Decimal),

    /// A nested mapped object.
    Model(Box<Instance>),

    /// The value of a collection attribute, in document order.
    Collection(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// A short description of the variant, for error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Decimal(_) => "decimal",
            Value::Model(_) => "model",
            Value::Collection(_) => "collection",
        }
    }
}

macro_rules! value_from {
    ( $t:ty, $variant:ident ) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}

value_from!(String, String);
value_from!(&str, String);
value_from!(i64, Integer);
value_from!(i32, Integer);
value_from!(u32, Integer);
value_from!(f64, Float);
value_from!(f32, Float);
value_from!(bool, Boolean);
value_from!(NaiveDate, Date);
value_from!(DateTime<FixedOffset>, Time);
value_from!(Decimal, Decimal);

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Model(Box::new(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Collection(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// An object of a mapped class.
///
/// Holds one [`Value`] per attribute of its [`Model`]'s registry, in
/// registry order. Attributes the registry doesn't define can't be set.
#[derive(Clone)]
pub struct Instance {
    model: &'static Model,
    values: IndexMap<String, Value>,
}

impl Instance {
    /// Creates an instance with every attribute at its initial value.
    ///
    /// Collection attributes start empty (never `Nil`), so values can always
    /// be appended; others take their declared default or `Nil`.
    pub fn new(model: &'static Model) -> Self {
        let values = model
            .attributes()
            .iter()
            .map(|a| (a.name().to_owned(), a.initial_value()))
            .collect();
        Instance { model, values }
    }

    #[inline]
    pub fn model(&self) -> &'static Model {
        self.model
    }

    /// Returns the value of `name`, or `None` if the model has no such attribute.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Sets `name`, returning false (and changing nothing) if the model has no
    /// such attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => {
                trace!("{} has no attribute {:?}; ignoring set", self.model.name(), name);
                false
            }
        }
    }

    /// Appends to the collection `name`.
    ///
    /// If the current value isn't a collection (e.g. it was explicitly set to
    /// `Nil`), it's replaced by a collection holding only `value`.
    pub fn push(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let Some(slot) = self.values.get_mut(name) else {
            trace!("{} has no attribute {:?}; ignoring push", self.model.name(), name);
            return false;
        };
        match slot {
            Value::Collection(items) => items.push(value.into()),
            other => *other = Value::Collection(vec![value.into()]),
        }
        true
    }

    /// Iterates over `(attribute name, value)` in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.model, other.model) && self.values == other.values
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct(self.model.name());
        for (k, v) in &self.values {
            s.field(k, v);
        }
        s.finish()
    }
}
