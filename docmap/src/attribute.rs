// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-model attribute registry.

use indexmap::IndexMap;

use crate::types::Type;
use crate::value::Value;

/// A declared attribute: name, type, whether it repeats, and its default.
#[derive(Clone, Debug)]
pub struct Attribute {
    name: String,
    ty: Type,
    collection: bool,
    default: Option<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Attribute {
            name: name.into(),
            ty,
            collection: false,
            default: None,
        }
    }

    /// Marks this attribute as holding an ordered sequence of values.
    pub fn collection(self) -> Self {
        Self {
            collection: true,
            ..self
        }
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
            ..self
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// The value a fresh instance starts with.
    pub(crate) fn initial_value(&self) -> Value {
        match (&self.default, self.collection) {
            (Some(d), _) => d.clone(),
            (None, true) => Value::Collection(Vec::new()),
            (None, false) => Value::Nil,
        }
    }
}

/// The attributes of one model, unique by name.
///
/// Order is preserved; it's the field order of instances and of the default
/// mappings used for formats without a declared table.
#[derive(Clone, Debug, Default)]
pub struct AttributeRegistry(IndexMap<String, Attribute>);

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `attribute`, replacing (in place) any earlier one of the same name.
    pub fn define(&mut self, attribute: Attribute) -> &mut Self {
        self.0.insert(attribute.name.clone(), attribute);
        self
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
