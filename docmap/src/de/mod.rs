// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deserialization: documents to instances.
//!
//! Both directions walk the document, not the table: each document field is
//! looked up in the model's mapping table and skipped if nothing maps it.
//! Grouped fields are held back until the whole element (or map) has been
//! seen, then handed to their group's `from` method once.

use log::trace;
use serde_json::Value as Json;

use crate::attribute::Attribute;
use crate::codec::Format;
use crate::config;
use crate::error::Error;
use crate::group::{DictGroups, XmlGroups};
use crate::mapping::xml::{XmlInput, XmlKind, XmlMapping, XmlRule};
use crate::mapping::Receiver;
use crate::model::Model;
use crate::types::Type;
use crate::value::{Instance, Value};
use crate::xml::Node;

/// Bounds recursion into nested composites.
///
/// The root is depth 0; each nested model adds one.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Depth {
    level: usize,
    limit: usize,
}

impl Depth {
    pub(crate) fn new() -> Self {
        Depth {
            level: 0,
            limit: config::max_depth(),
        }
    }

    pub(crate) fn descend(self) -> Result<Self, Error> {
        if self.level >= self.limit {
            return Err(Error::DepthExceeded { limit: self.limit });
        }
        Ok(Depth {
            level: self.level + 1,
            ..self
        })
    }
}

fn json_kind(v: &Json) -> String {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "a map",
    }
    .to_owned()
}

/// Hands `value` to the binding's receiver, or assigns it. Collection
/// attributes append; a `Collection` value appends each member.
fn assign(
    instance: &mut Instance,
    key: &str,
    attribute: &Attribute,
    receiver: Option<&Receiver>,
    value: Value,
) -> Result<(), Error> {
    if let Some(r) = receiver {
        return r(instance, value).map_err(|e| Error::custom(key, e));
    }
    let name = attribute.name();
    if !attribute.is_collection() {
        instance.set(name, value);
        return Ok(());
    }
    match value {
        Value::Nil => {}
        Value::Collection(items) => {
            for v in items {
                instance.push(name, v);
            }
        }
        v => {
            instance.push(name, v);
        }
    }
    Ok(())
}

/// Builds an instance of `model` from a dict document.
pub fn of_dict(model: &'static Model, format: Format, doc: &Json) -> Result<Instance, Error> {
    read_dict(model, format, doc, Depth::new())
}

fn read_dict(model: &'static Model, format: Format, doc: &Json, depth: Depth) -> Result<Instance, Error> {
    let map = doc.as_object().ok_or_else(|| Error::UnexpectedShape {
        model: model.name().to_owned(),
        expected: "a map",
        got: json_kind(doc),
    })?;
    let mapping = model.dict_mapping(format);
    let mut instance = Instance::new(model);
    let mut groups = DictGroups::new();
    for (key, raw) in map {
        let rule = match mapping.find(key) {
            Some(r) => r,
            None => {
                trace!("{}: skipping unmapped key {:?}", model.name(), key);
                continue;
            }
        };
        if let Some(g) = rule.group() {
            groups.add(g, key, raw.clone());
            continue;
        }
        if let Some(m) = rule.using() {
            (m.from)(&mut instance, raw).map_err(|e| Error::custom(key, e))?;
            continue;
        }
        let attribute = match rule.to().and_then(|a| model.attributes().get(a)) {
            Some(a) => a,
            None => {
                trace!("{}: {:?} maps to no attribute; skipping", model.name(), key);
                continue;
            }
        };
        let value = if attribute.is_collection() {
            let items = match raw {
                Json::Null => continue,
                Json::Array(items) => items
                    .iter()
                    .filter(|i| !i.is_null())
                    .map(|i| dict_value(attribute.ty(), i, format, depth))
                    .collect::<Result<Vec<_>, _>>()?,
                single => vec![dict_value(attribute.ty(), single, format, depth)?],
            };
            Value::Collection(items)
        } else if raw.is_null() {
            Value::Nil
        } else {
            dict_value(attribute.ty(), raw, format, depth)?
        };
        assign(&mut instance, key, attribute, rule.receiver(), value)?;
    }
    for (g, bucket) in groups.each() {
        if let Some(m) = mapping.group_methods(g) {
            let key = bucket.keys().next().map(String::as_str).unwrap_or("group");
            (m.from)(&mut instance, &Json::Object(bucket.clone())).map_err(|e| Error::custom(key, e))?;
        }
    }
    Ok(instance)
}

fn dict_value(ty: &Type, raw: &Json, format: Format, depth: Depth) -> Result<Value, Error> {
    match ty.model() {
        Some(m) => Ok(Value::from(read_dict(m, format, raw, depth.descend()?)?)),
        None => Ok(ty.of_dict(raw)?),
    }
}

/// Builds an instance of `model` from an element.
///
/// Attributes are read first, then the element's text (if the table maps
/// content), then child elements in document order.
pub fn of_xml(model: &'static Model, element: Node<'_>) -> Result<Instance, Error> {
    read_xml(model, element, Depth::new())
}

fn read_xml(model: &'static Model, element: Node<'_>, depth: Depth) -> Result<Instance, Error> {
    let mapping = model.xml_mapping();
    let mut instance = Instance::new(model);
    let mut groups = XmlGroups::new();
    for (name, text) in element.attributes() {
        match mapping.find_attribute(&name) {
            Some(rule) => read_text(model, mapping, rule, &mut instance, &mut groups, text)?,
            None => trace!("{}: skipping unmapped attribute {}", model.name(), name),
        }
    }
    if let (Some(rule), Some(text)) = (mapping.content(), element.text()) {
        read_text(model, mapping, rule, &mut instance, &mut groups, text)?;
    }
    for child in element.children() {
        let name = child.name();
        let rule = match mapping.find_element(&name) {
            Some(r) => r,
            None => {
                trace!("{}: skipping unmapped element {}", model.name(), name);
                continue;
            }
        };
        let key = mapping.key(rule);
        if let Some(g) = rule.group() {
            let text = child.text().unwrap_or_default().to_owned();
            groups.add(g, XmlKind::Element, &key, text);
            continue;
        }
        if let Some(m) = rule.using() {
            (m.from)(&mut instance, XmlInput::Element(child)).map_err(|e| Error::custom(&key, e))?;
            continue;
        }
        let attribute = match rule.to().and_then(|a| model.attributes().get(a)) {
            Some(a) => a,
            None => {
                trace!("{}: {} maps to no attribute; skipping", model.name(), key);
                continue;
            }
        };
        let value = match attribute.ty().model() {
            Some(m) => Value::from(read_xml(m, child, depth.descend()?)?),
            None => match child.text() {
                None | Some("") => Value::Nil,
                Some(text) => attribute.ty().of_text(text)?,
            },
        };
        if value.is_nil() && attribute.is_collection() && rule.receiver().is_none() {
            continue;
        }
        assign(&mut instance, &key, attribute, rule.receiver(), value)?;
    }
    for (g, values) in groups.each() {
        if let Some(m) = mapping.group_methods(g) {
            (m.from)(&mut instance, values).map_err(|e| Error::custom("group", e))?;
        }
    }
    Ok(instance)
}

/// Reads an attribute value or the element's content.
fn read_text(
    model: &Model,
    mapping: &XmlMapping,
    rule: &XmlRule,
    instance: &mut Instance,
    groups: &mut XmlGroups,
    text: &str,
) -> Result<(), Error> {
    let key = mapping.key(rule);
    if let Some(g) = rule.group() {
        groups.add(g, rule.kind(), &key, text.to_owned());
        return Ok(());
    }
    if let Some(m) = rule.using() {
        return (m.from)(instance, XmlInput::Text(text)).map_err(|e| Error::custom(&key, e));
    }
    let attribute = match rule.to().and_then(|a| model.attributes().get(a)) {
        Some(a) => a,
        None => {
            trace!("{}: {} maps to no attribute; skipping", model.name(), key);
            return Ok(());
        }
    };
    let ty = attribute.ty();
    if ty.model().is_some() {
        return Err(Error::UnexpectedShape {
            model: model.name().to_owned(),
            expected: "an element for a nested model",
            got: format!("text for {}", key),
        });
    }
    let value = if attribute.is_collection() && rule.kind() == XmlKind::Attribute {
        Value::Collection(
            text.split_whitespace()
                .map(|t| ty.of_text(t))
                .collect::<Result<Vec<_>, _>>()?,
        )
    } else if text.is_empty() {
        Value::Nil
    } else {
        ty.of_text(text)?
    };
    assign(instance, &key, attribute, rule.receiver(), value)
}
