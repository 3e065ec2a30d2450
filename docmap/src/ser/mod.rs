// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialization: instances to documents.
//!
//! Output follows table order. Each group's `to` method runs once, before
//! any binding is written; its fields then land where their bindings were
//! declared.

use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Value as Json};

use crate::codec::Format;
use crate::de::Depth;
use crate::error::Error;
use crate::group::XmlGroupValues;
use crate::mapping::xml::{XmlKind, XmlMapping, XmlRule};
use crate::mapping::{GroupId, Namespace};
use crate::model::Model;
use crate::types::Type;
use crate::value::{Instance, Value};
use crate::xml::{Builder, ElementId};

fn unexpected_group_value(model: &Model, got: &Json) -> Error {
    Error::UnexpectedShape {
        model: model.name().to_owned(),
        expected: "a map from a group method",
        got: got.to_string(),
    }
}

/// Writes `instance` as a dict document using `model`'s table for `format`.
pub fn as_dict(model: &Model, format: Format, instance: &Instance) -> Result<Json, Error> {
    write_dict(model, format, instance, Depth::new())
}

fn write_dict(model: &Model, format: Format, instance: &Instance, depth: Depth) -> Result<Json, Error> {
    let mapping = model.dict_mapping(format);
    let mut grouped: IndexMap<GroupId, Map<String, Json>> = IndexMap::new();
    for (g, m) in mapping.groups() {
        let bucket = match (m.to)(instance).map_err(|e| Error::custom("group", e))? {
            Json::Object(map) => map,
            Json::Null => Map::new(),
            other => return Err(unexpected_group_value(model, &other)),
        };
        grouped.insert(*g, bucket);
    }

    let mut out = Map::new();
    for rule in mapping.rules() {
        let key = rule.key();
        let renders_nil = mapping.renders_nil(rule);
        if let Some(g) = rule.group() {
            if let Some(v) = grouped.get(&g).and_then(|b| b.get(key)) {
                if !v.is_null() || renders_nil {
                    out.insert(key.to_owned(), v.clone());
                }
            }
            continue;
        }
        if let Some(m) = rule.using() {
            let v = (m.to)(instance).map_err(|e| Error::custom(key, e))?;
            if !v.is_null() || renders_nil {
                out.insert(key.to_owned(), v);
            }
            continue;
        }
        let attribute = match rule.to().and_then(|a| model.attributes().get(a)) {
            Some(a) => a,
            None => {
                trace!("{}: {:?} maps to no attribute; skipping", model.name(), key);
                continue;
            }
        };
        let value = instance.get(attribute.name()).unwrap_or(&Value::Nil);
        let written = match value {
            Value::Nil if renders_nil => Json::Null,
            Value::Nil => continue,
            Value::Collection(items) => Json::Array(
                items
                    .iter()
                    .filter(|v| !v.is_nil())
                    .map(|v| dict_value(attribute.ty(), v, format, depth))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            v if attribute.is_collection() => Json::Array(vec![dict_value(attribute.ty(), v, format, depth)?]),
            v => dict_value(attribute.ty(), v, format, depth)?,
        };
        out.insert(key.to_owned(), written);
    }
    Ok(Json::Object(out))
}

fn dict_value(ty: &Type, value: &Value, format: Format, depth: Depth) -> Result<Json, Error> {
    match (ty.model(), value) {
        (Some(_), Value::Model(inner)) => write_dict(inner.model(), format, inner, depth.descend()?),
        _ => Ok(ty.to_dict(value)?),
    }
}

/// Writes `instance` as an element named by `model`'s root, appended to
/// `parent` if given.
pub fn as_xml(
    model: &Model,
    instance: &Instance,
    builder: &mut Builder,
    parent: Option<ElementId>,
) -> Result<ElementId, Error> {
    let mapping = model.xml_mapping();
    let name = mapping.root_name().unwrap_or(model.name());
    write_xml(model, instance, builder, parent, mapping.default_namespace(), name, Depth::new())
}

/// Writes `instance` as an element named `local_name` in `namespace`. The
/// name is chosen by the caller: the root, or the parent's binding.
fn write_xml(
    model: &Model,
    instance: &Instance,
    builder: &mut Builder,
    parent: Option<ElementId>,
    namespace: Option<&Namespace>,
    local_name: &str,
    depth: Depth,
) -> Result<ElementId, Error> {
    let mapping = model.xml_mapping();
    let element = builder.create_qualified_element(namespace, local_name);
    if let Some(p) = parent {
        builder.add_element(p, element);
    }
    if let Some(ns) = mapping.default_namespace() {
        builder.declare_namespace(element, ns.prefix.as_deref(), &ns.uri);
    }

    let mut grouped: IndexMap<GroupId, XmlGroupValues> = IndexMap::new();
    for (g, m) in mapping.groups() {
        let values = (m.to)(instance).map_err(|e| Error::custom("group", e))?;
        grouped.insert(*g, values);
    }

    for rule in mapping.rules() {
        if let Some(g) = rule.group() {
            if let Some(values) = grouped.get(&g) {
                write_grouped(mapping, rule, values, builder, element);
            }
            continue;
        }
        if let Some(m) = rule.using() {
            declare(mapping, rule, builder, element);
            (m.to)(instance, &mut *builder, element).map_err(|e| Error::custom(&mapping.key(rule), e))?;
            continue;
        }
        let attribute = match rule.to().and_then(|a| model.attributes().get(a)) {
            Some(a) => a,
            None => {
                trace!("{}: {} maps to no attribute; skipping", model.name(), mapping.key(rule));
                continue;
            }
        };
        let value = instance.get(attribute.name()).unwrap_or(&Value::Nil);
        let renders_nil = mapping.renders_nil(rule);
        if value.is_nil() && !renders_nil {
            continue;
        }
        let ty = attribute.ty();
        match rule.kind() {
            XmlKind::Attribute => {
                let text = match value {
                    Value::Model(_) => {
                        return Err(Error::UnexpectedShape {
                            model: model.name().to_owned(),
                            expected: "a scalar for an XML attribute",
                            got: value.kind().to_owned(),
                        })
                    }
                    Value::Collection(items) => {
                        let texts = items
                            .iter()
                            .filter(|v| !v.is_nil())
                            .map(|v| ty.to_text(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        if texts.is_empty() && !renders_nil {
                            continue;
                        }
                        texts.join(" ")
                    }
                    v => text_of(ty, v)?,
                };
                let ns = declare(mapping, rule, builder, element);
                builder.add_qualified_attribute(element, ns, rule.name(), &text);
            }
            XmlKind::Content => {
                let text = text_of(ty, value)?;
                write_text(builder, element, &text, rule.cdata());
            }
            XmlKind::Element => {
                let ns = declare(mapping, rule, builder, element);
                match value {
                    Value::Collection(items) => {
                        for v in items.iter().filter(|v| !v.is_nil()) {
                            write_element(ty, v, rule, ns, builder, element, depth)?;
                        }
                    }
                    v => write_element(ty, v, rule, ns, builder, element, depth)?,
                }
            }
        }
    }
    Ok(element)
}

/// Asks for the binding's namespace to be declared on the model's element,
/// and returns it.
fn declare<'m>(
    mapping: &'m XmlMapping,
    rule: &'m XmlRule,
    builder: &mut Builder,
    element: ElementId,
) -> Option<&'m Namespace> {
    let ns = mapping.rule_namespace(rule);
    if let Some(ns) = ns {
        builder.declare_namespace(element, ns.prefix.as_deref(), &ns.uri);
    }
    ns
}

/// Text for a scalar; empty for `Nil`.
fn text_of(ty: &Type, value: &Value) -> Result<String, Error> {
    match value {
        Value::Nil => Ok(String::new()),
        v => Ok(ty.to_text(v)?),
    }
}

fn write_text(builder: &mut Builder, element: ElementId, text: &str, cdata: bool) {
    if text.is_empty() {
        return;
    }
    if cdata {
        builder.create_cdata(text, element);
    } else {
        builder.add_text(element, text);
    }
}

/// Writes one child element: a nested model, or a scalar (empty for `Nil`).
fn write_element(
    ty: &Type,
    value: &Value,
    rule: &XmlRule,
    namespace: Option<&Namespace>,
    builder: &mut Builder,
    parent: ElementId,
    depth: Depth,
) -> Result<(), Error> {
    if let (Some(_), Value::Model(inner)) = (ty.model(), value) {
        write_xml(inner.model(), inner, builder, Some(parent), namespace, rule.name(), depth.descend()?)?;
        return Ok(());
    }
    let child = builder.create_qualified_element(namespace, rule.name());
    builder.add_element(parent, child);
    let text = text_of(ty, value)?;
    write_text(builder, child, &text, rule.cdata());
    Ok(())
}

fn write_grouped(
    mapping: &XmlMapping,
    rule: &XmlRule,
    values: &XmlGroupValues,
    builder: &mut Builder,
    element: ElementId,
) {
    let key = mapping.key(rule);
    match rule.kind() {
        XmlKind::Attribute => {
            if let Some(v) = values.attribute(&key) {
                let ns = declare(mapping, rule, builder, element);
                builder.add_qualified_attribute(element, ns, rule.name(), v);
            }
        }
        XmlKind::Content => {
            if let Some(v) = &values.content {
                write_text(builder, element, v, rule.cdata());
            }
        }
        XmlKind::Element => {
            if let Some(vs) = values.elements.get(&key) {
                let ns = declare(mapping, rule, builder, element);
                for v in vs {
                    let child = builder.create_qualified_element(ns, rule.name());
                    builder.add_element(element, child);
                    write_text(builder, child, v, rule.cdata());
                }
            }
        }
    }
}
