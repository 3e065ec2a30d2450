// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapped classes and their conversion surface.

use indexmap::IndexMap;
use log::{debug, trace};
use once_cell::sync::OnceCell;
use serde_json::Value as Json;

use crate::attribute::{Attribute, AttributeRegistry};
use crate::codec::{DumpOptions, Format};
use crate::error::{Error, MappingError};
use crate::mapping::dict::DictMapping;
use crate::mapping::xml::XmlMapping;
use crate::value::Instance;
use crate::xml::{Builder, ElementId, Node, ParseError, TextPosition, XmlOptions};
use crate::{config, de, ser};

/// A declared table, and whether it was copied from a parent model.
#[derive(Clone, Debug)]
struct Declared<T> {
    table: T,
    inherited: bool,
}

/// A mapped class: its attributes and one mapping table per format.
///
/// Models are built once, then live for the rest of the process; the
/// conversions that create instances take `&'static self`. The usual home is
/// a `static` behind [`once_cell::sync::Lazy`]:
///
/// ```rust
/// use docmap::{Attribute, AttributeRegistry, Bind, Model, Type, XmlMapping, XmlOptions};
/// use once_cell::sync::Lazy;
///
/// static NOTE: Lazy<Model> = Lazy::new(|| {
///     let mut attributes = AttributeRegistry::new();
///     attributes.define(Attribute::new("lang", Type::String));
///     attributes.define(Attribute::new("body", Type::String));
///     let mut xml = XmlMapping::new();
///     xml.root("note").unwrap();
///     xml.map_attribute("lang", Bind::to("lang")).unwrap();
///     xml.map_content(Bind::to("body")).unwrap();
///     Model::new("Note", attributes).with_xml_mapping(xml).unwrap()
/// });
///
/// let note = NOTE.from_xml(r#"<note lang="en">hi</note>"#).unwrap();
/// assert_eq!(NOTE.to_xml(&note, XmlOptions::default()).unwrap(), r#"<note lang="en">hi</note>"#);
/// ```
#[derive(Debug)]
pub struct Model {
    name: String,
    attributes: AttributeRegistry,
    dict: IndexMap<Format, Declared<DictMapping>>,
    xml: Option<Declared<XmlMapping>>,

    // Fallback tables for formats without a declared one, built on first use.
    default_dict: OnceCell<DictMapping>,
    default_xml: OnceCell<XmlMapping>,
}

impl Model {
    pub fn new(name: impl Into<String>, attributes: AttributeRegistry) -> Self {
        Model {
            name: name.into(),
            attributes,
            dict: IndexMap::new(),
            xml: None,
            default_dict: OnceCell::new(),
            default_xml: OnceCell::new(),
        }
    }

    /// Creates a model which starts with a copy of `parent`'s attributes and tables.
    ///
    /// The copies may be extended with [`Model::extend_dict_mapping`] and
    /// [`Model::extend_xml_mapping`] or replaced outright; `parent` is never
    /// affected.
    pub fn derive(name: impl Into<String>, parent: &Model) -> Self {
        let name = name.into();
        debug!("deriving model {} from {}", name, parent.name);
        Model {
            name,
            attributes: parent.attributes.clone(),
            dict: parent
                .dict
                .iter()
                .map(|(&f, d)| {
                    let table = Declared {
                        table: d.table.clone(),
                        inherited: true,
                    };
                    (f, table)
                })
                .collect(),
            xml: parent.xml.as_ref().map(|d| Declared {
                table: d.table.clone(),
                inherited: true,
            }),
            default_dict: OnceCell::new(),
            default_xml: OnceCell::new(),
        }
    }

    /// Adds (or replaces) an attribute.
    pub fn define(mut self, attribute: Attribute) -> Self {
        self.attributes.define(attribute);
        self
    }

    /// Attaches the table for one key/value format, finalizing it.
    pub fn with_dict_mapping(mut self, format: Format, mut mapping: DictMapping) -> Result<Self, MappingError> {
        if matches!(self.dict.get(&format), Some(d) if !d.inherited) {
            return Err(MappingError::DuplicateTable {
                model: self.name.clone(),
                format: format.to_string(),
            });
        }
        mapping.finalize();
        debug!("model {}: attached {} mapping", self.name, format);
        self.dict.insert(
            format,
            Declared {
                table: mapping,
                inherited: false,
            },
        );
        Ok(self)
    }

    /// Attaches one table for every key/value format: hash, JSON, YAML, and TOML.
    pub fn with_key_value_mapping(self, mapping: DictMapping) -> Result<Self, MappingError> {
        Format::ALL
            .iter()
            .try_fold(self, |model, &f| model.with_dict_mapping(f, mapping.clone()))
    }

    pub fn with_xml_mapping(mut self, mut mapping: XmlMapping) -> Result<Self, MappingError> {
        if matches!(&self.xml, Some(d) if !d.inherited) {
            return Err(MappingError::DuplicateTable {
                model: self.name.clone(),
                format: "xml".to_owned(),
            });
        }
        mapping.finalize();
        debug!("model {}: attached xml mapping", self.name);
        self.xml = Some(Declared {
            table: mapping,
            inherited: false,
        });
        Ok(self)
    }

    /// Extends the table for `format` (or an empty one) with `f`.
    pub fn extend_dict_mapping<F>(mut self, format: Format, f: F) -> Result<Self, MappingError>
    where
        F: FnOnce(&mut DictMapping) -> Result<(), MappingError>,
    {
        let mut mapping = match self.dict.shift_remove(&format) {
            Some(d) => d.table.duplicate(),
            None => DictMapping::new(),
        };
        f(&mut mapping)?;
        self.with_dict_mapping(format, mapping)
    }

    /// Extends the XML table (or an empty one) with `f`.
    pub fn extend_xml_mapping<F>(mut self, f: F) -> Result<Self, MappingError>
    where
        F: FnOnce(&mut XmlMapping) -> Result<(), MappingError>,
    {
        let mut mapping = match self.xml.take() {
            Some(d) => d.table.duplicate(),
            None => XmlMapping::new(),
        };
        f(&mut mapping)?;
        self.with_xml_mapping(mapping)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    /// The table used for `format`: the declared one, or every attribute
    /// under its own name.
    pub fn dict_mapping(&self, format: Format) -> &DictMapping {
        match self.dict.get(&format) {
            Some(d) => &d.table,
            None => self.default_dict.get_or_init(|| {
                trace!("model {}: using default dict mapping", self.name);
                DictMapping::default_for(&self.attributes)
            }),
        }
    }

    /// The XML table: the declared one, or one element per attribute under
    /// a root named after the model.
    pub fn xml_mapping(&self) -> &XmlMapping {
        match &self.xml {
            Some(d) => &d.table,
            None => self.default_xml.get_or_init(|| {
                trace!("model {}: using default xml mapping", self.name);
                XmlMapping::default_for(&self.name, &self.attributes)
            }),
        }
    }

    /// Creates an instance with every attribute at its initial value.
    pub fn instance(&'static self) -> Instance {
        Instance::new(self)
    }

    pub fn of_dict(&'static self, format: Format, doc: &Json) -> Result<Instance, Error> {
        de::of_dict(self, format, doc)
    }

    pub fn as_dict(&self, format: Format, instance: &Instance) -> Result<Json, Error> {
        ser::as_dict(self, format, instance)
    }

    pub fn of_hash(&'static self, doc: &Json) -> Result<Instance, Error> {
        self.of_dict(Format::Hash, doc)
    }

    pub fn as_hash(&self, instance: &Instance) -> Result<Json, Error> {
        self.as_dict(Format::Hash, instance)
    }

    fn from_text(&'static self, format: Format, text: &str) -> Result<Instance, Error> {
        let codec = config::codec(format).ok_or(Error::NoCodec { format })?;
        self.of_dict(format, &codec.load(text)?)
    }

    fn to_text(&self, format: Format, instance: &Instance, options: DumpOptions) -> Result<String, Error> {
        let codec = config::codec(format).ok_or(Error::NoCodec { format })?;
        codec.dump(&self.as_dict(format, instance)?, options)
    }

    pub fn from_json(&'static self, text: &str) -> Result<Instance, Error> {
        self.from_text(Format::Json, text)
    }

    pub fn to_json(&self, instance: &Instance, pretty: bool) -> Result<String, Error> {
        self.to_text(Format::Json, instance, DumpOptions { pretty })
    }

    pub fn from_yaml(&'static self, text: &str) -> Result<Instance, Error> {
        self.from_text(Format::Yaml, text)
    }

    pub fn to_yaml(&self, instance: &Instance) -> Result<String, Error> {
        self.to_text(Format::Yaml, instance, DumpOptions::default())
    }

    pub fn from_toml(&'static self, text: &str) -> Result<Instance, Error> {
        self.from_text(Format::Toml, text)
    }

    pub fn to_toml(&self, instance: &Instance, pretty: bool) -> Result<String, Error> {
        self.to_text(Format::Toml, instance, DumpOptions { pretty })
    }

    /// Reads an instance from a parsed element.
    pub fn of_xml(&'static self, element: Node<'_>) -> Result<Instance, Error> {
        de::of_xml(self, element)
    }

    /// Writes `instance` as an element named by this model's root, appended
    /// to `parent` if given.
    pub fn as_xml(&self, instance: &Instance, builder: &mut Builder, parent: Option<ElementId>) -> Result<ElementId, Error> {
        ser::as_xml(self, instance, builder, parent)
    }

    pub fn from_xml(&'static self, text: &str) -> Result<Instance, Error> {
        let doc = config::xml_backend().parse(text)?;
        let root = doc.root().ok_or_else(|| {
            ParseError::msg(&[], TextPosition::default(), "document has no root element".to_owned())
        })?;
        self.of_xml(root)
    }

    pub fn to_xml(&self, instance: &Instance, options: XmlOptions) -> Result<String, Error> {
        let mut builder = Builder::new();
        self.as_xml(instance, &mut builder, None)?;
        config::xml_backend().dump(&builder.doc()?, options)
    }
}

/// Shortcuts which convert with the instance's own model.
impl Instance {
    pub fn as_hash(&self) -> Result<Json, Error> {
        self.model().as_hash(self)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, Error> {
        self.model().to_json(self, pretty)
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        self.model().to_yaml(self)
    }

    pub fn to_toml(&self, pretty: bool) -> Result<String, Error> {
        self.model().to_toml(self, pretty)
    }

    pub fn to_xml(&self, options: XmlOptions) -> Result<String, Error> {
        self.model().to_xml(self, options)
    }
}

/// A plain Rust type converted through a [`Model`].
///
/// Implementors say how to move between `Self` and an [`Instance`]; the
/// format conversions are provided.
pub trait Mapped: Sized {
    fn model() -> &'static Model;

    fn from_instance(instance: &Instance) -> Result<Self, Error>;

    fn to_instance(&self) -> Instance;

    fn from_hash(doc: &Json) -> Result<Self, Error> {
        Self::from_instance(&Self::model().of_hash(doc)?)
    }

    fn to_hash(&self) -> Result<Json, Error> {
        Self::model().as_hash(&self.to_instance())
    }

    fn from_json(text: &str) -> Result<Self, Error> {
        Self::from_instance(&Self::model().from_json(text)?)
    }

    fn to_json(&self, pretty: bool) -> Result<String, Error> {
        Self::model().to_json(&self.to_instance(), pretty)
    }

    fn from_yaml(text: &str) -> Result<Self, Error> {
        Self::from_instance(&Self::model().from_yaml(text)?)
    }

    fn to_yaml(&self) -> Result<String, Error> {
        Self::model().to_yaml(&self.to_instance())
    }

    fn from_toml(text: &str) -> Result<Self, Error> {
        Self::from_instance(&Self::model().from_toml(text)?)
    }

    fn to_toml(&self, pretty: bool) -> Result<String, Error> {
        Self::model().to_toml(&self.to_instance(), pretty)
    }

    fn from_xml(text: &str) -> Result<Self, Error> {
        Self::from_instance(&Self::model().from_xml(text)?)
    }

    fn to_xml(&self, options: XmlOptions) -> Result<String, Error> {
        Self::model().to_xml(&self.to_instance(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Bind;
    use crate::types::Type;
    use crate::value::Value;
    use once_cell::sync::Lazy;
    use serde_json::json;

    fn registry() -> AttributeRegistry {
        let mut attributes = AttributeRegistry::new();
        attributes.define(Attribute::new("name", Type::String));
        attributes.define(Attribute::new("age", Type::Integer));
        attributes
    }

    static PLAIN: Lazy<Model> = Lazy::new(|| Model::new("Plain", registry()));

    #[test]
    fn default_mappings() {
        let mut p = PLAIN.instance();
        p.set("name", "a");
        p.set("age", 3);
        assert_eq!(PLAIN.as_hash(&p).unwrap(), json!({"name": "a", "age": 3}));
        assert_eq!(
            PLAIN.to_xml(&p, XmlOptions::default()).unwrap(),
            "<Plain><name>a</name><age>3</age></Plain>"
        );
        assert_eq!(PLAIN.of_hash(&json!({"name": "a", "age": "3"})).unwrap(), p);
    }

    #[test]
    fn duplicate_tables() {
        let mut m = DictMapping::new();
        m.map("n", Bind::to("name")).unwrap();
        let model = Model::new("Dup", registry())
            .with_dict_mapping(Format::Json, m.clone())
            .unwrap();
        assert_eq!(
            model.with_dict_mapping(Format::Json, m).unwrap_err(),
            MappingError::DuplicateTable {
                model: "Dup".to_owned(),
                format: "json".to_owned()
            }
        );
    }

    static BASE: Lazy<Model> = Lazy::new(|| {
        let mut m = DictMapping::new();
        m.map("n", Bind::to("name")).unwrap();
        Model::new("Base", registry()).with_key_value_mapping(m).unwrap()
    });

    static DERIVED: Lazy<Model> = Lazy::new(|| {
        Model::derive("Derived", &BASE)
            .define(Attribute::new("email", Type::String))
            .extend_dict_mapping(Format::Json, |m| {
                m.map("e", Bind::to("email"))?;
                Ok(())
            })
            .unwrap()
    });

    #[test]
    fn derived_tables_extend_a_copy() {
        let d = DERIVED.from_json(r#"{"n": "a", "e": "a@example.com"}"#).unwrap();
        assert_eq!(d.get("email"), Some(&Value::from("a@example.com")));
        assert_eq!(d.get("name"), Some(&Value::from("a")));
        assert!(BASE.dict_mapping(Format::Json).find("e").is_none());
        assert!(BASE.attributes().get("email").is_none());

        // Other formats are inherited unchanged.
        assert!(DERIVED.dict_mapping(Format::Yaml).find("e").is_none());
        assert!(DERIVED.dict_mapping(Format::Yaml).is_finalized());
    }
}
