// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Swappable codecs and XML backends, the nesting limit, table declaration
//! errors, and derived models.
//!
//! Adapter settings are process-wide, so everything that changes them runs
//! within the single test `swap_adapters`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use docmap::codec::TomlCodec;
use docmap::xml::xml_rs::XmlRsBackend;
use docmap::xml::{BuiltDocument, Document, ParseError, XmlBackend};
use docmap::{
    config, Attribute, AttributeRegistry, Bind, Codec, DictMapping, DictMethods, DumpOptions,
    Error, Format, MappingError, Model, Type, Value, XmlMapping, XmlOptions,
};
use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value as Json};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `key=value` lines; every value loads as a string.
struct Properties;

impl Codec for Properties {
    fn load(&self, text: &str) -> Result<Json, Error> {
        let mut map = Map::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (k, v) = line.split_once('=').ok_or_else(|| Error::Custom {
                key: format!("line {}", n + 1),
                source: "expected key=value".into(),
            })?;
            map.insert(k.trim().to_owned(), Json::String(v.trim().to_owned()));
        }
        Ok(Json::Object(map))
    }

    fn dump(&self, value: &Json, _options: DumpOptions) -> Result<String, Error> {
        let mut out = String::new();
        for (k, v) in value.as_object().into_iter().flatten() {
            match v {
                Json::String(s) => out.push_str(&format!("{}={}\n", k, s)),
                other => out.push_str(&format!("{}={}\n", k, other)),
            }
        }
        Ok(out)
    }
}

static PARSES: AtomicUsize = AtomicUsize::new(0);

/// Counts parses, delegating to xml-rs.
struct CountingBackend;

impl XmlBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn parse(&self, text: &str) -> Result<Document, ParseError> {
        PARSES.fetch_add(1, Ordering::SeqCst);
        XmlRsBackend.parse(text)
    }

    fn dump(&self, doc: &BuiltDocument, options: XmlOptions) -> Result<String, Error> {
        XmlRsBackend.dump(doc, options)
    }
}

static SETTING: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    attributes.define(Attribute::new("port", Type::Integer));
    Model::new("Setting", attributes)
});

static CHAIN: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("next", Type::Model(|| &*CHAIN)));
    Model::new("Chain", attributes)
});

#[test]
fn swap_adapters() {
    init();

    config::set_codec(Format::Toml, Arc::new(Properties));
    let s = SETTING.from_toml("# comment\nname = web\nport = 8080\n").unwrap();
    assert_eq!(s.get("port"), Some(&Value::Integer(8080)));
    assert_eq!(SETTING.to_toml(&s, false).unwrap(), "name=web\nport=8080\n");
    assert_matches!(
        SETTING.from_toml("name"),
        Err(Error::Custom { key, .. }) if key == "line 1"
    );
    config::set_codec(Format::Toml, Arc::new(TomlCodec));
    assert_eq!(SETTING.to_toml(&s, false).unwrap(), "name = \"web\"\nport = 8080\n");

    config::set_xml_backend(Arc::new(CountingBackend));
    assert_eq!(config::xml_backend().name(), "counting");
    let x = SETTING
        .from_xml("<Setting><name>web</name><port>8080</port></Setting>")
        .unwrap();
    assert_eq!(x, s);
    assert!(PARSES.load(Ordering::SeqCst) >= 1);
    config::set_xml_backend(Arc::new(XmlRsBackend));

    let three = r#"{"next":{"next":{"next":{}}}}"#;
    let deep = CHAIN.from_json(three).unwrap();
    config::set_max_depth(2);
    assert_matches!(CHAIN.from_json(three), Err(Error::DepthExceeded { limit: 2 }));
    assert_matches!(deep.to_json(false), Err(Error::DepthExceeded { limit: 2 }));
    assert!(CHAIN.from_json(r#"{"next":{"next":{}}}"#).is_ok());
    config::set_max_depth(config::DEFAULT_MAX_DEPTH);
    assert_eq!(deep.to_json(false).unwrap(), three);
}

#[test]
fn declaration_errors() {
    let mut dict = DictMapping::new();
    assert_matches!(
        dict.map("k", Bind::default()),
        Err(MappingError::MissingTarget { key }) if key == "k"
    );
    let noop = DictMethods::new(|_, _| Ok(()), |_| Ok(Json::Null));
    assert_matches!(
        dict.map("k", Bind::using(noop).and_to("k")),
        Err(MappingError::ConflictingTarget { .. })
    );
    assert_matches!(
        dict.map("k", Bind::to("k").cdata(true)),
        Err(MappingError::XmlOnlyOption { option: "cdata", .. })
    );
    dict.set_render_nil_default(true).unwrap();
    assert_matches!(
        dict.set_render_nil_default(false),
        Err(MappingError::RenderNilDefaultSet)
    );

    let mut xml = XmlMapping::new();
    assert_matches!(
        xml.map_element("e", Bind::to("e").namespace(Some("urn:x"), None)),
        Err(MappingError::IncompleteNamespace { .. })
    );
    xml.finalize();
    assert_matches!(
        xml.map_element("e", Bind::to("e")),
        Err(MappingError::Finalized { key }) if key == "e"
    );

    let model = Model::new("Twice", AttributeRegistry::new())
        .with_dict_mapping(Format::Json, DictMapping::new())
        .unwrap();
    assert_matches!(
        model.with_dict_mapping(Format::Json, DictMapping::new()),
        Err(MappingError::DuplicateTable { model, format }) if model == "Twice" && format == "json"
    );
}

static CONTACT: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("contact").unwrap();
    xml.map_attribute("name", Bind::to("name")).unwrap();
    Model::new("Contact", attributes).with_xml_mapping(xml).unwrap()
});

static EMPLOYEE: Lazy<Model> = Lazy::new(|| {
    Model::derive("Employee", &CONTACT)
        .define(Attribute::new("badge", Type::Integer))
        .extend_xml_mapping(|xml| {
            xml.root("employee")?;
            xml.map_element("badge", Bind::to("badge"))?;
            Ok(())
        })
        .unwrap()
});

#[test]
fn derived_models() {
    init();
    let mut e = EMPLOYEE.instance();
    e.set("name", "Grace");
    e.set("badge", 7);
    let out = e.to_xml(XmlOptions::default()).unwrap();
    assert_eq!(out, r#"<employee name="Grace"><badge>7</badge></employee>"#);
    assert_eq!(EMPLOYEE.from_xml(&out).unwrap(), e);

    // The parent's table is untouched.
    let mut c = CONTACT.instance();
    c.set("name", "Grace");
    assert_eq!(c.to_xml(XmlOptions::default()).unwrap(), r#"<contact name="Grace"></contact>"#);
    assert!(CONTACT.attributes().get("badge").is_none());
}
