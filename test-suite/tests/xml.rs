// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! XML documents: namespaces, repetition, nesting, groups, and custom methods.

use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use chrono::NaiveDate;
use docmap::{
    Attribute, AttributeRegistry, Bind, Error, Instance, MappingError, Model, Type, Value,
    XmlGroupMethods, XmlGroupValues, XmlInput, XmlMapping, XmlMethods, XmlOptions,
};
use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn compact(instance: &Instance) -> String {
    instance.to_xml(XmlOptions::default()).unwrap()
}

static NAMESPACED: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("a", Type::String));
    attributes.define(Attribute::new("b", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("root").unwrap();
    xml.namespace("http://ns1.com", Some("ns1")).unwrap();
    xml.map_element("a", Bind::to("a")).unwrap();
    xml.map_element(
        "b",
        Bind::to("b").namespace(Some("http://ns2.com"), Some("ns2")),
    )
    .unwrap();
    Model::new("Namespaced", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn namespaces() {
    init();
    let mut n = NAMESPACED.instance();
    n.set("a", "x");
    n.set("b", "y");
    let out = compact(&n);
    assert_eq!(
        out,
        r#"<ns1:root xmlns:ns1="http://ns1.com" xmlns:ns2="http://ns2.com"><ns1:a>x</ns1:a><ns2:b>y</ns2:b></ns1:root>"#
    );
    assert_eq!(NAMESPACED.from_xml(&out).unwrap(), n);

    // Matching is by URI, not prefix; an unqualified <b> is someone else's.
    let renamed = NAMESPACED
        .from_xml(
            r#"<p:root xmlns:p="http://ns1.com" xmlns:q="http://ns2.com"><b>z</b><p:a>x</p:a><q:b>y</q:b></p:root>"#,
        )
        .unwrap();
    assert_eq!(renamed, n);
}

static THING: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("id", Type::Integer));
    let mut xml = XmlMapping::new();
    xml.root("thing").unwrap();
    xml.namespace("urn:things", Some("t")).unwrap();
    xml.map_attribute("id", Bind::to("id")).unwrap();
    Model::new("Thing", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn attributes_inherit_prefixed_namespace() {
    init();
    let mut t = THING.instance();
    t.set("id", 7);
    let out = compact(&t);
    assert_eq!(out, r#"<t:thing xmlns:t="urn:things" t:id="7"></t:thing>"#);
    assert_eq!(THING.from_xml(&out).unwrap(), t);
    assert_eq!(
        THING
            .from_xml(r#"<t:thing xmlns:t="urn:things" id="7"/>"#)
            .unwrap(),
        t
    );
}

static OPT_OUT: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("a", Type::String));
    attributes.define(Attribute::new("c", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("root").unwrap();
    xml.namespace("http://ns1.com", None).unwrap();
    xml.map_element("a", Bind::to("a")).unwrap();
    xml.map_element("c", Bind::to("c").no_namespace()).unwrap();
    Model::new("OptOut", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn unqualified_element_under_default_namespace() {
    init();
    let mut o = OPT_OUT.instance();
    o.set("a", "x");
    o.set("c", "y");
    let out = compact(&o);
    assert_eq!(
        out,
        r#"<root xmlns="http://ns1.com"><a>x</a><c xmlns="">y</c></root>"#
    );
    assert_eq!(OPT_OUT.from_xml(&out).unwrap(), o);
}

static LEAF: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("v", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("leaf").unwrap();
    xml.namespace("http://leaf.com", None).unwrap();
    xml.map_element("v", Bind::to("v")).unwrap();
    Model::new("Leaf", attributes).with_xml_mapping(xml).unwrap()
});

static HOLDER: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    attributes.define(Attribute::new("leaf", Type::Model(|| &*LEAF)));
    let mut xml = XmlMapping::new();
    xml.root("holder").unwrap();
    xml.map_element("name", Bind::to("name")).unwrap();
    xml.map_element("leaf", Bind::to("leaf")).unwrap();
    Model::new("Holder", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn nested_default_namespace_stays_inside() {
    init();
    let mut leaf = LEAF.instance();
    leaf.set("v", "inner");
    assert_eq!(
        compact(&leaf),
        r#"<leaf xmlns="http://leaf.com"><v>inner</v></leaf>"#
    );

    // <leaf> itself is the holder's unqualified element; only its contents
    // belong to the leaf's namespace.
    let mut h = HOLDER.instance();
    h.set("name", "outer");
    h.set("leaf", leaf);
    let out = compact(&h);
    assert_eq!(
        out,
        r#"<holder><name>outer</name><leaf><v xmlns="http://leaf.com">inner</v></leaf></holder>"#
    );
    assert_eq!(HOLDER.from_xml(&out).unwrap(), h);
}

static INNER: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("id", Type::Integer));
    attributes.define(Attribute::new("v", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("inner").unwrap();
    xml.namespace("http://one.com", Some("p")).unwrap();
    xml.map_attribute("id", Bind::to("id")).unwrap();
    xml.map_element("v", Bind::to("v")).unwrap();
    Model::new("Inner", attributes).with_xml_mapping(xml).unwrap()
});

static OUTER: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    attributes.define(Attribute::new("inner", Type::Model(|| &*INNER)));
    let mut xml = XmlMapping::new();
    xml.root("outer").unwrap();
    xml.namespace("http://two.com", Some("p")).unwrap();
    xml.map_element("name", Bind::to("name")).unwrap();
    xml.map_element("inner", Bind::to("inner")).unwrap();
    Model::new("Outer", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn clashing_prefixes_are_rebound() {
    init();
    let mut inner = INNER.instance();
    inner.set("id", 9);
    inner.set("v", "in");
    let mut o = OUTER.instance();
    o.set("name", "out");
    o.set("inner", inner);
    let out = compact(&o);

    // <p:inner> is the outer table's element, so `p` can't be rebound there:
    // the attribute takes a fresh prefix, and <v> rebinds `p` for itself.
    assert_eq!(
        out,
        concat!(
            r#"<p:outer xmlns:p="http://two.com"><p:name>out</p:name>"#,
            r#"<p:inner xmlns:p1="http://one.com" p1:id="9">"#,
            r#"<p:v xmlns:p="http://one.com">in</p:v>"#,
            r#"</p:inner></p:outer>"#,
        )
    );
    assert_eq!(OUTER.from_xml(&out).unwrap(), o);
}

static LIST: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("items", Type::String).collection());
    let mut xml = XmlMapping::new();
    xml.root("list").unwrap();
    xml.map_element("item", Bind::to("items")).unwrap();
    Model::new("List", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn repeated_elements() {
    init();
    let input = "<list><item>a</item><item>b</item><item>c</item></list>";
    let l = LIST.from_xml(input).unwrap();
    assert_eq!(l.get("items"), Some(&Value::from(vec!["a", "b", "c"])));
    assert_eq!(compact(&l), input);

    let pretty = l
        .to_xml(XmlOptions {
            pretty: true,
            declaration: true,
        })
        .unwrap();
    assert!(pretty.starts_with("<?xml"), "{}", pretty);
    assert_eq!(LIST.from_xml(&pretty).unwrap(), l);
}

static CATEGORY: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    attributes.define(Attribute::new("subcategories", Type::Model(|| &*CATEGORY)).collection());
    let mut xml = XmlMapping::new();
    xml.root("category").unwrap();
    xml.map_attribute("name", Bind::to("name")).unwrap();
    xml.map_element("category", Bind::to("subcategories")).unwrap();
    Model::new("Category", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn self_referential() {
    init();
    let input = concat!(
        r#"<category name="root">"#,
        r#"<category name="a"><category name="a1"></category></category>"#,
        r#"<category name="b"></category>"#,
        r#"</category>"#,
    );
    let c = CATEGORY.from_xml(input).unwrap();
    let subs = c.get("subcategories").and_then(Value::as_slice).unwrap();
    assert_eq!(subs.len(), 2);
    let a = subs[0].as_instance().unwrap();
    assert_eq!(a.get("name"), Some(&Value::from("a")));
    assert_eq!(a.get("subcategories").and_then(Value::as_slice).map(<[_]>::len), Some(1));
    assert_eq!(compact(&c), input);

    // No key/value table was declared, so the defaults apply there.
    assert_eq!(
        c.to_json(false).unwrap(),
        concat!(
            r#"{"name":"root","subcategories":["#,
            r#"{"name":"a","subcategories":[{"name":"a1","subcategories":[]}]},"#,
            r#"{"name":"b","subcategories":[]}]}"#,
        )
    );
}

static GROUP_FROM: AtomicUsize = AtomicUsize::new(0);
static GROUP_TO: AtomicUsize = AtomicUsize::new(0);

static PLACE: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("name", Type::String));
    attributes.define(Attribute::new("lat", Type::Float));
    attributes.define(Attribute::new("lon", Type::Float));
    let mut xml = XmlMapping::new();
    xml.root("place").unwrap();
    xml.map_attribute("name", Bind::to("name")).unwrap();
    xml.group(
        XmlGroupMethods::new(
            |i, values| {
                GROUP_FROM.fetch_add(1, Ordering::SeqCst);
                let lat: f64 = values.element("lat").ok_or("missing lat")?.parse()?;
                let lon: f64 = values.element("lon").ok_or("missing lon")?.parse()?;
                i.set("lat", lat);
                i.set("lon", lon);
                Ok(())
            },
            |i| {
                GROUP_TO.fetch_add(1, Ordering::SeqCst);
                let coord = |name| i.get(name).and_then(Value::as_f64).unwrap_or_default();
                Ok(XmlGroupValues::new()
                    .with_element("lat", coord("lat").to_string())
                    .with_element("lon", coord("lon").to_string()))
            },
        ),
        |g| {
            g.map_element("lat", Bind::default())?;
            g.map_element("lon", Bind::default())?;
            Ok(())
        },
    )
    .unwrap();
    Model::new("Place", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn groups_convert_together() {
    init();
    let input = r#"<place name="x"><lon>-2.25</lon><lat>1.5</lat></place>"#;
    let p = PLACE.from_xml(input).unwrap();
    assert_eq!(GROUP_FROM.load(Ordering::SeqCst), 1);
    assert_eq!(p.get("lat"), Some(&Value::Float(1.5)));
    assert_eq!(p.get("lon"), Some(&Value::Float(-2.25)));

    // Output follows declaration order.
    assert_eq!(
        compact(&p),
        r#"<place name="x"><lat>1.5</lat><lon>-2.25</lon></place>"#
    );
    assert_eq!(GROUP_TO.load(Ordering::SeqCst), 1);
}

static CODES: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("first", Type::String));
    attributes.define(Attribute::new("second", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("codes").unwrap();
    xml.group(
        XmlGroupMethods::new(
            |i, values| {
                i.set("first", values.element("urn:a:code"));
                i.set("second", values.element("urn:b:code"));
                Ok(())
            },
            |i| {
                let text = |name| i.get(name).and_then(Value::as_str).unwrap_or_default().to_owned();
                Ok(XmlGroupValues::new()
                    .with_element("urn:a:code", text("first"))
                    .with_element("urn:b:code", text("second")))
            },
        ),
        |g| {
            g.map_element("code", Bind::default().namespace(Some("urn:a"), Some("a")))?;
            g.map_element("code", Bind::default().namespace(Some("urn:b"), Some("b")))?;
            Ok(())
        },
    )
    .unwrap();
    Model::new("Codes", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn grouped_fields_keyed_by_expanded_name() {
    init();
    let input = r#"<codes xmlns:a="urn:a" xmlns:b="urn:b"><b:code>2</b:code><a:code>1</a:code></codes>"#;
    let c = CODES.from_xml(input).unwrap();
    assert_eq!(c.get("first"), Some(&Value::from("1")));
    assert_eq!(c.get("second"), Some(&Value::from("2")));
    assert_eq!(
        compact(&c),
        r#"<codes xmlns:a="urn:a" xmlns:b="urn:b"><a:code>1</a:code><b:code>2</b:code></codes>"#
    );
}

fn doc_model(render_nil: bool) -> Model {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("code", Type::String));
    attributes.define(Attribute::new("title", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("doc").unwrap();
    xml.set_render_nil_default(render_nil).unwrap();
    xml.map_attribute("code", Bind::to("code")).unwrap();
    xml.map_element("title", Bind::to("title")).unwrap();
    Model::new("Doc", attributes).with_xml_mapping(xml).unwrap()
}

static SPARSE_DOC: Lazy<Model> = Lazy::new(|| doc_model(false));
static FULL_DOC: Lazy<Model> = Lazy::new(|| doc_model(true));

#[test]
fn render_nil() {
    init();
    let sparse = SPARSE_DOC.instance();
    assert_eq!(compact(&sparse), "<doc></doc>");

    let full = FULL_DOC.instance();
    let out = compact(&full);
    assert_eq!(out, r#"<doc code=""><title></title></doc>"#);

    // Empty text reads back as nil.
    assert_eq!(FULL_DOC.from_xml(&out).unwrap(), full);
}

static SNIPPET: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("lang", Type::String));
    attributes.define(Attribute::new("body", Type::String));
    let mut xml = XmlMapping::new();
    xml.root("snippet").unwrap();
    xml.map_attribute("lang", Bind::to("lang")).unwrap();
    xml.map_content(Bind::to("body").cdata(true)).unwrap();
    Model::new("Snippet", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn cdata_content() {
    init();
    let mut s = SNIPPET.instance();
    s.set("lang", "html");
    s.set("body", "<b>x</b> & y");
    let out = compact(&s);
    assert_eq!(out, r#"<snippet lang="html"><![CDATA[<b>x</b> & y]]></snippet>"#);
    assert_eq!(SNIPPET.from_xml(&out).unwrap(), s);

    // Plain escaped text is accepted too.
    assert_eq!(
        SNIPPET
            .from_xml(r#"<snippet lang="html">&lt;b&gt;x&lt;/b&gt; &amp; y</snippet>"#)
            .unwrap(),
        s
    );
}

#[test]
fn cdata_attribute_rejected() {
    let mut xml = XmlMapping::new();
    assert_matches!(
        xml.map_attribute("lang", Bind::to("lang").cdata(true)),
        Err(MappingError::CdataAttribute { key }) if key == "lang"
    );
}

static EVENT: Lazy<Model> = Lazy::new(|| {
    let mut attributes = AttributeRegistry::new();
    attributes.define(Attribute::new("title", Type::String));
    attributes.define(Attribute::new("when", Type::Date));
    let mut xml = XmlMapping::new();
    xml.root("event").unwrap();
    xml.map_element("title", Bind::to("title")).unwrap();
    xml.map_element(
        "when",
        Bind::using(XmlMethods::new(
            |i, input| {
                let text = match input {
                    XmlInput::Element(e) => e.text().unwrap_or_default(),
                    XmlInput::Text(t) => t,
                };
                i.set("when", NaiveDate::parse_from_str(text, "%d/%m/%Y")?);
                Ok(())
            },
            |i, b, parent| {
                if let Some(d) = i.get("when").and_then(Value::as_date) {
                    let e = b.create_element("when");
                    b.add_element(parent, e);
                    b.add_text(e, &d.format("%d/%m/%Y").to_string());
                }
                Ok(())
            },
        )),
    )
    .unwrap();
    Model::new("Event", attributes).with_xml_mapping(xml).unwrap()
});

#[test]
fn custom_element_methods() {
    init();
    let input = "<event><title>Launch</title><when>04/03/2021</when></event>";
    let e = EVENT.from_xml(input).unwrap();
    assert_eq!(e.get("when"), Some(&Value::from(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap())));
    assert_eq!(compact(&e), input);

    let err = EVENT
        .from_xml("<event><when>someday</when></event>")
        .unwrap_err();
    assert_matches!(&err, Error::Custom { key, .. } if key == "when");
}

#[test]
fn parse_errors_show_the_stack() {
    init();
    let e = LIST.from_xml("<list>\n  <item>a</item>\n  <item>\n</list>").unwrap_err();
    let p = assert_matches!(&e, Error::XmlParse(p) => p);
    let names: Vec<_> = p.stack().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["list", "item"]);
    assert!(e.to_string().contains("XML element stack"), "{}", e);

    assert_matches!(LIST.from_xml("<list><item>x</item>"), Err(Error::XmlParse(_)));
}
