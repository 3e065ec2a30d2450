// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The default XML backend, on `xml-rs`.

use std::borrow::Cow;

use log::trace;
use xml::common::Position;
use xml::reader::XmlEvent as ReadEvent;
use xml::writer::XmlEvent as WriteEvent;

use super::{
    BuiltDocument, BuiltElement, BuiltNode, Document, NodeId, ParseError, StackElement,
    TextPosition, XmlBackend, XmlOptions,
};
use crate::error::Error;
use crate::ExpandedName;

/// Parses with [`xml::reader::EventReader`] and writes with
/// [`xml::writer::EventWriter`].
#[derive(Copy, Clone, Debug, Default)]
pub struct XmlRsBackend;

fn position(p: xml::common::TextPosition) -> TextPosition {
    // xml-rs positions are zero-based.
    TextPosition {
        line: p.row + 1,
        column: p.column + 1,
    }
}

impl XmlBackend for XmlRsBackend {
    fn name(&self) -> &str {
        "xml-rs"
    }

    fn parse(&self, text: &str) -> Result<Document, ParseError> {
        let mut reader = xml::reader::EventReader::new(text.as_bytes());
        let mut doc = Document::new();

        // Parallel stacks: names and positions for errors, ids for the arena.
        let mut stack: Vec<StackElement> = Vec::new();
        let mut ids: Vec<NodeId> = Vec::new();
        loop {
            let event = reader.next().map_err(|e| {
                let pos = position(e.position());
                ParseError::backend(&stack, pos, Box::new(e))
            })?;
            match event {
                ReadEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => {
                    if ids.is_empty() && doc.root().is_some() {
                        return Err(ParseError::msg(
                            &stack,
                            position(reader.position()),
                            format!("unexpected second root element {}", name.borrow().repr_display()),
                        ));
                    }
                    trace!("Starting {}, new depth {}", &name, stack.len() + 1);
                    let id = doc.push_element(
                        ids.last().copied(),
                        ExpandedName::new(name.namespace.as_deref(), &name.local_name),
                        name.prefix.as_deref(),
                    );
                    for a in attributes {
                        doc.add_attribute(
                            id,
                            ExpandedName::new(a.name.namespace.as_deref(), &a.name.local_name),
                            a.value,
                        );
                    }

                    // xml-rs reports every mapping in scope, including the
                    // builtins; keep only what this element adds.
                    for (prefix, uri) in namespace.0.iter() {
                        if prefix == "xml" || prefix == "xmlns" || uri.is_empty() {
                            continue;
                        }
                        let known = ids.last().and_then(|&p| doc_namespace(&doc, p, prefix))
                            == Some(uri.as_str());
                        if !known {
                            doc.add_namespace(id, Some(prefix.as_str()), uri);
                        }
                    }
                    stack.push(StackElement {
                        name: name.borrow().repr_display().to_string(),
                        pos: position(reader.position()),
                    });
                    ids.push(id);
                }
                ReadEvent::EndElement { name } => {
                    trace!("Ending {}, new depth {}", &name, stack.len().saturating_sub(1));
                    stack.pop();
                    ids.pop();
                }
                ReadEvent::Characters(s) | ReadEvent::CData(s) => {
                    if let Some(&id) = ids.last() {
                        doc.add_text(id, &s);
                    }
                }
                ReadEvent::EndDocument => break,
                // Declarations, comments, processing instructions, whitespace.
                _ => {}
            }
        }
        if doc.root().is_none() {
            return Err(ParseError::msg(
                &[],
                position(reader.position()),
                "document has no root element".to_owned(),
            ));
        }
        Ok(doc)
    }

    fn dump(&self, doc: &BuiltDocument, options: XmlOptions) -> Result<String, Error> {
        let mut out = Vec::new();
        let mut writer = xml::writer::EventWriter::new_with_config(
            &mut out,
            xml::writer::EmitterConfig {
                perform_indent: options.pretty,
                write_document_declaration: options.declaration,
                normalize_empty_elements: false,
                ..Default::default()
            },
        );
        write_element(&mut writer, doc.root())?;
        drop(writer);
        String::from_utf8(out).map_err(|e| Error::XmlWrite(e.to_string()))
    }
}

/// Returns the URI bound to `prefix` on `node` or its ancestors.
fn doc_namespace<'d>(doc: &'d Document, node: NodeId, prefix: &str) -> Option<&'d str> {
    let key = if prefix.is_empty() { "xmlns" } else { prefix };
    let mut cur = Some(doc.node(node));
    while let Some(n) = cur {
        if let Some((_, uri)) = n.namespaces().find(|(p, _)| *p == key) {
            return Some(uri);
        }
        cur = n.parent();
    }
    None
}

fn write_element<W: std::io::Write>(
    writer: &mut xml::writer::EventWriter<W>,
    element: BuiltElement<'_>,
) -> Result<(), Error> {
    let wrap = |e: xml::writer::Error| Error::XmlWrite(e.to_string());

    // Declarations go out as plain attributes. The writer's own namespace
    // stack never writes `xmlns=""` and drops a binding some ancestor made
    // even when an element in between rebound the prefix.
    let declarations: Vec<(String, &str)> = element
        .namespaces()
        .map(|(prefix, uri)| match prefix {
            "" => ("xmlns".to_owned(), uri),
            p => (format!("xmlns:{}", p), uri),
        })
        .collect();
    let attributes: Vec<_> = declarations
        .iter()
        .map(|(name, uri)| (name.as_str(), *uri))
        .chain(element.attributes())
        .map(|(name, value)| xml::attribute::Attribute {
            name: xml::name::Name::from(name),
            value,
        })
        .collect();
    writer
        .write(WriteEvent::StartElement {
            name: xml::name::Name::from(element.name()),
            attributes: Cow::Owned(attributes),
            namespace: Cow::Owned(xml::namespace::Namespace::empty()),
        })
        .map_err(wrap)?;
    for child in element.children() {
        match child {
            BuiltNode::Element(e) => write_element(writer, e)?,
            BuiltNode::Text(t) => writer.write(WriteEvent::Characters(t)).map_err(wrap)?,
            BuiltNode::CData(t) => writer.write(WriteEvent::CData(t)).map_err(wrap)?,
        }
    }
    writer
        .write(WriteEvent::EndElement { name: None })
        .map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Builder;

    #[test]
    fn parse_namespaces_and_text() {
        let doc = XmlRsBackend
            .parse(
                r#"<?xml version="1.0"?>
                <ns1:root xmlns:ns1="http://ns1.com" xmlns:ns2="http://ns2.com" id="7">
                    <ns1:a>x</ns1:a>
                    <!-- comment -->
                    <ns2:b><![CDATA[<y>]]></ns2:b>
                    <c xmlns="http://ns3.com"/>
                </ns1:root>"#,
            )
            .unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name().key(), "http://ns1.com:root");
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(
            root.namespaces().collect::<Vec<_>>(),
            [("ns1", "http://ns1.com"), ("ns2", "http://ns2.com")]
        );
        let children: Vec<_> = root.children().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].name().key(), "http://ns1.com:a");
        assert_eq!(children[0].text(), Some("x"));
        assert_eq!(children[0].namespaces().count(), 0);
        assert_eq!(children[1].text(), Some("<y>"));
        assert_eq!(children[2].namespace_uri(), Some("http://ns3.com"));
        assert_eq!(children[2].namespaces().collect::<Vec<_>>(), [("xmlns", "http://ns3.com")]);
        assert_eq!(children[2].text(), None);
    }

    #[test]
    fn parse_error_has_stack() {
        let e = XmlRsBackend.parse("<root>\n  <a>\n  </b>\n</root>").unwrap_err();
        let names: Vec<_> = e.stack().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["root", "a"]);
        assert!(e.to_string().contains("XML element stack:"), "{}", e);
    }

    #[test]
    fn dump_writes_declarations() {
        let default = crate::mapping::Namespace::new("urn:d", None);
        let mut b = Builder::new();
        let root = b.create_qualified_element(Some(&default), "root");
        let bare = b.create_qualified_element(None, "bare");
        b.add_text(bare, "x");
        b.add_element(root, bare);
        let again = b.create_qualified_element(Some(&default), "again");
        b.add_element(bare, again);
        let out = XmlRsBackend.dump(&b.doc().unwrap(), XmlOptions::default()).unwrap();
        assert_eq!(
            out,
            r#"<root xmlns="urn:d"><bare xmlns="">x<again xmlns="urn:d"></again></bare></root>"#
        );

        let doc = XmlRsBackend.parse(&out).unwrap();
        let bare = doc.root().unwrap().children().next().unwrap();
        assert_eq!(bare.namespace_uri(), None);
        assert_eq!(bare.children().next().unwrap().namespace_uri(), Some("urn:d"));
    }

    #[test]
    fn dump_options() {
        let mut b = Builder::new();
        let root = b.create_element("ns1:root");
        b.add_namespace(Some("ns1"), "http://ns1.com");
        b.add_attribute(root, "id", "a&b");
        let child = b.create_element("ns1:a");
        b.add_text(child, "x<y");
        b.add_element(root, child);
        let empty = b.create_element("empty");
        b.add_element(root, empty);
        let doc = b.doc().unwrap();

        let compact = XmlRsBackend.dump(&doc, XmlOptions::default()).unwrap();
        assert_eq!(
            compact,
            r#"<ns1:root xmlns:ns1="http://ns1.com" id="a&amp;b"><ns1:a>x&lt;y</ns1:a><empty></empty></ns1:root>"#
        );

        let declared = XmlRsBackend
            .dump(
                &doc,
                XmlOptions {
                    declaration: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(declared.starts_with("<?xml"), "{}", declared);

        let pretty = XmlRsBackend
            .dump(
                &doc,
                XmlOptions {
                    pretty: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(pretty.contains("\n  <ns1:a>"), "{}", pretty);
    }
}
