// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend-neutral XML trees.
//!
//! Parsing produces a [`Document`], read through [`Node`]. Serialization
//! writes into a [`Builder`], whose finished [`BuiltDocument`] an
//! [`XmlBackend`] turns into text. The mapping engine only ever sees these
//! types, so backends are swappable through [`crate::config`].

pub mod xml_rs;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::mapping::Namespace;
use crate::{BoxedStdError, ExpandedName, ExpandedNameRef};

/// Options for writing XML text.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct XmlOptions {
    /// Indents nested elements.
    pub pretty: bool,

    /// Writes an `<?xml ...?>` declaration first.
    pub declaration: bool,
}

/// Parses and writes XML text.
pub trait XmlBackend: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, text: &str) -> Result<Document, ParseError>;

    fn dump(&self, doc: &BuiltDocument, options: XmlOptions) -> Result<String, Error>;
}

/// A position within the source text: one-based line and column.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TextPosition {
    pub line: u64,
    pub column: u64,
}

impl std::fmt::Display for TextPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single element in the XML stack; see [`ParseError::stack`].
#[derive(Clone, Debug)]
pub struct StackElement {
    /// The element's name as written, including its prefix (if any).
    pub name: String,

    /// The position of the element's start tag.
    pub pos: TextPosition,
}

/// An error encountered while parsing XML.
///
/// This type's `Display` impl will show the error encountered and the XML
/// element stack, printing the qname and line:column of each element. E.g.:
///
/// ```text
/// Unexpected closing tag: ns1:b, expected ns1:a @ 3:9
///
/// XML element stack:
///    1: <ns1:a> @ 2:5
///    0: <ns1:root> @ 1:1
/// ```
///
/// Cloning a `ParseError` is cheap.
#[derive(Clone, Debug)]
pub struct ParseError(Arc<ParseErrorInner>);

#[derive(Debug)]
struct ParseErrorInner {
    kind: ParseErrorKind,
    stack: Vec<StackElement>,
    pos: TextPosition,
}

#[derive(Debug)]
enum ParseErrorKind {
    /// An error produced by the backend's parser.
    Backend(BoxedStdError),
    Msg(String),
}

impl ParseError {
    /// Wraps an error from the backend's underlying parser.
    pub fn backend(stack: &[StackElement], pos: TextPosition, e: BoxedStdError) -> Self {
        ParseError(Arc::new(ParseErrorInner {
            kind: ParseErrorKind::Backend(e),
            stack: stack.to_vec(),
            pos,
        }))
    }

    pub fn msg(stack: &[StackElement], pos: TextPosition, msg: String) -> Self {
        ParseError(Arc::new(ParseErrorInner {
            kind: ParseErrorKind::Msg(msg),
            stack: stack.to_vec(),
            pos,
        }))
    }

    /// Returns the stack of XML elements as of when this error occurred.
    ///
    /// `stack()[0]` is the root; `stack.last()` is the current element.
    pub fn stack(&self) -> &[StackElement] {
        &self.0.stack
    }

    pub fn position(&self) -> TextPosition {
        self.0.pos
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = &*self.0;
        match &inner.kind {
            ParseErrorKind::Backend(e) => write!(f, "{} @ {}", e, &inner.pos)?,
            ParseErrorKind::Msg(m) => write!(f, "{} @ {}", m, &inner.pos)?,
        }
        if !inner.stack.is_empty() {
            write!(f, "\n\nXML element stack:\n")?;
            for (i, element) in inner.stack.iter().enumerate().rev() {
                writeln!(f, "{:4x}: <{}> @ {}", i, element.name, &element.pos)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0.kind {
            ParseErrorKind::Backend(e) => Some(e.as_ref()),
            ParseErrorKind::Msg(_) => None,
        }
    }
}

/// Identifies a node within a [`Document`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeId(usize);

#[derive(Debug)]
struct NodeData {
    name: ExpandedName,
    prefix: Option<String>,
    attributes: IndexMap<String, AttributeData>,

    /// Declared on this element: prefix (`xmlns` for the default) -> URI.
    namespaces: IndexMap<String, String>,
    children: Vec<NodeId>,
    text: Option<String>,
    parent: Option<NodeId>,
}

#[derive(Debug)]
struct AttributeData {
    name: ExpandedName,
    value: String,
}

/// A parsed XML document: an arena of element nodes.
///
/// Backends fill it in document order with [`Document::push_element`] and
/// friends; the first element pushed is the root.
#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the root element, or `None` if nothing was pushed.
    pub fn root(&self) -> Option<Node<'_>> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(Node { doc: self, id: NodeId(0) })
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { doc: self, id }
    }

    /// Appends an element as the last child of `parent` (or as the root).
    pub fn push_element(&mut self, parent: Option<NodeId>, name: ExpandedName, prefix: Option<&str>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            name,
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_owned),
            attributes: IndexMap::new(),
            namespaces: IndexMap::new(),
            children: Vec::new(),
            text: None,
            parent,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    pub fn add_attribute(&mut self, node: NodeId, name: ExpandedName, value: String) {
        let key = name.as_ref().key();
        self.nodes[node.0].attributes.insert(key, AttributeData { name, value });
    }

    /// Records a namespace declaration; `prefix` is `None` for the default namespace.
    pub fn add_namespace(&mut self, node: NodeId, prefix: Option<&str>, uri: &str) {
        let prefix = prefix.filter(|p| !p.is_empty()).unwrap_or("xmlns");
        self.nodes[node.0].namespaces.insert(prefix.to_owned(), uri.to_owned());
    }

    /// Adds character data. Only the first text (or CDATA) child is kept.
    pub fn add_text(&mut self, node: NodeId, text: &str) {
        let slot = &mut self.nodes[node.0].text;
        if slot.is_none() {
            *slot = Some(text.to_owned());
        }
    }
}

/// A reference to a parsed element.
#[derive(Copy, Clone)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    #[inline]
    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id.0]
    }

    /// The expanded name, which [`std::fmt::Display`]s as `namespace:local_name`.
    #[inline]
    pub fn name(&self) -> ExpandedNameRef<'a> {
        self.data().name.as_ref()
    }

    #[inline]
    pub fn local_name(&self) -> &'a str {
        &self.data().name.local_name
    }

    pub fn namespace_uri(&self) -> Option<&'a str> {
        let ns = &self.data().name.namespace;
        if ns.is_empty() {
            None
        } else {
            Some(ns)
        }
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.data().prefix.as_deref()
    }

    /// Iterates over the attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (ExpandedNameRef<'a>, &'a str)> + 'a {
        self.data()
            .attributes
            .values()
            .map(|a| (a.name.as_ref(), a.value.as_str()))
    }

    /// Looks up an attribute by its `namespace:local_name` key.
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.data().attributes.get(key).map(|a| a.value.as_str())
    }

    /// Iterates over the namespaces declared on this element, as
    /// (prefix or `xmlns`, URI).
    pub fn namespaces(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.data()
            .namespaces
            .iter()
            .map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Iterates over the child elements; text is excluded.
    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        self.data().children.iter().map(move |&id| Node { doc, id })
    }

    /// The first text or CDATA child, if any.
    pub fn text(&self) -> Option<&'a str> {
        self.data().text.as_deref()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| Node { doc: self.doc, id })
    }
}

impl<'a> std::fmt::Debug for Node<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("text", &self.text())
            .finish()
    }
}

/// Identifies an element within a [`Builder`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElementId(usize);

#[derive(Clone, Debug, Eq, PartialEq)]
enum BuiltChild {
    Element(ElementId),
    Text(String),
    CData(String),
}

/// An element or attribute name as handed to the [`Builder`].
#[derive(Clone, Debug)]
enum PendingName {
    /// Written exactly as given.
    Raw(String),

    /// Written with whatever prefix binds the namespace where the name lands.
    /// `None` is no namespace at all.
    Qualified {
        namespace: Option<Namespace>,
        local_name: String,
    },
}

impl PendingName {
    fn qualified(namespace: Option<&Namespace>, local_name: &str) -> Self {
        PendingName::Qualified {
            namespace: namespace.cloned(),
            local_name: local_name.to_owned(),
        }
    }

    /// True if both name the same attribute; prefixes don't matter.
    fn same(&self, other: &PendingName) -> bool {
        match (self, other) {
            (PendingName::Raw(a), PendingName::Raw(b)) => a == b,
            (
                PendingName::Qualified {
                    namespace: a_ns,
                    local_name: a,
                },
                PendingName::Qualified {
                    namespace: b_ns,
                    local_name: b,
                },
            ) => a == b && a_ns.as_ref().map(|n| &n.uri) == b_ns.as_ref().map(|n| &n.uri),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingElement {
    name: PendingName,
    attributes: Vec<(PendingName, String)>,

    /// Requested declarations: prefix (empty for the default) -> URI.
    namespaces: IndexMap<String, String>,
    children: Vec<BuiltChild>,
    attached: bool,
}

#[derive(Clone, Debug, Default)]
struct BuiltElementData {
    /// As written: `prefix:local_name` or `local_name`.
    name: String,
    attributes: Vec<(String, String)>,

    /// (prefix, URI); an empty prefix declares the default namespace, and an
    /// empty URI undeclares it.
    namespaces: IndexMap<String, String>,
    children: Vec<BuiltChild>,
}

/// Accumulates an output tree.
///
/// Elements are created detached and attached with [`Builder::add_element`].
/// Qualified names get their prefixes when the tree is finished by
/// [`Builder::doc`]: each namespace is declared on the outermost element that
/// asked for it where that doesn't rebind a prefix the element itself uses,
/// otherwise on the element whose name needs it. Raw names are written as
/// given.
#[derive(Debug, Default)]
pub struct Builder {
    elements: Vec<PendingElement>,
    namespaces: IndexMap<String, String>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: PendingName) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(PendingElement {
            name,
            attributes: Vec::new(),
            namespaces: IndexMap::new(),
            children: Vec::new(),
            attached: false,
        });
        id
    }

    /// Creates a detached element named `name` (`prefix:local_name` or
    /// `local_name`), written as given.
    pub fn create_element(&mut self, name: &str) -> ElementId {
        self.push(PendingName::Raw(name.to_owned()))
    }

    /// Creates a detached element in `namespace` (or in no namespace).
    pub fn create_qualified_element(&mut self, namespace: Option<&Namespace>, local_name: &str) -> ElementId {
        self.push(PendingName::qualified(namespace, local_name))
    }

    /// Appends a CDATA section to `parent`.
    pub fn create_cdata(&mut self, text: &str, parent: ElementId) {
        self.elements[parent.0]
            .children
            .push(BuiltChild::CData(text.to_owned()));
    }

    /// Requests a namespace declaration on the root. The first URI added for
    /// a prefix wins; qualified names are unaffected either way.
    pub fn add_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        self.namespaces
            .entry(prefix.unwrap_or("").to_owned())
            .or_insert_with(|| uri.to_owned());
    }

    /// Requests a namespace declaration on `element`, so its descendants can
    /// share it.
    pub fn declare_namespace(&mut self, element: ElementId, prefix: Option<&str>, uri: &str) {
        self.elements[element.0]
            .namespaces
            .entry(prefix.unwrap_or("").to_owned())
            .or_insert_with(|| uri.to_owned());
    }

    fn set_attribute(&mut self, element: ElementId, name: PendingName, value: &str) {
        let attributes = &mut self.elements[element.0].attributes;
        match attributes.iter_mut().find(|(n, _)| n.same(&name)) {
            Some((_, v)) => *v = value.to_owned(),
            None => attributes.push((name, value.to_owned())),
        }
    }

    /// Sets an attribute, replacing any earlier value of the same name.
    pub fn add_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        self.set_attribute(element, PendingName::Raw(name.to_owned()), value)
    }

    /// Sets an attribute in `namespace` (or in no namespace), replacing any
    /// earlier value of the same expanded name.
    pub fn add_qualified_attribute(
        &mut self,
        element: ElementId,
        namespace: Option<&Namespace>,
        local_name: &str,
        value: &str,
    ) {
        self.set_attribute(element, PendingName::qualified(namespace, local_name), value)
    }

    pub fn add_element(&mut self, parent: ElementId, child: ElementId) {
        self.elements[child.0].attached = true;
        self.elements[parent.0].children.push(BuiltChild::Element(child));
    }

    pub fn add_text(&mut self, element: ElementId, text: &str) {
        self.elements[element.0]
            .children
            .push(BuiltChild::Text(text.to_owned()));
    }

    /// Finishes the tree rooted at the first detached element, declaring the
    /// namespaces requested with [`Builder::add_namespace`] on it.
    pub fn doc(mut self) -> Result<BuiltDocument, Error> {
        let root = self
            .elements
            .iter()
            .position(|e| !e.attached)
            .ok_or_else(|| Error::XmlWrite("document has no root element".to_owned()))?;
        let requested = &mut self.elements[root].namespaces;
        for (prefix, uri) in self.namespaces.drain(..) {
            requested.entry(prefix).or_insert(uri);
        }
        let mut elements = vec![BuiltElementData::default(); self.elements.len()];
        resolve(&self.elements, &mut elements, ElementId(root), &Scope::new());
        Ok(BuiltDocument {
            elements,
            root: ElementId(root),
        })
    }
}

/// Prefix bindings in effect: prefix (empty for the default) -> URI (empty
/// for none).
type Scope = IndexMap<String, String>;

fn bound<'a>(scope: &'a Scope, prefix: &str) -> &'a str {
    scope.get(prefix).map_or("", String::as_str)
}

fn bind(scope: &mut Scope, declared: &mut IndexMap<String, String>, prefix: &str, uri: &str) {
    scope.insert(prefix.to_owned(), uri.to_owned());
    declared.insert(prefix.to_owned(), uri.to_owned());
}

fn qualify(prefix: &str, local_name: &str) -> String {
    if prefix.is_empty() {
        local_name.to_owned()
    } else {
        format!("{}:{}", prefix, local_name)
    }
}

/// Returns `base1`, `base2`, ... whichever is first unbound.
fn fresh_prefix(scope: &Scope, base: &str) -> String {
    let mut n = 1;
    loop {
        let prefix = format!("{}{}", base, n);
        if !scope.contains_key(&prefix) {
            return prefix;
        }
        n += 1;
    }
}

/// Picks a prefix for a namespaced attribute, declaring one if needed.
///
/// Attributes never use the default namespace, and may not rebind a prefix
/// already in scope: the element or an earlier attribute may rely on it.
fn attribute_prefix(scope: &mut Scope, declared: &mut IndexMap<String, String>, ns: &Namespace) -> String {
    let preferred = ns.prefix.as_deref().filter(|p| !p.is_empty());
    if let Some(p) = preferred {
        if bound(scope, p) == ns.uri {
            return p.to_owned();
        }
    }
    if let Some((p, _)) = scope.iter().find(|(p, u)| !p.is_empty() && **u == ns.uri) {
        return p.clone();
    }
    let prefix = match preferred {
        Some(p) if !scope.contains_key(p) => p.to_owned(),
        _ => fresh_prefix(scope, preferred.unwrap_or("ns")),
    };
    bind(scope, declared, &prefix, &ns.uri);
    prefix
}

/// Writes the element `id` and its subtree into `out` with prefixes resolved
/// against `outer`.
fn resolve(pending: &[PendingElement], out: &mut [BuiltElementData], id: ElementId, outer: &Scope) {
    let p = &pending[id.0];
    let mut scope = outer.clone();
    let mut declared = IndexMap::new();

    // The element's own prefix, which requested declarations must not rebind
    // to another URI.
    let (name, own_prefix) = match &p.name {
        PendingName::Raw(n) => {
            let prefix = n.split_once(':').map_or("", |(prefix, _)| prefix);
            (n.clone(), prefix)
        }
        PendingName::Qualified {
            namespace,
            local_name,
        } => {
            let prefix = namespace.as_ref().and_then(|ns| ns.prefix.as_deref()).unwrap_or("");
            let uri = namespace.as_ref().map_or("", |ns| ns.uri.as_str());
            if bound(&scope, prefix) != uri {
                bind(&mut scope, &mut declared, prefix, uri);
            }
            (qualify(prefix, local_name), prefix)
        }
    };
    for (prefix, uri) in &p.namespaces {
        if declared.contains_key(prefix) || bound(&scope, prefix) == uri.as_str() {
            continue;
        }
        let rebinds_own = prefix.as_str() == own_prefix
            && (matches!(p.name, PendingName::Qualified { .. }) || scope.contains_key(prefix));
        if rebinds_own {
            continue;
        }
        bind(&mut scope, &mut declared, prefix, uri);
    }

    let mut attributes = Vec::with_capacity(p.attributes.len());
    for (n, value) in &p.attributes {
        let name = match n {
            PendingName::Raw(n) => n.clone(),
            PendingName::Qualified {
                namespace: None,
                local_name,
            } => local_name.clone(),
            PendingName::Qualified {
                namespace: Some(ns),
                local_name,
            } => qualify(&attribute_prefix(&mut scope, &mut declared, ns), local_name),
        };
        attributes.push((name, value.clone()));
    }

    out[id.0] = BuiltElementData {
        name,
        attributes,
        namespaces: declared,
        children: p.children.clone(),
    };
    for child in &p.children {
        if let BuiltChild::Element(e) = child {
            resolve(pending, out, *e, &scope);
        }
    }
}

/// A finished output tree, ready for [`XmlBackend::dump`].
#[derive(Clone, Debug)]
pub struct BuiltDocument {
    elements: Vec<BuiltElementData>,
    root: ElementId,
}

impl BuiltDocument {
    pub fn root(&self) -> BuiltElement<'_> {
        BuiltElement {
            doc: self,
            id: self.root,
        }
    }
}

/// A reference to an element of a [`BuiltDocument`].
#[derive(Copy, Clone)]
pub struct BuiltElement<'a> {
    doc: &'a BuiltDocument,
    id: ElementId,
}

/// A child of a [`BuiltElement`], in output order.
#[derive(Copy, Clone)]
pub enum BuiltNode<'a> {
    Element(BuiltElement<'a>),
    Text(&'a str),
    CData(&'a str),
}

impl<'a> BuiltElement<'a> {
    #[inline]
    fn data(&self) -> &'a BuiltElementData {
        &self.doc.elements[self.id.0]
    }

    /// The name as written: `prefix:local_name` or `local_name`.
    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.data()
            .attributes
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Namespace declarations as (prefix, URI); the prefix is empty for the
    /// default namespace.
    pub fn namespaces(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.data()
            .namespaces
            .iter()
            .map(|(p, u)| (p.as_str(), u.as_str()))
    }

    pub fn children(&self) -> impl Iterator<Item = BuiltNode<'a>> + 'a {
        let doc = self.doc;
        self.data().children.iter().map(move |c| match c {
            BuiltChild::Element(id) => BuiltNode::Element(BuiltElement { doc, id: *id }),
            BuiltChild::Text(t) => BuiltNode::Text(t),
            BuiltChild::CData(t) => BuiltNode::CData(t),
        })
    }
}
