// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping tables for XML.
//!
//! Bindings are looked up by expanded name (`namespace:local_name`, see
//! [`crate::ExpandedNameRef`]) so two namespaces may share a local name.
//! Bindings declared without namespace arguments inherit the table's default
//! namespace, which may be declared before or after them: names are resolved
//! when the table is finalized.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use super::{Bind, GroupId, Namespace, NamespaceArg, Receiver, TableState};
use crate::attribute::AttributeRegistry;
use crate::error::MappingError;
use crate::group::XmlGroupValues;
use crate::value::Instance;
use crate::xml::{Builder, ElementId, Node};
use crate::{BoxedStdError, ExpandedNameRef};

/// The raw document value handed to an XML `from` method.
#[derive(Copy, Clone, Debug)]
pub enum XmlInput<'a> {
    /// An attribute value or the element's character content.
    Text(&'a str),

    /// A child element.
    Element(Node<'a>),
}

type FromXml = Arc<dyn Fn(&mut Instance, XmlInput<'_>) -> Result<(), BoxedStdError> + Send + Sync>;
type ToXml =
    Arc<dyn Fn(&Instance, &mut Builder, ElementId) -> Result<(), BoxedStdError> + Send + Sync>;

/// Custom conversion methods for an XML binding.
///
/// `to` receives the element being built and writes whatever it likes into
/// it: a child element, an attribute, or text.
#[derive(Clone)]
pub struct XmlMethods {
    pub(crate) from: FromXml,
    pub(crate) to: ToXml,
}

impl XmlMethods {
    pub fn new<F, T>(from: F, to: T) -> Self
    where
        F: Fn(&mut Instance, XmlInput<'_>) -> Result<(), BoxedStdError> + Send + Sync + 'static,
        T: Fn(&Instance, &mut Builder, ElementId) -> Result<(), BoxedStdError>
            + Send
            + Sync
            + 'static,
    {
        XmlMethods {
            from: Arc::new(from),
            to: Arc::new(to),
        }
    }
}

type FromGroup = Arc<dyn Fn(&mut Instance, &XmlGroupValues) -> Result<(), BoxedStdError> + Send + Sync>;
type ToGroup = Arc<dyn Fn(&Instance) -> Result<XmlGroupValues, BoxedStdError> + Send + Sync>;

/// Conversion methods for an XML group.
///
/// Both directions see the grouped fields as text, keyed by local name.
#[derive(Clone)]
pub struct XmlGroupMethods {
    pub(crate) from: FromGroup,
    pub(crate) to: ToGroup,
}

impl XmlGroupMethods {
    pub fn new<F, T>(from: F, to: T) -> Self
    where
        F: Fn(&mut Instance, &XmlGroupValues) -> Result<(), BoxedStdError> + Send + Sync + 'static,
        T: Fn(&Instance) -> Result<XmlGroupValues, BoxedStdError> + Send + Sync + 'static,
    {
        XmlGroupMethods {
            from: Arc::new(from),
            to: Arc::new(to),
        }
    }
}

/// Where in the element a binding's value lives.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum XmlKind {
    Element,
    Attribute,
    Content,
}

/// A single declared element, attribute, or content binding.
#[derive(Clone)]
pub struct XmlRule {
    kind: XmlKind,
    name: String,
    to: Option<String>,
    receiver: Option<Receiver>,
    using: Option<XmlMethods>,
    group: Option<GroupId>,
    render_nil: Option<bool>,
    cdata: bool,
    namespace: NamespaceArg,
}

impl XmlRule {
    #[inline]
    pub fn kind(&self) -> XmlKind {
        self.kind
    }

    /// The local name of the element or attribute; empty for content.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    #[inline]
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    #[inline]
    pub fn cdata(&self) -> bool {
        self.cdata
    }

    #[inline]
    pub(crate) fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    #[inline]
    pub(crate) fn using(&self) -> Option<&XmlMethods> {
        self.using.as_ref()
    }
}

impl std::fmt::Debug for XmlRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlRule")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("to", &self.to)
            .field("receiver", &self.receiver.is_some())
            .field("using", &self.using.is_some())
            .field("group", &self.group)
            .field("render_nil", &self.render_nil)
            .field("cdata", &self.cdata)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// The XML bindings of one model, plus its root element name and default
/// namespace.
#[derive(Clone, Default)]
pub struct XmlMapping {
    root: Option<String>,
    namespace: Option<Namespace>,
    rules: Vec<XmlRule>,
    groups: Vec<(GroupId, XmlGroupMethods)>,
    state: TableState,
    in_group: bool,

    // Built by `finalize`: expanded-name key -> index within `rules`.
    elements: IndexMap<String, usize>,
    attributes: IndexMap<String, usize>,

    /// Attributes which inherited a prefixed namespace, by local name; these
    /// also match unprefixed attributes when parsing.
    inherited_attributes: IndexMap<String, usize>,
    content: Option<usize>,
}

impl XmlMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element name used when this model is serialized at the top level.
    pub fn root(&mut self, name: &str) -> Result<&mut Self, MappingError> {
        self.state.check_open(name)?;
        self.root = Some(name.to_owned());
        Ok(self)
    }

    /// Sets the default namespace, inherited by bindings that don't choose one.
    pub fn namespace(&mut self, uri: &str, prefix: Option<&str>) -> Result<&mut Self, MappingError> {
        self.state.check_open(uri)?;
        self.namespace = Some(Namespace::new(uri, prefix));
        Ok(self)
    }

    pub fn map_element(&mut self, name: &str, bind: Bind<XmlMethods>) -> Result<&mut Self, MappingError> {
        self.push(XmlKind::Element, name, bind)
    }

    pub fn map_attribute(&mut self, name: &str, bind: Bind<XmlMethods>) -> Result<&mut Self, MappingError> {
        if bind.cdata.is_some() {
            return Err(MappingError::CdataAttribute {
                key: name.to_owned(),
            });
        }
        self.push(XmlKind::Attribute, name, bind)
    }

    /// Maps the element's character content.
    pub fn map_content(&mut self, bind: Bind<XmlMethods>) -> Result<&mut Self, MappingError> {
        self.push(XmlKind::Content, "", bind)
    }

    fn push(&mut self, kind: XmlKind, name: &str, bind: Bind<XmlMethods>) -> Result<&mut Self, MappingError> {
        let key = if name.is_empty() { "content" } else { name };
        self.state.check_open(key)?;
        bind.validate(key, self.in_group)?;
        self.rules.push(XmlRule {
            kind,
            name: name.to_owned(),
            to: bind.to,
            receiver: bind.receiver,
            using: bind.using,
            group: None,
            render_nil: bind.render_nil,
            cdata: bind.cdata.unwrap_or(false),
            namespace: bind.namespace,
        });
        Ok(self)
    }

    /// Declares bindings which are converted together by one pair of methods.
    pub fn group<F>(&mut self, methods: XmlGroupMethods, f: F) -> Result<&mut Self, MappingError>
    where
        F: FnOnce(&mut XmlMapping) -> Result<(), MappingError>,
    {
        self.state.check_open("group")?;
        let mut sub = XmlMapping {
            in_group: true,
            ..XmlMapping::default()
        };
        f(&mut sub)?;
        let id = self.state.next_group();
        for mut rule in sub.rules {
            rule.group = Some(id);
            self.rules.push(rule);
        }
        self.groups.push((id, methods));
        Ok(self)
    }

    pub fn set_render_nil_default(&mut self, render_nil: bool) -> Result<&mut Self, MappingError> {
        self.state.set_render_nil_default(render_nil)?;
        Ok(self)
    }

    /// Resolves every binding's expanded name and forbids further changes.
    ///
    /// When two bindings of the same kind resolve to the same name, the later
    /// one takes the earlier one's place.
    pub fn finalize(&mut self) {
        if self.state.is_finalized() {
            return;
        }
        let mut rules: Vec<XmlRule> = Vec::with_capacity(self.rules.len());
        let mut elements = IndexMap::new();
        let mut attributes = IndexMap::new();
        let mut content = None;
        for rule in std::mem::take(&mut self.rules) {
            let slot = match rule.kind {
                XmlKind::Element => elements.get(&self.key(&rule)).copied(),
                XmlKind::Attribute => attributes.get(&self.key(&rule)).copied(),
                XmlKind::Content => content,
            };
            let i = match slot {
                Some(i) => {
                    rules[i] = rule;
                    i
                }
                None => {
                    rules.push(rule);
                    rules.len() - 1
                }
            };
            let rule = &rules[i];
            match rule.kind {
                XmlKind::Element => {
                    elements.insert(self.key(rule), i);
                }
                XmlKind::Attribute => {
                    attributes.insert(self.key(rule), i);
                }
                XmlKind::Content => content = Some(i),
            }
        }
        self.inherited_attributes = attributes
            .values()
            .filter(|&&i| rules[i].namespace == NamespaceArg::Inherit && self.rule_namespace(&rules[i]).is_some())
            .map(|&i| (rules[i].name.clone(), i))
            .collect();
        self.rules = rules;
        self.elements = elements;
        self.attributes = attributes;
        self.content = content;
        debug!(
            "finalizing XML mapping for root {:?}: {} elements, {} attributes",
            self.root,
            self.elements.len(),
            self.attributes.len()
        );
        self.state.finalize();
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Returns an open copy of this table, for a derived model to extend.
    pub fn duplicate(&self) -> Self {
        XmlMapping {
            root: self.root.clone(),
            namespace: self.namespace.clone(),
            rules: self.rules.clone(),
            groups: self.groups.clone(),
            state: self.state.reopened(),
            ..XmlMapping::default()
        }
    }

    #[inline]
    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    #[inline]
    pub fn default_namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    /// The namespace a binding resolves to, after inheritance.
    pub fn rule_namespace<'a>(&'a self, rule: &'a XmlRule) -> Option<&'a Namespace> {
        match (&rule.namespace, rule.kind) {
            (NamespaceArg::Explicit(ns), _) => Some(ns),
            (NamespaceArg::Unqualified | NamespaceArg::Incomplete, _) => None,
            (NamespaceArg::Inherit, XmlKind::Attribute) => {
                // An unprefixed attribute is never namespaced, so only a
                // prefixed default can be inherited.
                self.namespace.as_ref().filter(|ns| ns.prefix.is_some())
            }
            (NamespaceArg::Inherit, _) => self.namespace.as_ref(),
        }
    }

    /// The lookup key of a binding: its expanded name.
    pub fn key(&self, rule: &XmlRule) -> String {
        ExpandedNameRef {
            namespace: self.rule_namespace(rule).map(|ns| ns.uri.as_str()).unwrap_or(""),
            local_name: &rule.name,
        }
        .key()
    }

    /// The name a binding is written with where its prefix is free:
    /// `prefix:local_name` or `local_name`. The [`Builder`] picks another
    /// prefix where this one is bound to a different namespace.
    pub fn output_name(&self, rule: &XmlRule) -> String {
        match self.rule_namespace(rule) {
            Some(ns) => ns.qualify(&rule.name),
            None => rule.name.clone(),
        }
    }

    /// The name to write for the root element.
    pub fn root_output_name(&self, fallback: &str) -> String {
        let root = self.root.as_deref().unwrap_or(fallback);
        match &self.namespace {
            Some(ns) => ns.qualify(root),
            None => root.to_owned(),
        }
    }

    pub fn find_element(&self, name: &ExpandedNameRef<'_>) -> Option<&XmlRule> {
        if self.state.is_finalized() {
            return self.elements.get(&name.key()).map(|&i| &self.rules[i]);
        }
        self.scan(XmlKind::Element, name)
    }

    pub fn find_attribute(&self, name: &ExpandedNameRef<'_>) -> Option<&XmlRule> {
        if !self.state.is_finalized() {
            return self.scan(XmlKind::Attribute, name);
        }
        self.attributes
            .get(&name.key())
            .or_else(|| {
                if name.namespace.is_empty() {
                    self.inherited_attributes.get(name.local_name)
                } else {
                    None
                }
            })
            .map(|&i| &self.rules[i])
    }

    pub fn content(&self) -> Option<&XmlRule> {
        if self.state.is_finalized() {
            return self.content.map(|i| &self.rules[i]);
        }
        self.rules.iter().rev().find(|r| r.kind == XmlKind::Content)
    }

    /// Lookup for tables that aren't finalized yet: latest declaration wins.
    fn scan(&self, kind: XmlKind, name: &ExpandedNameRef<'_>) -> Option<&XmlRule> {
        let key = name.key();
        self.rules
            .iter()
            .rev()
            .find(|r| r.kind == kind && self.key(r) == key)
    }

    /// Iterates over the bindings: attributes first, then content and
    /// elements in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &XmlRule> {
        let attributes = self.rules.iter().filter(|r| r.kind == XmlKind::Attribute);
        let rest = self.rules.iter().filter(|r| r.kind != XmlKind::Attribute);
        attributes.chain(rest)
    }

    #[inline]
    pub fn renders_nil(&self, rule: &XmlRule) -> bool {
        self.state.render_nil(rule.render_nil)
    }

    pub(crate) fn group_methods(&self, id: GroupId) -> Option<&XmlGroupMethods> {
        self.groups.iter().find(|(g, _)| *g == id).map(|(_, m)| m)
    }

    pub(crate) fn groups(&self) -> impl Iterator<Item = &(GroupId, XmlGroupMethods)> {
        self.groups.iter()
    }

    /// The mapping used when a model declares none: one unqualified element
    /// per attribute, under the model's name.
    pub(crate) fn default_for(model_name: &str, attributes: &AttributeRegistry) -> Self {
        let mut mapping = XmlMapping {
            root: Some(model_name.to_owned()),
            ..XmlMapping::default()
        };
        for a in attributes.iter() {
            mapping.rules.push(XmlRule {
                kind: XmlKind::Element,
                name: a.name().to_owned(),
                to: Some(a.name().to_owned()),
                receiver: None,
                using: None,
                group: None,
                render_nil: None,
                cdata: false,
                namespace: NamespaceArg::Inherit,
            });
        }
        mapping.finalize();
        mapping
    }
}

impl std::fmt::Debug for XmlMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlMapping")
            .field("root", &self.root)
            .field("namespace", &self.namespace)
            .field("rules", &self.rules)
            .field("groups", &self.groups.len())
            .field("state", &self.state)
            .finish()
    }
}
