// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping tables for the key/value formats: hash, JSON, YAML, and TOML.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use serde_json::Value as Json;

use super::{Bind, GroupId, Receiver, TableState};
use crate::attribute::AttributeRegistry;
use crate::error::MappingError;
use crate::value::Instance;
use crate::BoxedStdError;

type FromDict = Arc<dyn Fn(&mut Instance, &Json) -> Result<(), BoxedStdError> + Send + Sync>;
type ToDict = Arc<dyn Fn(&Instance) -> Result<Json, BoxedStdError> + Send + Sync>;

/// Custom conversion methods for a dict binding or group.
///
/// `from` receives the raw document value (for a group, a map of every
/// grouped key present); `to` returns the value to place in the document
/// (for a group, a map keyed by the grouped keys).
#[derive(Clone)]
pub struct DictMethods {
    pub(crate) from: FromDict,
    pub(crate) to: ToDict,
}

impl DictMethods {
    pub fn new<F, T>(from: F, to: T) -> Self
    where
        F: Fn(&mut Instance, &Json) -> Result<(), BoxedStdError> + Send + Sync + 'static,
        T: Fn(&Instance) -> Result<Json, BoxedStdError> + Send + Sync + 'static,
    {
        DictMethods {
            from: Arc::new(from),
            to: Arc::new(to),
        }
    }
}

/// A single declared key binding.
#[derive(Clone)]
pub struct DictRule {
    key: String,
    to: Option<String>,
    receiver: Option<Receiver>,
    using: Option<DictMethods>,
    group: Option<GroupId>,
    render_nil: Option<bool>,
}

impl std::fmt::Debug for DictRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictRule")
            .field("key", &self.key)
            .field("to", &self.to)
            .field("receiver", &self.receiver.is_some())
            .field("using", &self.using.is_some())
            .field("group", &self.group)
            .field("render_nil", &self.render_nil)
            .finish()
    }
}

impl DictRule {
    /// The document key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The bound attribute's name, if any.
    #[inline]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    #[inline]
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    #[inline]
    pub(crate) fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    #[inline]
    pub(crate) fn using(&self) -> Option<&DictMethods> {
        self.using.as_ref()
    }
}

/// The key bindings of one model for one key/value format.
///
/// Once finalized (which [`crate::Model`] does when the table is attached),
/// the table is read-only; use [`DictMapping::duplicate`] to extend it.
#[derive(Clone, Default)]
pub struct DictMapping {
    rules: IndexMap<String, DictRule>,
    groups: Vec<(GroupId, DictMethods)>,
    state: TableState,

    /// True while collecting the bindings of a `group` call.
    in_group: bool,
}

impl std::fmt::Debug for DictMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictMapping")
            .field("rules", &self.rules)
            .field("groups", &self.groups.len())
            .field("state", &self.state)
            .finish()
    }
}

impl DictMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps document `key` as described by `bind`.
    ///
    /// A later binding for the same key replaces the earlier one.
    pub fn map(&mut self, key: &str, bind: Bind<DictMethods>) -> Result<&mut Self, MappingError> {
        self.state.check_open(key)?;
        bind.validate(key, self.in_group)?;
        bind.reject_xml_options(key)?;
        self.rules.insert(
            key.to_owned(),
            DictRule {
                key: key.to_owned(),
                to: bind.to,
                receiver: bind.receiver,
                using: bind.using,
                group: None,
                render_nil: bind.render_nil,
            },
        );
        Ok(self)
    }

    /// Declares bindings which are converted together by one pair of methods.
    ///
    /// The bindings declared within `f` take neither `to` nor `using`; all of
    /// them share `methods` and a fresh group id.
    pub fn group<F>(&mut self, methods: DictMethods, f: F) -> Result<&mut Self, MappingError>
    where
        F: FnOnce(&mut DictMapping) -> Result<(), MappingError>,
    {
        self.state.check_open("group")?;
        let mut sub = DictMapping {
            in_group: true,
            ..DictMapping::default()
        };
        f(&mut sub)?;
        let id = self.state.next_group();
        for (key, mut rule) in sub.rules {
            rule.group = Some(id);
            self.rules.insert(key, rule);
        }
        self.groups.push((id, methods));
        Ok(self)
    }

    /// Sets the render-nil policy for bindings that don't choose one. May be
    /// called once.
    pub fn set_render_nil_default(&mut self, render_nil: bool) -> Result<&mut Self, MappingError> {
        self.state.set_render_nil_default(render_nil)?;
        Ok(self)
    }

    /// Forbids further changes.
    pub fn finalize(&mut self) {
        if !self.state.is_finalized() {
            debug!("finalizing dict mapping with {} bindings", self.rules.len());
        }
        self.state.finalize();
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Returns an open copy of this table, for a derived model to extend.
    pub fn duplicate(&self) -> Self {
        DictMapping {
            rules: self.rules.clone(),
            groups: self.groups.clone(),
            state: self.state.reopened(),
            in_group: false,
        }
    }

    /// Looks up the binding for a document key.
    #[inline]
    pub fn find(&self, key: &str) -> Option<&DictRule> {
        self.rules.get(key)
    }

    /// Iterates over the bindings in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &DictRule> {
        self.rules.values()
    }

    /// Whether `None`/nil values of this binding are written.
    #[inline]
    pub fn renders_nil(&self, rule: &DictRule) -> bool {
        self.state.render_nil(rule.render_nil)
    }

    pub(crate) fn group_methods(&self, id: GroupId) -> Option<&DictMethods> {
        self.groups.iter().find(|(g, _)| *g == id).map(|(_, m)| m)
    }

    pub(crate) fn groups(&self) -> impl Iterator<Item = &(GroupId, DictMethods)> {
        self.groups.iter()
    }

    /// The mapping used when a model declares none: every attribute under its own name.
    pub(crate) fn default_for(attributes: &AttributeRegistry) -> Self {
        let mut mapping = DictMapping::new();
        for a in attributes.iter() {
            mapping.rules.insert(
                a.name().to_owned(),
                DictRule {
                    key: a.name().to_owned(),
                    to: Some(a.name().to_owned()),
                    receiver: None,
                    using: None,
                    group: None,
                    render_nil: None,
                },
            );
        }
        mapping.finalize();
        mapping
    }
}
