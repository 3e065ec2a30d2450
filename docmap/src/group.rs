// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversion accumulation of grouped document fields.
//!
//! While a document is read, the values of every binding declared inside a
//! `group` block are collected here, one bucket per group, and handed to the
//! group's `from` method once the whole document has been seen.

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::mapping::xml::XmlKind;
use crate::mapping::GroupId;

/// Dict group buckets: document key -> raw value, per group.
#[derive(Debug, Default)]
pub struct DictGroups {
    buckets: IndexMap<GroupId, Map<String, Json>>,
}

impl DictGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` under `key` in `group`'s bucket, creating it if needed.
    pub fn add(&mut self, group: GroupId, key: &str, value: Json) {
        self.buckets.entry(group).or_default().insert(key.to_owned(), value);
    }

    /// Iterates over the buckets in the order their groups were first seen.
    pub fn each(&self) -> impl Iterator<Item = (GroupId, &Map<String, Json>)> {
        self.buckets.iter().map(|(&g, b)| (g, b))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// The grouped fields of one element, as text.
///
/// Fields are keyed by their binding's expanded name: the local name when
/// unqualified, `namespace:local_name` otherwise, so same-named fields in
/// different namespaces stay apart. Repeated elements keep every occurrence
/// in document order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct XmlGroupValues {
    pub content: Option<String>,
    pub attributes: IndexMap<String, String>,
    pub elements: IndexMap<String, Vec<String>>,
}

impl XmlGroupValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first value of element `key`.
    pub fn element(&self, key: &str) -> Option<&str> {
        self.elements.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Builder-style setter for an element value, for group `to` methods.
    pub fn with_element(mut self, key: &str, value: impl Into<String>) -> Self {
        self.elements.entry(key.to_owned()).or_default().push(value.into());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_content(mut self, value: impl Into<String>) -> Self {
        self.content = Some(value.into());
        self
    }

    pub(crate) fn add(&mut self, kind: XmlKind, key: &str, value: String) {
        match kind {
            XmlKind::Content => self.content = Some(value),
            XmlKind::Attribute => {
                self.attributes.insert(key.to_owned(), value);
            }
            XmlKind::Element => self.elements.entry(key.to_owned()).or_default().push(value),
        }
    }
}

/// XML group buckets, one [`XmlGroupValues`] per group.
#[derive(Debug, Default)]
pub struct XmlGroups {
    buckets: IndexMap<GroupId, XmlGroupValues>,
}

impl XmlGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `value` by `kind` into `group`'s bucket, creating it if needed.
    pub fn add(&mut self, group: GroupId, kind: XmlKind, key: &str, value: String) {
        self.buckets.entry(group).or_default().add(kind, key, value);
    }

    pub fn each(&self) -> impl Iterator<Item = (GroupId, &XmlGroupValues)> {
        self.buckets.iter().map(|(&g, b)| (g, b))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
