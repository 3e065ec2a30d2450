// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping tables: which document field feeds which attribute.
//!
//! [`dict::DictMapping`] serves the key/value formats, [`xml::XmlMapping`]
//! serves XML. Both take their per-binding arguments as a [`Bind`] and check
//! them when the binding is declared, so a bad table never reaches
//! conversion.

pub mod dict;
pub mod xml;

use std::sync::Arc;

use crate::error::MappingError;
use crate::value::{Instance, Value};
use crate::BoxedStdError;

/// Called with the cast value instead of assigning it to the attribute.
pub type Receiver = Arc<dyn Fn(&mut Instance, Value) -> Result<(), BoxedStdError> + Send + Sync>;

/// Identifies the bindings declared by one `group` call on a table.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct GroupId(pub(crate) usize);

/// A namespace URI and the prefix to write it with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Namespace {
    pub uri: String,

    /// `None` declares the default namespace (`xmlns="..."`).
    pub prefix: Option<String>,
}

impl Namespace {
    pub fn new(uri: impl Into<String>, prefix: Option<&str>) -> Self {
        Namespace {
            uri: uri.into(),
            prefix: prefix.map(str::to_owned),
        }
    }

    /// Returns `prefix:local_name`, or `local_name` without a prefix.
    pub fn qualify(&self, local_name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, local_name),
            None => local_name.to_owned(),
        }
    }
}

/// How an XML binding chooses its namespace.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) enum NamespaceArg {
    /// Use the table's default namespace.
    #[default]
    Inherit,

    /// Explicitly unqualified.
    Unqualified,

    Explicit(Namespace),

    /// Only one of namespace/prefix was given; rejected on bind.
    Incomplete,
}

/// The arguments of a single binding.
///
/// `M` is the pair of custom conversion methods for the table's format:
/// [`dict::DictMethods`] or [`xml::XmlMethods`].
///
/// ```rust
/// use docmap::{Bind, DictMapping};
///
/// let mut mapping = DictMapping::new();
/// mapping.map("first_name", Bind::to("name").render_nil(true)).unwrap();
/// assert!(mapping.map("oops", Bind::default()).is_err());
/// ```
pub struct Bind<M> {
    pub(crate) to: Option<String>,
    pub(crate) receiver: Option<Receiver>,
    pub(crate) using: Option<M>,
    pub(crate) render_nil: Option<bool>,
    pub(crate) cdata: Option<bool>,
    pub(crate) namespace: NamespaceArg,
}

impl<M> Default for Bind<M> {
    fn default() -> Self {
        Bind {
            to: None,
            receiver: None,
            using: None,
            render_nil: None,
            cdata: None,
            namespace: NamespaceArg::Inherit,
        }
    }
}

impl<M> Bind<M> {
    /// Binds to the named attribute.
    pub fn to(attribute: impl Into<String>) -> Self {
        Bind {
            to: Some(attribute.into()),
            ..Default::default()
        }
    }

    /// Binds to a pair of custom conversion methods.
    pub fn using(methods: M) -> Self {
        Bind {
            using: Some(methods),
            ..Default::default()
        }
    }

    /// Sets the attribute alongside `using`; rejected on bind.
    ///
    /// Exists so a table can be handed both and report the conflict.
    pub fn and_to(self, attribute: impl Into<String>) -> Self {
        Bind {
            to: Some(attribute.into()),
            ..self
        }
    }

    /// Hands the cast value to `f` rather than assigning it.
    pub fn receiver<F>(self, f: F) -> Self
    where
        F: Fn(&mut Instance, Value) -> Result<(), BoxedStdError> + Send + Sync + 'static,
    {
        Bind {
            receiver: Some(Arc::new(f)),
            ..self
        }
    }

    /// Overrides the table's default render-nil policy for this binding.
    pub fn render_nil(self, render_nil: bool) -> Self {
        Bind {
            render_nil: Some(render_nil),
            ..self
        }
    }

    /// Writes the value as a CDATA section. XML only.
    pub fn cdata(self, cdata: bool) -> Self {
        Bind {
            cdata: Some(cdata),
            ..self
        }
    }

    /// Places the binding in an explicit namespace. XML only.
    ///
    /// Both or neither must be given; `(None, None)` is the same as
    /// [`Bind::no_namespace`].
    pub fn namespace(self, uri: Option<&str>, prefix: Option<&str>) -> Self {
        let namespace = match (uri, prefix) {
            (Some(uri), Some(prefix)) => NamespaceArg::Explicit(Namespace::new(uri, Some(prefix))),
            (None, None) => NamespaceArg::Unqualified,
            _ => NamespaceArg::Incomplete,
        };
        Bind { namespace, ..self }
    }

    /// Opts out of the table's default namespace. XML only.
    pub fn no_namespace(self) -> Self {
        Bind {
            namespace: NamespaceArg::Unqualified,
            ..self
        }
    }

    /// Checks the invariants shared by every table.
    ///
    /// `in_group` bindings are converted by the group's methods, so they take
    /// neither `to` nor `using`.
    pub(crate) fn validate(&self, key: &str, in_group: bool) -> Result<(), MappingError> {
        let key = || key.to_owned();
        match (&self.to, &self.using) {
            (Some(_), Some(_)) => return Err(MappingError::ConflictingTarget { key: key() }),
            (Some(_), None) | (None, Some(_)) if in_group => {
                return Err(MappingError::GroupedTarget { key: key() })
            }
            (None, None) if !in_group => return Err(MappingError::MissingTarget { key: key() }),
            _ => {}
        }
        if self.receiver.is_some() && self.to.is_none() {
            return Err(MappingError::ReceiverWithoutTo { key: key() });
        }
        if self.namespace == NamespaceArg::Incomplete {
            return Err(MappingError::IncompleteNamespace { key: key() });
        }
        Ok(())
    }

    /// Rejects the XML-only arguments, for the dict tables.
    pub(crate) fn reject_xml_options(&self, key: &str) -> Result<(), MappingError> {
        let option = if self.cdata.is_some() {
            "cdata"
        } else if self.namespace != NamespaceArg::Inherit {
            "namespace"
        } else {
            return Ok(());
        };
        Err(MappingError::XmlOnlyOption {
            key: key.to_owned(),
            option,
        })
    }
}

/// Shared table bookkeeping: the finalized flag and the default render-nil policy.
#[derive(Clone, Debug, Default)]
pub(crate) struct TableState {
    finalized: bool,
    render_nil_default: Option<bool>,
    next_group: usize,
}

impl TableState {
    pub(crate) fn check_open(&self, key: &str) -> Result<(), MappingError> {
        if self.finalized {
            return Err(MappingError::Finalized {
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    pub(crate) fn set_render_nil_default(&mut self, render_nil: bool) -> Result<(), MappingError> {
        self.check_open("render_nil")?;
        if self.render_nil_default.is_some() {
            return Err(MappingError::RenderNilDefaultSet);
        }
        self.render_nil_default = Some(render_nil);
        Ok(())
    }

    #[inline]
    pub(crate) fn render_nil(&self, binding: Option<bool>) -> bool {
        binding.or(self.render_nil_default).unwrap_or(false)
    }

    pub(crate) fn next_group(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    #[inline]
    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Returns an open copy, for a derived table.
    pub(crate) fn reopened(&self) -> Self {
        TableState {
            finalized: false,
            ..self.clone()
        }
    }
}
