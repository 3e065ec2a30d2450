// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use crate::BoxedStdError;

/// An error while converting between a document and an [`crate::Instance`].
///
/// Codec errors are carried unchanged; use `std::error::Error::source` or
/// match on the variant to get at them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    XmlParse(#[from] crate::xml::ParseError),

    #[error("no codec configured for {format}")]
    NoCodec { format: crate::codec::Format },

    #[error("unable to write XML: {0}")]
    XmlWrite(String),

    /// An error returned by a `using`, `receiver`, or group method.
    #[error("conversion method for {key:?} failed: {source}")]
    Custom {
        key: String,
        #[source]
        source: BoxedStdError,
    },

    /// A document fragment had the wrong shape for its target, e.g. a string
    /// where a nested model expects a map.
    #[error("{model} expects {expected}, got {got}")]
    UnexpectedShape {
        model: String,
        expected: &'static str,
        got: String,
    },

    #[error("document nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },
}

impl Error {
    pub(crate) fn custom(key: &str, source: BoxedStdError) -> Self {
        Error::Custom {
            key: key.to_owned(),
            source,
        }
    }
}

/// A raw value that can't be coerced to its declared type.
#[derive(Debug, thiserror::Error)]
#[error("can't cast {value} to {type_name}: {reason}")]
pub struct CastError {
    pub type_name: String,
    pub value: String,
    pub reason: String,
}

impl CastError {
    pub fn new(type_name: &str, value: impl std::fmt::Debug, reason: impl std::fmt::Display) -> Self {
        CastError {
            type_name: type_name.to_owned(),
            value: format!("{:?}", value),
            reason: reason.to_string(),
        }
    }
}

/// A misconfigured mapping table.
///
/// These are returned while a table is being declared, never during
/// conversion.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("binding {key:?} needs either `to` or `using`")]
    MissingTarget { key: String },

    #[error("binding {key:?} can't have both `to` and `using`")]
    ConflictingTarget { key: String },

    #[error("binding {key:?} is converted by its group's methods and can't have `to` or `using`")]
    GroupedTarget { key: String },

    #[error("binding {key:?} has a receiver but no `to` attribute")]
    ReceiverWithoutTo { key: String },

    #[error("binding {key:?} sets {option}, which only applies to XML")]
    XmlOnlyOption { key: String, option: &'static str },

    #[error("attribute binding {key:?} can't be written as CDATA")]
    CdataAttribute { key: String },

    #[error("binding {key:?} must give namespace and prefix together")]
    IncompleteNamespace { key: String },

    #[error("mapping for {key:?} added after the table was finalized")]
    Finalized { key: String },

    #[error("the default render-nil policy is already set")]
    RenderNilDefaultSet,

    #[error("{format} mapping already declared for {model}")]
    DuplicateTable { model: String, format: String },
}
