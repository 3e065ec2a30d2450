// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Table-driven mapping between typed objects and key/value (hash, JSON,
//! YAML, TOML) or XML documents.
//!
//! Each mapped class is a [`Model`]: an [`AttributeRegistry`] describing its
//! attributes plus one mapping table per document format. The same registry
//! drives every format; the tables only say which document field goes where.
//!
//! ```rust
//! use docmap::{Attribute, AttributeRegistry, Bind, DictMapping, Model, Type};
//! use once_cell::sync::Lazy;
//!
//! static TAGGED: Lazy<Model> = Lazy::new(|| {
//!     let mut attributes = AttributeRegistry::new();
//!     attributes.define(Attribute::new("name", Type::String));
//!     attributes.define(Attribute::new("tags", Type::String).collection());
//!     let mut mapping = DictMapping::new();
//!     mapping.map("name", Bind::to("name")).unwrap();
//!     mapping.map("tag", Bind::to("tags")).unwrap();
//!     Model::new("Tagged", attributes)
//!         .with_key_value_mapping(mapping)
//!         .unwrap()
//! });
//!
//! let tagged = TAGGED.from_json(r#"{"name": "a", "tag": ["x", "y"]}"#).unwrap();
//! assert_eq!(tagged.get("name").and_then(|v| v.as_str()), Some("a"));
//! assert_eq!(TAGGED.to_json(&tagged, false).unwrap(), r#"{"name":"a","tag":["x","y"]}"#);
//! ```

pub mod attribute;
pub mod codec;
pub mod config;
pub mod de;
mod error;
pub mod group;
pub mod mapping;
pub mod model;
pub mod ser;
pub mod types;
pub mod value;
pub mod xml;

pub use attribute::{Attribute, AttributeRegistry};
pub use codec::{Codec, DumpOptions, Format};
pub use error::{CastError, Error, MappingError};
pub use group::XmlGroupValues;
pub use mapping::dict::{DictMapping, DictMethods};
pub use mapping::xml::{XmlGroupMethods, XmlInput, XmlMapping, XmlMethods};
pub use mapping::Bind;
pub use model::{Mapped, Model};
pub use types::{Type, ValueType};
pub use value::{Instance, Value};
pub use crate::xml::XmlOptions;

/// A reference to an "expanded name": namespace and local name.
///
/// See [Namespaces in XML 1.1 (Second Edition) section 2.1: Basic
/// Concepts](https://www.w3.org/TR/2006/REC-xml-names11-20060816/#concepts).
///
/// Its `Display` form, `namespace:local_name` (or the bare local name when
/// there is no namespace), is the key mapping tables use to look up elements
/// and attributes. The owned version is called [`ExpandedName`].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExpandedNameRef<'a> {
    pub namespace: &'a str,
    pub local_name: &'a str,
}

impl<'a> ExpandedNameRef<'a> {
    /// Returns the lookup key as an owned string.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl<'a> std::fmt::Display for ExpandedNameRef<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{}:{}", self.namespace, self.local_name)
        }
    }
}

/// An owned version of an "expanded name": namespace and local name.
///
/// The borrowed version is called [`ExpandedNameRef`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExpandedName {
    pub namespace: String,
    pub local_name: String,
}

impl ExpandedName {
    pub fn new(namespace: Option<&str>, local_name: &str) -> Self {
        Self {
            namespace: namespace.unwrap_or_default().to_owned(),
            local_name: local_name.to_owned(),
        }
    }

    pub fn as_ref(&self) -> ExpandedNameRef {
        ExpandedNameRef {
            namespace: &self.namespace,
            local_name: &self.local_name,
        }
    }
}

impl std::fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// Shorthand for `Box<dyn std::error::Error + Send + Sync + 'static>`.
///
/// Returned by user-supplied conversion methods and custom value types.
pub type BoxedStdError = Box<dyn std::error::Error + Send + Sync + 'static>;
