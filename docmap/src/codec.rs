// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value codecs: text to and from nested-dictionary documents.
//!
//! Every dict format shares one document representation, [`serde_json::Value`].
//! The active codec for each format is looked up in [`crate::config`].

use serde_json::{Map, Value as Json};

use crate::error::Error;

/// A key/value document format.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Format {
    /// In-memory documents, with no text form.
    Hash,
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Hash, Format::Json, Format::Yaml, Format::Toml];

    pub fn name(self) -> &'static str {
        match self {
            Format::Hash => "hash",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for [`Codec::dump`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DumpOptions {
    /// Multi-line, indented output where the format has a compact form.
    pub pretty: bool,
}

/// Loads and dumps one text format.
pub trait Codec: Send + Sync {
    fn load(&self, text: &str) -> Result<Json, Error>;
    fn dump(&self, value: &Json, options: DumpOptions) -> Result<String, Error>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn load(&self, text: &str) -> Result<Json, Error> {
        Ok(serde_json::from_str(text)?)
    }

    fn dump(&self, value: &Json, options: DumpOptions) -> Result<String, Error> {
        Ok(if options.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }
}

/// YAML has no compact form, so `pretty` is ignored.
#[derive(Copy, Clone, Debug, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn load(&self, text: &str) -> Result<Json, Error> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn dump(&self, value: &Json, _options: DumpOptions) -> Result<String, Error> {
        Ok(serde_yaml::to_string(value)?)
    }
}

/// TOML has no null: nulls are dropped when dumping. Datetimes load as their
/// string form, which the date and time types cast from.
#[derive(Copy, Clone, Debug, Default)]
pub struct TomlCodec;

impl Codec for TomlCodec {
    fn load(&self, text: &str) -> Result<Json, Error> {
        let table: toml::Table = text.parse()?;
        Ok(Json::Object(
            table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect(),
        ))
    }

    fn dump(&self, value: &Json, options: DumpOptions) -> Result<String, Error> {
        let value = without_nulls(value);
        Ok(if options.pretty {
            toml::to_string_pretty(&value)?
        } else {
            toml::to_string(&value)?
        })
    }
}

fn toml_to_json(v: toml::Value) -> Json {
    match v {
        toml::Value::String(s) => Json::String(s),
        toml::Value::Integer(i) => Json::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        toml::Value::Boolean(b) => Json::Bool(b),
        toml::Value::Datetime(d) => Json::String(d.to_string()),
        toml::Value::Array(a) => Json::Array(a.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(t) => Json::Object(t.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect()),
    }
}

fn without_nulls(v: &Json) -> Json {
    match v {
        Json::Object(m) => Json::Object(
            m.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect::<Map<_, _>>(),
        ),
        Json::Array(a) => Json::Array(a.iter().filter(|v| !v.is_null()).map(without_nulls).collect()),
        other => other.clone(),
    }
}
