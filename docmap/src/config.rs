// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide adapter settings: the codec per format, the XML backend,
//! and the nesting limit.
//!
//! Settings are read on every conversion. Swap adapters during start-up,
//! before conversions run on other threads.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::codec::{Codec, Format, JsonCodec, TomlCodec, YamlCodec};
use crate::xml::xml_rs::XmlRsBackend;
use crate::xml::XmlBackend;

/// The nesting limit when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 256;

struct Config {
    codecs: IndexMap<Format, Arc<dyn Codec>>,
    xml_backend: Arc<dyn XmlBackend>,
    max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        let mut codecs: IndexMap<Format, Arc<dyn Codec>> = IndexMap::new();
        codecs.insert(Format::Json, Arc::new(JsonCodec));
        codecs.insert(Format::Yaml, Arc::new(YamlCodec));
        codecs.insert(Format::Toml, Arc::new(TomlCodec));
        Config {
            codecs,
            xml_backend: Arc::new(XmlRsBackend),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Returns the active codec for `format`; `None` for [`Format::Hash`], which
/// has no text form.
pub fn codec(format: Format) -> Option<Arc<dyn Codec>> {
    CONFIG.read().codecs.get(&format).cloned()
}

/// Replaces the codec for `format`.
///
/// Setting a codec for [`Format::Hash`] is allowed but unused.
pub fn set_codec(format: Format, codec: Arc<dyn Codec>) {
    debug!("setting {} codec", format);
    CONFIG.write().codecs.insert(format, codec);
}

pub fn xml_backend() -> Arc<dyn XmlBackend> {
    CONFIG.read().xml_backend.clone()
}

pub fn set_xml_backend(backend: Arc<dyn XmlBackend>) {
    debug!("setting XML backend to {}", backend.name());
    CONFIG.write().xml_backend = backend;
}

/// The deepest nesting of composite values a conversion will follow.
pub fn max_depth() -> usize {
    CONFIG.read().max_depth
}

pub fn set_max_depth(max_depth: usize) {
    debug!("setting max depth to {}", max_depth);
    CONFIG.write().max_depth = max_depth;
}
