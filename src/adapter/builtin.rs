// src/adapter/builtin.rs

//! Built-in adapters for common configuration sources
//!
//! These cover the sources most scanners hand over:
//!
//! - `PathBuf` -> [`RawContent`] ([`FileAdapter`])
//! - [`RawContent`] -> property set, per format ([`PropertiesAdapter`],
//!   [`JsonAdapter`], [`TomlAdapter`])
//! - string maps and JSON objects -> property set ([`MapAdapter`],
//!   [`JsonAdapter`])
//! - property sets handed over directly ([`PassThroughAdapter`])
//!
//! The content format is taken from the `conflux.format` metadata key when
//! present, otherwise from the file extension.

use super::{Adapter, AdapterHandle, AdapterRepository, Source};
use crate::identity::SourceObject;
use crate::properties::{PropertySet, PropertyValue};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key overriding the detected content format
pub const FORMAT_KEY: &str = "conflux.format";

/// Serialization format of raw configuration content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// `key=value` lines (`.cfg`, `.properties`)
    Properties,
    Json,
    Toml,
}

impl ContentFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "cfg" | "config" | "properties" => Some(Self::Properties),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

impl FromStr for ContentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "properties" | "cfg" => Ok(Self::Properties),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(format!("unknown content format '{}'", other)),
        }
    }
}

/// Bytes read from a configuration source, not yet parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    /// Format guessed from where the bytes came from
    pub format: Option<ContentFormat>,
    pub bytes: Vec<u8>,
    pub origin: Option<PathBuf>,
}

impl RawContent {
    pub fn new(format: Option<ContentFormat>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            bytes: bytes.into(),
            origin: None,
        }
    }
}

/// Resolve the effective format of raw content: metadata wins over detection
fn effective_format(metadata: &PropertySet, raw: &RawContent) -> Option<ContentFormat> {
    match metadata.get_str(FORMAT_KEY) {
        Some(name) => name.parse().ok(),
        None => raw.format,
    }
}

fn content_in_format(metadata: &PropertySet, source: Source<'_>, format: ContentFormat) -> bool {
    source
        .downcast_ref::<RawContent>()
        .is_some_and(|raw| effective_format(metadata, raw) == Some(format))
}

/// Reads a file path into [`RawContent`]
#[derive(Debug, Default)]
pub struct FileAdapter;

impl Adapter for FileAdapter {
    fn name(&self) -> &str {
        "file"
    }

    fn is_satisfied_by(&self, _metadata: &PropertySet, source: Source<'_>) -> bool {
        source.downcast_ref::<PathBuf>().is_some_and(|p| p.is_file())
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        let path = source.downcast_ref::<PathBuf>()?;
        match std::fs::read(path) {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Some(Arc::new(RawContent {
                    format: ContentFormat::from_path(path),
                    bytes,
                    origin: Some(path.clone()),
                }))
            }
            Err(e) => {
                warn!("Failed to read configuration file {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Parses `key=value` content into string properties
#[derive(Debug, Default)]
pub struct PropertiesAdapter;

impl Adapter for PropertiesAdapter {
    fn name(&self) -> &str {
        "properties"
    }

    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        content_in_format(metadata, source, ContentFormat::Properties)
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        let raw = source.downcast_ref::<RawContent>()?;
        let text = match std::str::from_utf8(&raw.bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Properties content is not valid UTF-8: {}", e);
                return None;
            }
        };
        Some(Arc::new(parse_properties(text)))
    }
}

/// Parse properties text
///
/// Blank lines and lines starting with `#` or `!` are skipped. The first
/// `=` or `:` separates key and value; a trailing backslash continues the
/// value on the next line. A line without separator is a key with an empty
/// value.
pub fn parse_properties(text: &str) -> PropertySet {
    let mut props = PropertySet::new();
    let mut pending: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.trim();

        if let Some((key, mut value)) = pending.take() {
            match line.strip_suffix('\\') {
                Some(part) => {
                    value.push_str(part.trim());
                    pending = Some((key, value));
                }
                None => {
                    value.push_str(line);
                    props.insert(key, value);
                }
            }
            continue;
        }

        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let (key, value) = match line.find(['=', ':']) {
            Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
            None => (line, ""),
        };

        match value.strip_suffix('\\') {
            Some(part) => pending = Some((key.to_string(), part.trim().to_string())),
            None => {
                props.insert(key, value);
            }
        }
    }

    if let Some((key, value)) = pending {
        props.insert(key, value);
    }

    props
}

/// Parses JSON objects into properties
#[derive(Debug, Default)]
pub struct JsonAdapter;

impl Adapter for JsonAdapter {
    fn name(&self) -> &str {
        "json"
    }

    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        source.downcast_ref::<PropertyValue>().is_some_and(|v| v.is_object())
            || content_in_format(metadata, source, ContentFormat::Json)
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        if let Some(value) = source.downcast_ref::<PropertyValue>() {
            return PropertySet::from_json(value).map(|p| Arc::new(p) as SourceObject);
        }

        let raw = source.downcast_ref::<RawContent>()?;
        match serde_json::from_slice::<PropertyValue>(&raw.bytes) {
            Ok(value) => match PropertySet::from_json(&value) {
                Some(props) => Some(Arc::new(props)),
                None => {
                    warn!("JSON configuration is not an object");
                    None
                }
            },
            Err(e) => {
                warn!("Failed to parse JSON configuration: {}", e);
                None
            }
        }
    }
}

/// Parses TOML documents into properties
#[derive(Debug, Default)]
pub struct TomlAdapter;

impl Adapter for TomlAdapter {
    fn name(&self) -> &str {
        "toml"
    }

    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        content_in_format(metadata, source, ContentFormat::Toml)
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        let raw = source.downcast_ref::<RawContent>()?;
        let text = std::str::from_utf8(&raw.bytes).ok()?;

        let table: toml::Table = match toml::from_str(text) {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to parse TOML configuration: {}", e);
                return None;
            }
        };

        let value = serde_json::to_value(table).ok()?;
        PropertySet::from_json(&value).map(|p| Arc::new(p) as SourceObject)
    }
}

/// Converts plain string maps into properties
#[derive(Debug, Default)]
pub struct MapAdapter;

impl Adapter for MapAdapter {
    fn name(&self) -> &str {
        "map"
    }

    fn is_satisfied_by(&self, _metadata: &PropertySet, source: Source<'_>) -> bool {
        source.is::<HashMap<String, String>>() || source.is::<BTreeMap<String, String>>()
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        if let Some(map) = source.downcast_ref::<HashMap<String, String>>() {
            return Some(Arc::new(PropertySet::from(map.clone())));
        }
        source
            .downcast_ref::<BTreeMap<String, String>>()
            .map(|map| Arc::new(PropertySet::from(map.clone())) as SourceObject)
    }
}

/// Accepts sources that already are property sets
#[derive(Debug, Default)]
pub struct PassThroughAdapter;

impl Adapter for PassThroughAdapter {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn is_satisfied_by(&self, _metadata: &PropertySet, source: Source<'_>) -> bool {
        source.is::<PropertySet>()
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        source
            .downcast_ref::<PropertySet>()
            .map(|props| Arc::new(props.clone()) as SourceObject)
    }
}

/// Register every built-in adapter, in priority order
pub fn register_builtin(repository: &AdapterRepository) -> Vec<AdapterHandle> {
    let adapters: Vec<Arc<dyn Adapter>> = vec![
        Arc::new(FileAdapter),
        Arc::new(PropertiesAdapter),
        Arc::new(JsonAdapter),
        Arc::new(TomlAdapter),
        Arc::new(MapAdapter),
        Arc::new(PassThroughAdapter),
    ];

    adapters.into_iter().map(|a| repository.register(a)).collect()
}
