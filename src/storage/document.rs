//! YAML documents
//!
//! A document is a YAML mapping with a small envelope around the user tree:
//!
//! ```text
//! tagtree: 1.0.0
//! format_version: 1.5.0
//! history:
//!   extensions:
//!     - !tag:tagtree.dev:core/extension_metadata-1.0.0 {...}
//! tree: ...
//! ```
//!
//! Parsing and emitting YAML is left to `serde_yaml`; this module only maps
//! between its [`Value`] and [`Node`] trees and runs the conversion engine.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ExtensionMetadata, FormatVersion, Node, NodeValue, Object, Software, VersionError};
use crate::plugin::MissingExtension;
use crate::serialization::{from_tree, object_to_tree, to_tree, ConvertError, SerializationContext};

use super::runtime::RuntimeConfig;

/// Version of the envelope layout
pub const ENVELOPE_VERSION: &str = "1.0.0";

const ENVELOPE_KEY: &str = "tagtree";
const VERSION_KEY: &str = "format_version";
const HISTORY_KEY: &str = "history";
const EXTENSIONS_KEY: &str = "extensions";
const TREE_KEY: &str = "tree";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Document must be a YAML mapping, found {0}")]
    NotAMapping(&'static str),

    #[error("Invalid format version: {0}")]
    Version(#[from] VersionError),

    #[error("Unsupported mapping key of kind {0}; only scalar keys are allowed")]
    ComplexKey(&'static str),

    #[error("Cannot write a cyclic tree")]
    Cycle,

    #[error("Object of type {0} was not converted")]
    UnconvertedObject(String),

    #[error("Invalid history entry: {0}")]
    InvalidHistory(String),

    #[error("{}", format_missing(.0))]
    MissingExtensions(Vec<MissingExtension>),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

fn format_missing(missing: &[MissingExtension]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A document: format version, provenance history and the user tree
#[derive(Debug, Clone)]
pub struct Document {
    /// Format version the tree conforms to
    pub version: FormatVersion,

    /// Tree holding application objects where converters applied
    pub tree: Node,

    /// Extensions recorded by the writer of the document
    pub history: Vec<ExtensionMetadata>,

    /// Recorded extensions not available when the document was read
    pub missing: Vec<MissingExtension>,
}

impl Document {
    pub fn new(version: FormatVersion, tree: Node) -> Self {
        Self {
            version,
            tree,
            history: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Parses and converts a document
    pub fn from_yaml_str(text: &str, config: &RuntimeConfig) -> Result<Self, DocumentError> {
        let envelope = match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            other => return Err(DocumentError::NotAMapping(value_kind(&other))),
        };

        let version = match envelope.get(VERSION_KEY) {
            None | Some(Value::Null) => config.default_version.clone(),
            Some(value) => FormatVersion::parse_supported(&scalar_text(value)?)?,
        };
        debug!(%version, "Reading document");

        let ctx = config.context_for(&version);

        let history = match envelope
            .get(HISTORY_KEY)
            .and_then(|h| h.get(EXTENSIONS_KEY))
        {
            Some(entries) => read_history(entries, &ctx)?,
            None => Vec::new(),
        };

        let missing = ctx.extension_manager().check_recorded(&history);
        if !missing.is_empty() {
            if config.strict_extension_check {
                return Err(DocumentError::MissingExtensions(missing));
            }
            for m in &missing {
                warn!("{}", m);
            }
        }

        let tree = match envelope.get(TREE_KEY) {
            Some(value) => from_tree(&value_to_node(value)?, &ctx)?,
            None => Node::null(),
        };

        Ok(Self {
            version,
            tree,
            history,
            missing,
        })
    }

    /// Converts and emits the document
    ///
    /// The history is replaced by the extensions this write used.
    pub fn to_yaml_string(&self, config: &RuntimeConfig) -> Result<String, DocumentError> {
        let ctx = config.context_for(&self.version);
        let tree = to_tree(&self.tree, &ctx)?;
        let records = ctx.extension_metadata();

        let mut envelope = Mapping::new();
        envelope.insert(
            Value::from(ENVELOPE_KEY),
            Value::from(ENVELOPE_VERSION),
        );
        envelope.insert(
            Value::from(VERSION_KEY),
            Value::from(self.version.to_string()),
        );

        if !records.is_empty() {
            let history_ctx = config.context_for(&self.version);
            let entries = records
                .into_iter()
                .map(|record| node_to_value(&record_to_node(record, &history_ctx)?))
                .collect::<Result<Vec<_>, _>>()?;

            let mut history = Mapping::new();
            history.insert(Value::from(EXTENSIONS_KEY), Value::Sequence(entries));
            envelope.insert(Value::from(HISTORY_KEY), Value::Mapping(history));
        }

        envelope.insert(Value::from(TREE_KEY), node_to_value(&tree)?);

        Ok(serde_yaml::to_string(&Value::Mapping(envelope))?)
    }

    /// Reads a document from a file
    pub fn load(path: &Path, config: &RuntimeConfig) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        Self::from_yaml_str(&text, config)
            .with_context(|| format!("Failed to load document: {}", path.display()))
    }

    /// Writes the document to a file
    pub fn save(&self, path: &Path, config: &RuntimeConfig) -> Result<()> {
        let text = self
            .to_yaml_string(config)
            .with_context(|| format!("Failed to serialize document: {}", path.display()))?;

        fs::write(path, text)
            .with_context(|| format!("Failed to write document: {}", path.display()))
    }
}

fn read_history(
    entries: &Value,
    ctx: &SerializationContext,
) -> Result<Vec<ExtensionMetadata>, DocumentError> {
    let Value::Sequence(entries) = entries else {
        return Err(DocumentError::InvalidHistory(format!(
            "expected a sequence of extensions, found {}",
            value_kind(entries)
        )));
    };

    entries
        .iter()
        .map(|entry| {
            let node = value_to_node(entry)?;
            // Untagged or unknown entries are read as plain mappings.
            let converted = match from_tree(&node, ctx) {
                Ok(converted) => converted,
                Err(ConvertError::UnhandledTag { .. }) => node,
                Err(e) => return Err(e.into()),
            };
            metadata_from_node(&converted)
        })
        .collect()
}

fn metadata_from_node(node: &Node) -> Result<ExtensionMetadata, DocumentError> {
    if let Some(object) = node.as_object() {
        return object
            .downcast_ref::<ExtensionMetadata>()
            .cloned()
            .ok_or_else(|| DocumentError::InvalidHistory(format!("unexpected {}", object.type_name())));
    }

    let text = |n: &Node, key: &str| n.get(key).and_then(|v| v.as_string());

    let extension_class = text(node, "extension_class").ok_or_else(|| {
        DocumentError::InvalidHistory("missing string field 'extension_class'".to_string())
    })?;

    let software = match node.get("software") {
        None => None,
        Some(software) => match software.as_object() {
            Some(object) => object.downcast_ref::<Software>().cloned(),
            None => text(&software, "name")
                .zip(text(&software, "version"))
                .map(|(name, version)| Software::new(name, version)),
        },
    };

    Ok(ExtensionMetadata {
        extension_uri: text(node, "extension_uri"),
        extension_class,
        software,
    })
}

fn record_to_node(
    record: ExtensionMetadata,
    ctx: &SerializationContext,
) -> Result<Node, DocumentError> {
    match object_to_tree(&Object::new(record.clone()), ctx) {
        Ok(node) => Ok(node),
        Err(ConvertError::UnhandledType { .. }) => {
            let node = Node::mapping([("extension_class", Node::string(record.extension_class))]);
            if let Some(uri) = record.extension_uri {
                node.insert("extension_uri", Node::string(uri));
            }
            if let Some(software) = record.software {
                node.insert(
                    "software",
                    Node::mapping([
                        ("name", Node::string(software.name)),
                        ("version", Node::string(software.version)),
                    ]),
                );
            }
            Ok(node)
        }
        Err(e) => Err(e.into()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn scalar_text(value: &Value) -> Result<String, DocumentError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(DocumentError::ComplexKey(value_kind(other))),
    }
}

/// Converts a parsed YAML value into a tree
pub fn value_to_node(value: &Value) -> Result<Node, DocumentError> {
    let node = match value {
        Value::Null => Node::null(),
        Value::Bool(b) => Node::bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::int(i),
            None => Node::float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Node::string(s.clone()),
        Value::Sequence(items) => Node::sequence(
            items
                .iter()
                .map(value_to_node)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Mapping(mapping) => {
            let entries = mapping
                .iter()
                .map(|(key, item)| Ok((scalar_text(key)?, value_to_node(item)?)))
                .collect::<Result<Vec<_>, DocumentError>>()?;
            Node::mapping(entries)
        }
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let tag = tag.strip_prefix('!').unwrap_or(&tag).to_string();
            value_to_node(&tagged.value)?.with_tag(tag)
        }
    };
    Ok(node)
}

/// Converts a tree into a YAML value
///
/// The tree must be acyclic and fully converted. Shared subtrees are
/// written once per reference.
pub fn node_to_value(node: &Node) -> Result<Value, DocumentError> {
    write_value(node, &mut HashSet::new())
}

fn write_value(node: &Node, path: &mut HashSet<usize>) -> Result<Value, DocumentError> {
    if !path.insert(node.id()) {
        return Err(DocumentError::Cycle);
    }

    let value = node.value().clone();
    let value = match value {
        NodeValue::Null => Value::Null,
        NodeValue::Bool(b) => Value::Bool(b),
        NodeValue::Int(i) => Value::from(i),
        NodeValue::Float(f) => Value::from(f),
        NodeValue::String(s) => Value::String(s),
        NodeValue::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| write_value(item, path))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        NodeValue::Mapping(entries) => {
            let mut mapping = Mapping::new();
            for (key, item) in &entries {
                mapping.insert(Value::String(key.clone()), write_value(item, path)?);
            }
            Value::Mapping(mapping)
        }
        NodeValue::Object(object) => {
            return Err(DocumentError::UnconvertedObject(object.type_name().to_string()))
        }
    };

    path.remove(&node.id());

    Ok(match node.tag().filter(|t| !t.is_empty()) {
        Some(tag) => Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(tag),
            value,
        })),
        None => value,
    })
}
