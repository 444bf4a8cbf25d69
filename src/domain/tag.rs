//! Tag definitions
//!
//! A tag URI names the shape of a serialized value independently of any Rust
//! type. Definitions may carry optional metadata (schema URI, title,
//! description) but are compared and hashed by URI alone.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One tag URI and its optional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDefinition {
    tag_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl TagDefinition {
    /// Creates a definition with no metadata
    pub fn new(tag_uri: impl Into<String>) -> Self {
        Self {
            tag_uri: tag_uri.into(),
            schema_uri: None,
            title: None,
            description: None,
        }
    }

    /// Sets the schema URI
    pub fn with_schema_uri(mut self, schema_uri: impl Into<String>) -> Self {
        self.schema_uri = Some(schema_uri.into());
        self
    }

    /// Sets the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag_uri(&self) -> &str {
        &self.tag_uri
    }

    pub fn schema_uri(&self) -> Option<&str> {
        self.schema_uri.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns true if any metadata field is set
    pub fn has_metadata(&self) -> bool {
        self.schema_uri.is_some() || self.title.is_some() || self.description.is_some()
    }
}

impl PartialEq for TagDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.tag_uri == other.tag_uri
    }
}

impl Eq for TagDefinition {}

impl Hash for TagDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag_uri.hash(state);
    }
}

impl fmt::Display for TagDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_uri)
    }
}

/// A tag as declared by a converter or extension author
///
/// Either a bare URI or an already-rich definition. Bare URIs are promoted to
/// metadata-less [`TagDefinition`]s when a proxy normalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSpec {
    Uri(String),
    Definition(TagDefinition),
}

impl TagSpec {
    /// Returns the tag URI
    pub fn uri(&self) -> &str {
        match self {
            TagSpec::Uri(uri) => uri,
            TagSpec::Definition(def) => def.tag_uri(),
        }
    }

    /// Returns true if this spec carries any metadata
    pub fn has_metadata(&self) -> bool {
        match self {
            TagSpec::Uri(_) => false,
            TagSpec::Definition(def) => def.has_metadata(),
        }
    }

    /// Converts to a definition, promoting bare URIs
    pub fn into_definition(self) -> TagDefinition {
        match self {
            TagSpec::Uri(uri) => TagDefinition::new(uri),
            TagSpec::Definition(def) => def,
        }
    }
}

impl From<&str> for TagSpec {
    fn from(uri: &str) -> Self {
        TagSpec::Uri(uri.to_string())
    }
}

impl From<String> for TagSpec {
    fn from(uri: String) -> Self {
        TagSpec::Uri(uri)
    }
}

impl From<TagDefinition> for TagSpec {
    fn from(def: TagDefinition) -> Self {
        TagSpec::Definition(def)
    }
}
