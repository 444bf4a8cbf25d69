//! Provenance records written into a document's history

use std::fmt;

use serde::{Deserialize, Serialize};

/// A software package name and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Software {
    pub name: String,
    pub version: String,
}

impl Software {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Software {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Record of one extension used to write a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// URI of the extension (absent for legacy extensions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_uri: Option<String>,

    /// Class name of the extension implementation
    pub extension_class: String,

    /// Package that provided the extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<Software>,
}

impl ExtensionMetadata {
    pub fn new(extension_class: impl Into<String>) -> Self {
        Self {
            extension_uri: None,
            extension_class: extension_class.into(),
            software: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.extension_uri = Some(uri.into());
        self
    }

    pub fn with_software(mut self, software: Software) -> Self {
        self.software = Some(software);
        self
    }

    /// Human-readable label: the URI when present, else the class name
    pub fn label(&self) -> &str {
        self.extension_uri.as_deref().unwrap_or(&self.extension_class)
    }
}
