//! # Storage Layer
//!
//! Configuration files, the runtime configuration built from them, and the
//! YAML document format.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML | `.tagtree/config.toml` |
//! | Global config | TOML | `~/.config/tagtree/config.toml` |
//! | Documents | YAML with a `tagtree` envelope | anywhere |
//!
//! ## Key Types
//!
//! - [`Config`] - Project and global configuration files
//! - [`RuntimeConfig`] - Installed extensions plus serialization settings
//! - [`ConfigStack`] - Scoped overrides of a [`RuntimeConfig`]
//! - [`Document`] - Reads and writes YAML documents

pub mod config;
mod document;
mod runtime;

pub use config::{Config, ConfigError, ExtensionsConfig, ProjectConfig, SerializationConfig};
pub use document::{node_to_value, value_to_node, Document, DocumentError, ENVELOPE_VERSION};
pub use runtime::{ConfigGuard, ConfigStack, RuntimeConfig};
