//! tagtree - Extension-driven conversion between typed objects and tagged trees
//!
//! Extensions contribute converters that turn application objects into
//! tagged YAML nodes and back. An [`ExtensionManager`] indexes the enabled
//! extensions by tag and by type, and the serialization engine walks whole
//! trees, preserving shared and cyclic references.

pub mod domain;
pub mod plugin;
pub mod serialization;
pub mod storage;
pub mod cli;

pub use domain::{FormatVersion, Node, Object, TagDefinition};
pub use plugin::{Conversion, Converter, Extension, ExtensionManager, ExtensionProxy};
pub use serialization::{from_tree, to_tree, ConvertError, SerializationContext};
pub use storage::{Document, RuntimeConfig};
