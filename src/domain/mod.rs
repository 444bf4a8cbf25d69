//! Domain models for tagtree
//!
//! Tags, tree nodes, format versions and provenance records. No I/O and no
//! knowledge of extensions.

mod metadata;
mod node;
mod tag;
mod version;

pub use metadata::{ExtensionMetadata, Software};
pub use node::{Node, NodeValue, Object};
pub use tag::{TagDefinition, TagSpec};
pub use version::{
    FormatVersion, VersionError, VersionRequirement, DEFAULT_VERSION, SUPPORTED_VERSIONS,
};
