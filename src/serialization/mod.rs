//! # Serialization
//!
//! Drives conversion between application objects and tagged trees.
//!
//! ## Key Types
//!
//! - [`SerializationContext`] - Format version, active manager and the
//!   extensions used by one read or write
//! - [`to_tree`] / [`from_tree`] - The two conversion walks
//! - [`ConvertError`] - Dispatch and converter failures

mod context;
mod engine;

pub use context::SerializationContext;
pub use engine::{from_tree, object_to_tree, to_tree, tree_to_object, ConvertError};
