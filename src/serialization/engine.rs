//! Tree conversion engine
//!
//! [`to_tree`] turns a tree whose leaves may be application objects into a
//! plain tagged tree; [`from_tree`] does the reverse. Both walks track nodes
//! and objects by identity, so shared references stay shared and cyclic
//! graphs survive a round trip without duplicating anything.
//!
//! Converters taking part in a cycle return
//! [`Conversion::Deferred`](crate::plugin::Conversion::Deferred):
//!
//! - writing: the provisional node is registered under the object's identity
//!   before its children are converted, so every later reference to the same
//!   object resolves to that node; the finisher runs after the whole tree is
//!   converted and may add children, which are then converted too
//! - reading: the walk is postorder, and a reference to a node that is still
//!   being converted gets a placeholder that is patched with the node's final
//!   value once the walk ends; finishers run after patching, so a provisional
//!   object sees its complete children

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Node, NodeValue, Object};
use crate::plugin::{Finisher, LookupError};

use super::context::SerializationContext;

/// Errors raised while converting between objects and trees
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("No support available for type '{type_name}'. You may need to install or enable an extension.")]
    UnhandledType { type_name: String },

    #[error("No support available for tag '{tag}'. You may need to install a missing extension.")]
    UnhandledTag { tag: String },

    #[error("Converter {converter} has no tag enabled by the active extensions")]
    NoActiveTag { converter: String },

    #[error("Converter {converter} selected tag '{selected}', which is not one of the candidates {candidates:?}")]
    InvalidTagSelection {
        converter: String,
        selected: String,
        candidates: Vec<String>,
    },

    #[error("Invalid node for tag '{tag}': {message}")]
    InvalidNode { tag: String, message: String },

    #[error("Expected an object of type {expected}, found {found}")]
    UnexpectedObject { expected: String, found: String },

    #[error("Reference to a node that was never converted")]
    UnresolvedReference,

    #[error("{0}")]
    Custom(String),
}

impl ConvertError {
    /// A node did not have the shape a converter expects
    pub fn invalid_node(tag: impl Into<String>, message: impl Into<String>) -> Self {
        ConvertError::InvalidNode {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// A required mapping entry is missing or has the wrong kind
    pub fn missing_field(tag: impl Into<String>, field: &str, expected: &str) -> Self {
        Self::invalid_node(tag, format!("missing {} field '{}'", expected, field))
    }

    /// An object was not of the type a converter handles
    pub fn unexpected_object<T>(object: &Object) -> Self {
        ConvertError::UnexpectedObject {
            expected: std::any::type_name::<T>().to_string(),
            found: object.type_name().to_string(),
        }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        ConvertError::Custom(message.into())
    }
}

impl From<LookupError> for ConvertError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownTag(tag) => ConvertError::UnhandledTag { tag },
            LookupError::UnknownType(type_name) => ConvertError::UnhandledType { type_name },
        }
    }
}

/// Converts every object in `root` into tagged nodes
///
/// Returns a new tree; `root` is left untouched.
pub fn to_tree(root: &Node, ctx: &SerializationContext) -> Result<Node, ConvertError> {
    let mut walk = ToTreeWalk::new(ctx);
    let tree = walk.convert_item(root)?;
    walk.finish()?;
    Ok(tree)
}

/// Converts a single object into a tagged node
pub fn object_to_tree(object: &Object, ctx: &SerializationContext) -> Result<Node, ConvertError> {
    to_tree(&Node::object(object.clone()), ctx)
}

/// Converts every tagged node in `root` into an object
///
/// Returns a new tree whose converted nodes are object leaves; `root` is
/// left untouched.
pub fn from_tree(root: &Node, ctx: &SerializationContext) -> Result<Node, ConvertError> {
    let mut walk = FromTreeWalk::new(ctx);
    let tree = walk.convert(root)?;
    walk.finish()?;
    Ok(tree)
}

/// Converts a tagged node and returns the resulting object
pub fn tree_to_object(root: &Node, ctx: &SerializationContext) -> Result<Object, ConvertError> {
    let tree = from_tree(root, ctx)?;
    tree.as_object()
        .ok_or_else(|| match root.tag() {
            Some(tag) => ConvertError::UnhandledTag { tag },
            None => ConvertError::custom(format!(
                "Expected a tagged node, found an untagged {}",
                root.kind()
            )),
        })
}

struct ToTreeWalk<'a> {
    ctx: &'a SerializationContext,
    // Sources are held so their addresses stay unique for the whole walk.
    by_object: HashMap<usize, (Object, Node)>,
    by_node: HashMap<usize, (Node, Node)>,
    pending: Vec<(Node, Finisher)>,
}

impl<'a> ToTreeWalk<'a> {
    fn new(ctx: &'a SerializationContext) -> Self {
        Self {
            ctx,
            by_object: HashMap::new(),
            by_node: HashMap::new(),
            pending: Vec::new(),
        }
    }

    fn register(&mut self, source: &Node, output: &Node) {
        self.by_node
            .insert(source.id(), (source.clone(), output.clone()));
        self.by_node
            .insert(output.id(), (output.clone(), output.clone()));
    }

    fn convert_item(&mut self, node: &Node) -> Result<Node, ConvertError> {
        if let Some((_, output)) = self.by_node.get(&node.id()) {
            return Ok(output.clone());
        }

        let value = node.value().clone();
        let output = match value {
            NodeValue::Object(object) => self.convert_object(object)?,
            NodeValue::Sequence(items) => {
                let output = Node::sequence(Vec::with_capacity(items.len()));
                output.set_tag(node.tag());
                self.register(node, &output);
                for item in items {
                    let converted = self.convert_item(&item)?;
                    output.push(converted);
                }
                output
            }
            NodeValue::Mapping(entries) => {
                let output = Node::empty_mapping();
                output.set_tag(node.tag());
                self.register(node, &output);
                for (key, item) in entries {
                    let converted = self.convert_item(&item)?;
                    output.insert(key, converted);
                }
                output
            }
            scalar => {
                let output = Node::from_value(scalar);
                output.set_tag(node.tag());
                output
            }
        };

        self.register(node, &output);
        Ok(output)
    }

    fn convert_object(&mut self, object: Object) -> Result<Node, ConvertError> {
        if let Some((_, node)) = self.by_object.get(&object.id()) {
            return Ok(node.clone());
        }

        let ctx = self.ctx;
        let manager = ctx.extension_manager();
        let converter = manager.get_converter_for_object(&object)?;

        let candidates: Vec<String> = converter
            .tag_uris()
            .filter(|tag| manager.has_tag_definition(tag))
            .map(str::to_string)
            .collect();

        let tag = match candidates.len() {
            0 => {
                return Err(ConvertError::NoActiveTag {
                    converter: converter.class_name().to_string(),
                })
            }
            1 => candidates[0].clone(),
            _ => {
                let selected = converter.select_tag(&object, &candidates, ctx)?;
                if !candidates.contains(&selected) {
                    return Err(ConvertError::InvalidTagSelection {
                        converter: converter.class_name().to_string(),
                        selected,
                        candidates,
                    });
                }
                selected
            }
        };

        debug!(type_name = object.type_name(), %tag, "Converting object to tree");

        let (node, finish) = converter.to_tree(&object, &tag, ctx)?.into_parts();
        if !node.is_tagged() {
            node.set_tag(Some(tag));
        }
        ctx.mark_extension_used(converter.extension());

        self.by_object
            .insert(object.id(), (object.clone(), node.clone()));
        self.by_node.insert(node.id(), (node.clone(), node.clone()));

        self.resolve_children(&node)?;

        if let Some(finish) = finish {
            self.pending.push((node.clone(), finish));
        }

        Ok(node)
    }

    /// Converts the children of a converter-produced node in place
    fn resolve_children(&mut self, node: &Node) -> Result<(), ConvertError> {
        for (index, child) in node.children().into_iter().enumerate() {
            let converted = self.convert_item(&child)?;
            if !converted.ptr_eq(&child) {
                node.set_child_at(index, converted);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        while !self.pending.is_empty() {
            for (node, finish) in std::mem::take(&mut self.pending) {
                finish(self.ctx)?;
                self.resolve_children(&node)?;
            }
        }
        Ok(())
    }
}

struct FromTreeWalk<'a> {
    ctx: &'a SerializationContext,
    finished: HashMap<usize, (Node, Node)>,
    in_progress: HashSet<usize>,
    patches: Vec<(Node, usize, Node)>,
    pending: Vec<Finisher>,
}

impl<'a> FromTreeWalk<'a> {
    fn new(ctx: &'a SerializationContext) -> Self {
        Self {
            ctx,
            finished: HashMap::new(),
            in_progress: HashSet::new(),
            patches: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn convert(&mut self, node: &Node) -> Result<Node, ConvertError> {
        if let Some((_, output)) = self.finished.get(&node.id()) {
            return Ok(output.clone());
        }

        self.in_progress.insert(node.id());

        let value = node.value().clone();
        let copy = match value {
            NodeValue::Sequence(items) => {
                let copy = Node::sequence(Vec::with_capacity(items.len()));
                for (index, item) in items.iter().enumerate() {
                    let child = self.convert_child(&copy, index, item)?;
                    copy.push(child);
                }
                copy
            }
            NodeValue::Mapping(entries) => {
                let copy = Node::empty_mapping();
                for (index, (key, item)) in entries.iter().enumerate() {
                    let child = self.convert_child(&copy, index, item)?;
                    copy.insert(key.clone(), child);
                }
                copy
            }
            scalar => Node::from_value(scalar),
        };
        copy.set_tag(node.tag());

        let output = match node.tag() {
            Some(tag) => self.convert_tagged(copy, &tag)?,
            None => copy,
        };

        self.in_progress.remove(&node.id());
        self.finished
            .insert(node.id(), (node.clone(), output.clone()));
        Ok(output)
    }

    fn convert_child(
        &mut self,
        container: &Node,
        index: usize,
        child: &Node,
    ) -> Result<Node, ConvertError> {
        if self.in_progress.contains(&child.id()) {
            self.patches
                .push((container.clone(), index, child.clone()));
            return Ok(Node::null());
        }
        self.convert(child)
    }

    fn convert_tagged(&mut self, node: Node, tag: &str) -> Result<Node, ConvertError> {
        let ctx = self.ctx;
        let converter = match ctx.extension_manager().get_converter_for_tag(tag) {
            Ok(converter) => converter,
            Err(err) if ctx.ignore_unrecognized_tags() => {
                warn!(%tag, "{}", err);
                return Ok(node);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(%tag, "Converting tree to object");

        let (object, finish) = converter.from_tree(&node, tag, ctx)?.into_parts();
        ctx.mark_extension_used(converter.extension());

        if let Some(finish) = finish {
            self.pending.push(finish);
        }

        Ok(Node::object(object))
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        for (container, index, source) in std::mem::take(&mut self.patches) {
            let (_, output) = self
                .finished
                .get(&source.id())
                .ok_or(ConvertError::UnresolvedReference)?;
            container.set_child_at(index, output.clone());
        }

        for finish in std::mem::take(&mut self.pending) {
            finish(self.ctx)?;
        }
        Ok(())
    }
}
