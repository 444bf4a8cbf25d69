//! Tagged tree nodes and type-erased application objects
//!
//! A [`Node`] is a shared handle: cloning it yields the same node, and
//! identity (not structure) is what the conversion engine uses to detect
//! repeated and cyclic references. Containers may therefore contain
//! themselves, directly or transitively.
//!
//! An [`Object`] is an application value behind an `Rc<dyn Any>`. Trees being
//! written contain objects as leaves awaiting conversion; trees that were read
//! contain the reconstructed objects in place of their tagged nodes.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A type-erased, shared application object
#[derive(Clone)]
pub struct Object {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl Object {
    /// Wraps a value in a fresh shared allocation
    pub fn new<T: Any>(value: T) -> Self {
        Self::from_rc(Rc::new(value))
    }

    /// Wraps an existing shared value, keeping its identity
    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the `TypeId` of the wrapped value
    pub fn type_id(&self) -> TypeId {
        Any::type_id(&*self.value)
    }

    /// Returns the fully-qualified type name of the wrapped value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the wrapped value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the wrapped value as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns the shared value as an `Rc<T>`, keeping its identity
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.value).downcast::<T>().ok()
    }

    /// Returns true if both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.id() == other.id()
    }

    /// Identity key of the wrapped allocation
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.value) as *const () as usize
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object<{}>", self.type_name)
    }
}

/// The content of a node
#[derive(Debug, Clone)]
pub enum NodeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Vec<(String, Node)>),
    Object(Object),
}

impl NodeValue {
    /// Short name of the value kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            NodeValue::Null => "null",
            NodeValue::Bool(_) => "bool",
            NodeValue::Int(_) => "int",
            NodeValue::Float(_) => "float",
            NodeValue::String(_) => "string",
            NodeValue::Sequence(_) => "sequence",
            NodeValue::Mapping(_) => "mapping",
            NodeValue::Object(_) => "object",
        }
    }

    /// Returns true for sequences and mappings
    pub fn is_container(&self) -> bool {
        matches!(self, NodeValue::Sequence(_) | NodeValue::Mapping(_))
    }
}

struct NodeData {
    tag: Option<String>,
    value: NodeValue,
}

/// A shared, optionally tagged tree node
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    /// Creates an untagged node holding `value`
    pub fn from_value(value: NodeValue) -> Self {
        Self(Rc::new(RefCell::new(NodeData { tag: None, value })))
    }

    pub fn null() -> Self {
        Self::from_value(NodeValue::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::from_value(NodeValue::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::from_value(NodeValue::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::from_value(NodeValue::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_value(NodeValue::String(value.into()))
    }

    pub fn sequence(items: Vec<Node>) -> Self {
        Self::from_value(NodeValue::Sequence(items))
    }

    /// Creates a mapping, keeping the given key order
    pub fn mapping<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        Self::from_value(NodeValue::Mapping(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Creates an empty mapping
    pub fn empty_mapping() -> Self {
        Self::from_value(NodeValue::Mapping(Vec::new()))
    }

    /// Creates a leaf holding an application object
    pub fn object(object: Object) -> Self {
        Self::from_value(NodeValue::Object(object))
    }

    /// Sets the tag and returns the node (builder style)
    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.set_tag(Some(tag.into()));
        self
    }

    pub fn tag(&self) -> Option<String> {
        self.0.borrow().tag.clone()
    }

    pub fn set_tag(&self, tag: Option<String>) {
        self.0.borrow_mut().tag = tag;
    }

    pub fn is_tagged(&self) -> bool {
        self.0.borrow().tag.is_some()
    }

    /// Borrows the node content
    ///
    /// The borrow must be released before recursing into children, since a
    /// child may be this very node.
    pub fn value(&self) -> Ref<'_, NodeValue> {
        Ref::map(self.0.borrow(), |data| &data.value)
    }

    /// Mutably borrows the node content
    pub fn value_mut(&self) -> RefMut<'_, NodeValue> {
        RefMut::map(self.0.borrow_mut(), |data| &mut data.value)
    }

    /// Replaces the node content in place, keeping identity and tag
    pub fn replace_value(&self, value: NodeValue) -> NodeValue {
        std::mem::replace(&mut *self.value_mut(), value)
    }

    pub fn kind(&self) -> &'static str {
        self.value().kind()
    }

    /// Returns true if both handles point at the same node
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key of the node
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.value(), NodeValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self.value() {
            NodeValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self.value() {
            NodeValue::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the number as `f64`; integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match *self.value() {
            NodeValue::Float(x) => Some(x),
            NodeValue::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match &*self.value() {
            NodeValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Object> {
        match &*self.value() {
            NodeValue::Object(object) => Some(object.clone()),
            _ => None,
        }
    }

    /// Looks up a mapping entry by key
    pub fn get(&self, key: &str) -> Option<Node> {
        match &*self.value() {
            NodeValue::Mapping(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Inserts or replaces a mapping entry; returns false if not a mapping
    pub fn insert(&self, key: impl Into<String>, node: Node) -> bool {
        let key = key.into();
        match &mut *self.value_mut() {
            NodeValue::Mapping(entries) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = node,
                    None => entries.push((key, node)),
                }
                true
            }
            _ => false,
        }
    }

    /// Appends to a sequence; returns false if not a sequence
    pub fn push(&self, node: Node) -> bool {
        match &mut *self.value_mut() {
            NodeValue::Sequence(items) => {
                items.push(node);
                true
            }
            _ => false,
        }
    }

    /// Number of children (0 for scalars)
    pub fn len(&self) -> usize {
        match &*self.value() {
            NodeValue::Sequence(items) => items.len(),
            NodeValue::Mapping(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the sequence items (empty for non-sequences)
    pub fn items(&self) -> Vec<Node> {
        match &*self.value() {
            NodeValue::Sequence(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of the mapping entries (empty for non-mappings)
    pub fn entries(&self) -> Vec<(String, Node)> {
        match &*self.value() {
            NodeValue::Mapping(entries) => entries.clone(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of the children in order: sequence items or mapping values
    pub fn children(&self) -> Vec<Node> {
        match &*self.value() {
            NodeValue::Sequence(items) => items.clone(),
            NodeValue::Mapping(entries) => entries.iter().map(|(_, v)| v.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Replaces the child at `index` (position in [`Node::children`])
    pub fn set_child_at(&self, index: usize, node: Node) -> bool {
        match &mut *self.value_mut() {
            NodeValue::Sequence(items) => match items.get_mut(index) {
                Some(slot) => {
                    *slot = node;
                    true
                }
                None => false,
            },
            NodeValue::Mapping(entries) => match entries.get_mut(index) {
                Some(slot) => {
                    slot.1 = node;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Collects every distinct tag in the tree, in first-seen order
    pub fn collect_tags(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        let mut stack = vec![self.clone()];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            if let Some(tag) = node.tag() {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }

        tags
    }
}

impl From<Object> for Node {
    fn from(object: Object) -> Self {
        Node::object(object)
    }
}

struct DebugNode<'a> {
    node: &'a Node,
    stack: &'a RefCell<Vec<usize>>,
}

impl fmt::Debug for DebugNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.node.id();
        if self.stack.borrow().contains(&id) {
            return write!(f, "<cycle>");
        }

        if let Some(tag) = self.node.tag() {
            write!(f, "!<{}> ", tag)?;
        }

        let value = self.node.value().clone();
        self.stack.borrow_mut().push(id);
        let result = match &value {
            NodeValue::Sequence(items) => f
                .debug_list()
                .entries(items.iter().map(|node| DebugNode {
                    node,
                    stack: self.stack,
                }))
                .finish(),
            NodeValue::Mapping(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, node)| {
                    (
                        k,
                        DebugNode {
                            node,
                            stack: self.stack,
                        },
                    )
                }))
                .finish(),
            NodeValue::Null => write!(f, "null"),
            NodeValue::Bool(b) => write!(f, "{}", b),
            NodeValue::Int(i) => write!(f, "{}", i),
            NodeValue::Float(x) => write!(f, "{:?}", x),
            NodeValue::String(s) => write!(f, "{:?}", s),
            NodeValue::Object(object) => write!(f, "{:?}", object),
        };
        self.stack.borrow_mut().pop();
        result
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = RefCell::new(Vec::new());
        DebugNode { node: self, stack: &stack }.fmt(f)
    }
}
