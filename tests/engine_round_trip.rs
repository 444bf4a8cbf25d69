//! Library-level integration tests
//!
//! These tests drive the extension registry, the conversion engine and the
//! document format together through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use tagtree::domain::{FormatVersion, Node, Object, TagSpec};
use tagtree::plugin::{
    ConflictKind, Conversion, Converter, Extension, ExtensionManager, ExtensionProxy,
    ExtensionSource, TypeKey,
};
use tagtree::serialization::{
    from_tree, object_to_tree, to_tree, tree_to_object, ConvertError, SerializationContext,
};
use tagtree::storage::{Document, DocumentError, RuntimeConfig};

const POINT_TAG: &str = "pkg://ns/tags/point-1.0";
const TREE_TAG: &str = "tag:x";

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

struct PointConverter;

impl Converter for PointConverter {
    fn tags(&self) -> Vec<TagSpec> {
        vec![POINT_TAG.into()]
    }

    fn types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Point>()]
    }

    fn to_tree(
        &self,
        object: &Object,
        _tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        let point = object
            .downcast_ref::<Point>()
            .ok_or_else(|| ConvertError::unexpected_object::<Point>(object))?;
        Ok(Node::mapping([("x", Node::int(point.x)), ("y", Node::int(point.y))]).into())
    }

    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        let field = |name: &str| {
            node.get(name)
                .and_then(|n| n.as_i64())
                .ok_or_else(|| ConvertError::missing_field(tag, name, "integer"))
        };
        Ok(Object::new(Point {
            x: field("x")?,
            y: field("y")?,
        })
        .into())
    }
}

/// Extension `X`: points, for format versions 1.4.0 and later
struct PointExtension;

impl Extension for PointExtension {
    fn extension_uri(&self) -> &str {
        "pkg://ns/ext-1.0"
    }

    fn format_requirement(&self) -> Option<&str> {
        Some(">=1.4.0")
    }

    fn converters(&self) -> Vec<Rc<dyn Converter>> {
        vec![Rc::new(PointConverter)]
    }
}

/// A graph node whose children may include itself
struct TreeNode {
    name: String,
    children: RefCell<Vec<Rc<TreeNode>>>,
}

impl TreeNode {
    fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            children: RefCell::new(Vec::new()),
        })
    }
}

struct TreeNodeConverter;

impl Converter for TreeNodeConverter {
    fn tags(&self) -> Vec<TagSpec> {
        vec![TREE_TAG.into()]
    }

    fn types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<TreeNode>()]
    }

    fn to_tree(
        &self,
        object: &Object,
        _tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        let tree_node = object
            .downcast::<TreeNode>()
            .ok_or_else(|| ConvertError::unexpected_object::<TreeNode>(object))?;
        let node = Node::mapping([("name", Node::string(tree_node.name.clone()))]);

        let provisional = node.clone();
        Ok(Conversion::deferred(node, move |_ctx: &SerializationContext| {
            let children = tree_node
                .children
                .borrow()
                .iter()
                .map(|child| Node::object(Object::from_rc(Rc::clone(child))))
                .collect();
            provisional.insert("children", Node::sequence(children));
            Ok(())
        }))
    }

    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        let name = node
            .get("name")
            .and_then(|n| n.as_string())
            .ok_or_else(|| ConvertError::missing_field(tag, "name", "string"))?;
        let tree_node = TreeNode::new(&name);

        let node = node.clone();
        let provisional = Rc::clone(&tree_node);
        Ok(Conversion::deferred(
            Object::from_rc(tree_node),
            move |_ctx: &SerializationContext| {
                let Some(children) = node.get("children") else {
                    return Ok(());
                };
                for child in children.items() {
                    let object = child.as_object().ok_or_else(|| {
                        ConvertError::invalid_node(TREE_TAG, "children must be tree nodes")
                    })?;
                    let child = object
                        .downcast::<TreeNode>()
                        .ok_or_else(|| ConvertError::unexpected_object::<TreeNode>(&object))?;
                    provisional.children.borrow_mut().push(child);
                }
                Ok(())
            },
        ))
    }
}

struct TreeExtension(&'static str);

impl Extension for TreeExtension {
    fn extension_uri(&self) -> &str {
        self.0
    }

    fn converters(&self) -> Vec<Rc<dyn Converter>> {
        vec![Rc::new(TreeNodeConverter)]
    }
}

fn context_with(extensions: Vec<Rc<ExtensionProxy>>) -> SerializationContext {
    SerializationContext::new(
        FormatVersion::default(),
        Rc::new(ExtensionManager::new(extensions)),
    )
}

fn wrap(extension: impl Extension + 'static) -> Rc<ExtensionProxy> {
    ExtensionProxy::wrap(ExtensionSource::current(extension)).unwrap()
}

fn runtime_with_points() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime
        .add_extension(ExtensionSource::current(PointExtension))
        .unwrap();
    runtime
}

// =============================================================================
// Cyclic Graphs
// =============================================================================

#[test]
fn self_referencing_node_round_trips_with_identity() {
    let ctx = context_with(vec![wrap(TreeExtension("pkg://ns/tree-1.0"))]);

    let root = TreeNode::new("root");
    let leaf = TreeNode::new("leaf");
    root.children.borrow_mut().push(Rc::clone(&root));
    root.children.borrow_mut().push(Rc::clone(&leaf));

    let tree = object_to_tree(&Object::from_rc(Rc::clone(&root)), &ctx).unwrap();
    assert_eq!(tree.tag().as_deref(), Some(TREE_TAG));

    let children = tree.get("children").unwrap().items();
    assert!(children[0].ptr_eq(&tree));
    assert_eq!(children[1].get("name").unwrap().as_string().as_deref(), Some("leaf"));

    let restored = tree_to_object(&tree, &ctx)
        .unwrap()
        .downcast::<TreeNode>()
        .unwrap();
    let restored_children = restored.children.borrow().clone();

    assert_eq!(restored.name, "root");
    assert_eq!(restored_children.len(), 2);
    assert!(Rc::ptr_eq(&restored, &restored_children[0]));
    assert_eq!(restored_children[1].name, "leaf");

    // Break the cycles so the test does not leak.
    root.children.borrow_mut().clear();
    restored.children.borrow_mut().clear();
    tree.insert("children", Node::null());
}

#[test]
fn mutual_references_resolve_to_the_same_instances() {
    let ctx = context_with(vec![wrap(TreeExtension("pkg://ns/tree-1.0"))]);

    let a = TreeNode::new("a");
    let b = TreeNode::new("b");
    a.children.borrow_mut().push(Rc::clone(&b));
    b.children.borrow_mut().push(Rc::clone(&a));

    let root = Node::sequence(vec![
        Node::object(Object::from_rc(Rc::clone(&a))),
        Node::object(Object::from_rc(Rc::clone(&b))),
    ]);
    let tree = to_tree(&root, &ctx).unwrap();
    let restored = from_tree(&tree, &ctx).unwrap().items();

    let ra = restored[0].as_object().unwrap().downcast::<TreeNode>().unwrap();
    let rb = restored[1].as_object().unwrap().downcast::<TreeNode>().unwrap();

    assert!(Rc::ptr_eq(&ra.children.borrow()[0], &rb));
    assert!(Rc::ptr_eq(&rb.children.borrow()[0], &ra));

    a.children.borrow_mut().clear();
    ra.children.borrow_mut().clear();
    for node in tree.items() {
        node.insert("children", Node::null());
    }
}

// =============================================================================
// Format Version Gating
// =============================================================================

#[test]
fn point_extension_is_gated_by_format_version() {
    let runtime = runtime_with_points();

    let old = runtime.manager_for(&"1.3.0".parse().unwrap());
    assert!(!old.handles_tag(POINT_TAG));
    assert!(old.extensions().iter().all(|e| e.extension_uri() != Some("pkg://ns/ext-1.0")));

    let new = runtime.manager_for(&"1.5.0".parse().unwrap());
    assert!(new.handles_tag(POINT_TAG));
    assert!(new.handles_type(&TypeKey::of::<Point>()));
}

#[test]
fn point_is_written_and_read_back() {
    let runtime = runtime_with_points();
    let ctx = runtime.context_for(&"1.5.0".parse().unwrap());

    let node = object_to_tree(&Object::new(Point { x: 1, y: 2 }), &ctx).unwrap();
    assert_eq!(node.tag().as_deref(), Some(POINT_TAG));
    assert_eq!(node.get("x").unwrap().as_i64(), Some(1));
    assert_eq!(node.get("y").unwrap().as_i64(), Some(2));
    assert_eq!(node.len(), 2);

    let object = tree_to_object(&node, &ctx).unwrap();
    assert_eq!(object.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
}

#[test]
fn document_header_selects_extensions() {
    let runtime = runtime_with_points();
    let body = "tree:\n  origin: !pkg://ns/tags/point-1.0 {x: 1, y: 2}\n";

    let doc = Document::from_yaml_str(&format!("format_version: 1.5.0\n{}", body), &runtime)
        .unwrap();
    let origin = doc.tree.get("origin").unwrap().as_object().unwrap();
    assert_eq!(origin.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));

    let err = Document::from_yaml_str(&format!("format_version: 1.3.0\n{}", body), &runtime)
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentError::Convert(ConvertError::UnhandledTag { .. })
    ));
}

#[test]
fn written_document_reads_back_equal() {
    let runtime = runtime_with_points();
    let tree = Node::mapping([
        ("a", Node::object(Object::new(Point { x: 1, y: 2 }))),
        ("b", Node::object(Object::new(Point { x: -3, y: 4 }))),
    ]);
    let doc = Document::new("1.5.0".parse().unwrap(), tree);

    let text = doc.to_yaml_string(&runtime).unwrap();
    assert!(text.contains("pkg://ns/ext-1.0"));

    let reread = Document::from_yaml_str(&text, &runtime).unwrap();
    let b = reread.tree.get("b").unwrap().as_object().unwrap();
    assert_eq!(b.downcast_ref::<Point>(), Some(&Point { x: -3, y: 4 }));
    assert!(reread
        .history
        .iter()
        .any(|r| r.extension_uri.as_deref() == Some("pkg://ns/ext-1.0")));
}

// =============================================================================
// Priority and Removal
// =============================================================================

#[test]
fn earliest_extension_wins_until_removed() {
    let a = wrap(TreeExtension("pkg://ns/tree-a-1.0"));
    let b = wrap(TreeExtension("pkg://ns/tree-b-1.0"));
    let mut manager = ExtensionManager::new(vec![Rc::clone(&a), Rc::clone(&b)]);

    let owner = manager.get_converter_for_tag(TREE_TAG).unwrap();
    assert!(Rc::ptr_eq(owner.extension(), &a));
    assert!(manager
        .conflicts()
        .iter()
        .any(|c| c.kind == ConflictKind::Tag && c.key == TREE_TAG));

    assert!(manager.remove_extension(&a));
    let owner = manager.get_converter_for_tag(TREE_TAG).unwrap();
    assert!(Rc::ptr_eq(owner.extension(), &b));
    assert!(manager.conflicts().is_empty());
}

#[test]
fn adding_twice_keeps_indices_unchanged() {
    let a = wrap(TreeExtension("pkg://ns/tree-a-1.0"));
    let mut manager = ExtensionManager::default();

    assert!(manager.add_extension(&a).unwrap());
    assert!(!manager.add_extension(&a).unwrap());

    assert_eq!(manager.extensions().len(), 1);
    assert_eq!(manager.tags().count(), 1);
    assert!(manager.conflicts().is_empty());
}
