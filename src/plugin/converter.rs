//! Converter interface and its normalizing proxy
//!
//! A converter translates between one or more application types and one or
//! more tags. Conversions that may participate in reference cycles return
//! [`Conversion::Deferred`]: a provisional value that is registered before
//! the rest of the graph is converted, and a finisher that completes it once
//! the graph is available.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::domain::{Node, Object, TagDefinition, TagSpec};
use crate::serialization::{ConvertError, SerializationContext};

use super::extension::{ExtensionError, ExtensionProxy};

/// Completes a deferred conversion after the rest of the graph is converted
pub type Finisher = Box<dyn FnOnce(&SerializationContext) -> Result<(), ConvertError>>;

/// The result of a single `to_tree` or `from_tree` call
pub enum Conversion<T> {
    /// The value is final
    Complete(T),

    /// `provisional` keeps its identity; `finish` fills it in later
    Deferred { provisional: T, finish: Finisher },
}

impl<T> Conversion<T> {
    /// Creates a deferred conversion
    pub fn deferred<F>(provisional: T, finish: F) -> Self
    where
        F: FnOnce(&SerializationContext) -> Result<(), ConvertError> + 'static,
    {
        Conversion::Deferred {
            provisional,
            finish: Box::new(finish),
        }
    }

    /// Splits into the value to register and the optional finisher
    pub fn into_parts(self) -> (T, Option<Finisher>) {
        match self {
            Conversion::Complete(value) => (value, None),
            Conversion::Deferred {
                provisional,
                finish,
            } => (provisional, Some(finish)),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Conversion::Deferred { .. })
    }
}

impl<T> From<T> for Conversion<T> {
    fn from(value: T) -> Self {
        Conversion::Complete(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Conversion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Complete(value) => f.debug_tuple("Complete").field(value).finish(),
            Conversion::Deferred { provisional, .. } => f
                .debug_struct("Deferred")
                .field("provisional", provisional)
                .finish_non_exhaustive(),
        }
    }
}

/// An application type a converter handles
///
/// Either a concrete Rust type, or a fully-qualified type name for types the
/// declaring crate cannot name directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Id { id: TypeId, name: &'static str },
    Name(String),
}

impl TypeKey {
    /// Key for a concrete type
    pub fn of<T: Any>() -> Self {
        TypeKey::Id {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a type known only by its fully-qualified name
    pub fn named(name: impl Into<String>) -> Self {
        TypeKey::Name(name.into())
    }

    /// Fully-qualified type name
    pub fn name(&self) -> &str {
        match self {
            TypeKey::Id { name, .. } => name,
            TypeKey::Name(name) => name,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            TypeKey::Id { id, .. } => Some(*id),
            TypeKey::Name(_) => None,
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Conversion logic supplied by an extension author
pub trait Converter {
    /// Tags this converter can produce and consume
    fn tags(&self) -> Vec<TagSpec>;

    /// Application types this converter can produce and consume
    fn types(&self) -> Vec<TypeKey>;

    /// Picks the tag to write `object` with
    ///
    /// `tags` is never empty and is ordered as [`Converter::tags`] declares.
    fn select_tag(
        &self,
        _object: &Object,
        tags: &[String],
        _ctx: &SerializationContext,
    ) -> Result<String, ConvertError> {
        tags.first().cloned().ok_or_else(|| ConvertError::NoActiveTag {
            converter: self.class_name().to_string(),
        })
    }

    /// Converts an object into a node
    ///
    /// Children of the returned container may themselves be objects; they are
    /// converted by the engine afterwards.
    fn to_tree(
        &self,
        object: &Object,
        tag: &str,
        ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError>;

    /// Converts a node into an object
    ///
    /// Children of `node` have already been converted, except for references
    /// to nodes still in progress (cycles), which are filled in before any
    /// finisher runs.
    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError>;

    /// Fully-qualified name of the implementing type
    fn class_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A converter wrapped once at registration with its normalized tags and types
pub struct ConverterProxy {
    delegate: Rc<dyn Converter>,
    extension: Weak<ExtensionProxy>,
    tags: Vec<TagDefinition>,
    types: Vec<TypeKey>,
    class_name: &'static str,
}

impl ConverterProxy {
    /// Wraps `delegate`, validating its declared tags and types
    pub fn new(
        delegate: Rc<dyn Converter>,
        extension: Weak<ExtensionProxy>,
    ) -> Result<Self, ExtensionError> {
        let (tags, types) = normalize(delegate.as_ref())?;
        Ok(Self::from_parts(delegate, extension, tags, types))
    }

    pub(crate) fn from_parts(
        delegate: Rc<dyn Converter>,
        extension: Weak<ExtensionProxy>,
        tags: Vec<TagDefinition>,
        types: Vec<TypeKey>,
    ) -> Self {
        let class_name = delegate.class_name();
        Self {
            delegate,
            extension,
            tags,
            types,
            class_name,
        }
    }

    /// Effective tags, in declaration order
    ///
    /// Tags the owning extension dropped are not included.
    pub fn tags(&self) -> &[TagDefinition] {
        &self.tags
    }

    /// Declared types, verbatim
    pub fn types(&self) -> &[TypeKey] {
        &self.types
    }

    /// Effective tag URIs, in declaration order
    pub fn tag_uris(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.tag_uri())
    }

    /// Returns true if `tag` is one of the effective tags
    pub fn declares_tag(&self, tag: &str) -> bool {
        self.tag_uris().any(|t| t == tag)
    }

    /// Chooses a tag for `object` among `candidates`
    ///
    /// Candidates are put into declaration order first, so the result never
    /// depends on the order the caller collected them in.
    pub fn select_tag(
        &self,
        object: &Object,
        candidates: &[String],
        ctx: &SerializationContext,
    ) -> Result<String, ConvertError> {
        let ordered: Vec<String> = self
            .tag_uris()
            .filter(|t| candidates.iter().any(|c| c == t))
            .map(str::to_string)
            .collect();

        if ordered.is_empty() {
            return Err(ConvertError::NoActiveTag {
                converter: self.class_name.to_string(),
            });
        }

        self.delegate.select_tag(object, &ordered, ctx)
    }

    pub fn to_tree(
        &self,
        object: &Object,
        tag: &str,
        ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        self.delegate.to_tree(object, tag, ctx)
    }

    pub fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        self.delegate.from_tree(node, tag, ctx)
    }

    /// The wrapped converter
    pub fn delegate(&self) -> &Rc<dyn Converter> {
        &self.delegate
    }

    /// The extension that provided this converter, if still alive
    pub fn extension(&self) -> Option<Rc<ExtensionProxy>> {
        self.extension.upgrade()
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    /// Package of the owning extension; `None` for runtime registrations
    pub fn package_name(&self) -> Option<String> {
        self.extension()
            .and_then(|e| e.package().map(|p| p.name.clone()))
    }

    pub fn package_version(&self) -> Option<String> {
        self.extension()
            .and_then(|e| e.package().map(|p| p.version.clone()))
    }

    fn delegate_ptr(&self) -> *const () {
        Rc::as_ptr(&self.delegate) as *const ()
    }
}

/// Normalizes a converter's declared tags and types
pub(crate) fn normalize(
    converter: &dyn Converter,
) -> Result<(Vec<TagDefinition>, Vec<TypeKey>), ExtensionError> {
    let class_name = converter.class_name();

    let mut tags = Vec::new();
    for spec in converter.tags() {
        if spec.uri().trim().is_empty() {
            return Err(ExtensionError::InvalidTag {
                owner: class_name.to_string(),
            });
        }
        tags.push(spec.into_definition());
    }

    let types = converter.types();
    if types.iter().any(|t| t.name().trim().is_empty()) {
        return Err(ExtensionError::InvalidType {
            owner: class_name.to_string(),
        });
    }

    Ok((tags, types))
}

impl PartialEq for ConverterProxy {
    fn eq(&self, other: &Self) -> bool {
        self.delegate_ptr() == other.delegate_ptr()
    }
}

impl Eq for ConverterProxy {}

impl fmt::Display for ConverterProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let package = match (self.package_name(), self.package_version()) {
            (Some(name), Some(version)) => format!("{}=={}", name, version),
            _ => "(none)".to_string(),
        };
        write!(
            f,
            "<ConverterProxy class: {} package: {}>",
            self.class_name, package
        )
    }
}

impl fmt::Debug for ConverterProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterProxy")
            .field("class_name", &self.class_name)
            .field("tags", &self.tags)
            .field("types", &self.types)
            .finish()
    }
}
