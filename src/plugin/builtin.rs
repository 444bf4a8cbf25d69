//! Built-in extensions
//!
//! The core extension converts complex numbers and the provenance records
//! documents carry in their history. The legacy core schema extension maps
//! core tags to schema locations.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::domain::{ExtensionMetadata, Node, Object, Software, TagDefinition, TagSpec};
use crate::serialization::{ConvertError, SerializationContext};

use super::converter::{Conversion, Converter, TypeKey};
use super::extension::{Extension, LegacyExtension, PrefixMapping};

pub const CORE_EXTENSION_URI: &str = "tagtree://tagtree.dev/core/extensions/core-1.0.0";

const TAG_PREFIX: &str = "tag:tagtree.dev:core/";
const COMPLEX_TAG: &str = "tag:tagtree.dev:core/complex-1.0.0";
const SOFTWARE_TAG: &str = "tag:tagtree.dev:core/software-1.0.0";
const EXTENSION_METADATA_TAG: &str = "tag:tagtree.dev:core/extension_metadata-1.0.0";

/// A complex number, written as a `1+2j` style scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.im.is_sign_negative() { '-' } else { '+' };
        write!(f, "{}{}{}j", self.re, sign, self.im.abs())
    }
}

impl FromStr for Complex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid complex number '{}'", s);
        let parse = |part: &str| part.parse::<f64>().map_err(|_| invalid());

        let Some(body) = s.strip_suffix(['j', 'J', 'i']) else {
            return Ok(Complex::new(parse(s)?, 0.0));
        };

        // The split is the last sign that is neither leading nor an exponent sign.
        let bytes = body.as_bytes();
        let split = (1..bytes.len())
            .rev()
            .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));

        let imaginary = |part: &str| match part {
            "" | "+" => Ok(1.0),
            "-" => Ok(-1.0),
            _ => parse(part),
        };

        match split {
            Some(i) => Ok(Complex::new(parse(&body[..i])?, imaginary(&body[i..])?)),
            None => Ok(Complex::new(0.0, imaginary(body)?)),
        }
    }
}

struct ComplexConverter;

impl Converter for ComplexConverter {
    fn tags(&self) -> Vec<TagSpec> {
        vec![COMPLEX_TAG.into()]
    }

    fn types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Complex>()]
    }

    fn to_tree(
        &self,
        object: &Object,
        _tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        let value = object
            .downcast_ref::<Complex>()
            .ok_or_else(|| ConvertError::unexpected_object::<Complex>(object))?;
        Ok(Node::string(value.to_string()).into())
    }

    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        let text = match (node.as_string(), node.as_f64()) {
            (Some(text), _) => text,
            (None, Some(re)) => return Ok(Object::new(Complex::new(re, 0.0)).into()),
            _ => {
                return Err(ConvertError::invalid_node(
                    tag,
                    format!("expected a string, found {}", node.kind()),
                ))
            }
        };

        let value: Complex = text
            .parse()
            .map_err(|e: String| ConvertError::invalid_node(tag, e))?;
        Ok(Object::new(value).into())
    }
}

struct SoftwareConverter;

impl Converter for SoftwareConverter {
    fn tags(&self) -> Vec<TagSpec> {
        vec![SOFTWARE_TAG.into()]
    }

    fn types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Software>()]
    }

    fn to_tree(
        &self,
        object: &Object,
        _tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        let software = object
            .downcast_ref::<Software>()
            .ok_or_else(|| ConvertError::unexpected_object::<Software>(object))?;
        Ok(Node::mapping([
            ("name", Node::string(software.name.clone())),
            ("version", Node::string(software.version.clone())),
        ])
        .into())
    }

    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        Ok(Object::new(software_from_mapping(node, tag)?).into())
    }
}

fn software_from_mapping(node: &Node, tag: &str) -> Result<Software, ConvertError> {
    let field = |name: &str| {
        node.get(name)
            .and_then(|n| n.as_string())
            .ok_or_else(|| ConvertError::missing_field(tag, name, "string"))
    };
    Ok(Software::new(field("name")?, field("version")?))
}

struct ExtensionMetadataConverter;

impl Converter for ExtensionMetadataConverter {
    fn tags(&self) -> Vec<TagSpec> {
        vec![EXTENSION_METADATA_TAG.into()]
    }

    fn types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ExtensionMetadata>()]
    }

    fn to_tree(
        &self,
        object: &Object,
        _tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Node>, ConvertError> {
        let record = object
            .downcast_ref::<ExtensionMetadata>()
            .ok_or_else(|| ConvertError::unexpected_object::<ExtensionMetadata>(object))?;

        let node = Node::mapping([("extension_class", Node::string(record.extension_class.clone()))]);
        if let Some(uri) = &record.extension_uri {
            node.insert("extension_uri", Node::string(uri.clone()));
        }
        if let Some(software) = &record.software {
            node.insert("software", Node::object(Object::new(software.clone())));
        }
        Ok(node.into())
    }

    fn from_tree(
        &self,
        node: &Node,
        tag: &str,
        _ctx: &SerializationContext,
    ) -> Result<Conversion<Object>, ConvertError> {
        let extension_class = node
            .get("extension_class")
            .and_then(|n| n.as_string())
            .ok_or_else(|| ConvertError::missing_field(tag, "extension_class", "string"))?;

        let software = match node.get("software") {
            None => None,
            Some(child) => match child.as_object() {
                Some(object) => Some(
                    object
                        .downcast_ref::<Software>()
                        .cloned()
                        .ok_or_else(|| ConvertError::unexpected_object::<Software>(&object))?,
                ),
                None => Some(software_from_mapping(&child, tag)?),
            },
        };

        Ok(Object::new(ExtensionMetadata {
            extension_uri: node.get("extension_uri").and_then(|n| n.as_string()),
            extension_class,
            software,
        })
        .into())
    }
}

/// Complex numbers and document provenance records
pub struct CoreExtension;

impl Extension for CoreExtension {
    fn extension_uri(&self) -> &str {
        CORE_EXTENSION_URI
    }

    fn converters(&self) -> Vec<Rc<dyn Converter>> {
        vec![
            Rc::new(ComplexConverter),
            Rc::new(SoftwareConverter),
            Rc::new(ExtensionMetadataConverter),
        ]
    }

    fn format_requirement(&self) -> Option<&str> {
        Some(">=1.0.0")
    }

    fn tags(&self) -> Option<Vec<TagSpec>> {
        Some(vec![
            TagDefinition::new(COMPLEX_TAG)
                .with_title("Complex number")
                .with_description("A complex number written as real and imaginary parts.")
                .into(),
            TagDefinition::new(SOFTWARE_TAG)
                .with_title("Software package")
                .into(),
            TagDefinition::new(EXTENSION_METADATA_TAG)
                .with_title("Extension used to write a document")
                .into(),
        ])
    }

    fn always_enabled(&self) -> bool {
        true
    }
}

/// Schema locations for the core tags
pub struct CoreSchemas;

impl LegacyExtension for CoreSchemas {
    fn tag_mapping(&self) -> Vec<PrefixMapping> {
        vec![PrefixMapping::new(
            TAG_PREFIX,
            "http://tagtree.dev/schemas/core/{tag_suffix}",
        )]
    }
}
