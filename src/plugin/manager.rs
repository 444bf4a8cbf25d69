//! Tag and type indices over an ordered list of extensions
//!
//! Earlier extensions take precedence: when two enabled extensions claim the
//! same tag or type, the earlier one keeps it and the claim of the later one
//! is recorded as a [`Conflict`] and logged. Indices are rebuilt from scratch
//! whenever an extension is removed, so a lower-priority extension regains
//! whatever a removed one was blocking.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ExtensionMetadata, Object, TagDefinition};

use super::converter::{ConverterProxy, TypeKey};
use super::extension::{ExtensionError, ExtensionProxy, Registration};

/// Failed index lookups
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No support available for tag '{0}'. You may need to install a missing extension.")]
    UnknownTag(String),

    #[error("No support available for type '{0}'. You may need to install or enable an extension.")]
    UnknownType(String),
}

/// A converter bound in an index, together with the extension providing it
#[derive(Clone)]
pub struct ConverterRef {
    extension: Rc<ExtensionProxy>,
    index: usize,
}

impl ConverterRef {
    pub fn extension(&self) -> &Rc<ExtensionProxy> {
        &self.extension
    }

    pub fn converter(&self) -> &ConverterProxy {
        &self.extension.converters()[self.index]
    }

    fn same_converter(&self, other: &ConverterRef) -> bool {
        self.converter() == other.converter()
    }
}

impl Deref for ConverterRef {
    type Target = ConverterProxy;

    fn deref(&self) -> &ConverterProxy {
        self.converter()
    }
}

impl fmt::Debug for ConverterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.converter(), self.extension.label())
    }
}

/// What a conflicting claim was about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Tag,
    Type,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Tag => write!(f, "tag"),
            ConflictKind::Type => write!(f, "type"),
        }
    }
}

/// A claim discarded because an earlier extension already held the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub key: String,
    pub winner: String,
    pub loser: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' claimed by {} and {}; using {}",
            self.kind, self.key, self.winner, self.loser, self.winner
        )
    }
}

/// A recorded extension that no enabled extension accounts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingExtension {
    pub record: ExtensionMetadata,
}

impl fmt::Display for MissingExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File was created with extension '{}'", self.record.label())?;
        if let Some(software) = &self.record.software {
            write!(f, " from package {}", software)?;
        }
        write!(f, ", which is not currently installed or enabled")
    }
}

struct TagEntry {
    definition: TagDefinition,
    extension: Rc<ExtensionProxy>,
}

/// The live, ordered set of enabled extensions and their indices
#[derive(Default)]
pub struct ExtensionManager {
    extensions: Vec<Rc<ExtensionProxy>>,
    tag_defs: Vec<TagEntry>,
    tag_defs_by_uri: HashMap<String, usize>,
    converters_by_tag: HashMap<String, ConverterRef>,
    converters_by_type_id: HashMap<TypeId, ConverterRef>,
    converters_by_type_name: HashMap<String, ConverterRef>,
    conflicts: Vec<Conflict>,
}

impl ExtensionManager {
    /// Builds a manager from proxies in priority order
    pub fn new(extensions: Vec<Rc<ExtensionProxy>>) -> Self {
        let mut manager = Self::default();
        for extension in extensions {
            if !manager.contains(&extension) {
                manager.extensions.push(extension);
            }
        }
        manager.rebuild();
        manager
    }

    /// Builds a manager from proxies or raw extensions, wrapping the raw ones
    pub fn from_registrations<I, R>(registrations: I) -> Result<Self, ExtensionError>
    where
        I: IntoIterator<Item = R>,
        R: Into<Registration>,
    {
        let extensions = registrations
            .into_iter()
            .map(ExtensionProxy::maybe_wrap)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(extensions))
    }

    /// Enabled extensions in priority order
    pub fn extensions(&self) -> &[Rc<ExtensionProxy>] {
        &self.extensions
    }

    /// Claims discarded while building the indices
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Returns true if an extension wrapping the same delegate is present
    pub fn contains(&self, extension: &ExtensionProxy) -> bool {
        self.extensions.iter().any(|e| e.same_delegate(extension))
    }

    /// Appends an extension with the lowest priority
    ///
    /// Returns `Ok(false)` if the same delegate is already registered.
    pub fn add_extension(
        &mut self,
        registration: impl Into<Registration>,
    ) -> Result<bool, ExtensionError> {
        let extension = ExtensionProxy::maybe_wrap(registration)?;
        if self.contains(&extension) {
            return Ok(false);
        }

        self.extensions.push(Rc::clone(&extension));
        self.index(&extension);
        Ok(true)
    }

    /// Removes an extension by delegate identity and rebuilds every index
    pub fn remove_extension(&mut self, extension: &ExtensionProxy) -> bool {
        let before = self.extensions.len();
        self.extensions.retain(|e| !e.same_delegate(extension));

        if self.extensions.len() == before {
            return false;
        }

        self.rebuild();
        true
    }

    fn rebuild(&mut self) {
        self.tag_defs.clear();
        self.tag_defs_by_uri.clear();
        self.converters_by_tag.clear();
        self.converters_by_type_id.clear();
        self.converters_by_type_name.clear();
        self.conflicts.clear();

        for extension in self.extensions.clone() {
            self.index(&extension);
        }
    }

    fn index(&mut self, extension: &Rc<ExtensionProxy>) {
        let mut accepted = HashSet::new();
        for definition in extension.tags() {
            let uri = definition.tag_uri();
            match self.tag_defs_by_uri.get(uri) {
                Some(&existing) => {
                    let winner = self.tag_defs[existing].extension.label().to_string();
                    self.record_conflict(
                        ConflictKind::Tag,
                        uri,
                        winner,
                        extension.label().to_string(),
                    );
                }
                None => {
                    self.tag_defs_by_uri
                        .insert(uri.to_string(), self.tag_defs.len());
                    self.tag_defs.push(TagEntry {
                        definition: definition.clone(),
                        extension: Rc::clone(extension),
                    });
                    accepted.insert(uri.to_string());
                }
            }
        }

        for (index, converter) in extension.converters().iter().enumerate() {
            let entry = ConverterRef {
                extension: Rc::clone(extension),
                index,
            };

            for uri in converter.tag_uris() {
                if !accepted.contains(uri) {
                    continue;
                }
                match self.converters_by_tag.get(uri) {
                    Some(existing) if existing.same_converter(&entry) => {}
                    Some(existing) => {
                        let (winner, loser) = claimants(existing, &entry);
                        self.record_conflict(ConflictKind::Tag, uri, winner, loser);
                    }
                    None => {
                        self.converters_by_tag.insert(uri.to_string(), entry.clone());
                    }
                }
            }

            for key in converter.types() {
                match self.lookup_type_key(key).cloned() {
                    Some(existing) if existing.same_converter(&entry) => {}
                    Some(existing) => {
                        let (winner, loser) = claimants(&existing, &entry);
                        self.record_conflict(ConflictKind::Type, key.name(), winner, loser);
                    }
                    None => {
                        if let Some(id) = key.type_id() {
                            self.converters_by_type_id.insert(id, entry.clone());
                        }
                        self.converters_by_type_name
                            .insert(key.name().to_string(), entry.clone());
                    }
                }
            }
        }

        debug!(
            extension = extension.label(),
            tags = accepted.len(),
            "Indexed extension"
        );
    }

    fn record_conflict(&mut self, kind: ConflictKind, key: &str, winner: String, loser: String) {
        warn!(
            %kind,
            key,
            winner = %winner,
            loser = %loser,
            "Multiple converters claim the same key; keeping the earliest"
        );
        self.conflicts.push(Conflict {
            kind,
            key: key.to_string(),
            winner,
            loser,
        });
    }

    fn lookup_type_key(&self, key: &TypeKey) -> Option<&ConverterRef> {
        key.type_id()
            .and_then(|id| self.converters_by_type_id.get(&id))
            .or_else(|| self.converters_by_type_name.get(key.name()))
    }

    /// Returns true if a converter is bound to `tag`
    pub fn handles_tag(&self, tag: &str) -> bool {
        self.converters_by_tag.contains_key(tag)
    }

    /// Returns true if a converter is bound to the type
    pub fn handles_type(&self, key: &TypeKey) -> bool {
        self.lookup_type_key(key).is_some()
    }

    pub fn get_tag_definition(&self, tag: &str) -> Result<&TagDefinition, LookupError> {
        self.tag_defs_by_uri
            .get(tag)
            .map(|&i| &self.tag_defs[i].definition)
            .ok_or_else(|| LookupError::UnknownTag(tag.to_string()))
    }

    pub fn get_converter_for_tag(&self, tag: &str) -> Result<&ConverterRef, LookupError> {
        self.converters_by_tag
            .get(tag)
            .ok_or_else(|| LookupError::UnknownTag(tag.to_string()))
    }

    pub fn get_converter_for_type(&self, key: &TypeKey) -> Result<&ConverterRef, LookupError> {
        self.lookup_type_key(key)
            .ok_or_else(|| LookupError::UnknownType(key.name().to_string()))
    }

    /// Looks up the converter for an object's concrete type
    pub fn get_converter_for_object(&self, object: &Object) -> Result<&ConverterRef, LookupError> {
        self.converters_by_type_id
            .get(&object.type_id())
            .or_else(|| self.converters_by_type_name.get(object.type_name()))
            .ok_or_else(|| LookupError::UnknownType(object.type_name().to_string()))
    }

    /// Every indexed tag definition, in priority order
    pub fn tags(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tag_defs.iter().map(|entry| &entry.definition)
    }

    /// Returns true if `tag` is one of the indexed tag definitions
    pub fn has_tag_definition(&self, tag: &str) -> bool {
        self.tag_defs_by_uri.contains_key(tag)
    }

    /// Locates the schema for a tag
    ///
    /// The tag definition's own schema URI wins. Otherwise the legacy tag
    /// mappings produce a schema URI, which the legacy URL mappings may then
    /// rewrite.
    pub fn resolve_schema_uri(&self, tag: &str) -> Option<String> {
        if let Some(uri) = self
            .get_tag_definition(tag)
            .ok()
            .and_then(|def| def.schema_uri())
        {
            return Some(uri.to_string());
        }

        let schema_uri = self
            .extensions
            .iter()
            .flat_map(|e| e.tag_mapping())
            .find_map(|rule| rule.map_tag(tag))?;

        let url = self
            .extensions
            .iter()
            .flat_map(|e| e.url_mapping())
            .find_map(|rule| rule.map_url(&schema_uri));

        Some(url.unwrap_or(schema_uri))
    }

    /// Returns the history records no enabled extension accounts for
    ///
    /// Records with a URI match by URI. Records without one match an
    /// extension's class name or one of its legacy class names.
    pub fn check_recorded(&self, records: &[ExtensionMetadata]) -> Vec<MissingExtension> {
        records
            .iter()
            .filter(|record| !self.accounts_for(record))
            .map(|record| MissingExtension {
                record: record.clone(),
            })
            .collect()
    }

    fn accounts_for(&self, record: &ExtensionMetadata) -> bool {
        self.extensions.iter().any(|e| match &record.extension_uri {
            Some(uri) => e.extension_uri() == Some(uri.as_str()),
            None => {
                e.class_name() == record.extension_class
                    || e.legacy_class_names().contains(&record.extension_class)
            }
        })
    }
}

impl fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("extensions", &self.extensions)
            .field("tags", &self.tag_defs_by_uri.len())
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

/// Conflict labels for a converter claim. Converters of one extension are
/// told apart by position and class name.
fn claimants(existing: &ConverterRef, claimant: &ConverterRef) -> (String, String) {
    let extension = claimant.extension();
    if existing.extension().same_delegate(extension) {
        let label = |c: &ConverterRef| {
            format!("{} converter #{} ({})", extension.label(), c.index, c.class_name())
        };
        (label(existing), label(claimant))
    } else {
        (
            existing.extension().label().to_string(),
            extension.label().to_string(),
        )
    }
}
