//! Extension interfaces and the normalizing extension proxy
//!
//! Two generations of extension exist side by side. Current extensions are
//! identified by URI and bundle converters. Legacy extensions carry no URI,
//! only type lists and prefix-based schema mappings, and are always enabled
//! so that older documents stay readable. Both are wrapped once in an
//! [`ExtensionProxy`], which is the only type the manager works with.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::domain::{
    ExtensionMetadata, FormatVersion, Software, TagDefinition, TagSpec, VersionError,
    VersionRequirement,
};

use super::converter::{normalize, Converter, ConverterProxy, TypeKey};

/// Configuration errors raised while wrapping an extension
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension {class} must declare a non-empty extension URI")]
    MissingUri { class: String },

    #[error("Extension {owner} has an invalid format requirement: {source}")]
    InvalidRequirement {
        owner: String,
        #[source]
        source: VersionError,
    },

    #[error("{owner} declares an empty tag URI")]
    InvalidTag { owner: String },

    #[error("{owner} declares an empty type name")]
    InvalidType { owner: String },

    #[error("Extension {owner} declares an empty legacy class name")]
    InvalidLegacyClassName { owner: String },
}

/// A current-generation extension
pub trait Extension {
    /// Identifying URI
    fn extension_uri(&self) -> &str;

    fn converters(&self) -> Vec<Rc<dyn Converter>> {
        Vec::new()
    }

    /// Range of format versions this extension supports (`None` for all)
    fn format_requirement(&self) -> Option<&str> {
        None
    }

    /// Explicit tag list; `None` means every tag of every converter
    fn tags(&self) -> Option<Vec<TagSpec>> {
        None
    }

    /// Class names of older extensions this one supersedes
    fn legacy_class_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Enabled for new documents unless explicitly disabled
    fn default_enabled(&self) -> bool {
        true
    }

    /// Enabled for every read and write regardless of configuration
    fn always_enabled(&self) -> bool {
        false
    }

    fn class_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A legacy extension without a URI
pub trait LegacyExtension {
    /// Types handled by the legacy type machinery; kept for reporting only
    fn types(&self) -> Vec<TypeKey> {
        Vec::new()
    }

    /// Tag prefix to schema URI rules
    fn tag_mapping(&self) -> Vec<PrefixMapping> {
        Vec::new()
    }

    /// Schema URI prefix to fetchable URL rules
    fn url_mapping(&self) -> Vec<PrefixMapping> {
        Vec::new()
    }

    fn default_enabled(&self) -> bool {
        true
    }

    fn class_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A prefix rewrite rule
///
/// The template may reference the whole input, the matched prefix and the
/// remainder: `{tag}`, `{tag_prefix}`, `{tag_suffix}` for tag mappings and
/// `{url}`, `{url_prefix}`, `{url_suffix}` for URL mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMapping {
    pub prefix: String,
    pub template: String,
}

impl PrefixMapping {
    pub fn new(prefix: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            template: template.into(),
        }
    }

    /// Applies the rule to a tag
    pub fn map_tag(&self, tag: &str) -> Option<String> {
        self.apply(tag, "tag")
    }

    /// Applies the rule to a URL
    pub fn map_url(&self, url: &str) -> Option<String> {
        self.apply(url, "url")
    }

    fn apply(&self, input: &str, name: &str) -> Option<String> {
        let suffix = input.strip_prefix(&self.prefix)?;
        Some(
            self.template
                .replace(&format!("{{{}_prefix}}", name), &self.prefix)
                .replace(&format!("{{{}_suffix}}", name), suffix)
                .replace(&format!("{{{}}}", name), input),
        )
    }
}

/// The package an extension was installed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// A raw extension of either generation
#[derive(Clone)]
pub enum ExtensionSource {
    Current(Rc<dyn Extension>),
    Legacy(Rc<dyn LegacyExtension>),
}

impl ExtensionSource {
    pub fn current(extension: impl Extension + 'static) -> Self {
        ExtensionSource::Current(Rc::new(extension))
    }

    pub fn legacy(extension: impl LegacyExtension + 'static) -> Self {
        ExtensionSource::Legacy(Rc::new(extension))
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ExtensionSource::Current(ext) => ext.class_name(),
            ExtensionSource::Legacy(ext) => ext.class_name(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ExtensionSource::Legacy(_))
    }

    /// Identity of the wrapped delegate
    fn ptr(&self) -> *const () {
        match self {
            ExtensionSource::Current(ext) => Rc::as_ptr(ext) as *const (),
            ExtensionSource::Legacy(ext) => Rc::as_ptr(ext) as *const (),
        }
    }
}

impl From<Rc<dyn Extension>> for ExtensionSource {
    fn from(extension: Rc<dyn Extension>) -> Self {
        ExtensionSource::Current(extension)
    }
}

impl From<Rc<dyn LegacyExtension>> for ExtensionSource {
    fn from(extension: Rc<dyn LegacyExtension>) -> Self {
        ExtensionSource::Legacy(extension)
    }
}

impl fmt::Debug for ExtensionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionSource::Current(_) => write!(f, "Current({})", self.class_name()),
            ExtensionSource::Legacy(_) => write!(f, "Legacy({})", self.class_name()),
        }
    }
}

/// Something that can be registered with a manager: a proxy or a raw extension
pub enum Registration {
    Proxy(Rc<ExtensionProxy>),
    Source(ExtensionSource),
}

impl From<Rc<ExtensionProxy>> for Registration {
    fn from(proxy: Rc<ExtensionProxy>) -> Self {
        Registration::Proxy(proxy)
    }
}

impl From<&Rc<ExtensionProxy>> for Registration {
    fn from(proxy: &Rc<ExtensionProxy>) -> Self {
        Registration::Proxy(Rc::clone(proxy))
    }
}

impl From<ExtensionSource> for Registration {
    fn from(source: ExtensionSource) -> Self {
        Registration::Source(source)
    }
}

/// An extension normalized once at registration
///
/// Equality and hashing follow the identity of the wrapped delegate: the same
/// extension instance wrapped twice compares equal, two instances sharing a
/// URI do not.
pub struct ExtensionProxy {
    source: ExtensionSource,
    package: Option<PackageInfo>,
    class_name: &'static str,
    requirement: VersionRequirement,
    converters: Vec<ConverterProxy>,
    tags: Vec<TagDefinition>,
    legacy_class_names: BTreeSet<String>,
    legacy_types: Vec<TypeKey>,
    tag_mapping: Vec<PrefixMapping>,
    url_mapping: Vec<PrefixMapping>,
}

impl ExtensionProxy {
    /// Wraps an extension registered at runtime (no package information)
    pub fn wrap(source: impl Into<ExtensionSource>) -> Result<Rc<Self>, ExtensionError> {
        Self::new(source, None)
    }

    /// Returns an existing proxy as is, or wraps a raw extension
    pub fn maybe_wrap(registration: impl Into<Registration>) -> Result<Rc<Self>, ExtensionError> {
        match registration.into() {
            Registration::Proxy(proxy) => Ok(proxy),
            Registration::Source(source) => Self::wrap(source),
        }
    }

    /// Wraps an extension, validating everything up front
    pub fn new(
        source: impl Into<ExtensionSource>,
        package: Option<PackageInfo>,
    ) -> Result<Rc<Self>, ExtensionError> {
        let source = source.into();
        match source.clone() {
            ExtensionSource::Current(ext) => Self::wrap_current(source, ext, package),
            ExtensionSource::Legacy(ext) => Ok(Rc::new(Self {
                class_name: ext.class_name(),
                source,
                package,
                requirement: VersionRequirement::any(),
                converters: Vec::new(),
                tags: Vec::new(),
                legacy_class_names: BTreeSet::new(),
                legacy_types: ext.types(),
                tag_mapping: ext.tag_mapping(),
                url_mapping: ext.url_mapping(),
            })),
        }
    }

    fn wrap_current(
        source: ExtensionSource,
        ext: Rc<dyn Extension>,
        package: Option<PackageInfo>,
    ) -> Result<Rc<Self>, ExtensionError> {
        let class_name = ext.class_name();

        if ext.extension_uri().trim().is_empty() {
            return Err(ExtensionError::MissingUri {
                class: class_name.to_string(),
            });
        }

        let requirement = match ext.format_requirement() {
            Some(req) => VersionRequirement::parse(req).map_err(|source| {
                ExtensionError::InvalidRequirement {
                    owner: class_name.to_string(),
                    source,
                }
            })?,
            None => VersionRequirement::any(),
        };

        let mut parts = Vec::new();
        for converter in ext.converters() {
            let (tags, types) = normalize(converter.as_ref())?;
            parts.push((converter, tags, types));
        }

        let converter_tags: Vec<&TagDefinition> =
            parts.iter().flat_map(|(_, tags, _)| tags.iter()).collect();
        let tags = reconcile_tags(ext.extension_uri(), ext.tags(), &converter_tags);

        // Converters only keep the tags their extension ended up with.
        let parts: Vec<_> = parts
            .into_iter()
            .map(|(delegate, own, types)| {
                let effective = own
                    .iter()
                    .filter_map(|t| tags.iter().find(|r| r.tag_uri() == t.tag_uri()).cloned())
                    .collect::<Vec<_>>();
                (delegate, effective, types)
            })
            .collect();

        let mut legacy_class_names = BTreeSet::new();
        for name in ext.legacy_class_names() {
            if name.trim().is_empty() {
                return Err(ExtensionError::InvalidLegacyClassName {
                    owner: class_name.to_string(),
                });
            }
            legacy_class_names.insert(name);
        }

        Ok(Rc::new_cyclic(|weak| Self {
            converters: parts
                .into_iter()
                .map(|(delegate, tags, types)| {
                    ConverterProxy::from_parts(delegate, weak.clone(), tags, types)
                })
                .collect(),
            source,
            package,
            class_name,
            requirement,
            tags,
            legacy_class_names,
            legacy_types: Vec::new(),
            tag_mapping: Vec::new(),
            url_mapping: Vec::new(),
        }))
    }

    /// Identifying URI; `None` for legacy extensions
    pub fn extension_uri(&self) -> Option<&str> {
        match &self.source {
            ExtensionSource::Current(ext) => Some(ext.extension_uri()),
            ExtensionSource::Legacy(_) => None,
        }
    }

    pub fn converters(&self) -> &[ConverterProxy] {
        &self.converters
    }

    /// Effective tags after reconciliation with the converters
    pub fn tags(&self) -> &[TagDefinition] {
        &self.tags
    }

    pub fn requirement(&self) -> &VersionRequirement {
        &self.requirement
    }

    /// Returns true if the extension may be used with `version`
    pub fn supports(&self, version: &FormatVersion) -> bool {
        self.requirement.matches(version)
    }

    pub fn legacy(&self) -> bool {
        self.source.is_legacy()
    }

    pub fn default_enabled(&self) -> bool {
        match &self.source {
            ExtensionSource::Current(ext) => ext.default_enabled(),
            ExtensionSource::Legacy(ext) => ext.default_enabled(),
        }
    }

    /// Legacy extensions are always enabled
    pub fn always_enabled(&self) -> bool {
        match &self.source {
            ExtensionSource::Current(ext) => ext.always_enabled(),
            ExtensionSource::Legacy(_) => true,
        }
    }

    pub fn legacy_class_names(&self) -> &BTreeSet<String> {
        &self.legacy_class_names
    }

    pub fn legacy_types(&self) -> &[TypeKey] {
        &self.legacy_types
    }

    pub fn tag_mapping(&self) -> &[PrefixMapping] {
        &self.tag_mapping
    }

    pub fn url_mapping(&self) -> &[PrefixMapping] {
        &self.url_mapping
    }

    /// The wrapped extension
    pub fn delegate(&self) -> &ExtensionSource {
        &self.source
    }

    /// Package information; `None` for runtime registrations
    pub fn package(&self) -> Option<&PackageInfo> {
        self.package.as_ref()
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.name.as_str())
    }

    pub fn package_version(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.version.as_str())
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    /// Short human-readable name: the URI, or the class name for legacy extensions
    pub fn label(&self) -> &str {
        self.extension_uri().unwrap_or(self.class_name)
    }

    /// Provenance record written into document history
    pub fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata {
            extension_uri: self.extension_uri().map(str::to_string),
            extension_class: self.class_name.to_string(),
            software: self
                .package
                .as_ref()
                .map(|p| Software::new(p.name.clone(), p.version.clone())),
        }
    }

    /// Returns true if both proxies wrap the same delegate
    pub fn same_delegate(&self, other: &ExtensionProxy) -> bool {
        self.source.ptr() == other.source.ptr()
    }
}

/// Resolves an extension's effective tags against its converters' tags
///
/// Without an explicit list every converter tag is effective (first
/// declaration of a URI wins). With one, tags no converter implements are
/// dropped, and of two definitions for a URI the one carrying metadata is
/// kept, the extension's when both do.
fn reconcile_tags(
    owner: &str,
    declared: Option<Vec<TagSpec>>,
    converter_tags: &[&TagDefinition],
) -> Vec<TagDefinition> {
    let mut tags: Vec<TagDefinition> = Vec::new();

    let Some(declared) = declared else {
        for def in converter_tags {
            if !tags.iter().any(|t| t.tag_uri() == def.tag_uri()) {
                tags.push((*def).clone());
            }
        }
        return tags;
    };

    for spec in declared {
        if tags.iter().any(|t| t.tag_uri() == spec.uri()) {
            continue;
        }

        let Some(converter_def) = converter_tags.iter().find(|t| t.tag_uri() == spec.uri())
        else {
            debug!(extension = owner, tag = spec.uri(), "Dropping tag without a converter");
            continue;
        };

        let resolved = if spec.has_metadata() || !converter_def.has_metadata() {
            spec.into_definition()
        } else {
            (*converter_def).clone()
        };
        tags.push(resolved);
    }

    tags
}

impl PartialEq for ExtensionProxy {
    fn eq(&self, other: &Self) -> bool {
        self.same_delegate(other)
    }
}

impl Eq for ExtensionProxy {}

impl Hash for ExtensionProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.ptr().hash(state);
    }
}

impl fmt::Display for ExtensionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let package = match &self.package {
            Some(package) => package.to_string(),
            None => "(none)".to_string(),
        };
        write!(
            f,
            "<ExtensionProxy class: {} package: {} legacy: {}>",
            self.class_name,
            package,
            self.legacy()
        )
    }
}

impl fmt::Debug for ExtensionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionProxy")
            .field("class_name", &self.class_name)
            .field("extension_uri", &self.extension_uri())
            .field("package", &self.package)
            .field("legacy", &self.legacy())
            .field("tags", &self.tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Node, Object};
    use crate::plugin::Conversion;
    use crate::serialization::{ConvertError, SerializationContext};
    use proptest::prelude::*;
    use std::collections::HashSet;

    const FOO: &str = "tag:example.org:test/foo-1.0.0";
    const BAR: &str = "tag:example.org:test/bar-1.0.0";
    const BAZ: &str = "tag:example.org:test/baz-1.0.0";

    struct TagConverter(Vec<TagSpec>);

    impl Converter for TagConverter {
        fn tags(&self) -> Vec<TagSpec> {
            self.0.clone()
        }

        fn types(&self) -> Vec<TypeKey> {
            vec![TypeKey::named("example::Thing")]
        }

        fn to_tree(
            &self,
            _object: &Object,
            _tag: &str,
            _ctx: &SerializationContext,
        ) -> Result<Conversion<Node>, ConvertError> {
            Ok(Node::null().into())
        }

        fn from_tree(
            &self,
            _node: &Node,
            _tag: &str,
            _ctx: &SerializationContext,
        ) -> Result<Conversion<Object>, ConvertError> {
            Ok(Object::new(()).into())
        }
    }

    #[derive(Default)]
    struct TestExtension {
        uri: String,
        requirement: Option<String>,
        tags: Option<Vec<TagSpec>>,
        converter_tags: Vec<Vec<TagSpec>>,
        legacy_class_names: Vec<String>,
    }

    impl TestExtension {
        fn new(uri: &str) -> Self {
            Self {
                uri: uri.to_string(),
                ..Default::default()
            }
        }
    }

    impl Extension for TestExtension {
        fn extension_uri(&self) -> &str {
            &self.uri
        }

        fn converters(&self) -> Vec<Rc<dyn Converter>> {
            self.converter_tags
                .iter()
                .map(|tags| Rc::new(TagConverter(tags.clone())) as Rc<dyn Converter>)
                .collect()
        }

        fn format_requirement(&self) -> Option<&str> {
            self.requirement.as_deref()
        }

        fn tags(&self) -> Option<Vec<TagSpec>> {
            self.tags.clone()
        }

        fn legacy_class_names(&self) -> Vec<String> {
            self.legacy_class_names.clone()
        }
    }

    struct OldStyle;

    impl LegacyExtension for OldStyle {
        fn tag_mapping(&self) -> Vec<PrefixMapping> {
            vec![PrefixMapping::new(
                "tag:example.org:old/",
                "http://example.org/schemas/old/{tag_suffix}",
            )]
        }
    }

    fn uris(proxy: &ExtensionProxy) -> Vec<&str> {
        proxy.tags().iter().map(|t| t.tag_uri()).collect()
    }

    #[test]
    fn defaults_for_minimal_extension() {
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(TestExtension::new(
            "pkg://ns/ext-1.0",
        )))
        .unwrap();

        assert_eq!(proxy.extension_uri(), Some("pkg://ns/ext-1.0"));
        assert!(proxy.converters().is_empty());
        assert!(proxy.tags().is_empty());
        assert!(proxy.requirement().is_unconstrained());
        assert!(!proxy.legacy());
        assert!(proxy.default_enabled());
        assert!(!proxy.always_enabled());
        assert!(proxy.package().is_none());
    }

    #[test]
    fn empty_uri_is_rejected() {
        let err = ExtensionProxy::wrap(ExtensionSource::current(TestExtension::new("")))
            .unwrap_err();
        assert!(matches!(err, ExtensionError::MissingUri { .. }));
        assert!(err.to_string().contains("TestExtension"));
    }

    #[test]
    fn malformed_requirement_fails_fast() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.requirement = Some("not a range".to_string());

        let err = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidRequirement { .. }));
    }

    #[test]
    fn requirement_gates_versions() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.requirement = Some(">=1.4.0".to_string());
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

        assert!(!proxy.supports(&"1.3.0".parse().unwrap()));
        assert!(proxy.supports(&"1.5.0".parse().unwrap()));
    }

    #[test]
    fn blank_legacy_class_name_is_rejected() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.legacy_class_names = vec!["old::Ext".to_string(), " ".to_string()];

        let err = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidLegacyClassName { .. }));
    }

    #[test]
    fn implicit_tags_are_converter_union() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.converter_tags = vec![vec![FOO.into(), BAR.into()], vec![BAR.into(), BAZ.into()]];
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

        assert_eq!(uris(&proxy), vec![FOO, BAR, BAZ]);
    }

    #[test]
    fn explicit_tags_drop_unimplemented() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.converter_tags = vec![vec![FOO.into(), BAR.into()]];
        ext.tags = Some(vec![BAR.into(), BAZ.into()]);
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

        assert_eq!(uris(&proxy), vec![BAR]);
    }

    #[test]
    fn converters_lose_tags_their_extension_drops() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.converter_tags = vec![vec![
            FOO.into(),
            BAR.into(),
            TagDefinition::new(BAZ).with_title("converter baz").into(),
        ]];
        ext.tags = Some(vec![BAZ.into(), BAR.into()]);
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

        let converter = &proxy.converters()[0];
        assert_eq!(converter.tag_uris().collect::<Vec<_>>(), vec![BAR, BAZ]);
        assert!(!converter.declares_tag(FOO));
        assert_eq!(converter.tags()[1].title(), Some("converter baz"));
    }

    #[test]
    fn reconciliation_prefers_metadata() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.converter_tags = vec![vec![
            TagDefinition::new(FOO).with_title("from converter").into(),
            BAR.into(),
            TagDefinition::new(BAZ).with_title("converter baz").into(),
        ]];
        ext.tags = Some(vec![
            FOO.into(),
            TagDefinition::new(BAR).with_title("from extension").into(),
            TagDefinition::new(BAZ).with_title("extension baz").into(),
        ]);
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

        assert_eq!(proxy.tags()[0].title(), Some("from converter"));
        assert_eq!(proxy.tags()[1].title(), Some("from extension"));
        assert_eq!(proxy.tags()[2].title(), Some("extension baz"));
    }

    #[test]
    fn converters_reference_their_extension() {
        let mut ext = TestExtension::new("pkg://ns/ext-1.0");
        ext.converter_tags = vec![vec![FOO.into()]];
        let proxy = ExtensionProxy::new(
            ExtensionSource::current(ext),
            Some(PackageInfo::new("foo", "1.2.3")),
        )
        .unwrap();

        let converter = &proxy.converters()[0];
        let owner = converter.extension().unwrap();
        assert!(Rc::ptr_eq(&owner, &proxy));
        assert_eq!(converter.package_name().as_deref(), Some("foo"));
        assert!(converter.to_string().ends_with("package: foo==1.2.3>"));
    }

    #[test]
    fn legacy_extension_shape() {
        let proxy = ExtensionProxy::wrap(ExtensionSource::legacy(OldStyle)).unwrap();

        assert!(proxy.legacy());
        assert!(proxy.always_enabled());
        assert_eq!(proxy.extension_uri(), None);
        assert!(proxy.label().ends_with("OldStyle"));
        assert_eq!(proxy.tag_mapping().len(), 1);
        assert!(proxy.metadata().extension_uri.is_none());
    }

    #[test]
    fn identity_follows_delegate() {
        let shared: Rc<dyn Extension> = Rc::new(TestExtension::new("pkg://ns/ext-1.0"));
        let a = ExtensionProxy::wrap(Rc::clone(&shared)).unwrap();
        let b = ExtensionProxy::wrap(shared).unwrap();
        let c = ExtensionProxy::wrap(ExtensionSource::current(TestExtension::new(
            "pkg://ns/ext-1.0",
        )))
        .unwrap();

        assert_eq!(*a, *b);
        assert_ne!(*a, *c);

        let mut set = HashSet::new();
        set.insert(Rc::clone(&a));
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn maybe_wrap_returns_existing_proxy() {
        let proxy = ExtensionProxy::wrap(ExtensionSource::current(TestExtension::new(
            "pkg://ns/ext-1.0",
        )))
        .unwrap();

        let again = ExtensionProxy::maybe_wrap(&proxy).unwrap();
        assert!(Rc::ptr_eq(&proxy, &again));
    }

    #[test]
    fn display_and_metadata() {
        let proxy = ExtensionProxy::new(
            ExtensionSource::current(TestExtension::new("pkg://ns/ext-1.0")),
            Some(PackageInfo::new("foo", "1.2.3")),
        )
        .unwrap();

        let rendered = proxy.to_string();
        assert!(rendered.starts_with("<ExtensionProxy class: "));
        assert!(rendered.ends_with("package: foo==1.2.3 legacy: false>"));

        let record = proxy.metadata();
        assert_eq!(record.extension_uri.as_deref(), Some("pkg://ns/ext-1.0"));
        assert_eq!(record.software, Some(Software::new("foo", "1.2.3")));
    }

    #[test]
    fn prefix_mapping_placeholders() {
        let tag_rule = PrefixMapping::new("tag:example.org:", "{tag_prefix}|{tag_suffix}|{tag}");
        assert_eq!(
            tag_rule.map_tag("tag:example.org:a-1.0").as_deref(),
            Some("tag:example.org:|a-1.0|tag:example.org:a-1.0")
        );
        assert_eq!(tag_rule.map_tag("tag:other.org:a"), None);

        let url_rule = PrefixMapping::new("http://example.org/", "file:///schemas/{url_suffix}.yaml");
        assert_eq!(
            url_rule.map_url("http://example.org/a-1.0").as_deref(),
            Some("file:///schemas/a-1.0.yaml")
        );
    }

    fn tag_strategy() -> impl Strategy<Value = TagSpec> {
        (0usize..4, proptest::option::of("[a-z]{1,6}")).prop_map(|(i, title)| -> TagSpec {
            let uri = format!("tag:example.org:prop/t{}-1.0.0", i);
            match title {
                Some(title) => TagDefinition::new(uri).with_title(title).into(),
                None => uri.into(),
            }
        })
    }

    proptest! {
        #[test]
        fn reconciled_tags_are_declared_by_converters(
            converter_tags in proptest::collection::vec(tag_strategy(), 0..6),
            declared in proptest::option::of(proptest::collection::vec(tag_strategy(), 0..6)),
        ) {
            let mut ext = TestExtension::new("pkg://ns/prop-1.0");
            ext.converter_tags = vec![converter_tags.clone()];
            ext.tags = declared.clone();
            let proxy = ExtensionProxy::wrap(ExtensionSource::current(ext)).unwrap();

            let resolved = uris(&proxy);
            let unique: HashSet<_> = resolved.iter().collect();
            prop_assert_eq!(unique.len(), resolved.len());

            for tag in proxy.tags() {
                prop_assert!(converter_tags.iter().any(|c| c.uri() == tag.tag_uri()));
                if let Some(declared) = &declared {
                    prop_assert!(declared.iter().any(|d| d.uri() == tag.tag_uri()));
                }
            }

            for converter in proxy.converters() {
                for uri in converter.tag_uris() {
                    prop_assert!(resolved.contains(&uri));
                }
            }

            if declared.is_none() {
                for spec in &converter_tags {
                    prop_assert!(resolved.contains(&spec.uri()));
                }
            }
        }
    }
}
