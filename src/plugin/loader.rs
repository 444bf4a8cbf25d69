//! Installed extension packages
//!
//! Each package provides a list of raw extensions. Loading wraps every one of
//! them with the package's name and version:
//! 1. Current extensions come first, legacy extensions after, each group in
//!    package registration order
//! 2. Extensions whose URI is disabled are dropped
//! 3. Extensions that fail to wrap are skipped with a warning

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use super::builtin::{CoreExtension, CoreSchemas};
use super::extension::{ExtensionProxy, ExtensionSource, PackageInfo};

/// Name of the package providing the built-in extensions
pub const BUILTIN_PACKAGE: &str = env!("CARGO_PKG_NAME");

type Provider = Rc<dyn Fn() -> Vec<ExtensionSource>>;

/// An installed package and the extensions it provides
#[derive(Clone)]
pub struct ExtensionPackage {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    provider: Provider,
}

impl ExtensionPackage {
    /// Creates a package whose extensions come from `provider`
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> Vec<ExtensionSource> + 'static,
    {
        Self {
            name: name.into(),
            version: version.into(),
            provider: Rc::new(provider),
        }
    }

    /// The package shipping the built-in extensions
    pub fn builtin() -> Self {
        Self::new(BUILTIN_PACKAGE, env!("CARGO_PKG_VERSION"), || {
            vec![
                ExtensionSource::current(CoreExtension),
                ExtensionSource::legacy(CoreSchemas),
            ]
        })
    }

    /// Instantiates the package's extensions
    pub fn extensions(&self) -> Vec<ExtensionSource> {
        (self.provider)()
    }

    fn info(&self) -> PackageInfo {
        PackageInfo::new(self.name.clone(), self.version.clone())
    }
}

impl fmt::Debug for ExtensionPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionPackage")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// An extension that could not be wrapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    /// Package that provided the extension
    pub package: String,

    /// Class name of the extension
    pub extension: String,

    /// Why wrapping failed
    pub error: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from package {} failed to load: {}",
            self.extension, self.package, self.error
        )
    }
}

/// Result of loading every registered package
#[derive(Debug, Default)]
pub struct LoadedExtensions {
    pub extensions: Vec<Rc<ExtensionProxy>>,
    pub failures: Vec<LoadFailure>,
}

/// Package registry
#[derive(Debug, Default, Clone)]
pub struct ExtensionLoader {
    /// Registered packages, in registration order
    packages: Vec<ExtensionPackage>,

    /// Extension URIs to leave out
    disabled: BTreeSet<String>,
}

impl ExtensionLoader {
    /// Creates an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader with the built-in package registered
    pub fn with_builtin() -> Self {
        let mut loader = Self::new();
        loader.add_package(ExtensionPackage::builtin());
        loader
    }

    /// Registers a package; a package with the same name is replaced
    pub fn add_package(&mut self, package: ExtensionPackage) {
        match self.packages.iter_mut().find(|p| p.name == package.name) {
            Some(existing) => *existing = package,
            None => self.packages.push(package),
        }
    }

    /// Leaves the extension with this URI out of future loads
    pub fn disable(&mut self, extension_uri: impl Into<String>) {
        self.disabled.insert(extension_uri.into());
    }

    /// Registered packages
    pub fn packages(&self) -> &[ExtensionPackage] {
        &self.packages
    }

    pub fn is_disabled(&self, extension_uri: &str) -> bool {
        self.disabled.contains(extension_uri)
    }

    /// Wraps every extension of every package
    pub fn load(&self) -> LoadedExtensions {
        let mut current = Vec::new();
        let mut legacy = Vec::new();
        let mut failures = Vec::new();

        for package in &self.packages {
            for source in package.extensions() {
                let class_name = source.class_name();

                let proxy = match ExtensionProxy::new(source, Some(package.info())) {
                    Ok(proxy) => proxy,
                    Err(e) => {
                        warn!(
                            package = %package.name,
                            extension = class_name,
                            error = %e,
                            "Skipping extension that failed to load"
                        );
                        failures.push(LoadFailure {
                            package: format!("{}=={}", package.name, package.version),
                            extension: class_name.to_string(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                };

                if proxy.extension_uri().is_some_and(|uri| self.is_disabled(uri)) {
                    debug!(extension = proxy.label(), "Extension disabled by configuration");
                    continue;
                }

                if proxy.legacy() {
                    legacy.push(proxy);
                } else {
                    current.push(proxy);
                }
            }
        }

        current.extend(legacy);
        LoadedExtensions {
            extensions: current,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Extension, LegacyExtension};

    struct Named(&'static str);

    impl Extension for Named {
        fn extension_uri(&self) -> &str {
            self.0
        }
    }

    struct Broken;

    impl Extension for Broken {
        fn extension_uri(&self) -> &str {
            "pkg://ns/broken-1.0"
        }

        fn format_requirement(&self) -> Option<&str> {
            Some("at least 1.4")
        }
    }

    struct Old;

    impl LegacyExtension for Old {}

    fn uris(loaded: &LoadedExtensions) -> Vec<String> {
        loaded
            .extensions
            .iter()
            .map(|e| e.label().to_string())
            .collect()
    }

    #[test]
    fn current_extensions_come_before_legacy() {
        let mut loader = ExtensionLoader::new();
        loader.add_package(ExtensionPackage::new("one", "1.0.0", || {
            vec![
                ExtensionSource::legacy(Old),
                ExtensionSource::current(Named("pkg://ns/a-1.0")),
            ]
        }));
        loader.add_package(ExtensionPackage::new("two", "2.0.0", || {
            vec![ExtensionSource::current(Named("pkg://ns/b-1.0"))]
        }));

        let loaded = loader.load();
        let labels = uris(&loaded);

        assert_eq!(labels[0], "pkg://ns/a-1.0");
        assert_eq!(labels[1], "pkg://ns/b-1.0");
        assert!(labels[2].ends_with("Old"));
        assert_eq!(loaded.extensions[1].package_name(), Some("two"));
        assert_eq!(loaded.extensions[1].package_version(), Some("2.0.0"));
    }

    #[test]
    fn failing_extension_is_skipped() {
        let mut loader = ExtensionLoader::new();
        loader.add_package(ExtensionPackage::new("mixed", "0.1.0", || {
            vec![
                ExtensionSource::current(Broken),
                ExtensionSource::current(Named("pkg://ns/ok-1.0")),
            ]
        }));

        let loaded = loader.load();

        assert_eq!(uris(&loaded), vec!["pkg://ns/ok-1.0"]);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].package, "mixed==0.1.0");
        assert!(loaded.failures[0].extension.ends_with("Broken"));
        assert!(loaded.failures[0].to_string().contains("at least 1.4"));
    }

    #[test]
    fn disabled_uris_are_dropped() {
        let mut loader = ExtensionLoader::new();
        loader.add_package(ExtensionPackage::new("one", "1.0.0", || {
            vec![
                ExtensionSource::current(Named("pkg://ns/a-1.0")),
                ExtensionSource::current(Named("pkg://ns/b-1.0")),
            ]
        }));
        loader.disable("pkg://ns/a-1.0");

        assert_eq!(uris(&loader.load()), vec!["pkg://ns/b-1.0"]);
    }

    #[test]
    fn builtin_package_loads() {
        let loaded = ExtensionLoader::with_builtin().load();

        assert!(loaded.failures.is_empty());
        assert_eq!(loaded.extensions.len(), 2);
        assert!(!loaded.extensions[0].legacy());
        assert!(loaded.extensions[1].legacy());
        assert_eq!(loaded.extensions[0].package_name(), Some(BUILTIN_PACKAGE));
    }

    #[test]
    fn re_adding_a_package_replaces_it() {
        let mut loader = ExtensionLoader::new();
        loader.add_package(ExtensionPackage::new("one", "1.0.0", Vec::new));
        loader.add_package(ExtensionPackage::new("one", "1.1.0", Vec::new));

        assert_eq!(loader.packages().len(), 1);
        assert_eq!(loader.packages()[0].version, "1.1.0");
    }
}
