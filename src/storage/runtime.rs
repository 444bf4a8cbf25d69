//! Runtime configuration
//!
//! [`RuntimeConfig`] is the explicit, cloneable value every read and write
//! is built from: the installed extensions plus the serialization settings.
//! [`ConfigStack`] gives callers scoped overrides without any global state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::FormatVersion;
use crate::plugin::{ExtensionError, ExtensionLoader, ExtensionManager, ExtensionProxy, Registration};
use crate::serialization::SerializationContext;

use super::config::Config;

/// Installed extensions and serialization settings
#[derive(Clone)]
pub struct RuntimeConfig {
    extensions: Vec<Rc<ExtensionProxy>>,

    /// Version used when writing, and when reading a document without one
    pub default_version: FormatVersion,

    /// Leave nodes with unknown tags unconverted on read
    pub ignore_unrecognized_tags: bool,

    /// Fail reads whose recorded extensions are not available
    pub strict_extension_check: bool,
}

impl RuntimeConfig {
    /// Creates a configuration over `extensions` with default settings
    pub fn new(extensions: Vec<Rc<ExtensionProxy>>) -> Self {
        Self {
            extensions,
            default_version: FormatVersion::default(),
            ignore_unrecognized_tags: false,
            strict_extension_check: false,
        }
    }

    /// Builds the runtime configuration from loaded configuration files
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut loader = ExtensionLoader::with_builtin();
        for uri in &config.project.extensions.disabled {
            loader.disable(uri.clone());
        }
        Self::from_loader(&loader, config)
    }

    /// Like [`RuntimeConfig::from_config`], with extensions from `loader`
    pub fn from_loader(loader: &ExtensionLoader, config: &Config) -> Result<Self> {
        let serialization = &config.project.serialization;
        let default_version = serialization
            .format_version()
            .context("Invalid serialization.default_format_version")?;

        let loaded = loader.load();
        debug!(
            extensions = loaded.extensions.len(),
            failures = loaded.failures.len(),
            "Loaded extensions"
        );

        Ok(Self {
            extensions: loaded.extensions,
            default_version,
            ignore_unrecognized_tags: serialization.ignore_unrecognized_tags,
            strict_extension_check: serialization.strict_extension_check,
        })
    }

    /// Installed extensions in priority order
    pub fn extensions(&self) -> &[Rc<ExtensionProxy>] {
        &self.extensions
    }

    /// Finds an installed extension by URI
    pub fn get_extension(&self, extension_uri: &str) -> Option<&Rc<ExtensionProxy>> {
        self.extensions
            .iter()
            .find(|e| e.extension_uri() == Some(extension_uri))
    }

    /// Installs an extension with the highest priority
    ///
    /// Installing an extension that is already present is a no-op.
    pub fn add_extension(
        &mut self,
        extension: impl Into<Registration>,
    ) -> Result<Rc<ExtensionProxy>, ExtensionError> {
        let proxy = ExtensionProxy::maybe_wrap(extension)?;
        if let Some(existing) = self.extensions.iter().find(|e| e.same_delegate(&proxy)) {
            return Ok(Rc::clone(existing));
        }
        self.extensions.insert(0, Rc::clone(&proxy));
        Ok(proxy)
    }

    /// Uninstalls every extension with this URI; returns true if any was removed
    pub fn remove_extension(&mut self, extension_uri: &str) -> bool {
        let before = self.extensions.len();
        self.extensions
            .retain(|e| e.extension_uri() != Some(extension_uri));
        self.extensions.len() != before
    }

    /// Extensions enabled for `version` unless explicitly excluded
    pub fn default_extensions(&self, version: &FormatVersion) -> Vec<Rc<ExtensionProxy>> {
        self.extensions
            .iter()
            .filter(|e| (e.default_enabled() || e.always_enabled()) && e.supports(version))
            .cloned()
            .collect()
    }

    /// Extensions that can never be turned off for `version`
    pub fn always_extensions(&self, version: &FormatVersion) -> Vec<Rc<ExtensionProxy>> {
        self.extensions
            .iter()
            .filter(|e| e.always_enabled() && e.supports(version))
            .cloned()
            .collect()
    }

    /// Builds a manager over the default extensions for `version`
    pub fn manager_for(&self, version: &FormatVersion) -> ExtensionManager {
        ExtensionManager::new(self.default_extensions(version))
    }

    /// Builds a fresh serialization context for `version`
    pub fn context_for(&self, version: &FormatVersion) -> SerializationContext {
        SerializationContext::new(version.clone(), Rc::new(self.manager_for(version)))
            .with_ignore_unrecognized_tags(self.ignore_unrecognized_tags)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(ExtensionLoader::with_builtin().load().extensions)
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.label()).collect::<Vec<_>>(),
            )
            .field("default_version", &self.default_version.to_string())
            .field("ignore_unrecognized_tags", &self.ignore_unrecognized_tags)
            .field("strict_extension_check", &self.strict_extension_check)
            .finish()
    }
}

/// A stack of runtime configurations with scoped overrides
///
/// The bottom entry is the base configuration and is never popped.
pub struct ConfigStack {
    stack: RefCell<Vec<RuntimeConfig>>,
}

impl ConfigStack {
    pub fn new(base: RuntimeConfig) -> Self {
        Self {
            stack: RefCell::new(vec![base]),
        }
    }

    /// The innermost configuration
    pub fn current(&self) -> RuntimeConfig {
        let stack = self.stack.borrow();
        stack[stack.len() - 1].clone()
    }

    /// Number of active configurations, the base included
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Pushes a modified copy of the current configuration
    ///
    /// The copy stays current until the returned guard is dropped.
    pub fn scoped<F>(&self, modify: F) -> ConfigGuard<'_>
    where
        F: FnOnce(&mut RuntimeConfig),
    {
        let mut config = self.current();
        modify(&mut config);

        let mut stack = self.stack.borrow_mut();
        let restore_to = stack.len();
        stack.push(config);

        ConfigGuard {
            stack: self,
            restore_to,
        }
    }
}

impl Default for ConfigStack {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Restores the previous configuration when dropped
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct ConfigGuard<'a> {
    stack: &'a ConfigStack,
    restore_to: usize,
}

impl ConfigGuard<'_> {
    /// The configuration this guard installed, or a nested one
    pub fn current(&self) -> RuntimeConfig {
        self.stack.current()
    }
}

impl Drop for ConfigGuard<'_> {
    fn drop(&mut self) {
        self.stack.stack.borrow_mut().truncate(self.restore_to);
    }
}
