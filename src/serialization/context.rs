//! Per-operation serialization state

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::domain::{ExtensionMetadata, FormatVersion};
use crate::plugin::{ExtensionManager, ExtensionProxy};

/// State for one read or write
///
/// Owned by a single operation and discarded afterwards. The set of used
/// extensions only grows.
pub struct SerializationContext {
    version: FormatVersion,
    manager: Rc<ExtensionManager>,
    used: RefCell<Vec<Rc<ExtensionProxy>>>,
    ignore_unrecognized_tags: bool,
}

impl SerializationContext {
    pub fn new(version: FormatVersion, manager: Rc<ExtensionManager>) -> Self {
        Self {
            version,
            manager,
            used: RefCell::new(Vec::new()),
            ignore_unrecognized_tags: false,
        }
    }

    /// Leaves nodes with unknown tags unconverted instead of failing
    pub fn with_ignore_unrecognized_tags(mut self, ignore: bool) -> Self {
        self.ignore_unrecognized_tags = ignore;
        self
    }

    /// Format version in effect
    pub fn version(&self) -> &FormatVersion {
        &self.version
    }

    pub fn extension_manager(&self) -> &ExtensionManager {
        &self.manager
    }

    pub fn ignore_unrecognized_tags(&self) -> bool {
        self.ignore_unrecognized_tags
    }

    /// Records that an extension was needed; repeated calls are no-ops
    pub fn mark_extension_used(&self, extension: &Rc<ExtensionProxy>) {
        let mut used = self.used.borrow_mut();
        if !used.iter().any(|e| e.same_delegate(extension)) {
            used.push(Rc::clone(extension));
        }
    }

    /// Extensions used so far, in first-use order
    pub fn extensions_used(&self) -> Vec<Rc<ExtensionProxy>> {
        self.used.borrow().clone()
    }

    /// Provenance records for the extensions used so far
    pub fn extension_metadata(&self) -> Vec<ExtensionMetadata> {
        self.used.borrow().iter().map(|e| e.metadata()).collect()
    }
}

impl fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("version", &self.version)
            .field("extensions_used", &self.used.borrow().len())
            .field("ignore_unrecognized_tags", &self.ignore_unrecognized_tags)
            .finish()
    }
}
