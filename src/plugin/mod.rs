//! # Extension System
//!
//! Extensibility layer mapping application types to tags.
//!
//! ## Overview
//!
//! An extension bundles converters; a converter translates between one or
//! more application types and one or more tag URIs. Extensions are wrapped
//! once in an [`ExtensionProxy`] and indexed by an [`ExtensionManager`].
//!
//! ## Extension Generations
//!
//! | Generation | Identified by | Provides |
//! |------------|---------------|----------|
//! | Current | extension URI | converters, tags, format requirement |
//! | Legacy | class name | type list, tag and URL prefix mappings |
//!
//! ## Priority
//!
//! Extensions earlier in the manager's list win any tag or type they share
//! with later ones. Conflicts are logged and kept in
//! [`ExtensionManager::conflicts`].
//!
//! ## Built-in Extensions
//!
//! - [`CoreExtension`] - complex numbers and document provenance records
//! - [`CoreSchemas`] - legacy schema location rules for core tags
//!
//! ## Key Types
//!
//! - [`Converter`] / [`ConverterProxy`] - Conversion logic and its wrapper
//! - [`Extension`] / [`LegacyExtension`] / [`ExtensionProxy`] - Extension shapes
//! - [`ExtensionManager`] - Tag and type indices
//! - [`ExtensionLoader`] - Installed packages and their extensions

mod builtin;
mod converter;
mod extension;
mod loader;
mod manager;

pub use builtin::{Complex, CoreExtension, CoreSchemas, CORE_EXTENSION_URI};
pub use converter::{Conversion, Converter, ConverterProxy, Finisher, TypeKey};
pub use extension::{
    Extension, ExtensionError, ExtensionProxy, ExtensionSource, LegacyExtension, PackageInfo,
    PrefixMapping, Registration,
};
pub use loader::{ExtensionLoader, ExtensionPackage, LoadFailure, LoadedExtensions, BUILTIN_PACKAGE};
pub use manager::{
    Conflict, ConflictKind, ConverterRef, ExtensionManager, LookupError, MissingExtension,
};
