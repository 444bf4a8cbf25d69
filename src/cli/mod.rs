//! # Command-Line Interface
//!
//! User-facing commands over the extension registry and YAML documents.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `extensions` | Installed extensions and whether they are enabled for a format version |
//! | `tags` | Enabled tag definitions and their schema locations |
//! | `inspect FILE` | Header version, recorded extensions and tags of a document |
//! | `convert FILE [-o OUT]` | Full read and write round trip of a document |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Without the flag, `default_format` from the global configuration applies.
//!
//! ## Logging
//!
//! Diagnostics go to stderr. `--verbose` (or `-v`) enables debug logging;
//! otherwise the `TAGTREE_LOG` filter applies, defaulting to `warn`.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod document_cmd;
mod extensions_cmd;
mod output;

pub use app::{run, Cli, Commands, LOG_ENV};
pub use output::{Output, OutputFormat};
