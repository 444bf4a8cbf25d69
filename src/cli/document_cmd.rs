//! Document commands

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::Value;

use super::output::Output;
use crate::domain::ExtensionMetadata;
use crate::storage::{value_to_node, ConfigStack, Document, RuntimeConfig};

pub fn inspect(output: &Output, runtime: &RuntimeConfig, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;

    // Inspection reports unknown tags and missing extensions instead of failing on them.
    let stack = ConfigStack::new(runtime.clone());
    let _lenient = stack.scoped(|cfg| {
        cfg.ignore_unrecognized_tags = true;
        cfg.strict_extension_check = false;
    });
    let config = stack.current();

    let doc = Document::from_yaml_str(&text, &config)
        .with_context(|| format!("Failed to load document: {}", file.display()))?;

    let raw: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse document: {}", file.display()))?;
    let tags = match raw.get("tree") {
        Some(tree) => value_to_node(tree)?.collect_tags(),
        None => Vec::new(),
    };

    let manager = config.manager_for(&doc.version);
    let installed = |record: &ExtensionMetadata| !doc.missing.iter().any(|m| &m.record == record);

    if output.is_json() {
        let extensions: Vec<_> = doc
            .history
            .iter()
            .map(|record| {
                serde_json::json!({
                    "extension_uri": record.extension_uri,
                    "extension_class": record.extension_class,
                    "software": record.software.as_ref().map(|s| s.to_string()),
                    "installed": installed(record),
                })
            })
            .collect();
        let tags: Vec<_> = tags
            .iter()
            .map(|tag| {
                serde_json::json!({
                    "tag": tag,
                    "handled": manager.handles_tag(tag),
                })
            })
            .collect();
        output.data(&serde_json::json!({
            "file": file.display().to_string(),
            "format_version": doc.version.to_string(),
            "extensions": extensions,
            "tags": tags,
        }));
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Format version: {}", doc.version);
    println!();

    if doc.history.is_empty() {
        println!("No extensions recorded.");
    } else {
        println!("Recorded extensions:");
        for record in &doc.history {
            let package = record
                .software
                .as_ref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default();
            let status = if installed(record) { "installed" } else { "MISSING" };
            println!("  [{}] {}{}", status, record.label(), package);
        }
    }
    println!();

    if tags.is_empty() {
        println!("No tags used.");
    } else {
        println!("Tags used:");
        for tag in &tags {
            let status = if manager.handles_tag(tag) { "handled" } else { "UNKNOWN" };
            println!("  [{}] {}", status, tag);
        }
    }

    Ok(())
}

pub fn convert(
    output: &Output,
    runtime: &RuntimeConfig,
    file: &Path,
    target: Option<&Path>,
) -> Result<()> {
    let doc = Document::load(file, runtime)?;

    match target {
        Some(target) => {
            doc.save(target, runtime)?;
            output.success(&format!(
                "Converted {} to {}",
                file.display(),
                target.display()
            ));
        }
        None => {
            let text = doc
                .to_yaml_string(runtime)
                .with_context(|| format!("Failed to serialize document: {}", file.display()))?;
            print!("{}", text);
        }
    }

    Ok(())
}
