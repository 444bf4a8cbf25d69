//! Extension and tag listing commands

use anyhow::{Context, Result};

use super::output::Output;
use crate::domain::FormatVersion;
use crate::plugin::ExtensionProxy;
use crate::storage::RuntimeConfig;

/// Parses `--format-version`, falling back to the configured default
fn resolve_version(runtime: &RuntimeConfig, requested: Option<&str>) -> Result<FormatVersion> {
    match requested {
        Some(text) => FormatVersion::parse_supported(text)
            .with_context(|| format!("Invalid --format-version '{}'", text)),
        None => Ok(runtime.default_version.clone()),
    }
}

pub fn list_extensions(
    output: &Output,
    runtime: &RuntimeConfig,
    requested: Option<&str>,
) -> Result<()> {
    let version = resolve_version(runtime, requested)?;
    let enabled = runtime.default_extensions(&version);
    let is_enabled = |ext: &ExtensionProxy| enabled.iter().any(|e| e.same_delegate(ext));

    let manager = runtime.manager_for(&version);
    for conflict in manager.conflicts() {
        output.warning(&conflict.to_string());
    }

    if output.is_json() {
        let items: Vec<_> = runtime
            .extensions()
            .iter()
            .map(|ext| {
                serde_json::json!({
                    "extension_uri": ext.extension_uri(),
                    "extension_class": ext.class_name(),
                    "package": ext.package().map(|p| p.to_string()),
                    "requirement": ext.requirement().to_string(),
                    "legacy": ext.legacy(),
                    "enabled": is_enabled(ext),
                })
            })
            .collect();
        output.data(&serde_json::json!({
            "format_version": version.to_string(),
            "extensions": items,
        }));
        return Ok(());
    }

    if runtime.extensions().is_empty() {
        println!("No extensions installed.");
        return Ok(());
    }

    println!("Extensions for format version {}:", version);
    println!(
        "{:<60} {:<20} {:<12} {:<7} ENABLED",
        "EXTENSION", "PACKAGE", "REQUIRES", "LEGACY"
    );
    println!("{}", "-".repeat(108));
    for ext in runtime.extensions() {
        let package = ext
            .package()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        println!(
            "{:<60} {:<20} {:<12} {:<7} {}",
            ext.label(),
            package,
            ext.requirement().to_string(),
            if ext.legacy() { "yes" } else { "no" },
            if is_enabled(ext) { "yes" } else { "no" },
        );
    }

    Ok(())
}

pub fn list_tags(output: &Output, runtime: &RuntimeConfig, requested: Option<&str>) -> Result<()> {
    let version = resolve_version(runtime, requested)?;
    let manager = runtime.manager_for(&version);

    let rows: Vec<_> = manager
        .tags()
        .map(|tag| {
            let uri = tag.tag_uri();
            let extension = manager
                .get_converter_for_tag(uri)
                .ok()
                .map(|c| c.extension().label().to_string());
            (tag, extension, manager.resolve_schema_uri(uri))
        })
        .collect();

    if output.is_json() {
        let items: Vec<_> = rows
            .iter()
            .map(|(tag, extension, schema)| {
                serde_json::json!({
                    "tag_uri": tag.tag_uri(),
                    "title": tag.title(),
                    "schema_uri": schema,
                    "extension": extension,
                })
            })
            .collect();
        output.data(&serde_json::json!({
            "format_version": version.to_string(),
            "tags": items,
        }));
        return Ok(());
    }

    if rows.is_empty() {
        println!("No tags enabled for format version {}.", version);
        return Ok(());
    }

    println!("Tags for format version {}:", version);
    println!("{:<50} SCHEMA", "TAG");
    println!("{}", "-".repeat(100));
    for (tag, _, schema) in &rows {
        println!(
            "{:<50} {}",
            tag.tag_uri(),
            schema.as_deref().unwrap_or("-")
        );
        if let Some(title) = tag.title() {
            println!("    {}", title);
        }
    }

    Ok(())
}
