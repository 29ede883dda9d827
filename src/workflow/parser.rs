//! Template Parser
//!
//! Loads workflow templates and run overrides from YAML (or JSON, which
//! `serde_yaml` reads as well) and parses `KEY=VALUE` overrides from the
//! command line.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;

use super::model::{ConfigMap, WorkflowTemplate};
use super::validator::validate_template;
use crate::error::ParseError;

/// Loads and validates a template from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use quantflow::workflow::load_template;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("templates/momentum.yaml")?;
///     println!("Loaded {} steps", template.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_template(path: impl AsRef<Path>) -> Result<WorkflowTemplate, ParseError> {
    let path = path.as_ref();
    info!("Loading template from: {}", path.display());

    let content = read(path)?;
    debug!("Template content loaded ({} bytes)", content.len());

    let template = parse_template(&content, path)?;
    validate_template(&template)?;

    info!(
        "Parsed template '{}' with {} steps",
        template.name,
        template.steps.len()
    );
    Ok(template)
}

/// Parses template text without touching the filesystem.
///
/// `origin` is only used in error messages.
pub fn parse_template(content: &str, origin: &Path) -> Result<WorkflowTemplate, ParseError> {
    serde_yaml::from_str(content).map_err(|source| ParseError::Yaml {
        path: origin.to_path_buf(),
        source,
    })
}

/// Loads every `*.yaml`, `*.yml` and `*.json` template in a directory.
///
/// Files that fail to load are skipped with a warning so one broken file
/// does not hide the rest. Results are sorted by file name.
pub fn load_templates_dir(dir: impl AsRef<Path>) -> Result<Vec<WorkflowTemplate>, ParseError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                )
        })
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        match load_template(&path) {
            Ok(template) => templates.push(template),
            Err(e) => warn!("Skipping template {}: {}", path.display(), e),
        }
    }

    info!("Loaded {} templates from {}", templates.len(), dir.display());
    Ok(templates)
}

/// Saves a template to a YAML file.
pub fn save_template(template: &WorkflowTemplate, path: impl AsRef<Path>) -> Result<(), ParseError> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(template).map_err(|source| ParseError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, yaml).map_err(|source| ParseError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Template saved to: {}", path.display());
    Ok(())
}

/// Loads a run override map from a YAML or JSON file.
pub fn load_overrides(path: impl AsRef<Path>) -> Result<ConfigMap, ParseError> {
    let path = path.as_ref();
    let content = read(path)?;

    let value: Value = serde_yaml::from_str(&content).map_err(|source| ParseError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        _ => Err(ParseError::NotAMapping(path.to_path_buf())),
    }
}

/// Parses a single `KEY=VALUE` override.
///
/// The value is read as JSON when possible (`top_n=5`, `symbols=["A","B"]`)
/// and kept as a plain string otherwise (`universe=csi300`).
pub fn parse_override(text: &str) -> Result<(String, Value), ParseError> {
    let (key, raw) = text
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidOverride(text.to_string()))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::InvalidOverride(text.to_string()));
    }

    let value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn read(path: &Path) -> Result<String, ParseError> {
    fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}
