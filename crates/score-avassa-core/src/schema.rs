//! Admission checks for raw Score documents: upgrade, validate, decode.

use crate::error::{AvassaError, Result};
use crate::workload::{Workload, API_VERSION};
use serde_yaml::{Mapping, Value};

fn invalid(path: impl Into<String>, reason: impl Into<String>) -> AvassaError {
    AvassaError::InvalidDocument {
        path: path.into(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Upgrade transforms
// ---------------------------------------------------------------------------

/// Rewrite backwards-compatible legacy shapes into the current schema.
///
/// Container `files` and `volumes` used to be lists of objects carrying a
/// `target`; they are now maps keyed by that target. Returns one message per
/// rewritten section.
pub fn apply_upgrade_transforms(doc: &mut Value) -> Result<Vec<String>> {
    let mut changes = Vec::new();
    let Some(containers) = doc.get_mut("containers").and_then(Value::as_mapping_mut) else {
        return Ok(changes);
    };
    for (name, container) in containers.iter_mut() {
        let name = name.as_str().unwrap_or_default().to_string();
        let Some(container) = container.as_mapping_mut() else {
            continue;
        };
        for section in ["files", "volumes"] {
            let Some(Value::Sequence(items)) = container.get(section) else {
                continue;
            };
            let path = format!("containers.{name}.{section}");
            let mut converted = Mapping::new();
            for (i, item) in items.iter().enumerate() {
                let Some(item) = item.as_mapping() else {
                    return Err(invalid(format!("{path}.{i}"), "must be a mapping"));
                };
                let mut item = item.clone();
                let target = match item.remove("target") {
                    Some(Value::String(t)) => t,
                    _ => return Err(invalid(format!("{path}.{i}.target"), "is required")),
                };
                if converted.contains_key(target.as_str()) {
                    return Err(invalid(
                        format!("{path}.{i}.target"),
                        format!("duplicate target '{target}'"),
                    ));
                }
                converted.insert(Value::String(target), Value::Mapping(item));
            }
            container.insert(Value::from(section), Value::Mapping(converted));
            changes.push(format!("{path}: converted list to map keyed by target"));
        }
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural validation of a raw document, reporting the first offending path.
pub fn validate(doc: &Value) -> Result<()> {
    let root = doc
        .as_mapping()
        .ok_or_else(|| invalid("(root)", "document must be a mapping"))?;

    let missing: Vec<&str> = ["apiVersion", "metadata", "containers"]
        .into_iter()
        .filter(|k| !root.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        let list = missing
            .iter()
            .map(|k| format!("'{k}'"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(invalid("(root)", format!("missing properties: {list}")));
    }

    match root.get("apiVersion") {
        Some(Value::String(v)) if v == API_VERSION => {}
        _ => {
            return Err(invalid(
                "apiVersion",
                format!("must be '{API_VERSION}'"),
            ))
        }
    }

    let metadata = root
        .get("metadata")
        .and_then(Value::as_mapping)
        .ok_or_else(|| invalid("metadata", "must be a mapping"))?;
    match metadata.get("name") {
        Some(Value::String(n)) if !n.trim().is_empty() => {}
        _ => return Err(invalid("metadata.name", "must be a non-empty string")),
    }

    let containers = root
        .get("containers")
        .and_then(Value::as_mapping)
        .ok_or_else(|| invalid("containers", "must be a mapping"))?;
    if containers.is_empty() {
        return Err(invalid("containers", "must declare at least one container"));
    }
    for (name, container) in containers {
        let name = name
            .as_str()
            .ok_or_else(|| invalid("containers", "container names must be strings"))?;
        validate_container(name, container)?;
    }

    if let Some(resources) = root.get("resources") {
        let resources = resources
            .as_mapping()
            .ok_or_else(|| invalid("resources", "must be a mapping"))?;
        for (name, res) in resources {
            let name = name
                .as_str()
                .ok_or_else(|| invalid("resources", "resource names must be strings"))?;
            validate_resource(name, res)?;
        }
    }
    Ok(())
}

fn validate_container(name: &str, container: &Value) -> Result<()> {
    let path = format!("containers.{name}");
    let container = container
        .as_mapping()
        .ok_or_else(|| invalid(&path, "must be a mapping"))?;
    match container.get("image") {
        Some(Value::String(i)) if !i.is_empty() => {}
        _ => return Err(invalid(format!("{path}.image"), "must be a non-empty string")),
    }
    for list in ["command", "args"] {
        if let Some(v) = container.get(list) {
            let ok = v
                .as_sequence()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !ok {
                return Err(invalid(format!("{path}.{list}"), "must be a list of strings"));
            }
        }
    }
    if let Some(vars) = container.get("variables") {
        let vars = vars
            .as_mapping()
            .ok_or_else(|| invalid(format!("{path}.variables"), "must be a mapping"))?;
        for (k, v) in vars {
            if !v.is_string() {
                let key = k.as_str().unwrap_or("?");
                return Err(invalid(format!("{path}.variables.{key}"), "must be a string"));
            }
        }
    }
    if let Some(files) = container.get("files") {
        let files = files
            .as_mapping()
            .ok_or_else(|| invalid(format!("{path}.files"), "must be a mapping"))?;
        for (target, file) in files {
            let target = target.as_str().unwrap_or("?");
            let fpath = format!("{path}.files.{target}");
            let file = file
                .as_mapping()
                .ok_or_else(|| invalid(&fpath, "must be a mapping"))?;
            if !file.contains_key("content") && !file.contains_key("source") {
                return Err(invalid(fpath, "missing 'content' or 'source'"));
            }
        }
    }
    Ok(())
}

fn validate_resource(name: &str, res: &Value) -> Result<()> {
    let path = format!("resources.{name}");
    let res = res
        .as_mapping()
        .ok_or_else(|| invalid(&path, "must be a mapping"))?;
    match res.get("type") {
        Some(Value::String(t)) if !t.is_empty() => {}
        _ => return Err(invalid(format!("{path}.type"), "must be a non-empty string")),
    }
    for key in ["class", "id"] {
        if let Some(v) = res.get(key) {
            if !v.is_string() {
                return Err(invalid(format!("{path}.{key}"), "must be a string"));
            }
        }
    }
    if let Some(params) = res.get("params") {
        if !params.is_mapping() && !params.is_null() {
            return Err(invalid(format!("{path}.params"), "must be a mapping"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Convert a validated raw document into a typed [`Workload`].
pub fn decode(doc: Value) -> Result<Workload> {
    serde_yaml::from_value(doc).map_err(|e| invalid("(root)", e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
