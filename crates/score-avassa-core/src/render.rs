//! Output serialization: deterministic multi-document YAML.
//!
//! Mapping keys are sorted at every depth, except that entries of a
//! `containers` list put `name` first so each container reads top-down.

use crate::error::Result;
use serde_yaml::{Mapping, Value};

const DOCUMENT_SEPARATOR: &str = "---\n";

/// Rebuild `value` with keys in canonical order.
pub fn canonicalize(value: &Value) -> Value {
    canonicalize_at(value, false)
}

fn canonicalize_at(value: &Value, name_first: bool) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut entries: Vec<(&Value, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| sort_key(a, name_first).cmp(&sort_key(b, name_first)));
            let mut out = Mapping::with_capacity(entries.len());
            for (key, child) in entries {
                let in_containers = key.as_str() == Some("containers");
                out.insert(key.clone(), canonicalize_list(child, in_containers));
            }
            Value::Mapping(out)
        }
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| canonicalize_at(item, name_first))
                .collect(),
        ),
        Value::Tagged(tagged) => canonicalize_at(&tagged.value, name_first),
        other => other.clone(),
    }
}

fn canonicalize_list(value: &Value, containers: bool) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| canonicalize_at(item, containers))
                .collect(),
        ),
        other => canonicalize_at(other, false),
    }
}

/// `name` sorts before everything when `name_first`; other keys compare as
/// their YAML text.
fn sort_key(key: &Value, name_first: bool) -> (bool, String) {
    let text = match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    };
    (!(name_first && text == "name"), text)
}

/// Render one document, keys canonicalized.
pub fn render_document(value: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(&canonicalize(value))?)
}

/// Render a stream of documents, each introduced by `---`.
pub fn render_documents(values: &[Value]) -> Result<String> {
    let mut out = String::new();
    for value in values {
        out.push_str(DOCUMENT_SEPARATOR);
        out.push_str(&render_document(value)?);
    }
    Ok(out)
}
