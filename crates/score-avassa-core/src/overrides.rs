//! Overrides applied to raw workload documents before validation.
//!
//! Two operations: deep-merging a whole override document, and setting or
//! removing a single dot-separated path. Both work on the untyped
//! `serde_yaml::Value` tree so that an override may introduce or drop fields
//! the schema would otherwise reject.

use crate::error::{AvassaError, Result};
use serde_yaml::{Mapping, Value};

// ---------------------------------------------------------------------------
// Document merge
// ---------------------------------------------------------------------------

/// Deep-merge `overrides` into `doc`.
///
/// Mappings merge key by key. Any other value in `overrides` replaces the
/// value in `doc` wholesale, so sequences are never concatenated. Null values
/// in `overrides` leave the existing value alone.
pub fn merge_document(doc: &mut Value, overrides: Value) -> Result<()> {
    match overrides {
        Value::Null => Ok(()),
        Value::Mapping(src) => {
            let Value::Mapping(dst) = doc else {
                return Err(AvassaError::OverrideMerge {
                    path: "(root)".to_string(),
                    reason: "workload document is not a mapping".to_string(),
                });
            };
            merge_mapping(dst, src);
            Ok(())
        }
        _ => Err(AvassaError::OverrideMerge {
            path: "(root)".to_string(),
            reason: "overrides document must be a mapping".to_string(),
        }),
    }
}

fn merge_mapping(dst: &mut Mapping, src: Mapping) {
    for (key, value) in src {
        if value.is_null() {
            continue;
        }
        let value = match (dst.get_mut(&key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                merge_mapping(existing, incoming);
                continue;
            }
            (_, value) => value,
        };
        dst.insert(key, value);
    }
}

// ---------------------------------------------------------------------------
// Dot paths
// ---------------------------------------------------------------------------

/// Split a dot-separated path. `\.` escapes a literal dot inside a segment.
pub fn parse_dot_path(path: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    if parts.iter().any(String::is_empty) {
        return Err(AvassaError::InvalidOverridePath {
            path: path.to_string(),
            reason: "path segments must not be empty".to_string(),
        });
    }
    Ok(parts)
}

/// Apply a `path=value` override. An empty value removes the path; anything
/// else is parsed as YAML and set at the path.
pub fn apply_property(doc: &mut Value, entry: &str) -> Result<()> {
    let Some((path, raw)) = entry.split_once('=') else {
        return Err(AvassaError::InvalidOverridePath {
            path: entry.to_string(),
            reason: "expected a =-separated path and value".to_string(),
        });
    };
    if raw.is_empty() {
        remove_path(doc, path)
    } else {
        let value: Value =
            serde_yaml::from_str(raw).map_err(|e| AvassaError::InvalidOverrideValue {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        set_path(doc, path, value)
    }
}

/// Set `value` at `path`, creating intermediate mappings as needed.
/// A sequence index of `-1` as the last segment appends.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let parts = parse_dot_path(path)?;
    set_at(doc, &parts, value, path)
}

/// Remove `path`. Missing leaf is an error; a missing parent is a no-op.
pub fn remove_path(doc: &mut Value, path: &str) -> Result<()> {
    let parts = parse_dot_path(path)?;
    remove_at(doc, &parts, path)
}

fn not_a_container(full: &str, segment: &str) -> AvassaError {
    AvassaError::InvalidOverridePath {
        path: full.to_string(),
        reason: format!("cannot address '{segment}' inside a non-container value"),
    }
}

fn parse_index(full: &str, segment: &str) -> Result<i64> {
    segment
        .parse::<i64>()
        .map_err(|_| AvassaError::InvalidOverridePath {
            path: full.to_string(),
            reason: format!("'{segment}' is not a valid sequence index"),
        })
}

fn out_of_range(full: &str, index: i64, len: usize) -> AvassaError {
    AvassaError::InvalidOverridePath {
        path: full.to_string(),
        reason: format!("index {index} out of range for sequence of length {len}"),
    }
}

fn set_at(node: &mut Value, parts: &[String], value: Value, full: &str) -> Result<()> {
    let Some((head, rest)) = parts.split_first() else {
        *node = value;
        return Ok(());
    };
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(m) => {
            let key = Value::String(head.clone());
            if rest.is_empty() {
                m.insert(key, value);
                return Ok(());
            }
            if !m.contains_key(&key) {
                m.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            match m.get_mut(&key) {
                Some(child) => set_at(child, rest, value, full),
                None => Err(not_a_container(full, head)),
            }
        }
        Value::Sequence(seq) => {
            let index = parse_index(full, head)?;
            if index == -1 && rest.is_empty() {
                seq.push(value);
                return Ok(());
            }
            let len = seq.len();
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| seq.get_mut(i))
                .ok_or_else(|| out_of_range(full, index, len))?;
            set_at(slot, rest, value, full)
        }
        _ => Err(not_a_container(full, head)),
    }
}

fn remove_at(node: &mut Value, parts: &[String], full: &str) -> Result<()> {
    let Some((head, rest)) = parts.split_first() else {
        return Ok(());
    };
    match node {
        Value::Null => Ok(()),
        Value::Mapping(m) => {
            if rest.is_empty() {
                return match m.remove(head.as_str()) {
                    Some(_) => Ok(()),
                    None => Err(AvassaError::OverridePathNotFound(full.to_string())),
                };
            }
            match m.get_mut(head.as_str()) {
                Some(child) => remove_at(child, rest, full),
                None => Ok(()),
            }
        }
        Value::Sequence(seq) => {
            let index = parse_index(full, head)?;
            let slot = usize::try_from(index).ok().filter(|i| *i < seq.len());
            match (slot, rest.is_empty()) {
                (Some(i), true) => {
                    seq.remove(i);
                    Ok(())
                }
                (Some(i), false) => remove_at(&mut seq[i], rest, full),
                (None, true) => Err(AvassaError::OverridePathNotFound(full.to_string())),
                (None, false) => Ok(()),
            }
        }
        _ => Err(not_a_container(full, head)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    const BASE: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: example
containers:
  main:
    image: nginx
    args: ["a", "b"]
    variables:
      A: "1"
      B: "2"
"#;

    #[test]
    fn parse_dot_path_escapes() {
        assert_eq!(
            parse_dot_path(r"metadata.annotations.avassa\.replicas").unwrap(),
            vec!["metadata", "annotations", "avassa.replicas"]
        );
        assert!(parse_dot_path("a..b").is_err());
        assert!(parse_dot_path("").is_err());
    }

    #[test]
    fn merge_overrides_scalars_and_replaces_sequences() {
        let mut d = doc(BASE);
        let o = doc(
            r#"
containers:
  main:
    image: httpd
    args: ["c"]
    variables:
      C: "3"
"#,
        );
        merge_document(&mut d, o).unwrap();
        let main = &d["containers"]["main"];
        assert_eq!(main["image"], Value::from("httpd"));
        assert_eq!(main["args"], doc("[c]"));
        assert_eq!(main["variables"]["A"], Value::from("1"));
        assert_eq!(main["variables"]["C"], Value::from("3"));
    }

    #[test]
    fn merge_rejects_non_mapping_overrides() {
        let mut d = doc(BASE);
        assert!(merge_document(&mut d, doc("[1, 2]")).is_err());
    }

    #[test]
    fn merge_empty_overrides_is_noop() {
        let mut d = doc(BASE);
        merge_document(&mut d, Value::Null).unwrap();
        assert_eq!(d, doc(BASE));
    }

    #[test]
    fn set_creates_intermediate_mappings() {
        let mut d = doc(BASE);
        apply_property(&mut d, "metadata.annotations.avassa\\.replicas=3").unwrap();
        assert_eq!(
            d["metadata"]["annotations"]["avassa.replicas"],
            Value::from(3)
        );
    }

    #[test]
    fn set_parses_structured_values() {
        let mut d = doc(BASE);
        apply_property(&mut d, "containers.main.command=[\"/bin/sh\", \"-c\"]").unwrap();
        assert_eq!(d["containers"]["main"]["command"], doc("[/bin/sh, -c]"));
    }

    #[test]
    fn set_sequence_index_and_append() {
        let mut d = doc(BASE);
        apply_property(&mut d, "containers.main.args.0=z").unwrap();
        apply_property(&mut d, "containers.main.args.-1=y").unwrap();
        assert_eq!(d["containers"]["main"]["args"], doc("[z, b, y]"));
        assert!(apply_property(&mut d, "containers.main.args.9=x").is_err());
    }

    #[test]
    fn set_into_scalar_fails() {
        let mut d = doc(BASE);
        let err = apply_property(&mut d, "containers.main.image.tag=x").unwrap_err();
        assert!(matches!(err, AvassaError::InvalidOverridePath { .. }));
    }

    #[test]
    fn remove_existing_path_keeps_siblings() {
        let mut d = doc(BASE);
        apply_property(&mut d, "containers.main.variables.A=").unwrap();
        let vars = d["containers"]["main"]["variables"].as_mapping().unwrap();
        assert!(!vars.contains_key("A"));
        assert_eq!(vars.get("B"), Some(&Value::from("2")));
        assert_eq!(d["containers"]["main"]["image"], Value::from("nginx"));
    }

    #[test]
    fn remove_missing_leaf_fails() {
        let mut d = doc(BASE);
        let err = apply_property(&mut d, "containers.main.variables.NOPE=").unwrap_err();
        assert!(matches!(err, AvassaError::OverridePathNotFound(p) if p == "containers.main.variables.NOPE"));
    }

    #[test]
    fn remove_with_absent_parent_is_noop() {
        let mut d = doc(BASE);
        apply_property(&mut d, "metadata.annotations.missing=").unwrap();
        assert_eq!(d, doc(BASE));
    }

    #[test]
    fn remove_sequence_element() {
        let mut d = doc(BASE);
        apply_property(&mut d, "containers.main.args.0=").unwrap();
        assert_eq!(d["containers"]["main"]["args"], doc("[b]"));
    }

    #[test]
    fn property_without_equals_fails() {
        let mut d = doc(BASE);
        assert!(matches!(
            apply_property(&mut d, "containers.main.image"),
            Err(AvassaError::InvalidOverridePath { .. })
        ));
    }

    #[test]
    fn unparsable_value_fails() {
        let mut d = doc(BASE);
        assert!(matches!(
            apply_property(&mut d, "metadata.x=[unterminated"),
            Err(AvassaError::InvalidOverrideValue { .. })
        ));
    }
}
