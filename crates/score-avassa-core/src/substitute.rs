//! Placeholder substitution for workload strings.
//!
//! # Placeholder Formats
//!
//! - `${metadata.<path>}` - a value from the workload's own metadata
//! - `${resources.<name>.<key>}` - an output of a resource the workload
//!   declares under `<name>`
//!
//! Path segments are separated by `.`; `\.` escapes a literal dot.
//!
//! # Escaping
//!
//! `$$` produces a literal `$`. A `$` not followed by `{` or `$` is kept as
//! is, so shell variables like `$HOME` pass through untouched.
//!
//! Substitution is single-pass: a resolved value is never scanned again.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `${metadata.a.b}`
    Metadata(Vec<String>),

    /// `${resources.<name>.<key>...}`
    Resource { name: String, path: Vec<String> },
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    #[error("unclosed placeholder at position {0}")]
    Unclosed(usize),

    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("invalid reference '{0}': metadata key not found")]
    UnknownMetadata(String),

    #[error("invalid reference '{reference}': resource '{resource}' is not declared by this workload")]
    UnknownResource { reference: String, resource: String },

    #[error("invalid reference '{reference}': resource '{resource}' has not been provisioned")]
    Unprovisioned { reference: String, resource: String },

    #[error("invalid reference '{reference}': resource '{resource}' has no such output")]
    MissingOutput { reference: String, resource: String },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn split_reference(reference: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = reference.chars().peekable();
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
    parts
}

fn parse_reference(reference: &str) -> Result<Placeholder, SubstitutionError> {
    let invalid = |reason: &str| SubstitutionError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };
    let mut parts = split_reference(reference);
    if parts.iter().any(String::is_empty) {
        return Err(invalid("empty path segment"));
    }
    let head = parts.remove(0);
    match head.as_str() {
        "metadata" => {
            if parts.is_empty() {
                return Err(invalid("expected a metadata key"));
            }
            Ok(Placeholder::Metadata(parts))
        }
        "resources" => {
            if parts.len() < 2 {
                return Err(invalid("expected resources.<name>.<output>"));
            }
            let name = parts.remove(0);
            Ok(Placeholder::Resource { name, path: parts })
        }
        _ => Err(invalid("must start with 'metadata' or 'resources'")),
    }
}

/// Split `input` into literal text and placeholders.
pub fn parse(input: &str) -> Result<Vec<Segment>, SubstitutionError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if ch != '$' {
            literal.push(ch);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                literal.push('$');
                chars.next();
            }
            Some((_, '{')) => {
                chars.next();
                let mut reference = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    reference.push(c);
                }
                if !closed {
                    return Err(SubstitutionError::Unclosed(pos));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(parse_reference(&reference)?));
            }
            _ => literal.push('$'),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Source of resource outputs, keyed by the workload's local resource name.
pub trait OutputLookup {
    /// `None` when the workload declares no resource of that name,
    /// `Some(None)` when it does but the resource is not provisioned yet.
    fn outputs(&self, resource: &str) -> Option<Option<&Mapping>>;
}

impl OutputLookup for BTreeMap<String, Option<Mapping>> {
    fn outputs(&self, resource: &str) -> Option<Option<&Mapping>> {
        self.get(resource).map(Option::as_ref)
    }
}

fn walk<'v>(root: &'v Mapping, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut current = root.get(first.as_str())?;
    for segment in rest {
        current = match current {
            Value::Mapping(m) => m.get(segment.as_str())?,
            Value::Sequence(s) => s.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render_value(reference: &str, value: &Value) -> Result<String, SubstitutionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => serde_json::to_string(other).map_err(|e| SubstitutionError::InvalidReference {
            reference: reference.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Resolves placeholders for one workload.
pub struct Substituter<'a> {
    metadata: &'a Mapping,
    resources: &'a dyn OutputLookup,
}

impl<'a> Substituter<'a> {
    pub fn new(metadata: &'a Mapping, resources: &'a dyn OutputLookup) -> Self {
        Self {
            metadata,
            resources,
        }
    }

    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut out = String::with_capacity(input.len());
        for segment in parse(input)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Placeholder(p) => out.push_str(&self.resolve(&p)?),
            }
        }
        Ok(out)
    }

    fn resolve(&self, placeholder: &Placeholder) -> Result<String, SubstitutionError> {
        match placeholder {
            Placeholder::Metadata(path) => {
                let reference = format!("metadata.{}", path.join("."));
                let value = walk(self.metadata, path)
                    .ok_or_else(|| SubstitutionError::UnknownMetadata(reference.clone()))?;
                render_value(&reference, value)
            }
            Placeholder::Resource { name, path } => {
                let reference = format!("resources.{name}.{}", path.join("."));
                let outputs = self
                    .resources
                    .outputs(name)
                    .ok_or_else(|| SubstitutionError::UnknownResource {
                        reference: reference.clone(),
                        resource: name.clone(),
                    })?
                    .ok_or_else(|| SubstitutionError::Unprovisioned {
                        reference: reference.clone(),
                        resource: name.clone(),
                    })?;
                let value = walk(outputs, path).ok_or_else(|| SubstitutionError::MissingOutput {
                    reference: reference.clone(),
                    resource: name.clone(),
                })?;
                render_value(&reference, value)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
