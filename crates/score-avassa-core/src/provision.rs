//! Provisioning gateway: fills in resource outputs via pluggable provisioners.

use crate::error::{AvassaError, Result};
use crate::paths;
use crate::resource::ResourceRecord;
use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::Path;
use tracing::{debug, info};

pub type ProvisionError = Box<dyn std::error::Error + Send + Sync>;

/// Scheme accepted for provisioners declared in `*.provisioners.yaml` files.
pub const STATIC_SCHEME: &str = "static://";

/// Written by `init` as the lowest-precedence provisioners file.
pub const DEFAULT_PROVISIONERS: &str = r#"# Provisioners resolve resources to outputs. Files named
# *.provisioners.yaml in this directory are read in lexicographic order and
# the first matching entry wins, so this file acts as the fallback.
#
# Each entry matches on `type`, and on `class` / `id` when they are set.
- uri: static://default-dns
  type: dns
  outputs:
    host: localhost
"#;

// ---------------------------------------------------------------------------
// Provisioner trait
// ---------------------------------------------------------------------------

pub trait Provisioner {
    fn uri(&self) -> &str;

    /// Whether this provisioner is responsible for the given resource.
    fn matches(&self, kind: &str, class: &str, id: &str) -> bool;

    fn provision(
        &self,
        kind: &str,
        class: &str,
        id: &str,
        params: &Mapping,
    ) -> std::result::Result<Mapping, ProvisionError>;
}

// ---------------------------------------------------------------------------
// Static provisioner
// ---------------------------------------------------------------------------

/// Returns a fixed set of outputs for every resource it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticProvisioner {
    pub uri: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub outputs: Mapping,
}

impl Provisioner for StaticProvisioner {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn matches(&self, kind: &str, class: &str, id: &str) -> bool {
        self.kind == kind
            && self.class.as_deref().map_or(true, |c| c == class)
            && self.id.as_deref().map_or(true, |i| i == id)
    }

    fn provision(
        &self,
        _kind: &str,
        _class: &str,
        _id: &str,
        _params: &Mapping,
    ) -> std::result::Result<Mapping, ProvisionError> {
        Ok(self.outputs.clone())
    }
}

/// Parse the contents of one provisioners file.
pub fn parse_provisioners(data: &str) -> Result<Vec<StaticProvisioner>> {
    let value: serde_yaml::Value = serde_yaml::from_str(data)?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    let entries: Vec<StaticProvisioner> = serde_yaml::from_value(value)?;
    for p in &entries {
        if !p.uri.starts_with(STATIC_SCHEME) {
            return Err(AvassaError::InvalidProvisioner {
                uri: p.uri.clone(),
                reason: format!("unsupported scheme, expected '{STATIC_SCHEME}'"),
            });
        }
        if p.kind.is_empty() {
            return Err(AvassaError::InvalidProvisioner {
                uri: p.uri.clone(),
                reason: "type must not be empty".to_string(),
            });
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: Vec<Box<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every provisioners file in the state directory, in filename order.
    pub fn load(root: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for file in paths::provisioner_files(root)? {
            let data = std::fs::read_to_string(&file)?;
            let entries = parse_provisioners(&data).map_err(|e| AvassaError::InvalidProvisioner {
                uri: file.display().to_string(),
                reason: e.to_string(),
            })?;
            debug!(file = %file.display(), count = entries.len(), "loaded provisioners");
            for p in entries {
                registry.register(Box::new(p));
            }
        }
        Ok(registry)
    }

    /// Later registrations have lower precedence.
    pub fn register(&mut self, provisioner: Box<dyn Provisioner>) {
        self.provisioners.push(provisioner);
    }

    pub fn len(&self) -> usize {
        self.provisioners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }

    pub fn find(&self, rec: &ResourceRecord) -> Option<&dyn Provisioner> {
        self.provisioners
            .iter()
            .find(|p| p.matches(&rec.kind, &rec.class, &rec.id))
            .map(|p| &**p)
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Provision every resource that has not been provisioned yet.
///
/// All-or-nothing: if any provisioner fails, the error is returned and none
/// of the outputs computed in this call are kept. Resources without a
/// matching provisioner stay unprovisioned.
pub fn provision_resources(state: &State, registry: &ProvisionerRegistry) -> Result<State> {
    let mut resources = state.resources.clone();
    for (uid, rec) in resources.iter_mut() {
        if rec.is_provisioned() {
            continue;
        }
        let Some(provisioner) = registry.find(rec) else {
            debug!(resource = %uid, "no provisioner matches, skipping");
            continue;
        };
        let outputs = provisioner
            .provision(&rec.kind, &rec.class, &rec.id, &rec.params)
            .map_err(|source| AvassaError::Provisioning {
                uid: uid.to_string(),
                uri: provisioner.uri().to_string(),
                source,
            })?;
        info!(resource = %uid, uri = provisioner.uri(), outputs = outputs.len(), "provisioned resource");
        rec.outputs = outputs;
        rec.provisioned_by = Some(provisioner.uri().to_string());
    }
    let mut next = state.clone();
    next.resources = resources;
    Ok(next)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
