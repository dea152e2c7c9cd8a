use crate::error::{AvassaError, Result};
use crate::workload::{ResourceRef, Workload};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

pub const DEFAULT_CLASS: &str = "default";
pub const DEFAULT_ID: &str = "default";

// ---------------------------------------------------------------------------
// ResourceUid
// ---------------------------------------------------------------------------

/// Canonical resource identity: `<type>.<class>#<id>`.
///
/// Two declarations with the same uid are the same resource, whichever
/// workload or local name they appear under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUid(String);

impl ResourceUid {
    pub fn new(kind: &str, class: Option<&str>, id: Option<&str>) -> Self {
        let class = class.unwrap_or(DEFAULT_CLASS);
        let id = id.unwrap_or(DEFAULT_ID);
        Self(format!("{kind}.{class}#{id}"))
    }

    pub fn for_ref(decl: &ResourceRef) -> Self {
        Self::new(&decl.kind, decl.class.as_deref(), decl.id.as_deref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ResourceRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub class: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub metadata: Mapping,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub params: Mapping,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub outputs: Mapping,
    /// Uri of the provisioner that produced `outputs`. Set even when the
    /// outputs are empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_by: Option<String>,
    #[serde(default)]
    pub used_by: BTreeSet<String>,
}

impl ResourceRecord {
    fn from_ref(decl: &ResourceRef) -> Self {
        Self {
            kind: decl.kind.clone(),
            class: decl.class.clone().unwrap_or_else(|| DEFAULT_CLASS.to_string()),
            id: decl.id.clone().unwrap_or_else(|| DEFAULT_ID.to_string()),
            metadata: decl.metadata.clone().unwrap_or_default(),
            params: decl.params.clone().unwrap_or_default(),
            outputs: Mapping::new(),
            provisioned_by: None,
            used_by: BTreeSet::new(),
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned_by.is_some()
    }

    /// Drop outputs so the next provisioning pass runs again.
    pub fn reset_outputs(&mut self) {
        self.outputs.clear();
        self.provisioned_by = None;
    }
}

// ---------------------------------------------------------------------------
// Priming
// ---------------------------------------------------------------------------

/// Derive the resource table from the given workloads.
///
/// Existing records keep their outputs unless the first workload to claim
/// them in this pass declares different params, in which case the outputs
/// are dropped so the resource is provisioned again. A second claim with
/// different params is a conflict. Records nobody claims are pruned.
pub fn prime<'a>(
    existing: &BTreeMap<ResourceUid, ResourceRecord>,
    workloads: impl IntoIterator<Item = (&'a str, &'a Workload)>,
) -> Result<BTreeMap<ResourceUid, ResourceRecord>> {
    let mut next: BTreeMap<ResourceUid, ResourceRecord> = existing
        .iter()
        .map(|(uid, rec)| {
            let mut rec = rec.clone();
            rec.used_by.clear();
            (uid.clone(), rec)
        })
        .collect();

    for (workload, spec) in workloads {
        for (local, decl) in &spec.resources {
            let uid = ResourceUid::for_ref(decl);
            let params = decl.params.clone().unwrap_or_default();
            match next.get_mut(&uid) {
                None => {
                    debug!(resource = %uid, workload, local, "new resource");
                    let mut rec = ResourceRecord::from_ref(decl);
                    rec.used_by.insert(workload.to_string());
                    next.insert(uid, rec);
                }
                Some(rec) if rec.used_by.is_empty() => {
                    if rec.params != params {
                        debug!(resource = %uid, workload, "params changed, outputs reset");
                        rec.params = params;
                        rec.reset_outputs();
                    }
                    rec.metadata = decl.metadata.clone().unwrap_or_default();
                    rec.used_by.insert(workload.to_string());
                }
                Some(rec) => {
                    if rec.params != params {
                        let first = rec.used_by.iter().next().cloned().unwrap_or_default();
                        return Err(AvassaError::ResourceParamsConflict {
                            uid: uid.to_string(),
                            first,
                            second: workload.to_string(),
                        });
                    }
                    rec.used_by.insert(workload.to_string());
                }
            }
        }
    }

    let before = next.len();
    next.retain(|_, rec| !rec.used_by.is_empty());
    if next.len() < before {
        debug!(pruned = before - next.len(), "dropped orphaned resources");
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
