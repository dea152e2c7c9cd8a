use crate::error::{AvassaError, Result};
use crate::paths;
use crate::resource::{self, ResourceRecord, ResourceUid};
use crate::workload::Workload;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Workload records
// ---------------------------------------------------------------------------

/// Side-channel data stored alongside a workload. Reserved; always empty today.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadExtras {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub spec: Workload,
    /// Score file this workload came from; relative file sources resolve against it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default)]
    pub extras: WorkloadExtras,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub workloads: BTreeMap<String, WorkloadRecord>,
    #[serde(default)]
    pub resources: BTreeMap<ResourceUid, ResourceRecord>,
}

fn default_version() -> u32 {
    1
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: default_version(),
            workloads: BTreeMap::new(),
            resources: BTreeMap::new(),
        }
    }
}

impl State {
    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Load the project state. The flag is false when the state directory
    /// does not exist, i.e. the project was never initialised.
    pub fn load(root: &Path) -> Result<(Self, bool)> {
        if !paths::state_dir(root).is_dir() {
            return Ok((Self::default(), false));
        }
        let path = paths::state_path(root);
        if !path.exists() {
            return Ok((Self::default(), true));
        }
        let data = std::fs::read_to_string(&path)?;
        let state: State = serde_yaml::from_str(&data)?;
        Ok((state, true))
    }

    pub fn persist(&self, root: &Path) -> Result<()> {
        let path = paths::state_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // ---------------------------------------------------------------------------
    // Merges
    // ---------------------------------------------------------------------------

    /// Return a copy of the state with `spec` stored under its metadata name,
    /// replacing any previous record of that name wholesale.
    pub fn with_workload(
        &self,
        spec: Workload,
        source_file: Option<PathBuf>,
        extras: WorkloadExtras,
    ) -> Result<Self> {
        let name = spec.name().ok_or(AvassaError::MissingName)?.to_string();
        let mut next = self.clone();
        next.workloads.insert(
            name,
            WorkloadRecord {
                spec,
                source_file,
                extras,
            },
        );
        Ok(next)
    }

    /// Return a copy of the state whose resource table matches the current
    /// workloads. On error `self` is untouched.
    pub fn with_primed_resources(&self) -> Result<Self> {
        let resources = resource::prime(
            &self.resources,
            self.workloads
                .iter()
                .map(|(name, rec)| (name.as_str(), &rec.spec)),
        )?;
        let mut next = self.clone();
        next.resources = resources;
        Ok(next)
    }

    // ---------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------

    pub fn workload(&self, name: &str) -> Result<&WorkloadRecord> {
        self.workloads
            .get(name)
            .ok_or_else(|| AvassaError::WorkloadNotFound(name.to_string()))
    }

    /// Outputs of the resources `name` references, keyed by the workload's
    /// local resource names; `None` for a resource not provisioned yet.
    /// Other workloads' resources are not visible.
    pub fn resource_outputs_for_workload(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, Option<Mapping>>> {
        let record = self.workload(name)?;
        let mut out = BTreeMap::new();
        for (local, decl) in &record.spec.resources {
            let uid = ResourceUid::for_ref(decl);
            let res = self
                .resources
                .get(&uid)
                .ok_or_else(|| AvassaError::UnprimedResource {
                    workload: name.to_string(),
                    resource: local.clone(),
                })?;
            out.insert(
                local.clone(),
                res.is_provisioned().then(|| res.outputs.clone()),
            );
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
