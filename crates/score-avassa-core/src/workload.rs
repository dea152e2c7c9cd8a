//! Strongly-typed Score workload specification.
//!
//! Raw documents are edited as `serde_yaml::Value` trees (see [`crate::overrides`])
//! and only become a [`Workload`] once [`crate::schema::decode`] accepts them.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

pub const API_VERSION: &str = "score.dev/v1b1";

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub api_version: String,
    pub metadata: Mapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    pub containers: BTreeMap<String, Container>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceRef>,
}

impl Workload {
    /// The declared `metadata.name`, if it is a non-empty string.
    pub fn name(&self) -> Option<&str> {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// `metadata.annotations` as a mapping, empty when absent.
    pub fn annotations(&self) -> Mapping {
        match self.metadata.get("annotations") {
            Some(Value::Mapping(m)) => m.clone(),
            _ => Mapping::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub ports: BTreeMap<String, ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Keyed by target path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, ContainerFile>,
    /// Keyed by target path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ContainerVolume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_expand: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerVolume {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpProbe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecProbe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProbe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecProbe {
    pub command: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resource references
// ---------------------------------------------------------------------------

/// A resource as declared under a workload's `resources` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Mapping>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: example
  annotations:
    avassa.replicas: "2"
containers:
  main:
    image: stefanprodan/podinfo
    command: ["/bin/sh"]
    args: ["-c", "sleep 1"]
    variables:
      KEY: value
    files:
      /etc/config:
        content: hello
        noExpand: true
    livenessProbe:
      httpGet:
        port: 8080
        path: /healthz
    readinessProbe:
      exec:
        command: ["true"]
resources:
  db:
    type: postgres
    class: large
    params:
      size: 10
"#;

    #[test]
    fn decodes_full_workload() {
        let w: Workload = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(w.name(), Some("example"));
        let main = &w.containers["main"];
        assert_eq!(main.command, vec!["/bin/sh"]);
        assert_eq!(main.args.len(), 2);
        assert_eq!(main.files["/etc/config"].no_expand, Some(true));
        assert_eq!(
            main.liveness_probe.as_ref().unwrap().http_get.as_ref().unwrap().port,
            8080
        );
        assert!(main.readiness_probe.as_ref().unwrap().exec.is_some());
        let db = &w.resources["db"];
        assert_eq!(db.kind, "postgres");
        assert_eq!(db.class.as_deref(), Some("large"));
        assert!(db.id.is_none());
    }

    #[test]
    fn blank_name_is_none() {
        let w: Workload = serde_yaml::from_str(
            "apiVersion: score.dev/v1b1\nmetadata: {name: '  '}\ncontainers: {}\n",
        )
        .unwrap();
        assert_eq!(w.name(), None);
    }

    #[test]
    fn annotations_default_empty() {
        let w: Workload = serde_yaml::from_str(
            "apiVersion: score.dev/v1b1\nmetadata: {name: a}\ncontainers: {}\n",
        )
        .unwrap();
        assert!(w.annotations().is_empty());
    }
}
