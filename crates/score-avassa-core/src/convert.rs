//! Manifest synthesis: one workload plus its resource outputs in, one Avassa
//! application spec out.

use crate::error::{AvassaError, Result};
use crate::names;
use crate::state::{State, WorkloadRecord};
use crate::substitute::{Substituter, SubstitutionError};
use crate::workload::{Container, Probe};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

// ---------------------------------------------------------------------------
// Defaults and annotation keys
// ---------------------------------------------------------------------------

pub const ANNOTATION_PREFIX: &str = "avassa.";

pub const ANN_REPLICAS: &str = "replicas";
pub const ANN_SHARE_PID_NAMESPACE: &str = "share-pid-namespace";
pub const ANN_LOG_SIZE: &str = "log-size";
pub const ANN_LOG_ARCHIVE: &str = "log-archive";
pub const ANN_SHUTDOWN_TIMEOUT: &str = "shutdown-timeout";
pub const ANN_ON_MUTABLE_VARIABLE_CHANGE: &str = "on-mutable-variable-change";
pub const ANN_NETWORK: &str = "network";
pub const ANN_APPROLE: &str = "approle";
pub const ANN_ON_MOUNTED_FILE_CHANGE_RESTART: &str = "on-mounted-file-change-restart";

pub const DEFAULT_REPLICAS: u32 = 1;
pub const DEFAULT_LOG_SIZE: &str = "100 MB";
pub const DEFAULT_SHUTDOWN_TIMEOUT: &str = "10s";
pub const DEFAULT_ON_MUTABLE_VARIABLE_CHANGE: &str = "restart-service-instance";
pub const SERVICE_MODE: &str = "replicated";

// ---------------------------------------------------------------------------
// Avassa application spec (subset)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Application {
    pub name: String,
    pub services: Vec<ServiceSpec>,
    pub on_mutable_variable_change: String,
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    pub labels: Mapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Network {
    pub shared_application_network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSpec {
    pub name: String,
    pub mode: String,
    pub replicas: u32,
    pub share_pid_namespace: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Volume {
    pub name: String,
    pub config_map: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigMap {
    pub items: Vec<ConfigItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigItem {
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerSpec {
    pub name: String,
    pub mounts: Vec<Mount>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub container_log_size: String,
    #[serde(skip_serializing_if = "is_false")]
    pub container_log_archive: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shutdown_timeout: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_mounted_file_change: Option<OnMountedFileChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<Probes>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Mount {
    pub volume_name: String,
    pub files: Vec<MountedFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MountedFile {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnMountedFileChange {
    pub restart: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Probes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<ProbeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ProbeSpec>,
}

/// Exactly one of `exec` and `http-get` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecAction {
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpGet {
    pub path: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

struct Annotations(Mapping);

impl Annotations {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .get(format!("{ANNOTATION_PREFIX}{key}").as_str())
            .filter(|v| !v.is_null())
    }

    fn invalid(key: &str, reason: &str) -> AvassaError {
        AvassaError::InvalidDocument {
            path: format!("metadata.annotations.{ANNOTATION_PREFIX}{key}"),
            reason: reason.to_string(),
        }
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        let s = match self.get(key) {
            None => return Ok(None),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => return Err(Self::invalid(key, "must be a scalar")),
        };
        Ok(Some(s).filter(|s| !s.is_empty()))
    }

    fn uint(&self, key: &str, default: u32) -> Result<u32> {
        let parsed = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            Some(_) => None,
        };
        parsed.ok_or_else(|| Self::invalid(key, "must be a non-negative integer"))
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s == "true" => Ok(true),
            Some(Value::String(s)) if s == "false" => Ok(false),
            Some(_) => Err(Self::invalid(key, "must be true or false")),
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Convert one workload from `state` into an Avassa application document.
pub fn synthesize(state: &State, workload: &str) -> Result<Value> {
    let app = build_application(state, workload)?;
    Ok(serde_yaml::to_value(&app)?)
}

/// Typed form of [`synthesize`].
pub fn build_application(state: &State, workload: &str) -> Result<Application> {
    let record = state.workload(workload)?;
    let outputs = state.resource_outputs_for_workload(workload)?;
    let spec = &record.spec;
    let substituter = Substituter::new(&spec.metadata, &outputs);
    let annotations = Annotations(spec.annotations());

    let name = names::sanitize_name(spec.name().unwrap_or(workload));
    debug_assert!(names::is_valid_name(&name));

    let mut service = ServiceSpec {
        name: format!("{name}-service"),
        mode: SERVICE_MODE.to_string(),
        replicas: annotations.uint(ANN_REPLICAS, DEFAULT_REPLICAS)?,
        share_pid_namespace: annotations.flag(ANN_SHARE_PID_NAMESPACE, false)?,
        volumes: Vec::new(),
        containers: Vec::new(),
    };

    let log_size = annotations
        .string(ANN_LOG_SIZE)?
        .unwrap_or_else(|| DEFAULT_LOG_SIZE.to_string());
    let log_archive = annotations.flag(ANN_LOG_ARCHIVE, false)?;
    let shutdown_timeout = annotations
        .string(ANN_SHUTDOWN_TIMEOUT)?
        .unwrap_or_else(|| DEFAULT_SHUTDOWN_TIMEOUT.to_string());
    let approle = annotations.string(ANN_APPROLE)?;
    let on_mounted_file_change = annotations
        .flag(ANN_ON_MOUNTED_FILE_CHANGE_RESTART, false)?
        .then_some(OnMountedFileChange { restart: true });

    let mut volume_names = BTreeSet::new();
    // BTreeMap iteration: containers come out sorted by name.
    for (container_name, container) in &spec.containers {
        let ctx = ContainerContext {
            workload,
            container: container_name,
            substituter: &substituter,
        };
        let env = ctx.variables(container)?;
        let cmd = ctx.command(container)?;
        let (volume, mount) = ctx.files(container, record, &mut volume_names)?;
        if let Some(volume) = volume {
            service.volumes.push(volume);
        }
        service.containers.push(ContainerSpec {
            name: container_name.clone(),
            mounts: mount.into_iter().collect(),
            container_log_size: log_size.clone(),
            container_log_archive: log_archive,
            shutdown_timeout: shutdown_timeout.clone(),
            image: container.image.clone(),
            cmd,
            env,
            approle: approle.clone(),
            on_mounted_file_change: on_mounted_file_change.clone(),
            probes: probes(container),
        });
    }

    let labels = match spec.metadata.get("labels") {
        Some(Value::Mapping(m)) => m.clone(),
        _ => Mapping::new(),
    };

    debug!(workload, app = %name, containers = service.containers.len(), "synthesized application");
    Ok(Application {
        name,
        services: vec![service],
        on_mutable_variable_change: annotations
            .string(ANN_ON_MUTABLE_VARIABLE_CHANGE)?
            .unwrap_or_else(|| DEFAULT_ON_MUTABLE_VARIABLE_CHANGE.to_string()),
        labels,
        network: annotations
            .string(ANN_NETWORK)?
            .map(|n| Network {
                shared_application_network: n,
            }),
    })
}

struct ContainerContext<'a> {
    workload: &'a str,
    container: &'a str,
    substituter: &'a Substituter<'a>,
}

impl ContainerContext<'_> {
    fn substitute(&self, site: String, input: &str) -> Result<String> {
        self.substituter
            .substitute(input)
            .map_err(|source: SubstitutionError| AvassaError::Substitution {
                workload: self.workload.to_string(),
                container: self.container.to_string(),
                site,
                source,
            })
    }

    fn fail(&self, reason: String) -> AvassaError {
        AvassaError::Container {
            workload: self.workload.to_string(),
            container: self.container.to_string(),
            reason,
        }
    }

    fn variables(&self, container: &Container) -> Result<BTreeMap<String, String>> {
        let mut env = BTreeMap::new();
        for (key, value) in &container.variables {
            let resolved = self.substitute(format!("variables.{key}"), value)?;
            env.insert(key.clone(), resolved);
        }
        Ok(env)
    }

    /// Command tokens first, then args; blank tokens are dropped.
    fn command(&self, container: &Container) -> Result<Vec<String>> {
        let tokens = container
            .command
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("command[{i}]"), t))
            .chain(
                container
                    .args
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (format!("args[{i}]"), t)),
            );
        let mut cmd = Vec::new();
        for (site, token) in tokens {
            let resolved = self.substitute(site, token)?;
            if !resolved.trim().is_empty() {
                cmd.push(resolved);
            }
        }
        Ok(cmd)
    }

    /// Files become one config-map volume per container plus a mount of it.
    /// Volume names are unique within the service, item names within the volume.
    fn files(
        &self,
        container: &Container,
        record: &WorkloadRecord,
        volume_names: &mut BTreeSet<String>,
    ) -> Result<(Option<Volume>, Option<Mount>)> {
        if container.files.is_empty() {
            return Ok((None, None));
        }
        let volume_name = names::claim_unique(
            names::sanitize_name(&format!("{}-files", self.container)),
            volume_names,
        );
        let mut item_names = BTreeSet::new();
        let mut items: Vec<ConfigItem> = Vec::new();
        let mut mounted = Vec::new();
        for (target, file) in &container.files {
            let raw = match (&file.content, &file.source) {
                (Some(content), _) => content.clone(),
                (None, Some(source)) => {
                    let path = resolve_source(source, record.source_file.as_deref());
                    std::fs::read_to_string(&path).map_err(|e| {
                        self.fail(format!(
                            "files: {target}: failed to read '{}': {e}",
                            path.display()
                        ))
                    })?
                }
                (None, None) => {
                    return Err(self.fail(format!("files: {target}: missing 'content' or 'source'")))
                }
            };
            let data = if file.no_expand.unwrap_or(false) {
                raw
            } else {
                self.substitute(format!("files.{target}"), &raw)?
            };

            let item_name = names::claim_unique(names::sanitize_name(target), &mut item_names);
            mounted.push(MountedFile {
                name: item_name.clone(),
                mount_path: target.clone(),
            });
            items.push(ConfigItem {
                name: item_name,
                data,
            });
        }
        Ok((
            Some(Volume {
                name: volume_name.clone(),
                config_map: ConfigMap { items },
            }),
            Some(Mount {
                volume_name,
                files: mounted,
            }),
        ))
    }
}

fn resolve_source(source: &str, workload_file: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(source);
    if path.is_absolute() {
        return path;
    }
    match workload_file.and_then(Path::parent) {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn probe_spec(probe: &Probe) -> Option<ProbeSpec> {
    if let Some(exec) = &probe.exec {
        return Some(ProbeSpec {
            exec: Some(ExecAction {
                cmd: exec.command.clone(),
            }),
            http_get: None,
        });
    }
    probe.http_get.as_ref().map(|http| ProbeSpec {
        exec: None,
        http_get: Some(HttpGet {
            path: http.path.clone(),
            port: http.port,
            scheme: http.scheme.clone(),
            host: http.host.clone(),
            http_headers: http
                .http_headers
                .iter()
                .map(|h| HttpHeader {
                    name: h.name.clone(),
                    value: h.value.clone(),
                })
                .collect(),
        }),
    })
}

fn probes(container: &Container) -> Option<Probes> {
    let liveness = container.liveness_probe.as_ref().and_then(probe_spec);
    let readiness = container.readiness_probe.as_ref().and_then(probe_spec);
    if liveness.is_none() && readiness.is_none() {
        return None;
    }
    Some(Probes {
        liveness,
        readiness,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceUid;
    use crate::state::WorkloadExtras;
    use crate::workload::Workload;
    use tempfile::TempDir;

    fn state_with(yaml: &str) -> State {
        state_with_source(yaml, None)
    }

    fn state_with_source(yaml: &str, source: Option<PathBuf>) -> State {
        let w: Workload = serde_yaml::from_str(yaml).unwrap();
        State::default()
            .with_workload(w, source, WorkloadExtras::default())
            .unwrap()
            .with_primed_resources()
            .unwrap()
    }

    const EXAMPLE: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: example
containers:
  main:
    image: repo/img
    variables:
      K: ${metadata.name}
"#;

    #[test]
    fn scenario_example() {
        let app = build_application(&state_with(EXAMPLE), "example").unwrap();
        assert_eq!(app.name, "example");
        assert_eq!(app.on_mutable_variable_change, DEFAULT_ON_MUTABLE_VARIABLE_CHANGE);
        assert!(app.network.is_none());
        assert_eq!(app.services.len(), 1);
        let svc = &app.services[0];
        assert_eq!(svc.name, "example-service");
        assert_eq!(svc.mode, "replicated");
        assert_eq!(svc.replicas, 1);
        assert!(!svc.share_pid_namespace);
        assert_eq!(svc.containers.len(), 1);
        let c = &svc.containers[0];
        assert_eq!(c.name, "main");
        assert_eq!(c.image, "repo/img");
        assert_eq!(c.env.get("K").map(String::as_str), Some("example"));
        assert_eq!(c.container_log_size, DEFAULT_LOG_SIZE);
        assert_eq!(c.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert!(c.mounts.is_empty());
        assert!(c.on_mounted_file_change.is_none());
    }

    #[test]
    fn document_shape() {
        let doc = synthesize(&state_with(EXAMPLE), "example").unwrap();
        let c = &doc["services"][0]["containers"][0];
        assert_eq!(c["env"]["K"], Value::from("example"));
        assert_eq!(c["mounts"], Value::Sequence(vec![]));
        assert!(c.get("container-log-archive").is_none());
        assert!(c.get("approle").is_none());
        assert_eq!(doc["services"][0]["replicas"], Value::from(1));
    }

    #[test]
    fn empty_env_is_omitted() {
        let state = state_with(
            "apiVersion: score.dev/v1b1\nmetadata: {name: bare}\ncontainers: {main: {image: x}}\n",
        );
        let doc = synthesize(&state, "bare").unwrap();
        assert!(doc["services"][0]["containers"][0].get("env").is_none());
    }

    #[test]
    fn containers_sorted_by_name() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: multi}
containers:
  zeta: {image: z}
  alpha: {image: a}
  mid: {image: m}
"#,
        );
        let app = build_application(&state, "multi").unwrap();
        let names: Vec<&str> = app.services[0]
            .containers
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn annotations_override_defaults() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata:
  name: My App!!
  labels: {tier: web}
  annotations:
    avassa.replicas: "3"
    avassa.share-pid-namespace: true
    avassa.log-size: 1 GB
    avassa.log-archive: "true"
    avassa.shutdown-timeout: 30s
    avassa.on-mutable-variable-change: restart-container
    avassa.network: edge-net
    avassa.approle: reader
    avassa.on-mounted-file-change-restart: true
containers:
  main: {image: x}
"#,
        );
        let app = build_application(&state, "My App!!").unwrap();
        assert_eq!(app.name, "my-app");
        assert_eq!(app.on_mutable_variable_change, "restart-container");
        assert_eq!(
            app.network.as_ref().map(|n| n.shared_application_network.as_str()),
            Some("edge-net")
        );
        assert_eq!(app.labels.get("tier"), Some(&Value::from("web")));
        let svc = &app.services[0];
        assert_eq!(svc.name, "my-app-service");
        assert_eq!(svc.replicas, 3);
        assert!(svc.share_pid_namespace);
        let c = &svc.containers[0];
        assert_eq!(c.container_log_size, "1 GB");
        assert!(c.container_log_archive);
        assert_eq!(c.shutdown_timeout, "30s");
        assert_eq!(c.approle.as_deref(), Some("reader"));
        assert_eq!(c.on_mounted_file_change, Some(OnMountedFileChange { restart: true }));
    }

    #[test]
    fn malformed_annotation_fails() {
        let state = state_with(
            "apiVersion: score.dev/v1b1\nmetadata: {name: a, annotations: {avassa.replicas: many}}\ncontainers: {main: {image: x}}\n",
        );
        let err = build_application(&state, "a").unwrap_err().to_string();
        assert!(err.contains("avassa.replicas"), "{err}");
    }

    #[test]
    fn command_and_args_concatenated() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: cmd}
containers:
  main:
    image: x
    command: ["/bin/sh", " "]
    args: ["-c", "echo ${metadata.name}", ""]
"#,
        );
        let app = build_application(&state, "cmd").unwrap();
        assert_eq!(
            app.services[0].containers[0].cmd,
            vec!["/bin/sh", "-c", "echo cmd"]
        );
    }

    #[test]
    fn exec_probe_preferred() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: probes}
containers:
  main:
    image: x
    livenessProbe:
      exec: {command: ["/bin/true"]}
      httpGet: {port: 8080, path: /live}
    readinessProbe:
      httpGet:
        port: 8080
        path: /ready
        httpHeaders: [{name: X-Probe, value: "1"}]
"#,
        );
        let app = build_application(&state, "probes").unwrap();
        let probes = app.services[0].containers[0].probes.clone().unwrap();
        let liveness = probes.liveness.unwrap();
        assert_eq!(liveness.exec.unwrap().cmd, vec!["/bin/true".to_string()]);
        assert!(liveness.http_get.is_none());
        let http = probes.readiness.unwrap().http_get.unwrap();
        assert_eq!(http.path, "/ready");
        assert_eq!(http.port, 8080);
        assert_eq!(http.http_headers.len(), 1);

        let doc = synthesize(&state, "probes").unwrap();
        let liveness = &doc["services"][0]["containers"][0]["probes"]["liveness"];
        assert_eq!(liveness["exec"]["cmd"][0], Value::from("/bin/true"));
    }

    #[test]
    fn colliding_file_targets_get_distinct_items() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: files}
containers:
  main:
    image: x
    files:
      "/a": {content: one}
      "/a-2": {content: two}
      "/a?": {content: three}
"#,
        );
        let app = build_application(&state, "files").unwrap();
        let svc = &app.services[0];
        let items: Vec<(&str, &str)> = svc.volumes[0]
            .config_map
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.data.as_str()))
            .collect();
        assert_eq!(items, vec![("a", "one"), ("a-2", "two"), ("a-3", "three")]);
        let mounts: Vec<(&str, &str)> = svc.containers[0].mounts[0]
            .files
            .iter()
            .map(|f| (f.mount_path.as_str(), f.name.as_str()))
            .collect();
        assert_eq!(mounts, vec![("/a", "a"), ("/a-2", "a-2"), ("/a?", "a-3")]);
    }

    #[test]
    fn colliding_container_names_get_distinct_volumes() {
        let state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: vols}
containers:
  "a b": {image: x, files: {/one: {content: "1"}}}
  a-b: {image: y, files: {/two: {content: "2"}}}
"#,
        );
        let app = build_application(&state, "vols").unwrap();
        let svc = &app.services[0];
        let volumes: Vec<&str> = svc.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(volumes, vec!["a-b-files", "a-b-files-2"]);
        let mounted: Vec<&str> = svc
            .containers
            .iter()
            .map(|c| c.mounts[0].volume_name.as_str())
            .collect();
        assert_eq!(mounted, volumes);
    }

    #[test]
    fn files_become_config_map_volume() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("motd.txt"), "hello ${metadata.name}").unwrap();
        let score = dir.path().join("score.yaml");
        let state = state_with_source(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: files}
containers:
  main:
    image: x
    files:
      /etc/motd:
        source: motd.txt
      /etc/raw:
        content: "${metadata.name}"
        noExpand: true
"#,
            Some(score),
        );
        let app = build_application(&state, "files").unwrap();
        let svc = &app.services[0];
        assert_eq!(svc.volumes.len(), 1);
        assert_eq!(svc.volumes[0].name, "main-files");
        let items = &svc.volumes[0].config_map.items;
        assert_eq!(items[0].name, "etc-motd");
        assert_eq!(items[0].data, "hello files");
        assert_eq!(items[1].name, "etc-raw");
        assert_eq!(items[1].data, "${metadata.name}");
        let mount = &svc.containers[0].mounts[0];
        assert_eq!(mount.volume_name, "main-files");
        assert_eq!(mount.files[0].mount_path, "/etc/motd");
    }

    #[test]
    fn missing_source_file_fails() {
        let state = state_with(
            "apiVersion: score.dev/v1b1\nmetadata: {name: a}\ncontainers: {main: {image: x, files: {/etc/x: {source: /does/not/exist}}}}\n",
        );
        let err = build_application(&state, "a").unwrap_err().to_string();
        assert!(err.contains("/does/not/exist"), "{err}");
    }

    #[test]
    fn unresolved_placeholder_names_the_site() {
        let state = state_with(
            "apiVersion: score.dev/v1b1\nmetadata: {name: a}\ncontainers: {main: {image: x, variables: {BAD: '${metadata.nope}'}}}\n",
        );
        let err = build_application(&state, "a").unwrap_err();
        match err {
            AvassaError::Substitution {
                workload,
                container,
                site,
                source,
            } => {
                assert_eq!(workload, "a");
                assert_eq!(container, "main");
                assert_eq!(site, "variables.BAD");
                assert_eq!(
                    source,
                    SubstitutionError::UnknownMetadata("metadata.nope".to_string())
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resource_outputs_resolve() {
        let mut state = state_with(
            r#"
apiVersion: score.dev/v1b1
metadata: {name: a}
containers:
  main:
    image: x
    variables:
      DB_HOST: ${resources.db.host}
resources:
  db: {type: postgres}
"#,
        );
        let rec = state
            .resources
            .get_mut(&ResourceUid::new("postgres", None, None))
            .unwrap();
        rec.outputs.insert("host".into(), "db.local".into());
        rec.provisioned_by = Some("static://pg".into());
        let app = build_application(&state, "a").unwrap();
        assert_eq!(
            app.services[0].containers[0].env.get("DB_HOST").map(String::as_str),
            Some("db.local")
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let state = state_with(EXAMPLE);
        let a = serde_yaml::to_string(&synthesize(&state, "example").unwrap()).unwrap();
        let b = serde_yaml::to_string(&synthesize(&state, "example").unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
