use crate::substitute::SubstitutionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AvassaError {
    #[error("state directory does not exist, please run \"init\" first")]
    NotInitialized,

    #[error("workload metadata.name is missing or empty")]
    MissingName,

    #[error("workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("invalid score document: {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("invalid override path '{path}': {reason}")]
    InvalidOverridePath { path: String, reason: String },

    #[error("cannot remove '{0}': path does not exist")]
    OverridePathNotFound(String),

    #[error("invalid override value for '{path}': {reason}")]
    InvalidOverrideValue { path: String, reason: String },

    #[error("cannot merge overrides at '{path}': {reason}")]
    OverrideMerge { path: String, reason: String },

    #[error(
        "resource '{uid}' is declared with different params by workloads '{first}' and '{second}'"
    )]
    ResourceParamsConflict {
        uid: String,
        first: String,
        second: String,
    },

    #[error("workload '{workload}' references resource '{resource}' which has not been primed")]
    UnprimedResource { workload: String, resource: String },

    #[error("invalid provisioner '{uri}': {reason}")]
    InvalidProvisioner { uri: String, reason: String },

    #[error("failed to provision resource '{uid}' with '{uri}'")]
    Provisioning {
        uid: String,
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("workload '{workload}': container '{container}': {reason}")]
    Container {
        workload: String,
        container: String,
        reason: String,
    },

    #[error("workload '{workload}': container '{container}': {site}")]
    Substitution {
        workload: String,
        container: String,
        site: String,
        #[source]
        source: SubstitutionError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AvassaError>;
