use anyhow::{bail, Context};
use score_avassa_core::{
    convert, io, overrides,
    provision::{self, ProvisionerRegistry},
    render, schema,
    state::{State, WorkloadExtras},
    workload::Workload,
};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Container image placeholder replaced by `--image`.
const IMAGE_PLACEHOLDER: &str = ".";

/// Everything `generate` needs besides the project root.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub files: Vec<PathBuf>,
    pub output: PathBuf,
    pub stdout: bool,
    pub overrides_file: Option<PathBuf>,
    pub override_properties: Vec<String>,
    pub image: Option<String>,
}

impl GenerateOptions {
    fn has_single_file_flags(&self) -> bool {
        self.overrides_file.is_some() || !self.override_properties.is_empty() || self.image.is_some()
    }

    fn writes_stdout(&self) -> bool {
        self.stdout || self.output.as_os_str() == "-"
    }
}

pub fn run(root: &Path, opts: GenerateOptions) -> anyhow::Result<()> {
    let (mut state, initialized) =
        State::load(root).context("failed to load existing state directory")?;
    if !initialized {
        bail!("state directory does not exist, please run \"init\" first");
    }

    if opts.files.len() != 1 && opts.has_single_file_flags() {
        bail!(
            "cannot use --override-property, --overrides-file, or --image when 0 or more than 1 score files are provided"
        );
    }

    let mut files = opts.files.clone();
    files.sort();
    for file in &files {
        let workload = load_workload(file, &opts)?;
        state = state
            .with_workload(workload, Some(file.clone()), WorkloadExtras::default())
            .with_context(|| format!("failed to add score file to project: {}", file.display()))?;
        info!(file = %file.display(), "added workload");
    }

    if state.workloads.is_empty() {
        bail!("project is empty, please add a score file");
    }

    let state = state
        .with_primed_resources()
        .context("failed to prime resources")?;
    info!(resources = state.resources.len(), "primed resources");

    let registry = ProvisionerRegistry::load(root).context("failed to load provisioners")?;
    let state =
        provision::provision_resources(&state, &registry).context("failed to provision resources")?;

    let mut documents = Vec::with_capacity(state.workloads.len());
    for name in state.workloads.keys() {
        let doc = convert::synthesize(&state, name)
            .with_context(|| format!("failed to convert workload '{name}'"))?;
        documents.push(doc);
    }

    state.persist(root).context("failed to persist state file")?;
    info!("persisted state");

    let rendered = render::render_documents(&documents).context("failed to render manifests")?;
    if opts.writes_stdout() {
        print!("{rendered}");
    } else {
        io::atomic_write(&opts.output, rendered.as_bytes())
            .with_context(|| format!("failed to write output file: {}", opts.output.display()))?;
        info!(output = %opts.output.display(), documents = documents.len(), "wrote manifests");
    }
    Ok(())
}

/// Read one score file and take it through overrides, upgrade, validation,
/// and decoding.
fn load_workload(file: &Path, opts: &GenerateOptions) -> anyhow::Result<Workload> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read input score file: {}", file.display()))?;
    let mut doc: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to decode input score file: {}", file.display()))?;
    if !doc.is_mapping() {
        bail!(
            "failed to decode input score file: {}: document is not a mapping",
            file.display()
        );
    }

    if let Some(path) = &opts.overrides_file {
        apply_overrides_file(&mut doc, path)?;
    }
    for entry in &opts.override_properties {
        overrides::apply_property(&mut doc, entry)
            .with_context(|| format!("--override-property '{entry}' could not be applied"))?;
        info!(property = %entry, "applied override");
    }

    let changes = schema::apply_upgrade_transforms(&mut doc).context("failed to upgrade spec")?;
    for change in changes {
        info!(file = %file.display(), "{change}");
    }

    schema::validate(&doc).with_context(|| format!("invalid score file: {}", file.display()))?;
    let mut workload = schema::decode(doc)
        .with_context(|| format!("failed to decode input score file: {}", file.display()))?;

    apply_image(&mut workload, opts.image.as_deref())?;
    Ok(workload)
}

fn apply_overrides_file(doc: &mut Value, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| {
        format!("--overrides-file '{}' is invalid, failed to read file", path.display())
    })?;
    let overrides: Value = serde_yaml::from_str(&raw).with_context(|| {
        format!("--overrides-file '{}' is invalid: failed to decode yaml", path.display())
    })?;
    overrides::merge_document(doc, overrides)
        .with_context(|| format!("--overrides-file '{}' failed to apply", path.display()))?;
    info!(file = %path.display(), "applied overrides file");
    Ok(())
}

/// Replace `.` container images with `image`.
fn apply_image(workload: &mut Workload, image: Option<&str>) -> anyhow::Result<()> {
    let image = image.map(str::trim);
    if image == Some(IMAGE_PLACEHOLDER) {
        bail!(
            "invalid --image value: '.' is not a valid image name; please provide an explicit image name (e.g. 'repo/name:tag')"
        );
    }
    for (name, container) in workload.containers.iter_mut() {
        if container.image != IMAGE_PLACEHOLDER {
            continue;
        }
        match image {
            Some(image) if !image.is_empty() => container.image = image.to_string(),
            _ => bail!(
                "container '{name}' has image '.'; please provide an explicit image name via --image"
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(image: &str) -> Workload {
        serde_yaml::from_str(&format!(
            "apiVersion: score.dev/v1b1\nmetadata: {{name: w}}\ncontainers: {{main: {{image: '{image}'}}, side: {{image: busybox}}}}\n"
        ))
        .unwrap()
    }

    #[test]
    fn image_replaces_placeholder_only() {
        let mut w = workload(".");
        apply_image(&mut w, Some("repo/app:1")).unwrap();
        assert_eq!(w.containers["main"].image, "repo/app:1");
        assert_eq!(w.containers["side"].image, "busybox");
    }

    #[test]
    fn placeholder_without_image_fails() {
        let mut w = workload(".");
        let err = apply_image(&mut w, None).unwrap_err().to_string();
        assert!(err.contains("container 'main'"), "{err}");
    }

    #[test]
    fn dot_image_flag_is_rejected() {
        let mut w = workload("nginx");
        assert!(apply_image(&mut w, Some(".")).is_err());
    }

    #[test]
    fn dash_output_means_stdout() {
        let opts = GenerateOptions {
            files: vec![],
            output: PathBuf::from("-"),
            stdout: false,
            overrides_file: None,
            override_properties: vec![],
            image: None,
        };
        assert!(opts.writes_stdout());
        assert!(!opts.has_single_file_flags());
    }
}
