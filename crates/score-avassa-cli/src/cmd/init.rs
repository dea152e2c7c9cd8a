use anyhow::Context;
use score_avassa_core::{io, paths, provision::DEFAULT_PROVISIONERS, state::State};
use std::path::Path;
use tracing::info;

/// Written to `score.yaml` unless the project already has one.
pub const SAMPLE_SCORE: &str = r#"apiVersion: score.dev/v1b1
metadata:
  name: example
containers:
  main:
    image: stefanprodan/podinfo
service:
  ports:
    web:
      port: 8080
"#;

pub fn run(root: &Path, write_sample: bool) -> anyhow::Result<()> {
    info!(root = %root.display(), "initializing project");

    // 1. State directory
    let dir = paths::state_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 2. Empty state file if missing
    let state_path = paths::state_path(root);
    if !state_path.exists() {
        State::default()
            .persist(root)
            .context("failed to write state file")?;
        info!("created: {}", paths::STATE_FILE);
    } else {
        info!("exists:  {}", paths::STATE_FILE);
    }

    // 3. Fallback provisioners
    let provisioners = paths::default_provisioners_path(root);
    let written = io::write_if_missing(&provisioners, DEFAULT_PROVISIONERS.as_bytes())
        .with_context(|| format!("failed to write {}", provisioners.display()))?;
    info!(
        "{} {}",
        if written { "created:" } else { "exists: " },
        paths::DEFAULT_PROVISIONERS_FILE
    );

    // 4. Sample score file
    if write_sample {
        let sample = paths::sample_score_path(root);
        let written = io::write_if_missing(&sample, SAMPLE_SCORE.as_bytes())
            .with_context(|| format!("failed to write {}", sample.display()))?;
        info!(
            "{} {}",
            if written { "created:" } else { "exists: " },
            paths::SAMPLE_SCORE_FILE
        );
    }

    Ok(())
}
