use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STATE_DIR: &str = ".score-avassa";
pub const STATE_FILE: &str = ".score-avassa/state.yaml";
pub const DEFAULT_PROVISIONERS_FILE: &str = ".score-avassa/zz-default.provisioners.yaml";

/// Suffix that marks a provisioners file inside the state directory.
pub const PROVISIONERS_SUFFIX: &str = ".provisioners.yaml";

pub const SAMPLE_SCORE_FILE: &str = "score.yaml";
pub const DEFAULT_OUTPUT_FILE: &str = "manifests.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn default_provisioners_path(root: &Path) -> PathBuf {
    root.join(DEFAULT_PROVISIONERS_FILE)
}

pub fn sample_score_path(root: &Path) -> PathBuf {
    root.join(SAMPLE_SCORE_FILE)
}

/// All provisioner files in the state directory, sorted by file name.
pub fn provisioner_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let dir = state_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(PROVISIONERS_SUFFIX) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
