//! Canonical paths within `.steward/` for a project root.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StewardPaths {
    pub root: PathBuf,
    pub steward_dir: PathBuf,
    pub state_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub config_path: PathBuf,
    pub pipeline_state_path: PathBuf,
    pub pipeline_log_path: PathBuf,
    pub reconcile_lock_path: PathBuf,
}

impl StewardPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let steward_dir = root.join(".steward");
        let state_dir = steward_dir.join("state");
        let locks_dir = steward_dir.join("locks");
        let logs_dir = steward_dir.join("logs");
        let reports_dir = steward_dir.join("reports");
        Self {
            root: root.clone(),
            steward_dir: steward_dir.clone(),
            state_dir: state_dir.clone(),
            locks_dir: locks_dir.clone(),
            logs_dir: logs_dir.clone(),
            reports_dir,
            config_path: state_dir.join("config.toml"),
            pipeline_state_path: state_dir.join("pipeline.json"),
            pipeline_log_path: logs_dir.join("pipeline.md"),
            reconcile_lock_path: locks_dir.join("reconcile.lock"),
        }
    }

    /// Resolve a config-relative path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
