//! Persisted pipeline state (`.steward/state/pipeline.json`) and the
//! append-only human-readable stage log (`.steward/logs/pipeline.md`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::{PipelineRun, StageRecord};
use crate::io::paths::StewardPaths;

/// Reads and writes pipeline state for one project root.
#[derive(Debug, Clone)]
pub struct PipelineStore {
    pub state_path: PathBuf,
    pub log_path: PathBuf,
}

impl PipelineStore {
    pub fn new(paths: &StewardPaths) -> Self {
        Self {
            state_path: paths.pipeline_state_path.clone(),
            log_path: paths.pipeline_log_path.clone(),
        }
    }

    /// Load the current run, or `None` if no state was ever written.
    pub fn load(&self) -> Result<Option<PipelineRun>> {
        if !self.state_path.exists() {
            debug!(path = %self.state_path.display(), "no pipeline state");
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.state_path)
            .with_context(|| format!("read pipeline state {}", self.state_path.display()))?;
        let run: PipelineRun = serde_json::from_str(&contents)
            .with_context(|| format!("parse pipeline state {}", self.state_path.display()))?;
        debug!(run_id = %run.run_id, last_stage = ?run.last_stage, "pipeline state loaded");
        Ok(Some(run))
    }

    /// Atomically persist the run (temp file + rename).
    pub fn save(&self, run: &PipelineRun) -> Result<()> {
        debug!(path = %self.state_path.display(), run_id = %run.run_id, "writing pipeline state");
        let mut buf = serde_json::to_string_pretty(run)?;
        buf.push('\n');
        write_atomic(&self.state_path, &buf)
    }

    /// Upsert `record` into `run`, persist, then append it to the history log.
    pub fn record(&self, run: &mut PipelineRun, record: StageRecord) -> Result<()> {
        let line = render_log_line(&run.run_id, &record);
        run.upsert(record);
        self.save(run)?;
        append_line(&self.log_path, &line)
    }

    /// Append a free-form note (run start, restart) to the history log.
    pub fn note(&self, text: &str) -> Result<()> {
        append_line(&self.log_path, &format!("- {text}"))
    }
}

fn render_log_line(run_id: &str, record: &StageRecord) -> String {
    let at = record.finished_at.unwrap_or(record.started_at);
    let mut line = format!(
        "- {} `{}` {} {:?} retries={}",
        at.to_rfc3339(),
        run_id,
        record.stage,
        record.status,
        record.retries
    );
    if let Some(class) = record.last_error_class {
        line.push_str(&format!(" error_class={class}"));
    }
    if let Some(reason) = &record.reason {
        line.push_str(&format!(" reason=\"{reason}\""));
    }
    line
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("append {}", path.display()))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("pipeline state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp pipeline state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace pipeline state {}", path.display()))?;
    Ok(())
}
