//! Steward configuration stored under `.steward/state/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::access_url::CanonicalUrl;

/// Steward configuration (TOML).
///
/// Edited by operators; missing fields default to values suitable for a
/// single-host deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StewardConfig {
    /// Truncate collaborator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Shared project-state document (kill switch, baseline, allow flags).
    pub project_state_path: PathBuf,

    pub reconcile: ReconcileConfig,
    pub pipeline: PipelineConfig,
    pub escalation: EscalationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Upper bound on remediation attempts per reconcile invocation.
    pub max_attempts: u32,
    /// Prints invariant results as JSON on stdout.
    pub health_command: Vec<String>,
    pub health_timeout_secs: u64,
    /// Invoked as `<command...> <playbook_id>`.
    pub remediation_command: Vec<String>,
    pub remediation_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            health_command: vec!["scripts/health_check.sh".to_string()],
            health_timeout_secs: 60,
            remediation_command: vec!["scripts/remediate.sh".to_string()],
            remediation_timeout_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Invoked as `<command...> <stage> <run_id>`; prints a JSON stage report.
    pub stage_command: Vec<String>,
    pub stage_timeout_secs: u64,
    /// Interactive session recovery; exit 0 means recovered.
    pub recovery_command: Vec<String>,
    pub recovery_timeout_secs: u64,
    /// Invoked as `<command...> <stage> <error_class>`; exit 0 means the
    /// human-required condition has cleared.
    pub probe_command: Vec<String>,
    pub probe_timeout_secs: u64,
    /// Allow flag in the project-state document that gates side-effecting stages.
    pub allow_flag: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_command: vec!["scripts/run_stage.sh".to_string()],
            stage_timeout_secs: 20 * 60,
            recovery_command: vec!["scripts/interactive_recovery.sh".to_string()],
            recovery_timeout_secs: 30 * 60,
            probe_command: vec!["scripts/session_probe.sh".to_string()],
            probe_timeout_secs: 60,
            allow_flag: "pipeline_side_effects".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EscalationConfig {
    /// Fallback access URL when no proof artifact carries one.
    pub canonical_url: String,
    /// Directory of proof artifacts; file names sort chronologically.
    pub proofs_dir: PathBuf,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            canonical_url: "https://steward.example.net/novnc/vnc.html?autoconnect=1&path=websockify"
                .to_string(),
            proofs_dir: PathBuf::from(".steward/proofs"),
        }
    }
}

impl EscalationConfig {
    pub fn canonical(&self) -> Result<CanonicalUrl> {
        CanonicalUrl::parse(&self.canonical_url).context("escalation.canonical_url")
    }
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: 100_000,
            project_state_path: PathBuf::from(".steward/state/project_state.json"),
            reconcile: ReconcileConfig::default(),
            pipeline: PipelineConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }
}

fn require_command(name: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(anyhow!("{name} must be > 0"));
    }
    Ok(())
}

impl StewardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.reconcile.max_attempts == 0 {
            return Err(anyhow!("reconcile.max_attempts must be > 0"));
        }
        require_command("reconcile.health_command", &self.reconcile.health_command)?;
        require_command(
            "reconcile.remediation_command",
            &self.reconcile.remediation_command,
        )?;
        require_positive("reconcile.health_timeout_secs", self.reconcile.health_timeout_secs)?;
        require_positive(
            "reconcile.remediation_timeout_secs",
            self.reconcile.remediation_timeout_secs,
        )?;
        require_command("pipeline.stage_command", &self.pipeline.stage_command)?;
        require_command("pipeline.recovery_command", &self.pipeline.recovery_command)?;
        require_command("pipeline.probe_command", &self.pipeline.probe_command)?;
        require_positive("pipeline.stage_timeout_secs", self.pipeline.stage_timeout_secs)?;
        require_positive(
            "pipeline.recovery_timeout_secs",
            self.pipeline.recovery_timeout_secs,
        )?;
        require_positive("pipeline.probe_timeout_secs", self.pipeline.probe_timeout_secs)?;
        if self.pipeline.allow_flag.trim().is_empty() {
            return Err(anyhow!("pipeline.allow_flag must be non-empty"));
        }
        self.escalation.canonical()?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StewardConfig::default()`.
pub fn load_config(path: &Path) -> Result<StewardConfig> {
    if !path.exists() {
        let cfg = StewardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StewardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StewardConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
