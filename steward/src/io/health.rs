//! Health-check collaborator: reports named invariants.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::types::Invariant;
use crate::io::process::{command_from_argv, ensure_success, run_command_with_timeout};

/// Source of invariant results. Implementations must bound their own runtime.
pub trait HealthCheck {
    fn gather(&self) -> Result<Vec<Invariant>>;
}

/// Runs the configured health command and parses its stdout.
#[derive(Debug, Clone)]
pub struct CommandHealthCheck {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl HealthCheck for CommandHealthCheck {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn gather(&self) -> Result<Vec<Invariant>> {
        let cmd = command_from_argv(&self.argv, &self.workdir)?;
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .context("run health check")?;
        ensure_success("health check", self.timeout, &output)?;
        let invariants = parse_invariants(&output.stdout_lossy())?;
        debug!(count = invariants.len(), "health check reported invariants");
        Ok(invariants)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HealthReport {
    List(Vec<Invariant>),
    Wrapped { invariants: Vec<Invariant> },
}

/// Parse `[{"id","pass"}]` or `{"invariants": [...]}`.
pub fn parse_invariants(raw: &str) -> Result<Vec<Invariant>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("health check produced no output"));
    }
    let report: HealthReport =
        serde_json::from_str(trimmed).context("parse health check output")?;
    let invariants = match report {
        HealthReport::List(list) => list,
        HealthReport::Wrapped { invariants } => invariants,
    };
    if let Some(blank) = invariants.iter().find(|inv| inv.id.trim().is_empty()) {
        return Err(anyhow!("health check reported an invariant with empty id (pass={})", blank.pass));
    }
    Ok(invariants)
}
