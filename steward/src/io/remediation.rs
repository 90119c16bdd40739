//! Remediation-script collaborator: applies a playbook.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::playbook::Playbook;
use crate::io::process::{command_from_argv, ensure_success, run_command_with_timeout};

/// Applies a playbook. Any `Err` counts as "remediation failed this attempt".
pub trait Remediator {
    fn apply(&self, playbook: Playbook) -> Result<()>;
}

/// Runs `<argv...> <playbook_id>`.
#[derive(Debug, Clone)]
pub struct CommandRemediator {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Remediator for CommandRemediator {
    #[instrument(skip_all, fields(playbook = %playbook, timeout_secs = self.timeout.as_secs()))]
    fn apply(&self, playbook: Playbook) -> Result<()> {
        if playbook == Playbook::Noop {
            return Err(anyhow!("refusing to apply the noop playbook"));
        }
        let mut cmd = command_from_argv(&self.argv, &self.workdir)?;
        cmd.arg(playbook.as_str());
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run remediation {playbook}"))?;
        ensure_success(&format!("remediation {playbook}"), self.timeout, &output)?;
        info!(playbook = %playbook, "remediation applied");
        Ok(())
    }
}
