//! Interactive-recovery and clearance-probe collaborators.
//!
//! Recovery is the long-running, one-shot session repair invoked when a stage
//! is blocked. The probe is the only thing allowed to run while a stage waits
//! for a human: it reports whether the external condition has cleared.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::error_class::ErrorClass;
use crate::core::types::Stage;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Context handed to recovery; no arguments beyond who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryContext {
    pub run_id: String,
    pub stage: Stage,
    pub error_class: ErrorClass,
}

pub trait InteractiveRecovery {
    /// `Ok(true)` when the session was recovered.
    fn recover(&self, ctx: &RecoveryContext) -> Result<bool>;
}

pub trait ClearanceProbe {
    /// `Ok(true)` when the human-required condition no longer holds.
    fn cleared(&self, stage: Stage, error_class: Option<ErrorClass>) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct CommandRecovery {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl InteractiveRecovery for CommandRecovery {
    #[instrument(skip_all, fields(run_id = %ctx.run_id, stage = %ctx.stage, timeout_secs = self.timeout.as_secs()))]
    fn recover(&self, ctx: &RecoveryContext) -> Result<bool> {
        let mut cmd = command_from_argv(&self.argv, &self.workdir)?;
        cmd.env("STEWARD_RUN_ID", &ctx.run_id)
            .env("STEWARD_STAGE", ctx.stage.as_str())
            .env("STEWARD_ERROR_CLASS", ctx.error_class.as_str());
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .context("run interactive recovery")?;
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "interactive recovery timed out");
            return Ok(false);
        }
        let recovered = output.status.success();
        info!(recovered, exit_code = ?output.status.code(), "interactive recovery finished");
        Ok(recovered)
    }
}

/// Runs `<argv...> <stage> <error_class>`; exit 0 means cleared.
#[derive(Debug, Clone)]
pub struct CommandClearanceProbe {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ClearanceProbe for CommandClearanceProbe {
    #[instrument(skip_all, fields(stage = %stage))]
    fn cleared(&self, stage: Stage, error_class: Option<ErrorClass>) -> Result<bool> {
        let mut cmd = command_from_argv(&self.argv, &self.workdir)?;
        cmd.arg(stage.as_str())
            .arg(error_class.map(ErrorClass::as_str).unwrap_or(""));
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .context("run clearance probe")?;
        Ok(!output.timed_out && output.status.success())
    }
}
