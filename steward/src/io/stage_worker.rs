//! Stage worker abstraction for the browser-automation driver.
//!
//! The [`StageWorker`] trait decouples the pipeline state machine from the
//! driver that performs the actual UI work. Tests use scripted workers that
//! return predetermined outcomes without spawning processes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::error_class::ErrorClass;
use crate::core::types::{Stage, StageDetail};
use crate::io::process::{CommandOutput, command_from_argv, run_command_with_timeout};

/// What the worker is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    pub run_id: String,
    pub stage: Stage,
    pub retries: u32,
}

/// Classified stage failure reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub error_class: ErrorClass,
    pub reason: String,
}

/// Result of running a single stage. `Err` from the worker means an
/// unrecoverable problem that the pipeline propagates as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// `extra` carries any driver-specific fields kept on the stage record.
    Pass {
        detail: StageDetail,
        extra: BTreeMap<String, Value>,
    },
    Failed(StageFailure),
}

impl StageOutcome {
    pub fn pass(detail: StageDetail) -> Self {
        StageOutcome::Pass {
            detail,
            extra: BTreeMap::new(),
        }
    }

    pub fn failed(error_class: ErrorClass, reason: impl Into<String>) -> Self {
        StageOutcome::Failed(StageFailure {
            error_class,
            reason: reason.into(),
        })
    }
}

pub trait StageWorker {
    fn run_stage(&self, ctx: &StageContext) -> Result<StageOutcome>;
}

/// JSON report printed by the stage command.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StageReport {
    Pass {
        #[serde(default)]
        detail: StageDetail,
        #[serde(default)]
        extra: BTreeMap<String, Value>,
    },
    Fail {
        error_class: ErrorClass,
        #[serde(default)]
        reason: String,
    },
}

/// Parse the stage command's stdout (last non-empty line wins).
pub fn parse_stage_report(raw: &str) -> Result<StageOutcome> {
    let line = raw
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| anyhow!("stage command produced no report"))?;
    let report: StageReport = serde_json::from_str(line.trim()).context("parse stage report")?;
    Ok(match report {
        StageReport::Pass { detail, extra } => StageOutcome::Pass { detail, extra },
        StageReport::Fail {
            error_class,
            reason,
        } => StageOutcome::failed(error_class, reason),
    })
}

/// Runs `<argv...> <stage> <run_id>`.
#[derive(Debug, Clone)]
pub struct CommandStageWorker {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl StageWorker for CommandStageWorker {
    #[instrument(skip_all, fields(run_id = %ctx.run_id, stage = %ctx.stage, retries = ctx.retries))]
    fn run_stage(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let mut cmd = command_from_argv(&self.argv, &self.workdir)?;
        cmd.arg(ctx.stage.as_str())
            .arg(&ctx.run_id)
            .env("STEWARD_STAGE_RETRIES", ctx.retries.to_string());
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run stage {}", ctx.stage))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "stage timed out");
            return Ok(StageOutcome::failed(
                ErrorClass::StageTimeout,
                format!("stage {} timed out after {}s", ctx.stage, self.timeout.as_secs()),
            ));
        }

        let exited_cleanly = output.status.success();
        match parse_stage_report(&output.stdout_lossy()) {
            // A pass report only counts with a zero exit status.
            Ok(StageOutcome::Pass { .. }) if !exited_cleanly => Ok(exit_failure(ctx, &output)),
            Ok(outcome) => {
                debug!(?outcome, "stage report parsed");
                Ok(outcome)
            }
            Err(err) if !exited_cleanly => {
                debug!(err = %err, "no parseable report from failed stage");
                Ok(exit_failure(ctx, &output))
            }
            Err(err) => Err(err).with_context(|| format!("stage {} report", ctx.stage)),
        }
    }
}

fn exit_failure(ctx: &StageContext, output: &CommandOutput) -> StageOutcome {
    StageOutcome::failed(
        ErrorClass::StageFailed,
        format!(
            "stage {} exited with status {:?}: {}",
            ctx.stage,
            output.status.code(),
            output.stderr_tail()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pass_with_detail() {
        let outcome = parse_stage_report(
            "log line\n{\"status\":\"pass\",\"detail\":{\"kind\":\"session\",\"valid\":true}}\n",
        )
        .expect("parse");
        assert_eq!(outcome, StageOutcome::pass(StageDetail::Session { valid: true }));
    }

    #[test]
    fn parses_pass_without_detail() {
        let outcome = parse_stage_report(r#"{"status":"pass"}"#).expect("parse");
        assert_eq!(outcome, StageOutcome::pass(StageDetail::None));
    }

    #[test]
    fn keeps_extra_fields_from_pass_report() {
        let outcome = parse_stage_report(
            r#"{"status":"pass","extra":{"artifact":"proofs/phase0.json","rows":12}}"#,
        )
        .expect("parse");
        let StageOutcome::Pass { detail, extra } = outcome else {
            panic!("expected pass, got {outcome:?}");
        };
        assert_eq!(detail, StageDetail::None);
        assert_eq!(extra["artifact"], "proofs/phase0.json");
        assert_eq!(extra["rows"], 12);
    }

    #[test]
    fn parses_classified_failure() {
        let outcome = parse_stage_report(
            r#"{"status":"fail","error_class":"SESSION_EXPIRED","reason":"cookie expired"}"#,
        )
        .expect("parse");
        assert_eq!(
            outcome,
            StageOutcome::failed(ErrorClass::SessionExpired, "cookie expired")
        );
    }

    #[test]
    fn rejects_unknown_class_and_empty_output() {
        assert!(parse_stage_report(r#"{"status":"fail","error_class":"NOPE"}"#).is_err());
        assert!(parse_stage_report("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failed_exit_without_report_is_stage_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let worker = CommandStageWorker {
            argv: vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 4".to_string()],
            workdir: temp.path().to_path_buf(),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1024,
        };
        let outcome = worker
            .run_stage(&StageContext {
                run_id: "run-1".to_string(),
                stage: Stage::Phase0,
                retries: 0,
            })
            .expect("run");
        match outcome {
            StageOutcome::Failed(failure) => {
                assert_eq!(failure.error_class, ErrorClass::StageFailed);
                assert!(failure.reason.contains("boom"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
