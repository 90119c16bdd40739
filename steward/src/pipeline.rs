//! Resumable stage pipeline for `steward pipeline run`.
//!
//! Drives the fixed stage order through a [`StageWorker`], persisting one
//! record per stage transition so a restarted process resumes where the last
//! one stopped. A blocked stage gets at most one interactive recovery per run.
//! Human-required failures and failed or exhausted recovery park the run until
//! the clearance probe passes.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::error_class::ErrorClass;
use crate::core::gate::{GateState, is_action_allowed};
use crate::core::redact::redact_secrets;
use crate::core::resume::{ResumePoint, resume_point};
use crate::core::types::{PipelineRun, Stage, StageRecord, StageStatus};
use crate::exit_codes;
use crate::io::pipeline_store::PipelineStore;
use crate::io::recovery::{ClearanceProbe, InteractiveRecovery, RecoveryContext};
use crate::io::stage_worker::{StageContext, StageOutcome, StageWorker};

/// How a pipeline invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineOutcome {
    /// Reached `done` during this invocation.
    Completed { run_id: String },
    /// The persisted run was already done; nothing ran.
    AlreadyDone { run_id: String },
    /// The run aborted on a non-recoverable or denied stage.
    Failed {
        run_id: String,
        stage: Stage,
        error_class: ErrorClass,
        reason: String,
    },
    /// A stage is parked until an operator clears the condition.
    WaitingForHuman {
        run_id: String,
        stage: Stage,
        error_class: ErrorClass,
        reason: String,
    },
}

impl PipelineOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            PipelineOutcome::Completed { run_id }
            | PipelineOutcome::AlreadyDone { run_id }
            | PipelineOutcome::Failed { run_id, .. }
            | PipelineOutcome::WaitingForHuman { run_id, .. } => run_id,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineOutcome::Completed { .. } | PipelineOutcome::AlreadyDone { .. } => {
                exit_codes::OK
            }
            PipelineOutcome::Failed { .. } | PipelineOutcome::WaitingForHuman { .. } => {
                exit_codes::FAILED
            }
        }
    }
}

/// `run-<YYYYMMDD_HHMMSS>-<6 lowercase alphanumerics>`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("run-{}-{suffix}", now.format("%Y%m%d_%H%M%S"))
}

/// Collaborators for one invocation. The gate state is a snapshot taken
/// before the run starts.
pub struct Pipeline<'a, W, R, P> {
    pub store: &'a PipelineStore,
    pub gate: &'a GateState,
    pub worker: &'a W,
    pub recovery: &'a R,
    pub probe: &'a P,
}

impl<W: StageWorker, R: InteractiveRecovery, P: ClearanceProbe> Pipeline<'_, W, R, P> {
    #[instrument(skip_all)]
    pub fn run(&self) -> Result<PipelineOutcome> {
        let loaded = self.store.load()?;
        let point = resume_point(loaded.as_ref());
        info!(?point, "resume point");

        let (run, stage, retries) = match point {
            ResumePoint::Fresh => (self.start_run("run started")?, Stage::first(), 0),
            ResumePoint::Restart {
                failed_stage,
                error_class,
            } => {
                let class = error_class.map_or("none", ErrorClass::as_str);
                let note = format!("previous run failed at {failed_stage} ({class}); run restarted");
                (self.start_run(&note)?, Stage::first(), 0)
            }
            ResumePoint::Continue { stage, retries } => {
                let run = loaded.ok_or_else(|| anyhow!("resume point without pipeline state"))?;
                info!(run_id = %run.run_id, %stage, retries, "resuming run");
                (run, stage, retries)
            }
            ResumePoint::Completed => {
                let run = loaded.ok_or_else(|| anyhow!("completed point without pipeline state"))?;
                info!(run_id = %run.run_id, "run already done");
                return Ok(PipelineOutcome::AlreadyDone { run_id: run.run_id });
            }
            ResumePoint::AwaitingHuman { stage, error_class } => {
                let run = loaded.ok_or_else(|| anyhow!("awaiting point without pipeline state"))?;
                match self.check_clearance(&run, stage, error_class)? {
                    Some(waiting) => return Ok(waiting),
                    None => {
                        let retries = run
                            .record(stage)
                            .map_or(0, |record| record.retries.saturating_add(1));
                        (run, stage, retries)
                    }
                }
            }
        };

        self.drive(run, stage, retries)
    }

    fn start_run(&self, note: &str) -> Result<PipelineRun> {
        let now = Utc::now();
        let run = PipelineRun::new(new_run_id(now), now);
        self.store.save(&run)?;
        self.store.note(&format!("{} `{}` {note}", now.to_rfc3339(), run.run_id))?;
        info!(run_id = %run.run_id, "{note}");
        Ok(run)
    }

    /// Only the probe runs while a stage waits for a human. `None` means cleared.
    fn check_clearance(
        &self,
        run: &PipelineRun,
        stage: Stage,
        error_class: Option<ErrorClass>,
    ) -> Result<Option<PipelineOutcome>> {
        let cleared = self
            .probe
            .cleared(stage, error_class)
            .with_context(|| format!("clearance probe for {stage}"))?;
        if cleared {
            info!(run_id = %run.run_id, %stage, "human-required condition cleared");
            self.store.note(&format!(
                "{} `{}` {stage} cleared by operator",
                Utc::now().to_rfc3339(),
                run.run_id
            ))?;
            return Ok(None);
        }

        let reason = run
            .record(stage)
            .and_then(|record| record.reason.clone())
            .unwrap_or_default();
        warn!(run_id = %run.run_id, %stage, "still waiting for human");
        Ok(Some(PipelineOutcome::WaitingForHuman {
            run_id: run.run_id.clone(),
            stage,
            error_class: error_class.unwrap_or(ErrorClass::InvalidState),
            reason,
        }))
    }

    fn drive(&self, mut run: PipelineRun, mut stage: Stage, mut retries: u32) -> Result<PipelineOutcome> {
        loop {
            if stage == Stage::Done {
                let now = Utc::now();
                let record =
                    StageRecord::running(Stage::Done, now, 0).finish(StageStatus::Pass, now, None);
                self.store.record(&mut run, record)?;
                info!(run_id = %run.run_id, "pipeline done");
                return Ok(PipelineOutcome::Completed { run_id: run.run_id });
            }

            if stage.is_side_effecting() {
                let decision = is_action_allowed(self.gate);
                if !decision.allowed {
                    let class = decision.error_class.unwrap_or(ErrorClass::InvalidState);
                    warn!(run_id = %run.run_id, %stage, error_class = %class, reason = %decision.reason, "gate denied stage");
                    let now = Utc::now();
                    let record = StageRecord::running(stage, now, retries).finish(
                        StageStatus::Fail,
                        now,
                        Some((class, decision.reason.clone())),
                    );
                    self.store.record(&mut run, record)?;
                    return Ok(failed(run, stage, class, decision.reason));
                }
            }

            let started_at = Utc::now();
            let running = StageRecord::running(stage, started_at, retries);
            self.store.record(&mut run, running.clone())?;
            info!(run_id = %run.run_id, %stage, retries, "stage running");

            let ctx = StageContext {
                run_id: run.run_id.clone(),
                stage,
                retries,
            };
            let outcome = match self.worker.run_stage(&ctx) {
                Ok(outcome) => outcome,
                Err(err) => {
                    let reason = redact_secrets(&format!("{err:#}"));
                    let record = running.finish(
                        StageStatus::Fail,
                        Utc::now(),
                        Some((ErrorClass::Internal, reason)),
                    );
                    self.store.record(&mut run, record)?;
                    return Err(err).with_context(|| format!("stage {stage} worker"));
                }
            };

            let failure = match outcome {
                StageOutcome::Pass { detail, extra } => {
                    let mut record = running.finish(StageStatus::Pass, Utc::now(), None);
                    record.detail = detail;
                    record.extra = extra;
                    self.store.record(&mut run, record)?;
                    info!(run_id = %run.run_id, %stage, "stage passed");
                    stage = stage.next();
                    retries = 0;
                    continue;
                }
                StageOutcome::Failed(failure) => failure,
            };

            let class = failure.error_class;
            let reason = redact_secrets(&failure.reason);

            if class.needs_interactive_recovery() {
                let record = running.clone().finish(
                    StageStatus::Blocked,
                    Utc::now(),
                    Some((class, reason.clone())),
                );
                self.store.record(&mut run, record)?;
                warn!(run_id = %run.run_id, %stage, error_class = %class, "stage blocked");

                if run.recovery_used {
                    let reason = format!("{stage} blocked again after interactive recovery: {reason}");
                    return self.escalate(run, &running, ErrorClass::RecoveryExhausted, reason);
                }

                // Persist the spent recovery before invoking it so a crash cannot grant a second one.
                run.recovery_used = true;
                self.store.save(&run)?;
                let recovered = self.recover(&run, stage, class);
                if !recovered {
                    let reason = format!("interactive recovery for {stage} failed after {class}");
                    return self.escalate(run, &running, ErrorClass::InteractiveRecoveryFailed, reason);
                }
                retries = retries.saturating_add(1);
                continue;
            }

            if class.requires_human() {
                return self.escalate(run, &running, class, reason);
            }

            return self.abort(run, &running, class, reason);
        }
    }

    fn recover(&self, run: &PipelineRun, stage: Stage, error_class: ErrorClass) -> bool {
        let ctx = RecoveryContext {
            run_id: run.run_id.clone(),
            stage,
            error_class,
        };
        match self.recovery.recover(&ctx) {
            Ok(recovered) => recovered,
            Err(err) => {
                warn!(%stage, err = %redact_secrets(&format!("{err:#}")), "interactive recovery errored");
                false
            }
        }
    }

    /// Parks the stage as `BLOCKED_FINAL`; later invocations only run the
    /// clearance probe until an operator clears it.
    fn escalate(
        &self,
        mut run: PipelineRun,
        running: &StageRecord,
        class: ErrorClass,
        reason: String,
    ) -> Result<PipelineOutcome> {
        let stage = running.stage;
        let record = running.clone().finish(
            StageStatus::BlockedFinal,
            Utc::now(),
            Some((class, reason.clone())),
        );
        self.store.record(&mut run, record)?;
        warn!(run_id = %run.run_id, %stage, error_class = %class, "waiting for human");
        Ok(PipelineOutcome::WaitingForHuman {
            run_id: run.run_id,
            stage,
            error_class: class,
            reason,
        })
    }

    fn abort(
        &self,
        mut run: PipelineRun,
        running: &StageRecord,
        class: ErrorClass,
        reason: String,
    ) -> Result<PipelineOutcome> {
        let stage = running.stage;
        let record = running
            .clone()
            .finish(StageStatus::Fail, Utc::now(), Some((class, reason.clone())));
        self.store.record(&mut run, record)?;
        warn!(run_id = %run.run_id, %stage, error_class = %class, "stage failed; run aborted");
        Ok(failed(run, stage, class, reason))
    }
}

fn failed(run: PipelineRun, stage: Stage, error_class: ErrorClass, reason: String) -> PipelineOutcome {
    PipelineOutcome::Failed {
        run_id: run.run_id,
        stage,
        error_class,
        reason,
    }
}
