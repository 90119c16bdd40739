//! Resume-point selection from persisted pipeline state.
//!
//! A restarted process never re-runs stages that already passed; it picks up
//! from the most recently written stage record.

use serde::Serialize;

use crate::core::error_class::ErrorClass;
use crate::core::types::{PipelineRun, Stage, StageStatus};

/// Where the next pipeline invocation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumePoint {
    /// No usable run state; start a new run at the first stage.
    Fresh,
    /// The previous run failed terminally; start a new run at the first stage.
    Restart {
        failed_stage: Stage,
        error_class: Option<ErrorClass>,
    },
    /// Continue the persisted run at `stage`.
    Continue { stage: Stage, retries: u32 },
    /// The run already reached `done`; reentry is a no-op.
    Completed,
    /// A stage is waiting for a human; only a clearance check may run.
    AwaitingHuman {
        stage: Stage,
        error_class: Option<ErrorClass>,
    },
}

pub fn resume_point(run: Option<&PipelineRun>) -> ResumePoint {
    let Some(run) = run else {
        return ResumePoint::Fresh;
    };
    let Some(latest) = run.latest() else {
        return ResumePoint::Continue {
            stage: Stage::first(),
            retries: 0,
        };
    };

    match latest.status {
        StageStatus::Pass if latest.stage == Stage::Done => ResumePoint::Completed,
        StageStatus::Pass => ResumePoint::Continue {
            stage: latest.stage.next(),
            retries: 0,
        },
        // Crashed mid-stage or mid-recovery: re-run the same stage.
        StageStatus::Running | StageStatus::Blocked => ResumePoint::Continue {
            stage: latest.stage,
            retries: latest.retries.saturating_add(1),
        },
        StageStatus::Fail => match latest.last_error_class {
            Some(class) if class.is_retryable() => ResumePoint::Continue {
                stage: latest.stage,
                retries: latest.retries.saturating_add(1),
            },
            _ => ResumePoint::Restart {
                failed_stage: latest.stage,
                error_class: latest.last_error_class,
            },
        },
        StageStatus::BlockedFinal => ResumePoint::AwaitingHuman {
            stage: latest.stage,
            error_class: latest.last_error_class,
        },
    }
}
