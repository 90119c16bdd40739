//! Shared deterministic types for steward core logic.
//!
//! These types define stable contracts between the evaluator, the reconciler,
//! and the stage pipeline. They carry no I/O and serialize to stable JSON.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error_class::ErrorClass;
use crate::core::playbook::Playbook;

/// A named boolean health check reported by the health-check collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invariant {
    pub id: String,
    pub pass: bool,
}

impl Invariant {
    pub fn new(id: impl Into<String>, pass: bool) -> Self {
        Self {
            id: id.into(),
            pass,
        }
    }
}

/// Ordered pipeline stages. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConnectorsStatus,
    SessionCheck,
    CaptureInteractive,
    Phase0,
    FinishPlan,
    AcceptanceGate,
    Done,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::ConnectorsStatus,
        Stage::SessionCheck,
        Stage::CaptureInteractive,
        Stage::Phase0,
        Stage::FinishPlan,
        Stage::AcceptanceGate,
        Stage::Done,
    ];

    pub fn first() -> Stage {
        Stage::ConnectorsStatus
    }

    /// Next stage in order; `Done` is its own successor.
    pub fn next(self) -> Stage {
        match self {
            Stage::ConnectorsStatus => Stage::SessionCheck,
            Stage::SessionCheck => Stage::CaptureInteractive,
            Stage::CaptureInteractive => Stage::Phase0,
            Stage::Phase0 => Stage::FinishPlan,
            Stage::FinishPlan => Stage::AcceptanceGate,
            Stage::AcceptanceGate | Stage::Done => Stage::Done,
        }
    }

    /// Stages that perform external side effects and must pass the gate first.
    pub fn is_side_effecting(self) -> bool {
        matches!(
            self,
            Stage::CaptureInteractive | Stage::Phase0 | Stage::FinishPlan
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ConnectorsStatus => "connectors_status",
            Stage::SessionCheck => "session_check",
            Stage::CaptureInteractive => "capture_interactive",
            Stage::Phase0 => "phase0",
            Stage::FinishPlan => "finish_plan",
            Stage::AcceptanceGate => "acceptance_gate",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Running,
    Pass,
    Fail,
    /// Blocked on a session problem; one interactive recovery may follow.
    Blocked,
    /// Blocked with no automated recovery left; waiting for a human.
    BlockedFinal,
}

/// Stage-specific payload reported by the stage worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    #[default]
    None,
    Connectors {
        connected: Vec<String>,
        #[serde(default)]
        missing: Vec<String>,
    },
    Session {
        valid: bool,
    },
    Capture {
        #[serde(default)]
        artifacts: Vec<String>,
    },
    Phase0 {
        records_processed: u64,
    },
    Plan {
        #[serde(default)]
        plan_path: Option<String>,
    },
    Acceptance {
        checks_passed: u32,
        checks_failed: u32,
    },
}

/// One entry per stage transition. The latest record for a stage is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub last_error_class: Option<ErrorClass>,
    /// Redacted, human-readable reason for a non-pass status.
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: StageDetail,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl StageRecord {
    pub fn running(stage: Stage, started_at: DateTime<Utc>, retries: u32) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            started_at,
            finished_at: None,
            retries,
            last_error_class: None,
            reason: None,
            detail: StageDetail::None,
            extra: BTreeMap::new(),
        }
    }

    /// Finish this record with a terminal (non-running) status.
    pub fn finish(
        mut self,
        status: StageStatus,
        finished_at: DateTime<Utc>,
        error: Option<(ErrorClass, String)>,
    ) -> Self {
        self.status = status;
        self.finished_at = Some(finished_at);
        match error {
            Some((class, reason)) => {
                self.last_error_class = Some(class);
                self.reason = Some(reason);
            }
            None => {
                self.last_error_class = None;
                self.reason = None;
            }
        }
        self
    }
}

/// Machine-readable state of one pipeline run.
///
/// Holds only the latest record per stage, plus a pointer to the stage whose
/// record was written most recently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Set once the single interactive recovery for this run has been spent.
    pub recovery_used: bool,
    pub last_stage: Option<Stage>,
    pub records: Vec<StageRecord>,
}

impl PipelineRun {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            recovery_used: false,
            last_stage: None,
            records: Vec::new(),
        }
    }

    pub fn record(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.iter().find(|record| record.stage == stage)
    }

    /// Most recently written record, if any.
    pub fn latest(&self) -> Option<&StageRecord> {
        self.last_stage.and_then(|stage| self.record(stage))
    }

    /// Replace the record for `record.stage`, keeping records in stage order.
    pub fn upsert(&mut self, record: StageRecord) {
        self.last_stage = Some(record.stage);
        match self
            .records
            .iter_mut()
            .find(|existing| existing.stage == record.stage)
        {
            Some(existing) => *existing = record,
            None => {
                self.records.push(record);
                self.records.sort_by_key(|r| r.stage);
            }
        }
    }
}

/// Baseline verification status from the project-state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineStatus {
    Pass,
    Fail,
    #[default]
    Unknown,
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BaselineStatus::Pass => "PASS",
            BaselineStatus::Fail => "FAIL",
            BaselineStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Final status of a reconcile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Pass,
    Fail,
}

/// Result of one reconcile invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub lock_acquired: bool,
    pub attempts: u32,
    pub final_status: FinalStatus,
    pub applied_playbook: Option<Playbook>,
    pub error_class: Option<ErrorClass>,
    /// Invariant ids still failing at the end of the invocation.
    pub failing_invariants: Vec<String>,
}

impl RemediationOutcome {
    pub fn lock_held() -> Self {
        Self {
            lock_acquired: false,
            attempts: 0,
            final_status: FinalStatus::Fail,
            applied_playbook: None,
            error_class: Some(ErrorClass::LockHeld),
            failing_invariants: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.final_status == FinalStatus::Pass
    }
}
