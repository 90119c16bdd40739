//! Lock-protected, bounded remediation loop for `steward reconcile`.
//!
//! One invocation takes the reconcile lock, then alternates health checks and
//! playbook application until every invariant passes or `max_attempts` is
//! spent. Re-invocation on a cadence is the scheduler's job, not this loop's.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::core::error_class::ErrorClass;
use crate::core::playbook::{Playbook, failing_ids, select_playbook};
use crate::core::redact::redact_secrets;
use crate::core::types::{FinalStatus, Invariant, RemediationOutcome};
use crate::io::health::HealthCheck;
use crate::io::lock::{LockError, try_acquire};
use crate::io::remediation::Remediator;

/// Failure inside a single attempt. Each variant consumes the attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("health check failed: {0:#}")]
    HealthCheck(anyhow::Error),
    #[error("remediation {playbook} failed: {err:#}")]
    Remediation {
        playbook: Playbook,
        err: anyhow::Error,
    },
}

impl AttemptError {
    pub fn error_class(&self) -> ErrorClass {
        match self {
            AttemptError::HealthCheck(_) => ErrorClass::HealthCheckFailed,
            AttemptError::Remediation { .. } => ErrorClass::RemediationFailed,
        }
    }
}

/// What happened during one attempt, for reports and callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub failing_before: Vec<String>,
    pub playbook: Option<Playbook>,
    pub failing_after: Vec<String>,
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
}

impl AttemptRecord {
    fn new(attempt: u32) -> Self {
        Self {
            attempt,
            failing_before: Vec::new(),
            playbook: None,
            failing_after: Vec::new(),
            error_class: None,
            error: None,
        }
    }
}

fn failing_list(invariants: &[Invariant]) -> Vec<String> {
    failing_ids(invariants)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Returns `Ok(true)` once every invariant passes.
///
/// `latest` holds the previous attempt's post-remediation gather. It is used
/// in place of a fresh gather and replaced by this attempt's.
fn run_attempt<H: HealthCheck, R: Remediator>(
    health: &H,
    remediator: &R,
    record: &mut AttemptRecord,
    latest: &mut Option<Vec<Invariant>>,
) -> Result<bool, AttemptError> {
    let before = match latest.take() {
        Some(invariants) => invariants,
        None => health.gather().map_err(AttemptError::HealthCheck)?,
    };
    record.failing_before = failing_list(&before);
    if record.failing_before.is_empty() {
        return Ok(true);
    }

    let playbook = select_playbook(&before);
    record.playbook = Some(playbook);
    remediator
        .apply(playbook)
        .map_err(|err| AttemptError::Remediation { playbook, err })?;

    let after = health.gather().map_err(AttemptError::HealthCheck)?;
    record.failing_after = failing_list(&after);
    *latest = Some(after);
    Ok(record.failing_after.is_empty())
}

/// Run one reconcile pass.
///
/// A held lock yields a `LOCK_HELD` outcome with zero remediations. The lock
/// guard is dropped on every return path.
#[instrument(skip_all, fields(lock = %lock_path.display(), max_attempts))]
pub fn reconcile<H: HealthCheck, R: Remediator, F: FnMut(&AttemptRecord)>(
    lock_path: &Path,
    health: &H,
    remediator: &R,
    max_attempts: u32,
    mut on_attempt: F,
) -> Result<RemediationOutcome> {
    if max_attempts == 0 {
        return Err(anyhow!("max_attempts must be > 0"));
    }

    let _guard = match try_acquire(lock_path) {
        Ok(guard) => guard,
        Err(LockError::Held { path }) => {
            warn!(lock = %path.display(), error_class = %ErrorClass::LockHeld, "reconcile already running");
            return Ok(RemediationOutcome::lock_held());
        }
        Err(err) => return Err(err).context("acquire reconcile lock"),
    };

    let mut applied: Option<Playbook> = None;
    let mut last_error: Option<ErrorClass> = None;
    let mut failing: Vec<String> = Vec::new();
    let mut latest: Option<Vec<Invariant>> = None;

    for attempt in 1..=max_attempts {
        let mut record = AttemptRecord::new(attempt);
        let result = run_attempt(health, remediator, &mut record, &mut latest);
        if record.playbook.is_some() {
            applied = record.playbook;
        }

        match result {
            Ok(true) => {
                on_attempt(&record);
                info!(attempt, applied_playbook = ?applied, "all invariants pass");
                return Ok(RemediationOutcome {
                    lock_acquired: true,
                    attempts: attempt,
                    final_status: FinalStatus::Pass,
                    applied_playbook: applied,
                    error_class: None,
                    failing_invariants: Vec::new(),
                });
            }
            Ok(false) => {
                last_error = None;
                failing = record.failing_after.clone();
                warn!(attempt, playbook = ?record.playbook, failing = ?failing, "invariants still failing");
            }
            Err(err) => {
                let class = err.error_class();
                let message = redact_secrets(&err.to_string());
                error!(attempt, error_class = %class, err = %message, "reconcile attempt failed");
                if !record.failing_before.is_empty() {
                    failing = record.failing_before.clone();
                }
                last_error = Some(class);
                record.error_class = Some(class);
                record.error = Some(message);
            }
        }
        on_attempt(&record);
    }

    let error_class = last_error.unwrap_or(ErrorClass::RemediationExhausted);
    warn!(
        attempts = max_attempts,
        applied_playbook = ?applied,
        error_class = %error_class,
        "remediation attempts exhausted"
    );
    Ok(RemediationOutcome {
        lock_acquired: true,
        attempts: max_attempts,
        final_status: FinalStatus::Fail,
        applied_playbook: applied,
        error_class: Some(error_class),
        failing_invariants: failing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::lock::try_acquire;
    use crate::test_support::{ScriptedHealth, ScriptedRemediator, failing, passing};

    fn lock_path(temp: &tempfile::TempDir) -> std::path::PathBuf {
        temp.path().join("locks/reconcile.lock")
    }

    #[test]
    fn healthy_system_applies_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::new(vec![Ok(passing(&["novnc_http_200"]))]);
        let remediator = ScriptedRemediator::succeeding();

        let outcome =
            reconcile(&lock_path(&temp), &health, &remediator, 3, |_| {}).expect("reconcile");
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.applied_playbook, None);
        assert!(remediator.applied().is_empty());
    }

    #[test]
    fn frontdoor_failure_applies_frontdoor_playbook() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::new(vec![
            Ok(failing(&["serve_single_root_targets_frontdoor"])),
            Ok(passing(&["serve_single_root_targets_frontdoor"])),
        ]);
        let remediator = ScriptedRemediator::succeeding();

        let outcome =
            reconcile(&lock_path(&temp), &health, &remediator, 3, |_| {}).expect("reconcile");
        assert_eq!(outcome.final_status, FinalStatus::Pass);
        assert_eq!(outcome.applied_playbook, Some(Playbook::ReconcileFrontdoorServe));
        assert_eq!(remediator.applied(), vec![Playbook::ReconcileFrontdoorServe]);
    }

    #[test]
    fn exhausts_attempts_without_exceeding_bound() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::repeating(Ok(failing(&["novnc_http_200"])));
        let remediator = ScriptedRemediator::succeeding();
        let mut seen = Vec::new();

        let outcome = reconcile(&lock_path(&temp), &health, &remediator, 2, |record| {
            seen.push(record.attempt)
        })
        .expect("reconcile");

        assert_eq!(outcome.final_status, FinalStatus::Fail);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.applied_playbook, Some(Playbook::RecoverNovncWs));
        assert_eq!(outcome.error_class, Some(ErrorClass::RemediationExhausted));
        assert_eq!(outcome.failing_invariants, vec!["novnc_http_200".to_string()]);
        assert_eq!(remediator.applied().len(), 2);
        assert_eq!(seen, vec![1, 2]);
        // One initial gather plus one after each remediation.
        assert_eq!(health.calls(), 3);
    }

    #[test]
    fn next_attempt_starts_from_previous_post_remediation_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::new(vec![
            Ok(failing(&["frontdoor_http_200"])),
            Ok(failing(&["novnc_ws_upgrade"])),
            Ok(passing(&["frontdoor_http_200", "novnc_ws_upgrade"])),
        ]);
        let remediator = ScriptedRemediator::succeeding();
        let mut records = Vec::new();

        let outcome = reconcile(&lock_path(&temp), &health, &remediator, 3, |record| {
            records.push(record.clone())
        })
        .expect("reconcile");
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(health.calls(), 3);
        assert_eq!(
            remediator.applied(),
            vec![Playbook::ReconcileFrontdoorServe, Playbook::RecoverNovncWs]
        );
        assert_eq!(records[1].failing_before, records[0].failing_after);
    }

    #[test]
    fn remediation_errors_consume_attempts_and_release_lock() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::repeating(Ok(failing(&["unrelated_check"])));
        let remediator = ScriptedRemediator::failing();

        let outcome =
            reconcile(&lock_path(&temp), &health, &remediator, 3, |_| {}).expect("reconcile");
        assert_eq!(outcome.final_status, FinalStatus::Fail);
        assert_eq!(outcome.error_class, Some(ErrorClass::RemediationFailed));
        assert_eq!(outcome.applied_playbook, Some(Playbook::RestartUiStack));
        assert_eq!(remediator.applied().len(), 3);
        assert_eq!(health.calls(), 3);

        let _again = try_acquire(&lock_path(&temp)).expect("lock released after failures");
    }

    #[test]
    fn health_check_error_is_distinguished() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::new(vec![
            Err("probe timed out".to_string()),
            Ok(passing(&["novnc_http_200"])),
        ]);
        let remediator = ScriptedRemediator::succeeding();
        let mut classes = Vec::new();

        let outcome = reconcile(&lock_path(&temp), &health, &remediator, 3, |record| {
            classes.push(record.error_class)
        })
        .expect("reconcile");
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(classes, vec![Some(ErrorClass::HealthCheckFailed), None]);
    }

    #[test]
    fn held_lock_fails_fast_with_zero_remediations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let _held = try_acquire(&lock_path(&temp)).expect("hold lock");
        let health = ScriptedHealth::repeating(Ok(failing(&["novnc_http_200"])));
        let remediator = ScriptedRemediator::succeeding();

        let outcome =
            reconcile(&lock_path(&temp), &health, &remediator, 3, |_| {}).expect("reconcile");
        assert_eq!(outcome, RemediationOutcome::lock_held());
        assert!(remediator.applied().is_empty());
        assert_eq!(health.calls(), 0);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let health = ScriptedHealth::repeating(Ok(Vec::new()));
        let remediator = ScriptedRemediator::succeeding();
        assert!(reconcile(&lock_path(&temp), &health, &remediator, 0, |_| {}).is_err());
    }
}
