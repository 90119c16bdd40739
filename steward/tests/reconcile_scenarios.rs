//! End-to-end reconcile scenarios through the public API.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use steward::core::error_class::ErrorClass;
use steward::core::gate::{GateState, is_action_allowed};
use steward::core::playbook::Playbook;
use steward::core::types::{BaselineStatus, FinalStatus};
use steward::io::lock::try_acquire;
use steward::io::paths::StewardPaths;
use steward::reconcile::reconcile;
use steward::test_support::{ScriptedHealth, ScriptedRemediator, failing, passing};

fn first_playbook(failing_ids: &[&str]) -> Option<Playbook> {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = StewardPaths::new(temp.path());
    let health = ScriptedHealth::new(vec![Ok(failing(failing_ids)), Ok(passing(failing_ids))]);
    let remediator = ScriptedRemediator::succeeding();
    let outcome = reconcile(&paths.reconcile_lock_path, &health, &remediator, 3, |_| {})
        .expect("reconcile");
    assert_eq!(outcome.final_status, FinalStatus::Pass);
    assert_eq!(remediator.applied().len(), 1);
    outcome.applied_playbook
}

#[test]
fn selects_playbook_per_failing_invariant() {
    assert_eq!(
        first_playbook(&["serve_single_root_targets_frontdoor"]),
        Some(Playbook::ReconcileFrontdoorServe)
    );
    assert_eq!(
        first_playbook(&["novnc_http_200"]),
        Some(Playbook::RecoverNovncWs)
    );
    assert_eq!(
        first_playbook(&["unrelated_check"]),
        Some(Playbook::DEFAULT)
    );
}

#[test]
fn gate_scenarios() {
    let allowed = is_action_allowed(&GateState {
        kill_switch: false,
        baseline_status: BaselineStatus::Pass,
        allow_flag: true,
    });
    assert!(allowed.allowed);
    assert!(allowed.reason.is_empty());

    let denied = is_action_allowed(&GateState {
        kill_switch: false,
        baseline_status: BaselineStatus::Unknown,
        allow_flag: true,
    });
    assert!(!denied.allowed);
    assert!(denied.reason.contains("baseline"));
    assert!(denied.reason.contains("PASS"));
}

/// A reconcile holding the lock in another thread makes a concurrent call
/// fail fast with `LOCK_HELD`.
#[test]
fn concurrent_reconcile_fails_fast() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock_path = StewardPaths::new(temp.path()).reconcile_lock_path;
    let (held_tx, held_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder_path = lock_path.clone();
    let holder = thread::spawn(move || {
        let guard = try_acquire(&holder_path).expect("first lock");
        held_tx.send(()).expect("signal");
        release_rx.recv_timeout(Duration::from_secs(10)).ok();
        drop(guard);
    });
    held_rx.recv_timeout(Duration::from_secs(10)).expect("holder ready");

    let health = ScriptedHealth::repeating(Ok(failing(&["novnc_ws_upgrade"])));
    let remediator = ScriptedRemediator::succeeding();
    let outcome = reconcile(&lock_path, &health, &remediator, 3, |_| {}).expect("reconcile");
    assert!(!outcome.lock_acquired);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.error_class, Some(ErrorClass::LockHeld));
    assert!(remediator.applied().is_empty());

    release_tx.send(()).expect("release");
    holder.join().expect("join");

    let outcome = reconcile(&lock_path, &health, &remediator, 1, |_| {}).expect("reconcile");
    assert!(outcome.lock_acquired);
    assert_eq!(remediator.applied(), vec![Playbook::RecoverNovncWs]);
}
