//! Read-only snapshot of the shared project-state document.
//!
//! Loaded once at the start of each invocation and never written by steward.
//! A missing document or flag evaluates fail-closed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::gate::GateState;
use crate::core::types::BaselineStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    pub kill_switch: bool,
    pub baseline: Baseline,
    pub allow_flags: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Baseline {
    pub status: BaselineStatus,
}

impl ProjectState {
    /// Gate inputs for the action guarded by `allow_flag`.
    pub fn gate_state(&self, allow_flag: &str) -> GateState {
        GateState {
            kill_switch: self.kill_switch,
            baseline_status: self.baseline.status,
            allow_flag: self.allow_flags.get(allow_flag).copied().unwrap_or(false),
        }
    }
}

pub fn load_project_state(path: &Path) -> Result<ProjectState> {
    if !path.exists() {
        warn!(path = %path.display(), "project state missing; gate will deny");
        return Ok(ProjectState::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read project state {}", path.display()))?;
    let state: ProjectState = serde_json::from_str(&contents)
        .with_context(|| format!("parse project state {}", path.display()))?;
    debug!(
        kill_switch = state.kill_switch,
        baseline = %state.baseline.status,
        flags = state.allow_flags.len(),
        "project state loaded"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::is_action_allowed;

    #[test]
    fn missing_document_fails_closed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = load_project_state(&temp.path().join("missing.json")).expect("load");
        let decision = is_action_allowed(&state.gate_state("pipeline_side_effects"));
        assert!(!decision.allowed);
    }

    #[test]
    fn parses_document_and_missing_flag_is_false() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("project_state.json");
        fs::write(
            &path,
            r#"{"kill_switch":false,"baseline":{"status":"PASS"},"allow_flags":{"pipeline_side_effects":true},"owner":"ops"}"#,
        )
        .expect("write");
        let state = load_project_state(&path).expect("load");

        let gate = state.gate_state("pipeline_side_effects");
        assert_eq!(
            gate,
            GateState {
                kill_switch: false,
                baseline_status: BaselineStatus::Pass,
                allow_flag: true,
            }
        );
        assert!(!state.gate_state("deploy").allow_flag);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("project_state.json");
        fs::write(&path, "{not json").expect("write");
        assert!(load_project_state(&path).is_err());
    }
}
