//! Pure policy gate consulted before any side-effecting action.

use serde::Serialize;

use crate::core::error_class::ErrorClass;
use crate::core::types::BaselineStatus;

/// Flags read from the project-state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    pub kill_switch: bool,
    pub baseline_status: BaselineStatus,
    pub allow_flag: bool,
}

/// Allow/deny decision. `reason` is empty when allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
    pub error_class: Option<ErrorClass>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
            error_class: None,
        }
    }

    fn deny(class: ErrorClass, reason: String) -> Self {
        Self {
            allowed: false,
            reason,
            error_class: Some(class),
        }
    }
}

/// First failing check wins: kill switch, then allow flag, then baseline.
pub fn is_action_allowed(state: &GateState) -> GateDecision {
    if state.kill_switch {
        return GateDecision::deny(
            ErrorClass::KillSwitchActive,
            "kill switch is active (kill_switch=true)".to_string(),
        );
    }
    if !state.allow_flag {
        return GateDecision::deny(
            ErrorClass::AllowFlagDisabled,
            "allow flag is false; action requires allow_flag=true".to_string(),
        );
    }
    if state.baseline_status != BaselineStatus::Pass {
        return GateDecision::deny(
            ErrorClass::BaselineNotPass,
            format!(
                "baseline status is {}; action requires baseline PASS",
                state.baseline_status
            ),
        );
    }
    GateDecision::allow()
}
