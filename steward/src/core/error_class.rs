//! Closed taxonomy of machine-matchable failure identifiers.
//!
//! Every terminal failure reported by the reconciler or the stage pipeline
//! carries one of these classes. Callers branch on the class, never on the
//! human-readable reason.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error identifier, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    SessionExpired,
    SessionUiBlocked,
    CaptureBlocked,
    LoginRequired,
    SecondFactorRequired,
    KillSwitchActive,
    AllowFlagDisabled,
    BaselineNotPass,
    TransportBlocked,
    RoutingBroken,
    HealthCheckFailed,
    RemediationFailed,
    RemediationExhausted,
    LockHeld,
    InteractiveRecoveryFailed,
    RecoveryExhausted,
    StageTimeout,
    StageFailed,
    InvalidState,
    Internal,
}

/// Coarse grouping that drives the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recoverable through exactly one interactive recovery attempt.
    BlockingSession,
    /// Only a human can clear it (login, second factor).
    HumanRequired,
    /// Gate rules; never retried, needs an external state change.
    PolicyDenial,
    /// Routing/transport problems owned by the reconciler playbooks.
    Infrastructure,
    /// Propagated as-is, no retry.
    Unrecoverable,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 20] = [
        ErrorClass::SessionExpired,
        ErrorClass::SessionUiBlocked,
        ErrorClass::CaptureBlocked,
        ErrorClass::LoginRequired,
        ErrorClass::SecondFactorRequired,
        ErrorClass::KillSwitchActive,
        ErrorClass::AllowFlagDisabled,
        ErrorClass::BaselineNotPass,
        ErrorClass::TransportBlocked,
        ErrorClass::RoutingBroken,
        ErrorClass::HealthCheckFailed,
        ErrorClass::RemediationFailed,
        ErrorClass::RemediationExhausted,
        ErrorClass::LockHeld,
        ErrorClass::InteractiveRecoveryFailed,
        ErrorClass::RecoveryExhausted,
        ErrorClass::StageTimeout,
        ErrorClass::StageFailed,
        ErrorClass::InvalidState,
        ErrorClass::Internal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::SessionExpired => "SESSION_EXPIRED",
            ErrorClass::SessionUiBlocked => "SESSION_UI_BLOCKED",
            ErrorClass::CaptureBlocked => "CAPTURE_BLOCKED",
            ErrorClass::LoginRequired => "LOGIN_REQUIRED",
            ErrorClass::SecondFactorRequired => "SECOND_FACTOR_REQUIRED",
            ErrorClass::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            ErrorClass::AllowFlagDisabled => "ALLOW_FLAG_DISABLED",
            ErrorClass::BaselineNotPass => "BASELINE_NOT_PASS",
            ErrorClass::TransportBlocked => "TRANSPORT_BLOCKED",
            ErrorClass::RoutingBroken => "ROUTING_BROKEN",
            ErrorClass::HealthCheckFailed => "HEALTH_CHECK_FAILED",
            ErrorClass::RemediationFailed => "REMEDIATION_FAILED",
            ErrorClass::RemediationExhausted => "REMEDIATION_EXHAUSTED",
            ErrorClass::LockHeld => "LOCK_HELD",
            ErrorClass::InteractiveRecoveryFailed => "INTERACTIVE_RECOVERY_FAILED",
            ErrorClass::RecoveryExhausted => "RECOVERY_EXHAUSTED",
            ErrorClass::StageTimeout => "STAGE_TIMEOUT",
            ErrorClass::StageFailed => "STAGE_FAILED",
            ErrorClass::InvalidState => "INVALID_STATE",
            ErrorClass::Internal => "INTERNAL",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorClass::SessionExpired
            | ErrorClass::SessionUiBlocked
            | ErrorClass::CaptureBlocked => ErrorCategory::BlockingSession,
            ErrorClass::LoginRequired | ErrorClass::SecondFactorRequired => {
                ErrorCategory::HumanRequired
            }
            ErrorClass::KillSwitchActive
            | ErrorClass::AllowFlagDisabled
            | ErrorClass::BaselineNotPass => ErrorCategory::PolicyDenial,
            ErrorClass::TransportBlocked
            | ErrorClass::RoutingBroken
            | ErrorClass::HealthCheckFailed
            | ErrorClass::RemediationFailed
            | ErrorClass::RemediationExhausted
            | ErrorClass::LockHeld => ErrorCategory::Infrastructure,
            ErrorClass::InteractiveRecoveryFailed
            | ErrorClass::RecoveryExhausted
            | ErrorClass::StageTimeout
            | ErrorClass::StageFailed
            | ErrorClass::InvalidState
            | ErrorClass::Internal => ErrorCategory::Unrecoverable,
        }
    }

    /// True for the fixed set that gets one interactive recovery attempt.
    pub fn needs_interactive_recovery(self) -> bool {
        self.category() == ErrorCategory::BlockingSession
    }

    /// True when only an operator can move the pipeline forward.
    pub fn requires_human(self) -> bool {
        self.category() == ErrorCategory::HumanRequired
    }

    /// Whether a later invocation may retry the failed stage in the same run.
    /// Policy denials qualify because the gate is re-evaluated on every run.
    pub fn is_retryable(self) -> bool {
        self.category() != ErrorCategory::Unrecoverable
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
