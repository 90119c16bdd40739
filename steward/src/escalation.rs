//! Human escalation: the `WAITING_FOR_HUMAN` signal and its access URL.

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::access_url::{CanonicalUrl, find_access_url};
use crate::core::error_class::ErrorClass;
use crate::core::types::Stage;
use crate::io::proofs::ProofSource;
use crate::pipeline::PipelineOutcome;

pub const WAITING_FOR_HUMAN: &str = "WAITING_FOR_HUMAN";

/// Operator-facing escalation emitted when a stage needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationSignal {
    pub status: &'static str,
    pub run_id: String,
    pub stage: Stage,
    pub error_class: ErrorClass,
    pub reason: String,
    pub access_url: String,
}

impl EscalationSignal {
    /// `None` unless the outcome is waiting for a human.
    pub fn from_outcome(outcome: &PipelineOutcome, access_url: String) -> Option<Self> {
        match outcome {
            PipelineOutcome::WaitingForHuman {
                run_id,
                stage,
                error_class,
                reason,
            } => Some(Self {
                status: WAITING_FOR_HUMAN,
                run_id: run_id.clone(),
                stage: *stage,
                error_class: *error_class,
                reason: reason.clone(),
                access_url,
            }),
            _ => None,
        }
    }
}

/// Newest user-facing access URL found in the proof artifacts, or the
/// canonical URL. Never returns a loopback address.
pub fn resolve_access_url<S: ProofSource + ?Sized>(proofs: &S, canonical: &CanonicalUrl) -> String {
    let mut artifacts = match proofs.artifacts() {
        Ok(artifacts) => artifacts,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "proof artifacts unavailable; using canonical url");
            return canonical.as_str().to_string();
        }
    };
    artifacts.sort_by(|a, b| b.name.cmp(&a.name));

    for artifact in &artifacts {
        if let Some(url) = find_access_url(&artifact.contents) {
            debug!(artifact = %artifact.name, "access url found in proof");
            return url.to_string();
        }
    }
    debug!("no access url in proofs; using canonical url");
    canonical.as_str().to_string()
}
