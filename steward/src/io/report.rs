//! Reconcile report artifacts under `.steward/reports/`.
//!
//! One pretty JSON file per `steward reconcile` invocation, independent of
//! `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::RemediationOutcome;
use crate::reconcile::AttemptRecord;

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub max_attempts: u32,
    pub outcome: RemediationOutcome,
    pub attempts: Vec<AttemptRecord>,
}

/// `reconcile-<UTC timestamp>.json`; names sort chronologically.
pub fn report_path(reports_dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
    reports_dir.join(format!(
        "reconcile-{}.json",
        started_at.format("%Y%m%dT%H%M%S%.3fZ")
    ))
}

pub fn write_reconcile_report(reports_dir: &Path, report: &ReconcileReport) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports dir {}", reports_dir.display()))?;
    let path = report_path(reports_dir, report.started_at);
    let mut buf = serde_json::to_string_pretty(report)?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace {}", path.display()))?;
    Ok(path)
}
