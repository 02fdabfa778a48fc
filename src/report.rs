use chrono::{DateTime, Utc};
use eyre::WrapErr;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::orchestrator::load::LoadSummary;
use crate::orchestrator::types::RecoveryOutcome;

/// Serializable form of a recovery outcome for the run artifact
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryRecord {
    pub target: String,
    pub kind: String,
    pub recovered: bool,
    pub detected_unhealthy_after_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub classification: Option<String>,
}

impl From<&RecoveryOutcome> for RecoveryRecord {
    fn from(outcome: &RecoveryOutcome) -> Self {
        Self {
            target: outcome.target.clone(),
            kind: outcome.kind.to_string(),
            recovered: outcome.recovered(),
            detected_unhealthy_after_ms: outcome.detected_unhealthy_at.map(|at| {
                at.saturating_duration_since(outcome.injected_at).as_millis() as u64
            }),
            duration_ms: outcome.duration().map(|d| d.as_millis() as u64),
            classification: outcome.classification.map(|c| c.to_string()),
        }
    }
}

/// Pass/fail and metrics for one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryRecord>,
}

/// Per-run metrics artifact; the only state the harness persists
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        !self.scenarios.is_empty() && self.scenarios.iter().all(|s| s.passed)
    }

    /// Write the report as JSON under `dir`, creating it if needed
    pub fn write_json(&self, dir: &str) -> eyre::Result<PathBuf> {
        std::fs::create_dir_all(dir).wrap_err("Failed to create report directory")?;
        let path = Path::new(dir).join("resilience_report.json");
        let json = serde_json::to_string_pretty(self).wrap_err("Failed to serialize report")?;
        std::fs::write(&path, json).wrap_err("Failed to write report file")?;
        tracing::info!(path = %path.display(), "Run report written");
        Ok(path)
    }
}
