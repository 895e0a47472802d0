use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::pipeline::orchestrator::StageKind;

/// Where a stage stands in the current (or last) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Done,
    /// Output artifact was already present; the stage did not run.
    Skipped,
    Failed,
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Skipped => write!(f, "skipped (cached)"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: StageKind,
    pub state: StageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable failure reason (if state == Failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Status snapshot written to the working directory during a run and read
/// back by `meetscribe status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Input audio of the run, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub stages: Vec<StageStatus>,
    pub started_at: String,
    /// ISO-8601 timestamp of the last status update.
    pub updated_at: String,
}

pub const STATUS_FILE_NAME: &str = ".pipeline-status.json";

impl PipelineStatus {
    /// Every stage pending.
    pub fn new(input: Option<String>, stages: &[StageKind]) -> Self {
        let now = chrono::Local::now().to_rfc3339();
        Self {
            input,
            stages: stages
                .iter()
                .map(|&stage| StageStatus {
                    stage,
                    state: StageState::Pending,
                    error_kind: None,
                    reason: None,
                })
                .collect(),
            started_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn set(&mut self, stage: StageKind, state: StageState) {
        if let Some(entry) = self.stages.iter_mut().find(|s| s.stage == stage) {
            entry.state = state;
        }
        self.touch();
    }

    pub fn set_failed(&mut self, stage: StageKind, kind: ErrorKind, reason: &str) {
        if let Some(entry) = self.stages.iter_mut().find(|s| s.stage == stage) {
            entry.state = StageState::Failed;
            entry.error_kind = Some(kind);
            entry.reason = Some(reason.to_string());
        }
        self.touch();
    }

    pub fn state_of(&self, stage: StageKind) -> Option<StageState> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| s.state)
    }

    /// Write the status file into `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(STATUS_FILE_NAME);
        let content = serde_json::to_string_pretty(self)?;
        // Write atomically: write to temp then rename, to avoid the reader
        // seeing a half-written file.
        let tmp_path = dir.join(format!("{}.tmp", STATUS_FILE_NAME));
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Read the status file from `dir`. Returns `None` if the file doesn't
    /// exist or can't be parsed.
    pub fn read(dir: &Path) -> Option<Self> {
        let path = dir.join(STATUS_FILE_NAME);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Update the timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Local::now().to_rfc3339();
    }

    /// One-line summary for `meetscribe status`.
    pub fn summary_line(&self) -> String {
        if let Some(failed) = self.stages.iter().find(|s| s.state == StageState::Failed) {
            return format!(
                "Failed at {}: {}",
                failed.stage,
                failed.reason.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(running) = self.stages.iter().find(|s| s.state == StageState::Running) {
            return format!("Running {}", running.stage);
        }
        let finished = self
            .stages
            .iter()
            .filter(|s| matches!(s.state, StageState::Done | StageState::Skipped))
            .count();
        if finished == self.stages.len() {
            "Complete".to_string()
        } else {
            format!("{}/{} stages finished", finished, self.stages.len())
        }
    }
}
