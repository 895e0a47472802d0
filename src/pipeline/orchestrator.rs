// Runs the stages in order, skipping any whose output artifact is already
// ready. The first failure (error or panic) stops the run; artifacts written
// by earlier stages are left in place so the next run resumes from there.

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::artifacts::{Artifact, ArtifactStore};
use crate::error::{classify, ErrorKind};
use crate::pipeline::status::{PipelineStatus, StageState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Clean,
    Transcribe,
    Diarize,
    Merge,
    Summarize,
}

impl StageKind {
    pub const ORDER: [StageKind; 5] = [
        StageKind::Clean,
        StageKind::Transcribe,
        StageKind::Diarize,
        StageKind::Merge,
        StageKind::Summarize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Transcribe => "transcribe",
            Self::Diarize => "diarize",
            Self::Merge => "merge",
            Self::Summarize => "summarize",
        }
    }

    /// The artifact whose readiness marks this stage as complete.
    pub fn output(self) -> Artifact {
        match self {
            Self::Clean => Artifact::CleanedAudio,
            Self::Transcribe => Artifact::Transcription,
            Self::Diarize => Artifact::Diarization,
            Self::Merge => Artifact::DiarizedTranscript,
            Self::Summarize => Artifact::Summary,
        }
    }

    /// 1-based position in the pipeline.
    pub fn position(self) -> usize {
        self as usize + 1
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub trait Stage {
    fn kind(&self) -> StageKind;

    /// Produce this stage's output artifact in `store`.
    fn run(&self, store: &ArtifactStore) -> Result<()>;

    /// Called instead of `run` when the output is already ready. Must not
    /// contact any external service.
    fn on_skip(&self, _store: &ArtifactStore) -> Result<()> {
        Ok(())
    }
}

/// Observer for stage transitions.
pub trait ProgressReporter {
    fn stage_changed(&mut self, stage: StageKind, state: StageState, detail: Option<&str>);
}

/// Prints one line per transition.
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn stage_changed(&mut self, stage: StageKind, state: StageState, detail: Option<&str>) {
        let prefix = format!("[{}/{}] {}", stage.position(), StageKind::ORDER.len(), stage);
        match detail {
            Some(detail) => println!("{}: {} ({})", prefix, state, detail),
            None => println!("{}: {}", prefix, state),
        }
    }
}

/// Keeps every transition; used by tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<(StageKind, StageState)>,
}

impl ProgressReporter for RecordingReporter {
    fn stage_changed(&mut self, stage: StageKind, state: StageState, _detail: Option<&str>) {
        self.events.push((stage, state));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: StageKind,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages: Vec<(StageKind, StageState)>,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn state_of(&self, stage: StageKind) -> Option<StageState> {
        self.stages
            .iter()
            .find(|(kind, _)| *kind == stage)
            .map(|(_, state)| *state)
    }
}

pub struct Orchestrator {
    store: ArtifactStore,
    stages: Vec<Box<dyn Stage>>,
    input_label: Option<String>,
}

impl Orchestrator {
    pub fn new(store: ArtifactStore, mut stages: Vec<Box<dyn Stage>>) -> Self {
        stages.sort_by_key(|s| s.kind());
        Self {
            store,
            stages,
            input_label: None,
        }
    }

    /// Recorded in the status file.
    pub fn with_input_label(mut self, label: impl Into<String>) -> Self {
        self.input_label = Some(label.into());
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn run(&self, reporter: &mut dyn ProgressReporter) -> RunReport {
        let kinds: Vec<StageKind> = self.stages.iter().map(|s| s.kind()).collect();
        let mut status = PipelineStatus::new(self.input_label.clone(), &kinds);
        self.save_status(&status);

        for stage in &self.stages {
            let kind = stage.kind();

            if self.store.is_ready(kind.output()) {
                if let Err(e) = stage.on_skip(&self.store) {
                    tracing::warn!("{}: refreshing cached outputs failed: {:#}", kind, e);
                }
                tracing::info!("{}: {} is ready, skipping", kind, kind.output().file_name());
                status.set(kind, StageState::Skipped);
                reporter.stage_changed(kind, StageState::Skipped, None);
                continue;
            }

            status.set(kind, StageState::Running);
            self.save_status(&status);
            reporter.stage_changed(kind, StageState::Running, None);

            match self.run_stage(stage.as_ref()) {
                Ok(()) => {
                    status.set(kind, StageState::Done);
                    self.save_status(&status);
                    reporter.stage_changed(kind, StageState::Done, None);
                }
                Err((error_kind, reason)) => {
                    tracing::error!("{} failed ({}): {}", kind, error_kind, reason);
                    status.set_failed(kind, error_kind, &reason);
                    self.save_status(&status);
                    reporter.stage_changed(kind, StageState::Failed, Some(&reason));
                    return report(
                        &status,
                        Some(StageFailure {
                            stage: kind,
                            kind: error_kind,
                            reason,
                        }),
                    );
                }
            }
        }

        self.save_status(&status);
        report(&status, None)
    }

    /// Run one stage, turning errors and panics into a classified failure.
    fn run_stage(&self, stage: &dyn Stage) -> std::result::Result<(), (ErrorKind, String)> {
        let kind = stage.kind();
        match catch_unwind(AssertUnwindSafe(|| stage.run(&self.store))) {
            Ok(Ok(())) if self.store.is_ready(kind.output()) => Ok(()),
            Ok(Ok(())) => Err((
                ErrorKind::Validation,
                format!("finished without producing {}", kind.output().file_name()),
            )),
            Ok(Err(e)) => Err((classify(&e), format!("{:#}", e))),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err((ErrorKind::Other, format!("panicked: {}", message)))
            }
        }
    }

    fn save_status(&self, status: &PipelineStatus) {
        if let Err(e) = status.write(self.store.root()) {
            tracing::warn!("Failed to write pipeline status: {:#}", e);
        }
    }
}

fn report(status: &PipelineStatus, failure: Option<StageFailure>) -> RunReport {
    RunReport {
        stages: status.stages.iter().map(|s| (s.stage, s.state)).collect(),
        failure,
    }
}
