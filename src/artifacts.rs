// File-backed stage artifacts for one pipeline run.
//
// An artifact is "ready" iff its file exists and is non-empty. That is the only
// cache key: there is no checksum or timestamp comparison. Writes go through a
// temp file + rename so an interrupted write never leaves a partial artifact
// that would later be mistaken for a finished one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    CleanedAudio,
    TranscriptText,
    Transcription,
    Diarization,
    DiarizedTranscript,
    Summary,
}

impl Artifact {
    pub const ALL: [Artifact; 6] = [
        Artifact::CleanedAudio,
        Artifact::TranscriptText,
        Artifact::Transcription,
        Artifact::Diarization,
        Artifact::DiarizedTranscript,
        Artifact::Summary,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::CleanedAudio => "cleaned.wav",
            Self::TranscriptText => "transcript.txt",
            Self::Transcription => "transcription.json",
            Self::Diarization => "diarization.json",
            Self::DiarizedTranscript => "diarized_transcript.txt",
            Self::Summary => "summary.txt",
        }
    }
}

/// Returns true if `path` exists and has a non-zero size.
pub fn file_ready(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (and create if needed) the working directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create working directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    pub fn is_ready(&self, artifact: Artifact) -> bool {
        file_ready(&self.path(artifact))
    }

    /// Fails with `MissingInput` unless the artifact is ready.
    pub fn require(&self, artifact: Artifact) -> Result<PathBuf> {
        let path = self.path(artifact);
        if !file_ready(&path) {
            return Err(PipelineError::MissingInput(format!(
                "{} is missing or empty",
                path.display()
            ))
            .into());
        }
        Ok(path)
    }

    pub fn read_text(&self, artifact: Artifact) -> Result<String> {
        let path = self.require(artifact)?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Parse a ready JSON artifact into an untyped value. Shape checks are the
    /// caller's job.
    pub fn read_json_value(&self, artifact: Artifact) -> Result<serde_json::Value> {
        let content = self.read_text(artifact)?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::MissingInput(format!("{} is not valid JSON: {}", artifact.file_name(), e))
                .into()
        })
    }

    pub fn read_json<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<T> {
        let value = self.read_json_value(artifact)?;
        serde_json::from_value(value).map_err(|e| {
            PipelineError::Validation(format!("{}: {}", artifact.file_name(), e)).into()
        })
    }

    pub fn write_text(&self, artifact: Artifact, content: &str) -> Result<PathBuf> {
        self.write_bytes(artifact, content.as_bytes())
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, artifact: Artifact, value: &T) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(value)?;
        self.write_text(artifact, &content)
    }

    pub fn write_bytes(&self, artifact: Artifact, content: &[u8]) -> Result<PathBuf> {
        let path = self.path(artifact);
        let tmp_path = self.tmp_path(artifact);
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        self.commit(artifact)?;
        Ok(path)
    }

    /// Scratch location for producers that write the file themselves (e.g. a
    /// WAV encoder). Call `commit` once the file is complete.
    pub fn tmp_path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(format!("{}.tmp", artifact.file_name()))
    }

    pub fn commit(&self, artifact: Artifact) -> Result<PathBuf> {
        let tmp_path = self.tmp_path(artifact);
        let path = self.path(artifact);
        std::fs::rename(&tmp_path, &path).with_context(|| {
            format!("Failed to move {} into place", tmp_path.display())
        })?;
        Ok(path)
    }
}
