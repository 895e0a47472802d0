pub mod client;
pub mod keys;
pub mod poller;

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One speaker turn reported by the diarization provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl DiarizationSegment {
    pub fn new(start: f64, end: f64, speaker: impl Into<String>) -> Self {
        Self {
            start,
            end,
            speaker: speaker.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Anything else the provider reports. Treated as still in progress.
    Unrecognized(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "created" => Self::Queued,
            "running" | "processing" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

/// Remote diarization job provider.
pub trait DiarizationApi: Send {
    /// Fails without making any request when no credentials are configured.
    fn ensure_credentials(&self) -> Result<()>;

    /// Upload the audio and create a job. Returns the raw creation response.
    fn submit(&self, audio_path: &Path) -> Result<serde_json::Value>;

    /// One status request. Errors here are expected to be retried.
    fn fetch_job(&self, job_id: &str) -> std::result::Result<serde_json::Value, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(JobStatus::parse("SUCCEEDED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::parse("Processing"), JobStatus::Running);
        assert_eq!(JobStatus::parse("pending"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("created"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("canceled"), JobStatus::Canceled);
    }

    #[test]
    fn test_unrecognized_status_is_not_terminal() {
        let status = JobStatus::parse("warming_up");
        assert_eq!(status, JobStatus::Unrecognized("warming_up".to_string()));
        assert!(!status.is_terminal());
        assert_eq!(status.to_string(), "warming_up");
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_segment_ignores_extra_fields() {
        let seg: DiarizationSegment =
            serde_json::from_str(r#"{"speaker":"SPEAKER_01","start":1.5,"end":3.0,"confidence":0.9}"#)
                .unwrap();
        assert_eq!(seg, DiarizationSegment::new(1.5, 3.0, "SPEAKER_01"));
    }
}
