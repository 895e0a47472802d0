// Error taxonomy shared by the pipeline stages and the diarization poller.
//
// Stage code propagates `anyhow::Error`; the typed errors below are the root
// causes the orchestrator downcasts to when it reports a failure.

use thiserror::Error;

/// Coarse classification used in stage reports and the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    TransientProvider,
    FatalProvider,
    Validation,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingInput => write!(f, "missing input"),
            Self::TransientProvider => write!(f, "transient provider error"),
            Self::FatalProvider => write!(f, "provider error"),
            Self::Validation => write!(f, "validation error"),
            Self::Other => write!(f, "error"),
        }
    }
}

/// A single failed request to a remote provider. Expected to resolve on retry.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required upstream artifact is absent, empty or unreadable.
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error(transparent)]
    TransientProvider(#[from] ProviderError),

    #[error("provider error: {0}")]
    FatalProvider(String),

    /// The remote job reached a terminal non-success state.
    #[error("job {job_id} ended with status '{status}'")]
    JobEnded { job_id: String, status: String },

    #[error("job {job_id} did not finish after {checks} status checks")]
    JobTimeout { job_id: String, checks: u32 },

    /// Artifact content does not have the expected shape.
    #[error("validation error: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput(_) => ErrorKind::MissingInput,
            Self::TransientProvider(_) => ErrorKind::TransientProvider,
            Self::FatalProvider(_) | Self::JobEnded { .. } | Self::JobTimeout { .. } => {
                ErrorKind::FatalProvider
            }
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Classify an arbitrary stage error by looking for a `PipelineError` in its
/// cause chain.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::kind)
        .unwrap_or(ErrorKind::Other)
}
