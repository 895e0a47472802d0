// Submit a diarization job and poll it to a terminal state.
//
// Every poll outcome counts against `max_checks`. Request-level failures are
// logged and retried; they only become fatal when they are still happening on
// the last allowed check. `failed`/`canceled` end the wait immediately.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::audio::live::CancellationToken;
use crate::config::DiarizationConfig;
use crate::diarize::{keys, DiarizationApi, JobStatus};
use crate::error::{PipelineError, ProviderError};

/// Waits between polls. Swapped out in tests.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct JobPoller {
    interval: Duration,
    max_checks: u32,
    sleeper: Box<dyn Sleeper>,
    cancel: CancellationToken,
}

impl JobPoller {
    pub fn new(interval: Duration, max_checks: u32) -> Self {
        Self {
            interval,
            max_checks: max_checks.max(1),
            sleeper: Box::new(ThreadSleeper),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &DiarizationConfig) -> Self {
        Self::new(Duration::from_secs(config.poll_interval_secs), config.max_checks)
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Submit `audio_path` and wait for the job's output payload.
    pub fn run(&self, api: &dyn DiarizationApi, audio_path: &Path) -> Result<Value> {
        let job_id = self.submit(api, audio_path)?;
        self.wait(api, &job_id)
    }

    pub fn submit(&self, api: &dyn DiarizationApi, audio_path: &Path) -> Result<String> {
        let body = api
            .submit(audio_path)
            .context("Failed to submit diarization job")?;
        let job_id = keys::job_id(&body).ok_or_else(|| {
            PipelineError::FatalProvider(format!(
                "job creation response has none of {:?}: {}",
                keys::JOB_ID_KEYS,
                body
            ))
        })?;
        tracing::info!("Diarization job {} submitted", job_id);
        Ok(job_id)
    }

    pub fn wait(&self, api: &dyn DiarizationApi, job_id: &str) -> Result<Value> {
        let mut last_failure: Option<ProviderError> = None;

        for check in 1..=self.max_checks {
            last_failure = None;
            match api.fetch_job(job_id).and_then(|body| parse_status(&body).map(|s| (s, body))) {
                Err(e) => {
                    tracing::warn!(
                        "Status check {}/{} for job {} failed: {}",
                        check,
                        self.max_checks,
                        job_id,
                        e
                    );
                    last_failure = Some(e);
                }
                Ok((JobStatus::Succeeded, body)) => {
                    tracing::info!("Diarization job {} succeeded", job_id);
                    return extract_output(job_id, &body);
                }
                Ok((status, _)) if status.is_terminal() => {
                    return Err(PipelineError::JobEnded {
                        job_id: job_id.to_string(),
                        status: status.to_string(),
                    }
                    .into());
                }
                Ok((JobStatus::Unrecognized(raw), _)) => {
                    tracing::warn!("Job {} reported unrecognized status '{}', waiting", job_id, raw);
                }
                Ok((status, _)) => {
                    tracing::info!(
                        "Job {} {} ({}/{}), waiting...",
                        job_id,
                        status,
                        check,
                        self.max_checks
                    );
                }
            }

            if check < self.max_checks {
                if self.cancel.is_cancelled() {
                    anyhow::bail!("Polling for job {} cancelled", job_id);
                }
                self.sleeper.sleep(self.interval);
            }
        }

        match last_failure {
            Some(e) => Err(PipelineError::FatalProvider(format!(
                "job {}: {} (status check budget of {} exhausted)",
                job_id, e, self.max_checks
            ))
            .into()),
            None => Err(PipelineError::JobTimeout {
                job_id: job_id.to_string(),
                checks: self.max_checks,
            }
            .into()),
        }
    }
}

fn parse_status(body: &Value) -> std::result::Result<JobStatus, ProviderError> {
    body.get("status")
        .and_then(Value::as_str)
        .map(JobStatus::parse)
        .ok_or_else(|| ProviderError::Malformed(format!("no 'status' field in {}", body)))
}

fn extract_output(job_id: &str, body: &Value) -> Result<Value> {
    keys::output_payload(body).cloned().ok_or_else(|| {
        PipelineError::FatalProvider(format!(
            "job {} succeeded but the response has none of {:?}",
            job_id,
            keys::OUTPUT_KEYS
        ))
        .into()
    })
}
