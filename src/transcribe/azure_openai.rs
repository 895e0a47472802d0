use std::path::Path;

use anyhow::{Context, Result};
use reqwest::blocking::multipart;
use serde::Deserialize;

use crate::audio::wav;
use crate::config::AzureConfig;
use crate::transcribe::backend::{BlockTranscriber, Transcriber, TranscriptSegment, Transcription};

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

/// Azure OpenAI Whisper deployment, called with `response_format=verbose_json`
/// so that segment timings come back with the text.
pub struct AzureWhisperBackend {
    endpoint: String,
    api_key: Option<String>,
    deployment: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for AzureWhisperBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureWhisperBackend")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("deployment", &self.deployment)
            .finish()
    }
}

impl AzureWhisperBackend {
    /// The key is resolved now but only required when a request is made, so a
    /// resumed run that skips transcription needs no credentials.
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let api_key = if config.api_key.is_empty() {
            std::env::var("MEETSCRIBE_AZURE_KEY").ok()
        } else {
            Some(config.api_key.clone())
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment: config.deployment.clone(),
            client,
        })
    }

    fn send(&self, file_bytes: Vec<u8>, filename: String) -> Result<VerboseTranscription> {
        if self.endpoint.is_empty() {
            anyhow::bail!(
                "Azure OpenAI endpoint not configured. Set [transcription.azure] endpoint"
            );
        }
        let api_key = self.api_key.as_deref().context(
            "Azure API key not configured. Set [transcription.azure] api_key or MEETSCRIBE_AZURE_KEY",
        )?;

        let url = format!(
            "{}/openai/deployments/{}/audio/transcriptions?api-version=2024-06-01",
            self.endpoint, self.deployment
        );

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(file_bytes)
                    .file_name(filename)
                    .mime_str("audio/wav")?,
            )
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(&url)
            .header("api-key", api_key)
            .multipart(form)
            .send()
            .context("Failed to send transcription request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Azure OpenAI returned HTTP {}: {}", status.as_u16(), body);
        }

        response
            .json()
            .context("Failed to parse transcription response")
    }
}

impl Transcriber for AzureWhisperBackend {
    fn name(&self) -> &str {
        "azure-openai"
    }

    fn transcribe(&self, audio_path: &Path) -> Result<Transcription> {
        let file_bytes = std::fs::read(audio_path)
            .with_context(|| format!("Failed to read {}", audio_path.display()))?;
        let filename = audio_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("audio path has no filename: {}", audio_path.display()))?
            .to_string_lossy()
            .to_string();

        let body = self.send(file_bytes, filename)?;

        // Fall back to the WAV header when the provider omits the duration.
        let duration = match body.duration {
            Some(d) => d,
            None => wav::duration_secs(audio_path)?,
        };

        Ok(Transcription {
            duration,
            text: body.text.trim().to_string(),
            segments: body.segments,
        })
    }
}

impl BlockTranscriber for AzureWhisperBackend {
    fn transcribe_block(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<TranscriptSegment>> {
        let bytes = wav::encode_i16(samples, sample_rate)?;
        let body = self.send(bytes, "live_block.wav".to_string())?;
        if body.segments.is_empty() && !body.text.trim().is_empty() {
            let end = samples.len() as f64 / sample_rate as f64;
            return Ok(vec![TranscriptSegment::new("seg_000", 0.0, end, body.text)]);
        }
        Ok(body.segments)
    }
}
