use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use url::Url;

use crate::config::DiarizationConfig;
use crate::diarize::DiarizationApi;
use crate::error::{PipelineError, ProviderError};

/// pyannoteAI HTTP API: presigned upload, job creation, job status.
pub struct PyannoteClient {
    base_url: Url,
    api_key: Option<String>,
    object_key: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for PyannoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyannoteClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("object_key", &self.object_key)
            .finish()
    }
}

fn resolve_api_key(configured: &str, from_env: Option<String>) -> Option<String> {
    if configured.is_empty() {
        from_env.filter(|k| !k.trim().is_empty())
    } else {
        Some(configured.to_string())
    }
}

impl PyannoteClient {
    pub fn new(config: &DiarizationConfig) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'.
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .with_context(|| format!("Invalid [diarization] base_url: {}", config.base_url))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            api_key: resolve_api_key(&config.api_key, std::env::var("PYANNOTE_API_KEY").ok()),
            object_key: config.object_key.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            PipelineError::FatalProvider(
                "Pyannote API key not configured. Set [diarization] api_key or PYANNOTE_API_KEY"
                    .to_string(),
            )
            .into()
        })
    }

    fn media_url(&self) -> String {
        format!("media://{}", self.object_key)
    }

    fn post_json(&self, path: &str, body: &Value, what: &str) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .with_context(|| format!("Failed to send {} request", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::FatalProvider(format!(
                "{} returned HTTP {}: {}",
                what,
                status.as_u16(),
                body
            ))
            .into());
        }
        response
            .json()
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

impl DiarizationApi for PyannoteClient {
    fn ensure_credentials(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    fn submit(&self, audio_path: &Path) -> Result<Value> {
        let media = json!({ "url": self.media_url() });

        let upload = self.post_json("media/input", &media, "upload URL")?;
        let presigned = upload
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::FatalProvider(format!("upload URL response has no 'url': {}", upload))
            })?;

        let bytes = std::fs::read(audio_path)
            .with_context(|| format!("Failed to read {}", audio_path.display()))?;
        tracing::info!(
            "Uploading {} ({} bytes) for diarization",
            audio_path.display(),
            bytes.len()
        );
        let response = self
            .client
            .put(presigned)
            .body(bytes)
            .send()
            .context("Failed to upload audio")?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::FatalProvider(format!(
                "audio upload returned HTTP {}: {}",
                code, body
            ))
            .into());
        }

        self.post_json("diarize", &media, "diarization job")
    }

    fn fetch_job(&self, job_id: &str) -> std::result::Result<Value, ProviderError> {
        let url = self
            .endpoint(&format!("jobs/{}", job_id))
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Status {
                code: 401,
                body: "no API key".to_string(),
            })?;

        let response = self
            .client
            .get(url)
            .bearer_auth(key)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}
