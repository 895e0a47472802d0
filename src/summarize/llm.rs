use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{PipelineError, ProviderError};
use crate::summarize::prompt;

/// Abstractive summarizer, called once per chunk.
pub trait Summarizer: Send {
    fn summarize(&self, chunk_text: &str, min_words: usize, max_words: usize) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [RequestMessage<'a>; 2],
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Azure OpenAI chat completions. Endpoint and key are shared with
/// [transcription.azure]; the deployment comes from [summarization].
pub struct ChatSummarizer {
    endpoint: String,
    api_key: Option<String>,
    deployment: String,
    system_prompt: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for ChatSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSummarizer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("deployment", &self.deployment)
            .finish()
    }
}

impl ChatSummarizer {
    /// Missing settings are reported on the first request, not here.
    pub fn from_config(config: &Config) -> Result<Self> {
        let azure = &config.transcription.azure;
        let api_key = if azure.api_key.is_empty() {
            std::env::var("MEETSCRIBE_AZURE_KEY").ok()
        } else {
            Some(azure.api_key.clone())
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            endpoint: azure.endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment: config.summarization.deployment.clone(),
            system_prompt: config.summarization.system_prompt.clone(),
            client,
        })
    }

    /// Send a chat completion request and return the response text.
    fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let not_configured = |what: &str| PipelineError::FatalProvider(format!("{} not configured", what));
        if self.endpoint.is_empty() {
            return Err(not_configured("Azure OpenAI endpoint ([transcription.azure] endpoint)").into());
        }
        if self.deployment.is_empty() {
            return Err(not_configured("summarization deployment ([summarization] deployment)").into());
        }
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            not_configured("Azure API key ([transcription.azure] api_key or MEETSCRIBE_AZURE_KEY)")
        })?;

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version=2024-06-01",
            self.endpoint, self.deployment
        );
        let request = ChatRequest {
            messages: [
                RequestMessage {
                    role: "system",
                    content: system_prompt,
                },
                RequestMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_completion_tokens: 1024,
        };

        tracing::debug!("Chat completion request to deployment {}", self.deployment);
        let response = self
            .client
            .post(&url)
            .header("api-key", api_key)
            .json(&request)
            .send()
            .map_err(|e| PipelineError::from(ProviderError::Network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(http_failure(status.as_u16(), body).into());
        }

        let chat_response: ChatResponse = response.json().map_err(|e| {
            PipelineError::FatalProvider(format!("unreadable chat completion response: {}", e))
        })?;
        first_choice(chat_response)
    }
}

/// Throttling and server errors may succeed on a later run; anything else
/// (bad key, unknown deployment, rejected prompt) will not.
fn http_failure(code: u16, body: String) -> PipelineError {
    if code == 429 || code >= 500 {
        PipelineError::TransientProvider(ProviderError::Status { code, body })
    } else {
        PipelineError::FatalProvider(format!("chat completion returned HTTP {}: {}", code, body))
    }
}

fn first_choice(chat_response: ChatResponse) -> Result<String> {
    if let Some(usage) = &chat_response.usage {
        tracing::debug!(
            "Token usage: prompt={}, completion={}",
            usage.prompt_tokens,
            usage.completion_tokens
        );
    }

    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .context("No choices in chat completion response")?;

    if let Some(reason) = choice.finish_reason.as_deref().filter(|r| *r != "stop") {
        tracing::warn!("Summary may be truncated (finish_reason: {})", reason);
    }

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(PipelineError::FatalProvider("chat completion returned no text".to_string()).into());
    }
    Ok(content.trim().to_string())
}

impl Summarizer for ChatSummarizer {
    fn summarize(&self, chunk_text: &str, min_words: usize, max_words: usize) -> Result<String> {
        let (system, user) =
            prompt::build_chunk_prompt(chunk_text, min_words, max_words, &self.system_prompt);
        self.chat(&system, &user)
    }
}
