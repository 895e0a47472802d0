use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub cleaner: CleanerConfig,
    pub transcription: TranscriptionConfig,
    pub diarization: DiarizationConfig,
    pub merge: MergeConfig,
    pub summarization: SummarizationConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Working directory holding every artifact of a run.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub sample_rate: u32,
    pub noise_reduction: bool,
    /// Gate opens this many dB above the estimated noise floor.
    pub gate_margin_db: f32,
    /// Peak level after normalization, in dB below full scale.
    pub headroom_db: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub backend: String,
    pub model: String,
    pub azure: AzureConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("deployment", &self.deployment)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiarizationConfig {
    pub base_url: String,
    /// Bearer token (or set PYANNOTE_API_KEY environment variable).
    pub api_key: String,
    /// Object key used for the `media://` upload location.
    pub object_key: String,
    pub poll_interval_secs: u64,
    pub max_checks: u32,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for DiarizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiarizationConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("object_key", &self.object_key)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_checks", &self.max_checks)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Assign the nearest speaker even when no diarization segment overlaps.
    pub fill_nearest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitterKind {
    /// Punctuation + whitespace + capital letter, nothing else.
    Regex,
    /// Same heuristic, but never breaks after common titles such as "Dr.".
    AbbreviationAware,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Azure OpenAI deployment name for chat completions (e.g. "gpt-4o").
    /// Endpoint and key are shared with [transcription.azure].
    pub deployment: String,
    pub max_chunk_words: usize,
    pub overlap_words: usize,
    pub min_summary_words: usize,
    pub max_summary_words: usize,
    pub sentence_splitter: SplitterKind,
    /// Custom system prompt. Use {min_words} and {max_words} as placeholders.
    /// Leave empty to use the built-in default prompt.
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub sample_rate: u32,
    /// Duration of each chunk handed from the producer to the consumer.
    pub chunk_secs: f32,
    /// Amount of audio transcribed in one model call.
    pub block_secs: f32,
    pub queue_capacity: usize,
    /// Pace WAV replay at real-time speed.
    pub realtime_replay: bool,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            cleaner: CleanerConfig::default(),
            transcription: TranscriptionConfig::default(),
            diarization: DiarizationConfig::default(),
            merge: MergeConfig::default(),
            summarization: SummarizationConfig::default(),
            live: LiveConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("processed_audio"),
        }
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            noise_reduction: true,
            gate_margin_db: 6.0,
            headroom_db: 0.1,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: "azure".to_string(),
            model: "base.en".to_string(),
            azure: AzureConfig::default(),
        }
    }
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: "whisper".to_string(),
        }
    }
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.pyannote.ai/v1".to_string(),
            api_key: String::new(),
            object_key: "meetscribe-input".to_string(),
            poll_interval_secs: 10,
            max_checks: 360,
            request_timeout_secs: 300,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { fill_nearest: true }
    }
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            deployment: String::new(),
            max_chunk_words: 500,
            overlap_words: 80,
            min_summary_words: 100,
            max_summary_words: 150,
            sentence_splitter: SplitterKind::AbbreviationAware,
            system_prompt: String::new(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_secs: 0.5,
            block_secs: 3.0,
            queue_capacity: 64,
            realtime_replay: true,
        }
    }
}

// --- Config loading ---

impl Config {
    /// Load config and return the resolved file path (if any).
    pub fn load_with_path(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // 1. Explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(p.to_path_buf())));
        }

        // 2. Beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(p) = exe_path.parent().map(|p| p.join("meetscribe.toml")) {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config: Config = toml::from_str(&content)?;
                    return Ok((config, Some(p)));
                }
            }
        }

        // 3. Platform config directory (e.g. ~/.config/meetscribe/config.toml)
        if let Some(platform_config) = Self::platform_path() {
            if platform_config.exists() {
                let content = std::fs::read_to_string(&platform_config)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(platform_config)));
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok((Config::default(), None))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_path(path).map(|(config, _)| config)
    }

    /// Where `init-config` writes when no explicit path is given.
    pub fn platform_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("meetscribe").join("config.toml"))
    }

    /// Generate a default config file with all fields and inline documentation.
    pub fn generate_default_commented() -> String {
        r#"# meetscribe configuration

[output]
# Working directory for a pipeline run. Every stage writes its artifact here,
# and a rerun with the same directory skips stages whose artifact already exists.
directory = "processed_audio"

[cleaner]
# Target sample rate in Hz for the cleaned audio.
sample_rate = 16000
# Attenuate audio that stays near the estimated noise floor. If this step
# fails the un-denoised audio is used instead.
noise_reduction = true
# The noise gate opens this many dB above the estimated noise floor.
gate_margin_db = 6.0
# Peak level after normalization, in dB below full scale.
headroom_db = 0.1

[transcription]
# Transcription backend: "azure" (cloud API) or "local" (needs the `whisper` feature).
backend = "azure"
# Whisper model name for the local backend, or a path to a ggml .bin file.
model = "base.en"

[transcription.azure]
# Azure OpenAI endpoint URL.
# endpoint = "https://your-resource.openai.azure.com"
# API key (or set MEETSCRIBE_AZURE_KEY environment variable).
# api_key = ""
# Deployment name for the Whisper model.
deployment = "whisper"

[diarization]
# Diarization provider base URL.
base_url = "https://api.pyannote.ai/v1"
# Bearer token (or set PYANNOTE_API_KEY environment variable).
# api_key = ""
# Object key for the uploaded media (media://<object_key>).
object_key = "meetscribe-input"
# Seconds between job status checks.
poll_interval_secs = 10
# Give up after this many status checks.
max_checks = 360
# Timeout in seconds for a single HTTP request (uploads can be large).
request_timeout_secs = 300

[merge]
# Label segments with the nearest speaker even when no diarization segment
# overlaps them. When false such segments are labeled "Unknown".
fill_nearest = true

[summarization]
# Azure OpenAI chat deployment used for summaries. Reuses the endpoint and
# api_key from [transcription.azure].
# deployment = "gpt-4o"
# Maximum words per chunk sent to the summarizer.
max_chunk_words = 500
# Words of trailing context repeated at the start of the next chunk.
overlap_words = 80
# Target length of each chunk summary.
min_summary_words = 100
max_summary_words = 150
# Sentence boundary detection: "regex" or "abbreviation_aware".
sentence_splitter = "abbreviation_aware"
# Custom system prompt. Use {min_words} and {max_words} as placeholders.
# Leave empty to use the built-in default.
# system_prompt = ""

[live]
# Capture sample rate for `meetscribe record`.
sample_rate = 16000
# Seconds of audio per chunk handed from the recorder to the transcriber.
chunk_secs = 0.5
# Seconds of audio transcribed per model call.
block_secs = 3.0
# Maximum number of chunks buffered between recorder and transcriber.
queue_capacity = 64
# Replay WAV files at real-time speed.
realtime_replay = true
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.output.directory, PathBuf::from("processed_audio"));
        assert_eq!(config.cleaner.sample_rate, 16000);
        assert!(config.cleaner.noise_reduction);
        assert_eq!(config.transcription.backend, "azure");
        assert_eq!(config.diarization.poll_interval_secs, 10);
        assert_eq!(config.diarization.max_checks, 360);
        assert!(config.merge.fill_nearest);
        assert_eq!(config.summarization.max_chunk_words, 500);
        assert_eq!(config.summarization.overlap_words, 80);
        assert_eq!(config.summarization.min_summary_words, 100);
        assert_eq!(config.summarization.max_summary_words, 150);
        assert_eq!(
            config.summarization.sentence_splitter,
            SplitterKind::AbbreviationAware
        );
        assert_eq!(config.live.queue_capacity, 64);
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [diarization]
            poll_interval_secs = 2

            [merge]
            fill_nearest = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.diarization.poll_interval_secs, 2);
        assert!(!config.merge.fill_nearest);
        assert_eq!(config.diarization.max_checks, 360);
        assert_eq!(config.summarization.overlap_words, 80);
        assert_eq!(config.cleaner.sample_rate, 16000);
    }

    #[test]
    fn test_parse_full_toml_config() {
        let toml_str = r#"
            [output]
            directory = "/tmp/meeting"

            [cleaner]
            sample_rate = 22050
            noise_reduction = false

            [transcription]
            backend = "local"
            model = "small.en"

            [transcription.azure]
            endpoint = "https://example.openai.azure.com"
            api_key = "test-key"

            [diarization]
            base_url = "https://diarize.example.com/v2"
            object_key = "standup"
            max_checks = 5

            [summarization]
            deployment = "gpt-4o"
            max_chunk_words = 300
            sentence_splitter = "regex"

            [live]
            block_secs = 5.0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output.directory, PathBuf::from("/tmp/meeting"));
        assert_eq!(config.cleaner.sample_rate, 22050);
        assert!(!config.cleaner.noise_reduction);
        assert_eq!(config.transcription.backend, "local");
        assert_eq!(config.transcription.azure.api_key, "test-key");
        assert_eq!(config.transcription.azure.deployment, "whisper");
        assert_eq!(config.diarization.base_url, "https://diarize.example.com/v2");
        assert_eq!(config.diarization.object_key, "standup");
        assert_eq!(config.diarization.max_checks, 5);
        assert_eq!(config.summarization.deployment, "gpt-4o");
        assert_eq!(config.summarization.max_chunk_words, 300);
        assert_eq!(config.summarization.sentence_splitter, SplitterKind::Regex);
        assert_eq!(config.live.block_secs, 5.0);
    }

    #[test]
    fn test_load_nonexistent_path_errors() {
        let result = Config::load(Some(Path::new("/nonexistent/meetscribe.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_with_path_returns_resolved_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_file = tmp.path().join("meetscribe.toml");
        std::fs::write(&config_file, "[merge]\nfill_nearest = false\n").unwrap();

        let (config, resolved) = Config::load_with_path(Some(config_file.as_path())).unwrap();
        assert!(!config.merge.fill_nearest);
        assert_eq!(resolved, Some(config_file));
    }

    #[test]
    fn test_generate_default_commented_parses_to_defaults() {
        let content = Config::generate_default_commented();
        let config: Config = toml::from_str(&content).unwrap();
        let defaults = Config::default();
        assert_eq!(config.output.directory, defaults.output.directory);
        assert_eq!(config.cleaner.gate_margin_db, defaults.cleaner.gate_margin_db);
        assert_eq!(config.diarization.base_url, defaults.diarization.base_url);
        assert_eq!(config.diarization.max_checks, defaults.diarization.max_checks);
        assert_eq!(
            config.summarization.sentence_splitter,
            defaults.summarization.sentence_splitter
        );
        assert_eq!(config.live.chunk_secs, defaults.live.chunk_secs);
    }

    #[test]
    fn test_generate_default_commented_has_all_sections() {
        let content = Config::generate_default_commented();
        for section in [
            "[output]",
            "[cleaner]",
            "[transcription]",
            "[transcription.azure]",
            "[diarization]",
            "[merge]",
            "[summarization]",
            "[live]",
        ] {
            assert!(content.contains(section), "missing {}", section);
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.transcription.azure.api_key = "azure-secret-123".to_string();
        config.diarization.api_key = "pyannote-secret-456".to_string();
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("azure-secret-123"));
        assert!(!debug_output.contains("pyannote-secret-456"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("https://api.pyannote.ai/v1"));
    }
}
