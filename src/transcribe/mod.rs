pub mod azure_openai;
pub mod backend;
#[cfg(feature = "whisper")]
pub mod whisper_local;

use anyhow::Result;

use crate::config::TranscriptionConfig;
use crate::transcribe::backend::{BlockTranscriber, Transcriber};

/// Build the configured backend for batch transcription.
pub fn build_transcriber(
    config: &TranscriptionConfig,
    backend_override: Option<&str>,
) -> Result<Box<dyn Transcriber>> {
    match backend_override.unwrap_or(&config.backend) {
        "azure" => Ok(Box::new(azure_openai::AzureWhisperBackend::new(&config.azure)?)),
        "local" => {
            #[cfg(feature = "whisper")]
            {
                use crate::transcribe::whisper_local::WhisperLocal;
                let model_file = WhisperLocal::model_file(&config.model);
                Ok(Box::new(WhisperLocal::new(&model_file)?))
            }
            #[cfg(not(feature = "whisper"))]
            {
                anyhow::bail!("Local whisper backend requires building with `--features whisper`")
            }
        }
        other => anyhow::bail!("Unknown transcription backend: {}", other),
    }
}

/// Build the configured backend for live block transcription.
pub fn build_block_transcriber(
    config: &TranscriptionConfig,
    backend_override: Option<&str>,
) -> Result<Box<dyn BlockTranscriber>> {
    match backend_override.unwrap_or(&config.backend) {
        "azure" => Ok(Box::new(azure_openai::AzureWhisperBackend::new(&config.azure)?)),
        "local" => {
            #[cfg(feature = "whisper")]
            {
                use crate::transcribe::whisper_local::WhisperLocal;
                let model_file = WhisperLocal::model_file(&config.model);
                Ok(Box::new(WhisperLocal::new(&model_file)?))
            }
            #[cfg(not(feature = "whisper"))]
            {
                anyhow::bail!("Local whisper backend requires building with `--features whisper`")
            }
        }
        other => anyhow::bail!("Unknown transcription backend: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_errors() {
        let config = TranscriptionConfig::default();
        let err = build_transcriber(&config, Some("carrier-pigeon")).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_azure_backend_builds_without_key() {
        let config = TranscriptionConfig::default();
        let backend = build_transcriber(&config, None).unwrap();
        assert_eq!(backend.name(), "azure-openai");
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn test_local_backend_requires_feature() {
        let config = TranscriptionConfig::default();
        assert!(build_block_transcriber(&config, Some("local")).is_err());
    }
}
