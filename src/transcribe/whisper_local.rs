use std::path::Path;

use anyhow::Result;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::wav;
use crate::transcribe::backend::{
    joined_text, BlockTranscriber, Transcriber, TranscriptSegment, Transcription,
};

pub struct WhisperLocal {
    ctx: WhisperContext,
}

impl WhisperLocal {
    pub fn new(model_path: &str) -> Result<Self> {
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model: {:?}", e))?;
        Ok(Self { ctx })
    }

    /// Resolve a model name such as "base.en" to `ggml-base.en.bin`, unless a
    /// path to an existing file was given.
    pub fn model_file(model: &str) -> String {
        if Path::new(model).is_file() {
            model.to_string()
        } else {
            format!("ggml-{}.bin", model)
        }
    }

    fn run(&self, samples: &[f32]) -> Result<Vec<TranscriptSegment>> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create state: {:?}", e))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(4);
        params.set_language(Some("en"));

        state
            .full(params, samples)
            .map_err(|e| anyhow::anyhow!("Transcription failed: {:?}", e))?;

        let mut segments = Vec::new();
        let n_segments = state.full_n_segments();
        for i in 0..n_segments {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(text) = segment.to_str_lossy() {
                    // Timestamps are in centiseconds.
                    segments.push(TranscriptSegment::new(
                        format!("seg_{:03}", i),
                        segment.start_timestamp() as f64 / 100.0,
                        segment.end_timestamp() as f64 / 100.0,
                        text.trim().to_string(),
                    ));
                }
            }
        }
        Ok(segments)
    }
}

impl Transcriber for WhisperLocal {
    fn name(&self) -> &str {
        "whisper-local"
    }

    fn transcribe(&self, audio_path: &Path) -> Result<Transcription> {
        let audio = wav::read_mono_f32(audio_path)?;
        if audio.sample_rate != 16000 {
            anyhow::bail!(
                "Local whisper needs 16 kHz audio, got {} Hz",
                audio.sample_rate
            );
        }
        let duration = audio.duration_secs();
        let segments = self.run(&audio.samples)?;

        Ok(Transcription {
            duration,
            text: joined_text(&segments),
            segments,
        })
    }
}

impl BlockTranscriber for WhisperLocal {
    fn transcribe_block(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<TranscriptSegment>> {
        if sample_rate != 16000 {
            anyhow::bail!("Local whisper needs 16 kHz audio, got {} Hz", sample_rate);
        }
        self.run(samples)
    }
}
