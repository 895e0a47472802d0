use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::artifacts::{file_ready, Artifact, ArtifactStore};
use crate::audio::cleaner::{AudioCleaner, WavCleaner};
use crate::audio::live::CancellationToken;
use crate::config::Config;
use crate::diarize::client::PyannoteClient;
use crate::diarize::poller::JobPoller;
use crate::diarize::{DiarizationApi, DiarizationSegment};
use crate::error::PipelineError;
use crate::merge::{self, SegmentMerger};
use crate::pipeline::orchestrator::{Stage, StageKind};
use crate::summarize::chunker::{build_splitter, ChunkerConfig, TextChunker};
use crate::summarize::llm::{ChatSummarizer, Summarizer};
use crate::summarize::runner::{summarize_text, SummaryLength};
use crate::transcribe;
use crate::transcribe::backend::{joined_text, TranscriptSegment, Transcriber};

pub struct CleanStage {
    input: PathBuf,
    cleaner: Box<dyn AudioCleaner>,
}

impl CleanStage {
    pub fn new(input: impl Into<PathBuf>, cleaner: Box<dyn AudioCleaner>) -> Self {
        Self {
            input: input.into(),
            cleaner,
        }
    }
}

impl Stage for CleanStage {
    fn kind(&self) -> StageKind {
        StageKind::Clean
    }

    fn run(&self, store: &ArtifactStore) -> Result<()> {
        if !file_ready(&self.input) {
            return Err(PipelineError::MissingInput(format!(
                "input audio {} is missing or empty",
                self.input.display()
            ))
            .into());
        }
        self.cleaner
            .clean(&self.input, &store.tmp_path(Artifact::CleanedAudio))?;
        store.commit(Artifact::CleanedAudio)?;
        Ok(())
    }
}

/// Persisted form of a transcription; the plain text goes to its own file.
#[derive(Serialize)]
struct TranscriptionRecord<'a> {
    duration: f64,
    segments: &'a [TranscriptSegment],
}

pub struct TranscribeStage {
    transcriber: Box<dyn Transcriber>,
}

impl TranscribeStage {
    pub fn new(transcriber: Box<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

impl Stage for TranscribeStage {
    fn kind(&self) -> StageKind {
        StageKind::Transcribe
    }

    fn run(&self, store: &ArtifactStore) -> Result<()> {
        let audio = store.require(Artifact::CleanedAudio)?;
        tracing::info!("Transcribing with {}", self.transcriber.name());
        let transcription = self
            .transcriber
            .transcribe(&audio)
            .with_context(|| format!("{} transcription failed", self.transcriber.name()))?;

        tracing::info!(
            "Transcribed {:.1}s of audio into {} segments",
            transcription.duration,
            transcription.segments.len()
        );

        // Text first: the JSON record is what marks the stage complete.
        let text = transcription.full_text();
        if !text.is_empty() {
            store.write_text(Artifact::TranscriptText, &text)?;
        }
        store.write_json(
            Artifact::Transcription,
            &TranscriptionRecord {
                duration: transcription.duration,
                segments: &transcription.segments,
            },
        )?;
        Ok(())
    }

    /// Rebuild transcript.txt from the cached segments if it went missing.
    fn on_skip(&self, store: &ArtifactStore) -> Result<()> {
        if store.is_ready(Artifact::TranscriptText) {
            return Ok(());
        }
        let record = store.read_json_value(Artifact::Transcription)?;
        let text = joined_text(&merge::transcript_segments(&record)?);
        if !text.is_empty() {
            tracing::info!("Regenerating {}", Artifact::TranscriptText.file_name());
            store.write_text(Artifact::TranscriptText, &text)?;
        }
        Ok(())
    }
}

pub struct DiarizeStage {
    api: Box<dyn DiarizationApi>,
    poller: JobPoller,
}

impl DiarizeStage {
    pub fn new(api: Box<dyn DiarizationApi>, poller: JobPoller) -> Self {
        Self { api, poller }
    }
}

impl Stage for DiarizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Diarize
    }

    fn run(&self, store: &ArtifactStore) -> Result<()> {
        let audio = store.require(Artifact::CleanedAudio)?;
        self.api.ensure_credentials()?;

        let output = self.poller.run(self.api.as_ref(), &audio)?;
        let segments = merge::diarization_segments(&output)?;
        tracing::info!("Diarization returned {} speaker turns", segments.len());

        store.write_json(Artifact::Diarization, &segments)?;
        Ok(())
    }
}

pub struct MergeStage {
    merger: SegmentMerger,
}

impl MergeStage {
    pub fn new(merger: SegmentMerger) -> Self {
        Self { merger }
    }
}

impl Stage for MergeStage {
    fn kind(&self) -> StageKind {
        StageKind::Merge
    }

    fn run(&self, store: &ArtifactStore) -> Result<()> {
        let transcription = store.read_json_value(Artifact::Transcription)?;
        let transcript = merge::transcript_segments(&transcription)?;
        let turns: Vec<DiarizationSegment> = store.read_json(Artifact::Diarization)?;

        if transcript.is_empty() {
            return Err(PipelineError::Validation(
                "transcription contains no segments to attribute".to_string(),
            )
            .into());
        }

        let merged = self.merger.merge(&transcript, &turns);
        store.write_text(Artifact::DiarizedTranscript, &merge::render_lines(&merged))?;
        tracing::info!("Attributed {} segments to speakers", merged.len());
        Ok(())
    }
}

pub struct SummarizeStage {
    chunker: TextChunker,
    summarizer: Box<dyn Summarizer>,
    length: SummaryLength,
}

impl SummarizeStage {
    pub fn new(chunker: TextChunker, summarizer: Box<dyn Summarizer>, length: SummaryLength) -> Self {
        Self {
            chunker,
            summarizer,
            length,
        }
    }
}

impl Stage for SummarizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Summarize
    }

    fn run(&self, store: &ArtifactStore) -> Result<()> {
        let transcript = store.read_text(Artifact::DiarizedTranscript)?;
        let summary = summarize_text(
            &transcript,
            &self.chunker,
            self.summarizer.as_ref(),
            self.length,
        )?;
        store.write_text(Artifact::Summary, &summary)?;
        Ok(())
    }
}

/// The production stage set for one input file. Credentials are only
/// checked when a stage actually runs.
pub fn build_stages(
    config: &Config,
    input: &Path,
    backend_override: Option<&str>,
    cancel: CancellationToken,
) -> Result<Vec<Box<dyn Stage>>> {
    let summarization = &config.summarization;
    let chunker = TextChunker::new(
        build_splitter(summarization.sentence_splitter),
        ChunkerConfig {
            max_words: summarization.max_chunk_words,
            overlap_words: summarization.overlap_words,
        },
    );
    let poller = JobPoller::new(
        Duration::from_secs(config.diarization.poll_interval_secs),
        config.diarization.max_checks,
    )
    .with_cancellation(cancel);

    Ok(vec![
        Box::new(CleanStage::new(
            input,
            Box::new(WavCleaner::new(config.cleaner.clone())),
        )),
        Box::new(TranscribeStage::new(transcribe::build_transcriber(
            &config.transcription,
            backend_override,
        )?)),
        Box::new(DiarizeStage::new(
            Box::new(PyannoteClient::new(&config.diarization)?),
            poller,
        )),
        Box::new(MergeStage::new(SegmentMerger::new(config.merge.fill_nearest))),
        Box::new(SummarizeStage::new(
            chunker,
            Box::new(ChatSummarizer::from_config(config)?),
            SummaryLength {
                min_words: summarization.min_summary_words,
                max_words: summarization.max_summary_words,
            },
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use crate::summarize::chunker::RegexSplitter;
    use crate::transcribe::backend::Transcription;
    use serde_json::json;
    use tempfile::TempDir;

    struct FixedTranscriber;

    impl Transcriber for FixedTranscriber {
        fn name(&self) -> &str {
            "fixed"
        }

        fn transcribe(&self, _audio_path: &Path) -> Result<Transcription> {
            Ok(Transcription {
                duration: 5.0,
                text: String::new(),
                segments: vec![TranscriptSegment::new("seg_000", 0.0, 5.0, " Hello there ")],
            })
        }
    }

    struct ShortSummarizer;

    impl Summarizer for ShortSummarizer {
        fn summarize(&self, chunk_text: &str, _: usize, _: usize) -> Result<String> {
            Ok(format!("Summary of: {}", chunk_text))
        }
    }

    fn store() -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_clean_missing_input_is_missing_input() {
        let (tmp, store) = store();
        let stage = CleanStage::new(
            tmp.path().join("nope.wav"),
            Box::new(WavCleaner::new(Default::default())),
        );
        let err = stage.run(&store).unwrap_err();
        assert_eq!(classify(&err), ErrorKind::MissingInput);
    }

    #[test]
    fn test_transcribe_writes_record_and_text() {
        let (_tmp, store) = store();
        store.write_bytes(Artifact::CleanedAudio, b"RIFF").unwrap();

        TranscribeStage::new(Box::new(FixedTranscriber)).run(&store).unwrap();

        let record = store.read_json_value(Artifact::Transcription).unwrap();
        assert_eq!(record["duration"], json!(5.0));
        assert_eq!(record["segments"][0]["id"], json!("seg_000"));
        assert_eq!(store.read_text(Artifact::TranscriptText).unwrap(), "Hello there");
    }

    #[test]
    fn test_transcribe_requires_cleaned_audio() {
        let (_tmp, store) = store();
        let err = TranscribeStage::new(Box::new(FixedTranscriber))
            .run(&store)
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::MissingInput);
    }

    #[test]
    fn test_transcribe_skip_regenerates_text() {
        let (_tmp, store) = store();
        store
            .write_json(
                Artifact::Transcription,
                &json!({"duration": 3.0, "segments": [
                    {"id": "seg_000", "start": 0.0, "end": 1.0, "text": "One."},
                    {"id": "seg_001", "start": 1.0, "end": 3.0, "text": " Two."}
                ]}),
            )
            .unwrap();

        TranscribeStage::new(Box::new(FixedTranscriber))
            .on_skip(&store)
            .unwrap();
        assert_eq!(store.read_text(Artifact::TranscriptText).unwrap(), "One. Two.");
    }

    #[test]
    fn test_merge_stage_writes_lines() {
        let (_tmp, store) = store();
        store
            .write_json(
                Artifact::Transcription,
                &json!({"duration": 5.0, "segments": [
                    {"id": "seg_000", "start": 0.0, "end": 5.0, "text": "Hello there"}
                ]}),
            )
            .unwrap();
        store
            .write_json(
                Artifact::Diarization,
                &json!([{"start": 0.0, "end": 5.0, "speaker": "SPEAKER_00"}]),
            )
            .unwrap();

        MergeStage::new(SegmentMerger::default()).run(&store).unwrap();
        assert_eq!(
            store.read_text(Artifact::DiarizedTranscript).unwrap(),
            "[SPEAKER_00] : Hello there"
        );
    }

    #[test]
    fn test_merge_stage_rejects_non_list_diarization() {
        let (_tmp, store) = store();
        store
            .write_json(Artifact::Transcription, &json!({"duration": 1.0, "segments": []}))
            .unwrap();
        store
            .write_json(Artifact::Diarization, &json!({"speaker": "A"}))
            .unwrap();
        let err = MergeStage::new(SegmentMerger::default()).run(&store).unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Validation);
        assert!(err.to_string().contains("diarization.json"));
        assert!(!store.is_ready(Artifact::DiarizedTranscript));
    }

    #[test]
    fn test_summarize_stage_writes_summary() {
        let (_tmp, store) = store();
        store
            .write_text(Artifact::DiarizedTranscript, "[SPEAKER_00] : Hello there")
            .unwrap();
        let stage = SummarizeStage::new(
            TextChunker::new(Box::new(RegexSplitter::new()), ChunkerConfig::default()),
            Box::new(ShortSummarizer),
            SummaryLength {
                min_words: 100,
                max_words: 150,
            },
        );
        stage.run(&store).unwrap();
        assert_eq!(
            store.read_text(Artifact::Summary).unwrap(),
            "Summary of: [SPEAKER_00] : Hello there"
        );
    }

    #[test]
    fn test_build_stages_without_credentials() {
        let tmp = TempDir::new().unwrap();
        let stages = build_stages(
            &Config::default(),
            &tmp.path().join("meeting.wav"),
            None,
            CancellationToken::new(),
        )
        .unwrap();
        let kinds: Vec<StageKind> = stages.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
    }
}
