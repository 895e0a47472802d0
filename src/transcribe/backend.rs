use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// One timed piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Providers number segments; stored artifacts may use strings such as "seg_000".
    #[serde(default, deserialize_with = "id_from_str_or_int")]
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(id: impl Into<String>, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            text: text.into(),
        }
    }
}

fn id_from_str_or_int<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => format!("seg_{:03}", n),
    })
}

/// Result of transcribing one audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub duration: f64,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcription {
    /// Plain text of the transcription, falling back to the joined segments
    /// when the provider returned no top-level text.
    pub fn full_text(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.trim().to_string();
        }
        joined_text(&self.segments)
    }
}

pub fn joined_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub trait Transcriber: Send {
    fn name(&self) -> &str;
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription>;
}

/// Transcribes in-memory audio blocks (live mode).
pub trait BlockTranscriber: Send {
    fn transcribe_block(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<TranscriptSegment>>;
}
