// Speaker attribution: label each transcript segment with the diarization
// speaker it overlaps most.
//
// Score per speaker = sum over that speaker's turns of
// `min(turn.end, seg.end) - max(turn.start, seg.start)`. Negative values (no
// overlap, the gap between the two intervals) are kept, so with
// `fill_nearest` a segment with no overlap still goes to the closest speaker.
// Speakers are compared in label order and only a strictly greater score
// replaces the current leader.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diarize::DiarizationSegment;
use crate::error::PipelineError;
use crate::transcribe::backend::TranscriptSegment;

pub const UNKNOWN_SPEAKER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerLabeledSegment {
    #[serde(flatten)]
    pub segment: TranscriptSegment,
    pub speaker: String,
}

impl SpeakerLabeledSegment {
    /// `[speaker] : text`, the persisted line format.
    pub fn line(&self) -> String {
        format!("[{}] : {}", self.speaker, self.segment.text.trim())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentMerger {
    fill_nearest: bool,
}

impl Default for SegmentMerger {
    fn default() -> Self {
        Self { fill_nearest: true }
    }
}

impl SegmentMerger {
    pub fn new(fill_nearest: bool) -> Self {
        Self { fill_nearest }
    }

    pub fn merge(
        &self,
        transcript: &[TranscriptSegment],
        diarization: &[DiarizationSegment],
    ) -> Vec<SpeakerLabeledSegment> {
        transcript
            .iter()
            .map(|seg| SpeakerLabeledSegment {
                segment: seg.clone(),
                speaker: self.speaker_for(seg, diarization),
            })
            .collect()
    }

    fn speaker_for(&self, seg: &TranscriptSegment, diarization: &[DiarizationSegment]) -> String {
        let mut scores: BTreeMap<&str, f64> = BTreeMap::new();
        for turn in diarization {
            let intersection = turn.end.min(seg.end) - turn.start.max(seg.start);
            if !self.fill_nearest && intersection <= 0.0 {
                continue;
            }
            *scores.entry(turn.speaker.as_str()).or_insert(0.0) += intersection;
        }

        let mut best: Option<(&str, f64)> = None;
        for (speaker, score) in scores {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((speaker, score)),
            }
        }

        best.map(|(speaker, _)| speaker.to_string())
            .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())
    }
}

/// One `[speaker] : text` line per segment, newline separated.
pub fn render_lines(segments: &[SpeakerLabeledSegment]) -> String {
    segments
        .iter()
        .map(SpeakerLabeledSegment::line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript segments from a stored transcription record. The record may be
/// the full `{duration, segments}` object or a bare segment list.
pub fn transcript_segments(record: &Value) -> Result<Vec<TranscriptSegment>> {
    let list = match record {
        Value::Object(map) => map
            .get("segments")
            .ok_or_else(|| PipelineError::Validation("transcription has no 'segments'".to_string()))?,
        other => other,
    };
    parse_list(list, "transcript segments")
}

/// Diarization segments from a stored diarization record (a list).
pub fn diarization_segments(record: &Value) -> Result<Vec<DiarizationSegment>> {
    parse_list(record, "diarization result")
}

fn parse_list<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<Vec<T>> {
    if !value.is_array() {
        return Err(PipelineError::Validation(format!(
            "{} must be a list, got {}",
            what,
            json_type(value)
        ))
        .into());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| PipelineError::Validation(format!("{}: {}", what, e)).into())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
