use anyhow::{Context, Result};

use crate::summarize::chunker::TextChunker;
use crate::summarize::llm::Summarizer;
use crate::summarize::prompt;

/// Written instead of calling the summarizer when nothing was said.
pub const NO_CONTENT_SUMMARY: &str = "No speech was recorded in this meeting.";

#[derive(Debug, Clone, Copy)]
pub struct SummaryLength {
    pub min_words: usize,
    pub max_words: usize,
}

/// Summarize a (possibly long) transcript chunk by chunk. The per-chunk
/// summaries are joined in order with a blank line and no deduplication.
pub fn summarize_text(
    transcript: &str,
    chunker: &TextChunker,
    summarizer: &dyn Summarizer,
    length: SummaryLength,
) -> Result<String> {
    let cleaned = prompt::strip_noise_lines(transcript);
    let chunks = chunker.chunk(&cleaned);

    if chunks.is_empty() {
        tracing::info!("Transcript has no meaningful speech, skipping summarizer");
        return Ok(NO_CONTENT_SUMMARY.to_string());
    }

    tracing::info!("Summarizing {} chunk(s)", chunks.len());
    let mut summaries = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        tracing::info!(
            "Summarizing chunk {}/{} ({} words)",
            i + 1,
            chunks.len(),
            chunk.word_count()
        );
        let summary = summarizer
            .summarize(&chunk.text(), length.min_words, length.max_words)
            .with_context(|| format!("Summarization failed for chunk {}", i + 1))?;
        summaries.push(summary.trim().to_string());
    }

    Ok(summaries.join("\n\n"))
}
