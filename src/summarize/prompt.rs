/// Noise patterns that should be filtered from transcripts before summarization.
const NOISE_PATTERNS: &[&str] = &[
    "[BLANK_AUDIO]",
    "(keyboard clicking)",
    "(keyboard clacking)",
    "[snoring]",
    "(coughing)",
    "(silence)",
    "[silence]",
    "(music)",
    "[music]",
    "(static)",
    "(background noise)",
    "[inaudible]",
];

const DEFAULT_SYSTEM_PROMPT: &str = "You summarize meeting transcripts. Each line has the form \
     \"[speaker] : text\". Write a summary of {min_words} to {max_words} words covering the \
     topics discussed, decisions made and action items, attributing them to speakers where \
     it matters. Ignore filler and small talk. Do not invent content that is not in the \
     transcript.";

/// Returns true if the transcript text is considered noise (empty, whitespace-only,
/// or matches known noise patterns).
pub fn is_noise(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    NOISE_PATTERNS
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// Text of a merged transcript line without its `[speaker] : ` prefix.
fn line_body(line: &str) -> &str {
    match line.split_once(" : ") {
        Some((head, body)) if head.trim_start().starts_with('[') => body,
        _ => line,
    }
}

/// Drop lines whose spoken text is noise.
pub fn strip_noise_lines(transcript: &str) -> String {
    transcript
        .lines()
        .filter(|line| !is_noise(line_body(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the (system, user) prompt pair for one chunk.
pub fn build_chunk_prompt(
    chunk_text: &str,
    min_words: usize,
    max_words: usize,
    custom_system: &str,
) -> (String, String) {
    let template = if custom_system.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        custom_system
    };
    let system = template
        .replace("{min_words}", &min_words.to_string())
        .replace("{max_words}", &max_words.to_string());

    let user = format!("# Transcript excerpt\n\n{}", chunk_text.trim());
    (system, user)
}
