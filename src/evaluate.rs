// Transcription accuracy against a reference text: word-level WER/MER/WIL/WIP
// and character-level CER, from a Levenshtein alignment.
//
// Words are compared case-insensitively after whitespace normalisation.
// Characters are compared as-is on the trimmed text, spaces included.

use anyhow::Result;

use crate::error::PipelineError;

pub const REPORT_FILE_NAME: &str = "wer_report.txt";

/// Operation counts of a minimum-cost alignment of hypothesis to reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditCounts {
    pub hits: usize,
    pub substitutions: usize,
    pub deletions: usize,
    pub insertions: usize,
}

impl EditCounts {
    pub fn errors(&self) -> usize {
        self.substitutions + self.deletions + self.insertions
    }

    pub fn reference_len(&self) -> usize {
        self.hits + self.substitutions + self.deletions
    }

    pub fn hypothesis_len(&self) -> usize {
        self.hits + self.substitutions + self.insertions
    }
}

/// Align `hypothesis` to `reference` and count the edit operations.
///
/// Ties in the backtrace prefer match/substitution, then deletion, then
/// insertion. The total error count does not depend on the tie-break.
pub fn align<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> EditCounts {
    let m = reference.len();
    let n = hypothesis.len();
    let width = n + 1;
    let mut dist = vec![0usize; (m + 1) * width];

    for i in 0..=m {
        dist[i * width] = i;
    }
    for j in 0..=n {
        dist[j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = usize::from(reference[i - 1] != hypothesis[j - 1]);
            dist[i * width + j] = (dist[(i - 1) * width + j] + 1)
                .min(dist[i * width + j - 1] + 1)
                .min(dist[(i - 1) * width + j - 1] + cost);
        }
    }

    let mut counts = EditCounts::default();
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        let here = dist[i * width + j];
        if i > 0 && j > 0 {
            let same = reference[i - 1] == hypothesis[j - 1];
            if dist[(i - 1) * width + j - 1] + usize::from(!same) == here {
                if same {
                    counts.hits += 1;
                } else {
                    counts.substitutions += 1;
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && dist[(i - 1) * width + j] + 1 == here {
            counts.deletions += 1;
            i -= 1;
        } else {
            counts.insertions += 1;
            j -= 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordMetrics {
    pub counts: EditCounts,
    pub wer: f64,
    pub mer: f64,
    pub wil: f64,
    pub wip: f64,
}

impl WordMetrics {
    fn from_counts(counts: EditCounts) -> Self {
        let errors = counts.errors() as f64;
        let hits = counts.hits as f64;
        let reference = counts.reference_len() as f64;
        let hypothesis = counts.hypothesis_len() as f64;

        let wer = errors / reference;
        let mer = errors / (hits + errors);
        let wip = if hypothesis == 0.0 {
            0.0
        } else {
            (hits / reference) * (hits / hypothesis)
        };
        Self {
            counts,
            wer,
            mer,
            wil: 1.0 - wip,
            wip,
        }
    }

    /// `1 - WER`. Negative when the hypothesis has many insertions.
    pub fn accuracy(&self) -> f64 {
        1.0 - self.wer
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharMetrics {
    pub counts: EditCounts,
    pub cer: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyReport {
    pub words: WordMetrics,
    pub chars: CharMetrics,
}

/// Lowercased words, split on any whitespace.
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Score `hypothesis` against `reference`. An empty reference is rejected.
pub fn evaluate(reference: &str, hypothesis: &str) -> Result<AccuracyReport> {
    let reference_words = normalize_words(reference);
    if reference_words.is_empty() {
        return Err(PipelineError::Validation("reference text is empty".to_string()).into());
    }
    let words = WordMetrics::from_counts(align(&reference_words, &normalize_words(hypothesis)));

    let reference_chars: Vec<char> = reference.trim().chars().collect();
    let hypothesis_chars: Vec<char> = hypothesis.trim().chars().collect();
    let char_counts = align(&reference_chars, &hypothesis_chars);
    let chars = CharMetrics {
        counts: char_counts,
        cer: char_counts.errors() as f64 / char_counts.reference_len() as f64,
    };

    tracing::debug!(
        "WER {:.3} over {} reference words, CER {:.3}",
        words.wer,
        words.counts.reference_len(),
        chars.cer
    );
    Ok(AccuracyReport { words, chars })
}

impl AccuracyReport {
    /// Plain-text report, as printed and saved to `wer_report.txt`.
    pub fn render(&self) -> String {
        let w = &self.words;
        let c = &self.chars;
        let row = |label: &str, value: String| format!("{:<30}{}\n", label, value);

        let mut out = String::from("=== Speech-to-Text Evaluation ===\n\n--- Word-Level Metrics ---\n");
        out += &row("Word Error Rate (WER):", format!("{:.3}", w.wer));
        out += &row("Match Error Rate (MER):", format!("{:.3}", w.mer));
        out += &row("Word Info Lost (WIL):", format!("{:.3}", w.wil));
        out += &row("Word Info Preserved (WIP):", format!("{:.3}", w.wip));
        out += &row("Substitutions:", w.counts.substitutions.to_string());
        out += &row("Insertions:", w.counts.insertions.to_string());
        out += &row("Deletions:", w.counts.deletions.to_string());
        out += &row("Hits (correct words):", w.counts.hits.to_string());
        out += &row("Total Reference Words:", w.counts.reference_len().to_string());
        out += &row("Accuracy (Word-Level):", format!("{:.3}", w.accuracy()));
        out += "\n--- Character-Level Metrics ---\n";
        out += &row("Character Error Rate (CER):", format!("{:.3}", c.cer));
        out += &row("Substitutions (chars):", c.counts.substitutions.to_string());
        out += &row("Insertions (chars):", c.counts.insertions.to_string());
        out += &row("Deletions (chars):", c.counts.deletions.to_string());
        out += &row("Total Reference Chars:", c.counts.reference_len().to_string());
        out
    }
}
