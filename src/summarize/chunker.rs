// Sentence-aligned chunking of long transcripts for piecewise summarization.

use regex::Regex;

use crate::config::SplitterKind;

/// Splits text into sentences. Implementations must return every non-blank
/// piece of the input, in order.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// A candidate sentence break: the sentence ends at `end` (just after the
/// punctuation) and the next one starts at `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundary {
    end: usize,
    next: usize,
}

/// Ends a sentence at `.`, `?` or `!` followed by whitespace and then an
/// uppercase letter or `[`.
pub struct RegexSplitter {
    pattern: Regex,
}

impl RegexSplitter {
    pub fn new() -> Self {
        Self {
            // Both the punctuation and the following character are single bytes.
            pattern: Regex::new(r"[.!?]\s+[A-Z\[]").expect("static regex"),
        }
    }

    fn boundaries(&self, text: &str) -> Vec<Boundary> {
        self.pattern
            .find_iter(text)
            .map(|m| Boundary {
                end: m.start() + 1,
                next: m.end() - 1,
            })
            .collect()
    }
}

impl Default for RegexSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSplitter for RegexSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        cut(text, &self.boundaries(text))
    }
}

const ABBREVIATIONS: &[&str] = &[
    "dr.", "mr.", "mrs.", "ms.", "prof.", "st.", "jr.", "sr.", "vs.", "etc.", "e.g.", "i.e.",
];

/// The regex heuristic, minus breaks that directly follow a known title or
/// abbreviation ("Dr. Smith arrived." stays one sentence).
pub struct AbbreviationAware {
    inner: RegexSplitter,
}

impl AbbreviationAware {
    pub fn new() -> Self {
        Self {
            inner: RegexSplitter::new(),
        }
    }

    fn ends_with_abbreviation(head: &str) -> bool {
        let last_word = head
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        ABBREVIATIONS.contains(&last_word.as_str())
    }
}

impl Default for AbbreviationAware {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSplitter for AbbreviationAware {
    fn split(&self, text: &str) -> Vec<String> {
        let kept: Vec<Boundary> = self
            .inner
            .boundaries(text)
            .into_iter()
            .filter(|b| !Self::ends_with_abbreviation(&text[..b.end]))
            .collect();
        cut(text, &kept)
    }
}

fn cut(text: &str, boundaries: &[Boundary]) -> Vec<String> {
    let mut sentences = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for b in boundaries {
        push_trimmed(&mut sentences, &text[start..b.end]);
        start = b.next;
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece.to_string());
    }
}

pub fn build_splitter(kind: SplitterKind) -> Box<dyn SentenceSplitter> {
    match kind {
        SplitterKind::Regex => Box::new(RegexSplitter::new()),
        SplitterKind::AbbreviationAware => Box::new(AbbreviationAware::new()),
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub max_words: usize,
    /// Words repeated from the end of the previous chunk. Zero disables overlap.
    pub overlap_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_words: 500,
            overlap_words: 80,
        }
    }
}

/// One piece of text handed to the summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Whole sentences, the overlap sentences first.
    pub sentences: Vec<String>,
    /// Words at the start of this chunk repeated from the previous one.
    pub overlap_with_previous: usize,
}

impl TextChunk {
    pub fn words(&self) -> Vec<&str> {
        self.sentences
            .iter()
            .flat_map(|s| s.split_whitespace())
            .collect()
    }

    pub fn word_count(&self) -> usize {
        self.sentences.iter().map(|s| word_count(s)).sum()
    }

    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }
}

pub struct TextChunker {
    splitter: Box<dyn SentenceSplitter>,
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(splitter: Box<dyn SentenceSplitter>, config: ChunkerConfig) -> Self {
        Self { splitter, config }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let max_words = self.config.max_words.max(1);
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0;
        let mut overlap = 0;

        for sentence in self.splitter.split(text) {
            let words = word_count(&sentence);

            // A sentence longer than the budget still rolls over normally: it
            // lands after the overlap seed and its chunk runs over budget.
            if current_words + words > max_words && !current.is_empty() {
                let (seed, seed_words) = self.trailing_overlap(&current);
                chunks.push(TextChunk {
                    sentences: std::mem::replace(&mut current, seed),
                    overlap_with_previous: overlap,
                });
                current_words = seed_words;
                overlap = seed_words;
            }

            current_words += words;
            current.push(sentence);
        }

        if !current.is_empty() {
            chunks.push(TextChunk {
                sentences: current,
                overlap_with_previous: overlap,
            });
        }

        tracing::debug!("Split text into {} chunk(s)", chunks.len());
        chunks
    }

    /// Whole sentences from the end of `sentences`, walked backward until they
    /// hold at least `overlap_words` words.
    fn trailing_overlap(&self, sentences: &[String]) -> (Vec<String>, usize) {
        if self.config.overlap_words == 0 {
            return (Vec::new(), 0);
        }
        let mut taken = 0;
        let mut words = 0;
        for sentence in sentences.iter().rev() {
            taken += 1;
            words += word_count(sentence);
            if words >= self.config.overlap_words {
                break;
            }
        }
        (sentences[sentences.len() - taken..].to_vec(), words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count` sentences of exactly `words` words each, e.g. "S0 w w w.".
    fn sentences(count: usize, words: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let mut s = format!("S{}", i);
                for _ in 1..words {
                    s.push_str(" w");
                }
                s.push('.');
                s
            })
            .collect()
    }

    fn chunker(max_words: usize, overlap_words: usize) -> TextChunker {
        TextChunker::new(
            Box::new(AbbreviationAware::new()),
            ChunkerConfig {
                max_words,
                overlap_words,
            },
        )
    }

    #[test]
    fn test_regex_splitter_basic() {
        let s = RegexSplitter::new().split("Hello there. How are you? Fine! ok then.");
        assert_eq!(s, vec!["Hello there.", "How are you?", "Fine! ok then."]);
    }

    #[test]
    fn test_regex_splitter_breaks_before_bracket() {
        let s = RegexSplitter::new().split("[A] : We agreed.\n[B] : Good.");
        assert_eq!(s, vec!["[A] : We agreed.", "[B] : Good."]);
    }

    #[test]
    fn test_regex_splitter_breaks_after_title() {
        let s = RegexSplitter::new().split("Dr. Smith arrived. He sat down.");
        assert_eq!(s, vec!["Dr.", "Smith arrived.", "He sat down."]);
    }

    #[test]
    fn test_abbreviation_aware_keeps_title() {
        let s = AbbreviationAware::new().split("Dr. Smith arrived. He sat down.");
        assert_eq!(s, vec!["Dr. Smith arrived.", "He sat down."]);
    }

    #[test]
    fn test_abbreviation_aware_other_guards() {
        let s = AbbreviationAware::new()
            .split("We met Mrs. Jones (Prof. Lee came too). Apples vs. Oranges won.");
        assert_eq!(
            s,
            vec!["We met Mrs. Jones (Prof. Lee came too).", "Apples vs. Oranges won."]
        );
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunker(500, 80).chunk("   ").is_empty());
    }

    #[test]
    fn test_chunk_short_text_single_chunk() {
        let chunks = chunker(500, 80).chunk("Dr. Smith arrived. He sat down.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].overlap_with_previous, 0);
        assert_eq!(chunks[0].text(), "Dr. Smith arrived. He sat down.");
        assert_eq!(chunks[0].word_count(), 6);
    }

    #[test]
    fn test_chunk_coverage_overlap_and_budget() {
        let source = sentences(30, 10);
        let chunks = chunker(50, 15).chunk(&source.join(" "));
        assert!(chunks.len() > 1);

        let mut rebuilt: Vec<String> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.word_count() <= 50);
            if i == 0 {
                assert_eq!(chunk.overlap_with_previous, 0);
            } else {
                assert!(chunk.overlap_with_previous >= 15);
                // The overlap is exactly the tail of the previous chunk.
                let prev_words = chunks[i - 1].words();
                let words = chunk.words();
                let overlap = &words[..chunk.overlap_with_previous];
                assert_eq!(overlap, &prev_words[prev_words.len() - overlap.len()..]);
            }
            let overlap_sentences = chunk
                .sentences
                .iter()
                .scan(0, |words, s| {
                    *words += word_count(s);
                    Some(*words)
                })
                .take_while(|w| *w <= chunk.overlap_with_previous)
                .count();
            rebuilt.extend(chunk.sentences[overlap_sentences..].iter().cloned());
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_chunk_without_overlap_is_partition() {
        let source = sentences(12, 10);
        let chunks = chunker(40, 0).chunk(&source.join(" "));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.overlap_with_previous == 0));
        let rebuilt: Vec<String> = chunks.into_iter().flat_map(|c| c.sentences).collect();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_oversized_sentence_keeps_overlap() {
        let mut source = sentences(2, 5);
        let long = sentences(1, 30)[0].replace("S0", "Long");
        source.insert(1, long.clone());
        let chunks = chunker(20, 5).chunk(&source.join(" "));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].sentences, vec![source[0].clone()]);
        assert_eq!(chunks[1].sentences, vec![source[0].clone(), long.clone()]);
        assert_eq!(chunks[1].overlap_with_previous, 5);
        assert_eq!(chunks[2].sentences, vec![long, source[2].clone()]);
        assert_eq!(chunks[2].overlap_with_previous, 30);

        for pair in chunks.windows(2) {
            let prev_words = pair[0].words();
            let words = pair[1].words();
            assert!(pair[1].overlap_with_previous >= 5);
            let overlap = &words[..pair[1].overlap_with_previous];
            assert_eq!(overlap, &prev_words[prev_words.len() - overlap.len()..]);
        }
    }

    #[test]
    fn test_oversized_first_sentence() {
        let mut source = sentences(1, 25);
        source.extend(sentences(1, 4).into_iter().map(|s| s.replace("S0", "Tail")));
        let chunks = chunker(20, 5).chunk(&source.join(" "));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].word_count(), 25);
        assert_eq!(chunks[1].overlap_with_previous, 25);
        assert_eq!(chunks[1].sentences, source);
    }

    #[test]
    fn test_overlap_walks_whole_sentences() {
        let source = sentences(4, 10);
        // Budget fits three sentences; overlap of 12 needs two trailing sentences.
        let chunks = chunker(30, 12).chunk(&source.join(" "));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].overlap_with_previous, 20);
        assert_eq!(chunks[1].sentences, source[1..4].to_vec());
    }
}
