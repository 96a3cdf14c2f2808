//! Deterministic sentence-accumulation chunker: an exact splitting rule
//! (`. `, `! `, `? `) and a target sentences-per-chunk budget, hand-rolled
//! rather than delegated to a general-purpose splitter crate so the result
//! is reproducible for a given input.

/// Tuning knobs for [`split_into_chunks`]: a sentences-per-chunk budget
/// since chunk size here is measured in sentences, not tokens.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingTuning {
    /// Target number of sentences packed per chunk before a new chunk is
    /// started.
    pub sentences_per_chunk: usize,
}

impl Default for ChunkingTuning {
    fn default() -> Self {
        // One sentence per chunk keeps chunk boundaries aligned with
        // sentence boundaries exactly; packing more blurs retrieval
        // granularity without a clear win for typical note-length input.
        ChunkingTuning {
            sentences_per_chunk: 1,
        }
    }
}

/// Splits `text` into sentences on `. `, `! `, `? `, stripping empties,
/// then packs consecutive sentences into chunks of at most
/// `tuning.sentences_per_chunk` sentences each. Deterministic for a given
/// input; empty input yields zero chunks.
#[must_use]
pub fn split_into_chunks(text: &str, tuning: &ChunkingTuning) -> Vec<String> {
    let sentences = split_into_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let budget = tuning.sentences_per_chunk.max(1);
    sentences
        .chunks(budget)
        .map(|group| group.join(" "))
        .collect()
}

fn split_into_sentences(text: &str) -> Vec<String> {
    const DELIMITERS: [&str; 3] = [". ", "! ", "? "];

    let mut sentences = Vec::new();
    let mut remainder = text;
    loop {
        let next_split = DELIMITERS
            .iter()
            .filter_map(|delim| remainder.find(delim).map(|idx| (idx, delim.len())))
            .min_by_key(|(idx, _)| *idx);

        match next_split {
            Some((idx, delim_len)) => {
                // `idx` points at the punctuation character itself; keep it
                // as part of the sentence and drop only the delimiter's
                // trailing whitespace.
                let sentence = remainder.get(..=idx).unwrap_or(remainder);
                push_trimmed(&mut sentences, sentence);
                remainder = remainder.get(idx + delim_len..).unwrap_or("");
            }
            None => {
                push_trimmed(&mut sentences, remainder);
                break;
            }
        }
    }
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
