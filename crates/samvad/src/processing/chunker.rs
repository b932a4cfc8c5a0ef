//! Sliding-window text chunking.
//!
//! Splits normalized text into fixed-size windows with a fixed overlap and
//! tags each chunk with its 1-based ordinal and sibling count. Concatenating
//! chunks in ordinal order reconstructs the source text modulo the overlap
//! regions, which keeps retrieval hits traceable back to the document.

/// A bounded-size fragment of source text tagged with its position.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentChunk {
    /// 1-based position among siblings.
    pub ordinal: usize,
    /// Total number of chunks produced from the same source.
    pub total: usize,
    pub text: String,
}

impl DocumentChunk {
    /// Text submitted to the embedding service: the stored chunk prefixed
    /// with its sequence header so adjacent chunks embed distinctly.
    pub fn embedding_text(&self) -> String {
        format!("Chunk {} of {}:\n{}", self.ordinal, self.total, self.text)
    }
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Panics in debug builds if overlap >= size; config validation rejects
    /// that combination before a chunker is ever constructed.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_overlap < chunk_size);
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split `text` into overlapping windows. Empty input yields no chunks;
    /// callers treat that as "nothing to index", not an error.
    pub fn chunk(&self, text: &str) -> Vec<DocumentChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let end = snap_to_char_boundary(text, (start + self.chunk_size).min(text.len()));
            pieces.push(text[start..end].to_string());
            if end >= text.len() {
                break;
            }
            let next = snap_to_char_boundary(text, start + step);
            // Snapping rounds down; with tiny steps over multibyte text that
            // can land back on `start`, so force progress to the next char.
            start = if next > start {
                next
            } else {
                match text[start..].char_indices().nth(1) {
                    Some((offset, _)) => start + offset,
                    None => break,
                }
            };
        }

        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| DocumentChunk {
                ordinal: i + 1,
                total,
                text,
            })
            .collect()
    }
}

/// Snap a byte offset to the nearest valid UTF-8 char boundary (rounding down).
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = TextChunker::new(100, 20);
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let chunker = TextChunker::new(100, 20);
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 1);
        assert_eq!(chunks[0].total, 1);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn ordinals_are_one_based_and_totals_consistent() {
        let chunker = TextChunker::new(10, 2);
        let chunks = chunker.chunk(&"abcdefgh".repeat(8));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i + 1);
            assert_eq!(chunk.total, chunks.len());
        }
    }

    #[test]
    fn concatenation_reconstructs_source_modulo_overlap() {
        let text: String = (0..997).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let size = 50;
        let overlap = 10;
        let chunker = TextChunker::new(size, overlap);
        let chunks = chunker.chunk(&text);

        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk.text[overlap.min(chunk.text.len())..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn chunk_count_stays_within_termination_bound() {
        let text = "x".repeat(4321);
        let size = 100;
        let overlap = 30;
        let chunker = TextChunker::new(size, overlap);
        let chunks = chunker.chunk(&text);
        let bound = text.len().div_ceil(size - overlap);
        assert!(chunks.len() <= bound);
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let chunker = TextChunker::new(10, 3);
        let chunks = chunker.chunk(&"héllо wörld ".repeat(20));
        // Would panic on a bad boundary; also verify nothing is empty.
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn embedding_text_carries_sequence_header() {
        let chunk = DocumentChunk {
            ordinal: 2,
            total: 5,
            text: "body".into(),
        };
        assert_eq!(chunk.embedding_text(), "Chunk 2 of 5:\nbody");
    }
}
