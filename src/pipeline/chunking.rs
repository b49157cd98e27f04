//! Sliding-window chunking and the chunk-count limit.
//!
//! Chunks are measured in the pieces produced by the run's [`SizeEstimator`]: BPE tokens for
//! tiktoken encodings, words for the whitespace counter. Pieces are contiguous slices of the
//! document, so a window never splits a character. Chunk `k` starts at piece
//! `k * (chunk_size - overlap)` and spans up to `chunk_size` pieces, which means:
//!
//! - dropping the first `overlap` pieces of every chunk after the first and concatenating
//!   reproduces the document exactly;
//! - a document of `L > overlap` pieces yields `ceil((L - overlap) / (chunk_size - overlap))`
//!   chunks.
//!
//! The chunk iterator is lazy, `Clone` and exact-size, so a caller can restart it from any point
//! or count what remains without building chunk text. The `chunk_count_limit` truncation is a
//! separate step ([`apply_chunk_limit`]) applied after chunking, so the limit never changes
//! overlap behavior.

use std::sync::Arc;

use super::estimate::SizeEstimator;
use super::types::{Chunk, ChunkingError};

/// Splits documents into overlapping, bounded-size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Build a chunker, rejecting zero-sized chunks and overlaps that leave no room to advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Lazily iterate the chunks of `text`, measured in `estimator` pieces.
    ///
    /// Fails with [`ChunkingError::EmptyInput`] when the document is empty or whitespace only.
    pub fn chunks<'a>(
        &self,
        text: &'a str,
        estimator: &SizeEstimator,
    ) -> Result<Chunks<'a>, ChunkingError> {
        if text.trim().is_empty() {
            return Err(ChunkingError::EmptyInput);
        }
        Ok(Chunks {
            text,
            piece_ends: estimator.piece_ends(text).into(),
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.overlap,
            next_index: 0,
        })
    }
}

/// Lazy iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    piece_ends: Arc<[usize]>,
    chunk_size: usize,
    step: usize,
    next_index: usize,
}

impl Chunks<'_> {
    /// Total number of chunks the document produces.
    fn total(&self) -> usize {
        let pieces = self.piece_ends.len();
        let overlap = self.chunk_size - self.step;
        if pieces <= overlap {
            1
        } else {
            (pieces - overlap).div_ceil(self.step)
        }
    }

    fn byte_offset(&self, piece: usize) -> usize {
        match piece {
            0 => 0,
            _ => self.piece_ends[piece - 1],
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.total() {
            return None;
        }
        let first_piece = self.next_index * self.step;
        let end_piece = (first_piece + self.chunk_size).min(self.piece_ends.len());
        let chunk = Chunk {
            sequence_index: self.next_index,
            text: self.text[self.byte_offset(first_piece)..self.byte_offset(end_piece)]
                .to_string(),
        };
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.next_index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Chunks kept after applying `chunk_count_limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitedChunks {
    /// The first `limit` chunks, in order.
    pub chunks: Vec<Chunk>,
    /// Number of trailing chunks that were discarded.
    pub dropped: usize,
}

/// Keep the first `limit` chunks and count the ones left behind.
///
/// Truncation is lossy: discarded chunks are never built or summarized.
pub fn apply_chunk_limit<I>(chunks: I, limit: usize) -> LimitedChunks
where
    I: IntoIterator<Item = Chunk>,
    I::IntoIter: ExactSizeIterator,
{
    let iter = chunks.into_iter();
    let total = iter.len();
    let kept: Vec<Chunk> = iter.take(limit).collect();
    let dropped = total - kept.len();
    LimitedChunks {
        chunks: kept,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars() -> SizeEstimator {
        SizeEstimator::from_fn("chars", |text| text.chars().count())
    }

    fn collect(chunker: &Chunker, text: &str, estimator: &SizeEstimator) -> Vec<Chunk> {
        chunker.chunks(text, estimator).unwrap().collect()
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize, estimator: &SizeEstimator) -> String {
        let mut rebuilt = String::new();
        for (position, chunk) in chunks.iter().enumerate() {
            if position == 0 {
                rebuilt.push_str(&chunk.text);
                continue;
            }
            let ends = estimator.piece_ends(&chunk.text);
            let skip = match overlap {
                0 => 0,
                _ => ends[overlap - 1],
            };
            rebuilt.push_str(&chunk.text[skip..]);
        }
        rebuilt
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert_eq!(Chunker::new(0, 0), Err(ChunkingError::InvalidChunkSize));
        assert_eq!(
            Chunker::new(10, 10),
            Err(ChunkingError::InvalidOverlap {
                overlap: 10,
                chunk_size: 10
            })
        );
    }

    #[test]
    fn rejects_blank_documents() {
        let chunker = Chunker::new(10, 2).unwrap();
        let estimator = SizeEstimator::whitespace();
        assert_eq!(
            chunker.chunks("", &estimator).unwrap_err(),
            ChunkingError::EmptyInput
        );
        assert_eq!(
            chunker.chunks(" \n\t ", &estimator).unwrap_err(),
            ChunkingError::EmptyInput
        );
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = collect(&chunker, "hello", &chars());
        assert_eq!(
            chunks,
            vec![Chunk {
                sequence_index: 0,
                text: "hello".into()
            }]
        );
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let chunker = Chunker::new(4, 1).unwrap();
        let texts: Vec<String> = collect(&chunker, "abcdefghij", &chars())
            .into_iter()
            .map(|chunk| chunk.text)
            .collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn word_windows_share_whole_words() {
        let chunker = Chunker::new(3, 1).unwrap();
        let texts: Vec<String> = collect(&chunker, "one two three four five", &SizeEstimator::whitespace())
            .into_iter()
            .map(|chunk| chunk.text)
            .collect();
        assert_eq!(texts, vec!["one two three ", "three four five"]);
    }

    #[test]
    fn chunks_reconstruct_document_and_respect_size() {
        let document = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(37);
        for estimator in [chars(), SizeEstimator::whitespace()] {
            for (chunk_size, overlap) in [(50, 0), (50, 7), (13, 12), (1000, 20)] {
                let chunker = Chunker::new(chunk_size, overlap).unwrap();
                let chunks = collect(&chunker, &document, &estimator);
                assert!(
                    chunks
                        .iter()
                        .all(|chunk| estimator.piece_ends(&chunk.text).len() <= chunk_size)
                );
                assert_eq!(reconstruct(&chunks, overlap, &estimator), document);
                for (expected, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.sequence_index, expected);
                }
            }
        }
    }

    #[test]
    fn chunk_count_matches_window_formula() {
        let chunker = Chunker::new(5000, 20).unwrap();
        for length in [21usize, 4999, 5000, 5001, 9980, 9981, 24_000, 50_123] {
            let document = "x".repeat(length);
            let chunks = chunker.chunks(&document, &chars()).unwrap();
            let expected = (length - 20).div_ceil(5000 - 20);
            assert_eq!(chunks.len(), expected, "length {length}");
            assert_eq!(chunks.count(), expected, "length {length}");
        }
    }

    #[test]
    fn token_windows_follow_tokenizer_pieces() {
        let estimator = SizeEstimator::for_model("cl100k_base");
        let document = "The committee reviewed hiring, infrastructure and churn. ".repeat(1500);
        let pieces = estimator.piece_ends(&document).len();
        let chunker = Chunker::new(5000, 20).unwrap();

        let chunks = collect(&chunker, &document, &estimator);

        assert_eq!(chunks.len(), (pieces - 20).div_ceil(4980));
        assert!(chunks.len() < 10, "token windows are far wider than 5000 characters");
        assert!(document.starts_with(&chunks[0].text));
        assert!(document.ends_with(&chunks[chunks.len() - 1].text));
        let mut search_from = 0;
        for chunk in &chunks {
            let found = document[search_from..]
                .find(&chunk.text)
                .expect("chunk is a slice of the document");
            search_from += found + 1;
        }
    }

    #[test]
    fn multibyte_text_is_split_on_character_boundaries() {
        let document = "héllo wörld ünïcödé ✓✓✓ ".repeat(5);
        let chunker = Chunker::new(7, 3).unwrap();
        let estimator = chars();
        let chunks = collect(&chunker, &document, &estimator);
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 7));
        assert_eq!(reconstruct(&chunks, 3, &estimator), document);
    }

    #[test]
    fn iterator_can_be_restarted() {
        let chunker = Chunker::new(3, 1).unwrap();
        let estimator = chars();
        let mut chunks = chunker.chunks("abcdefg", &estimator).unwrap();
        let first = chunks.next().unwrap();
        let resumed = chunks.clone();
        assert_eq!(resumed.len(), 2);
        let rest: Vec<Chunk> = chunks.collect();
        let replay: Vec<Chunk> = resumed.collect();
        assert_eq!(first.text, "abc");
        assert_eq!(rest, replay);

        let fresh: Vec<String> = collect(&chunker, "abcdefg", &estimator)
            .into_iter()
            .map(|chunk| chunk.text)
            .collect();
        assert_eq!(fresh, vec!["abc", "cde", "efg"]);
    }

    #[test]
    fn chunk_limit_keeps_prefix_and_counts_drops() {
        let chunker = Chunker::new(2, 0).unwrap();
        let estimator = chars();
        let limited = apply_chunk_limit(chunker.chunks("aabbccddee", &estimator).unwrap(), 3);
        let texts: Vec<&str> = limited.chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["aa", "bb", "cc"]);
        assert_eq!(limited.dropped, 2);

        let unlimited = apply_chunk_limit(chunker.chunks("aabb", &estimator).unwrap(), 10);
        assert_eq!(unlimited.chunks.len(), 2);
        assert_eq!(unlimited.dropped, 0);
    }

    #[test]
    fn chunk_limit_counts_drops_of_long_documents() {
        let chunker = Chunker::new(10, 2).unwrap();
        let document = "word ".repeat(100_000);
        let limited = apply_chunk_limit(
            chunker.chunks(&document, &SizeEstimator::whitespace()).unwrap(),
            10,
        );
        assert_eq!(limited.chunks.len(), 10);
        assert_eq!(limited.dropped, (100_000usize - 2).div_ceil(8) - 10);
    }

    #[test]
    fn chunk_limit_does_not_change_overlap() {
        let chunker = Chunker::new(4, 1).unwrap();
        let estimator = chars();
        let full = collect(&chunker, "abcdefghij", &estimator);
        let limited = apply_chunk_limit(chunker.chunks("abcdefghij", &estimator).unwrap(), 2);
        assert_eq!(limited.chunks, full[..2].to_vec());
    }
}
