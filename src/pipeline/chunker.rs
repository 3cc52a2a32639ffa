//! Text chunking.
//!
//! Two strategies:
//!
//! - [`chunk_by_offset`]: fixed windows of `chunk_size` characters advancing by
//!   `chunk_size - overlap`, used by the summarization and style pipelines.
//! - [`chunk_by_lines`]: never splits a line; consecutive chunks concatenate back to the
//!   original document exactly. Used when line fidelity matters (reformatting).
//!
//! Sizes are counted in characters, offsets are byte offsets into the source so chunks
//! can be sliced without copying the index math around.

use serde::{Deserialize, Serialize};

/// A contiguous slice of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be positive")]
    ZeroChunkSize,
    #[error("overlap {overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Split `text` into windows of `chunk_size` characters overlapping by `overlap`
pub fn chunk_by_offset(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_count);
        let (byte_start, byte_end) = (boundaries[start], boundaries[end]);
        chunks.push(Chunk {
            index: chunks.len(),
            start: byte_start,
            end: byte_end,
            text: text[byte_start..byte_end].to_string(),
        });
        if end >= char_count {
            break;
        }
        start += step;
    }
    Ok(chunks)
}

/// Accumulate whole lines until the next would push the chunk past `chunk_size` characters
///
/// A single line longer than `chunk_size` is kept whole in its own chunk.
pub fn chunk_by_lines(text: &str, chunk_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_start = 0;
    let mut current_end = 0;
    let mut current_chars = 0;

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if current_chars > 0 && current_chars + line_chars > chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                start: current_start,
                end: current_end,
                text: text[current_start..current_end].to_string(),
            });
            current_start = offset;
            current_chars = 0;
        }
        offset += line.len();
        current_end = offset;
        current_chars += line_chars;
    }

    if current_chars > 0 {
        chunks.push(Chunk {
            index: chunks.len(),
            start: current_start,
            end: current_end,
            text: text[current_start..current_end].to_string(),
        });
    }
    chunks
}

/// Group consecutive chunks and join each group with [`SEGMENT_BREAK`](crate::pipeline::SEGMENT_BREAK)
pub fn group_chunks(chunks: &[Chunk], group_size: usize) -> Vec<String> {
    chunks
        .chunks(group_size.max(1))
        .map(|group| {
            group
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(crate::pipeline::types::SEGMENT_BREAK)
        })
        .collect()
}
