//! Fixed-window text chunker.
//!
//! Splits normalised resume text into overlapping character windows. Window and
//! overlap are measured in `char`s, never bytes, so multi-byte text can't be cut
//! mid-sequence. Consecutive windows share exactly `overlap` characters and every
//! window except the last is exactly `size` characters long.
//!
//! Every chunk carries the candidate metadata of its whole document, extracted
//! once per document (see [`CandidateIdentity`]).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::identity::CandidateIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 100,
        }
    }
}

impl ChunkerConfig {
    /// Clamps to a usable window: `size >= 1` and `overlap < size`.
    pub fn normalized(self) -> Self {
        let size = self.size.max(1);
        Self {
            size,
            overlap: self.overlap.min(size - 1),
        }
    }
}

/// Advisory identity attached to every chunk of a document. Only
/// `source_document_id` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub source_document_id: String,
    pub best_effort_name: String,
    pub best_effort_email: Option<String>,
    pub best_effort_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{document_id}:{chunk_index}"`
    pub id: String,
    pub chunk_index: usize,
    /// Offset of the first character of this chunk, in chars.
    pub start: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: CandidateMetadata,
}

impl Chunk {
    pub fn document_id(&self) -> &str {
        &self.metadata.source_document_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    /// Splits `text` into chunks tagged with `document_id`. Empty text yields no chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let windows = split_windows(text, self.config.size, self.config.overlap);
        if windows.is_empty() {
            return Vec::new();
        }

        let identity = CandidateIdentity::from_text(text);
        let metadata = CandidateMetadata {
            source_document_id: document_id.to_string(),
            best_effort_name: identity.name,
            best_effort_email: identity.email,
            best_effort_phone: identity.phone,
        };

        windows
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start, window))| Chunk {
                id: format!("{document_id}:{chunk_index}"),
                chunk_index,
                start,
                hash: sha256_hex(window),
                text: window.to_string(),
                metadata: metadata.clone(),
            })
            .collect()
    }
}

/// Returns `(char_offset, slice)` windows. `overlap` must be smaller than `size`.
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<(usize, &str)> {
    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = boundaries.len() - 1;
    if len == 0 {
        return Vec::new();
    }

    let step = size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        windows.push((start, &text[boundaries[start]..boundaries[end]]));
        if end == len {
            break;
        }
        start += step;
    }
    windows
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig { size, overlap })
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(Chunker::default().chunk("doc", "").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = Chunker::default().chunk("doc", "Jane Doe\nRust developer");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc:0");
        assert_eq!(chunks[0].text, "Jane Doe\nRust developer");
    }

    #[test]
    fn test_windows_cover_text_with_exact_overlap() {
        let text: String = (0..1234).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunker(500, 100).chunk("doc", &text);

        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].text.chars().count(), 500);
            let tail: String = pair[0].text.chars().skip(400).collect();
            let head: String = pair[1].text.chars().take(100).collect();
            assert_eq!(tail, head);
            assert_eq!(pair[1].start, pair[0].start + 400);
        }

        let last = chunks.last().unwrap();
        assert_eq!(last.start + last.text.chars().count(), 1234);

        // Rebuild the original from the non-overlapping parts.
        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(100));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_windows_count_chars_not_bytes() {
        let text = "é".repeat(12);
        let chunks = chunker(5, 2).chunk("doc", &text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 5));
        assert_eq!(chunks[0].text, "ééééé");
        assert_eq!(chunks.last().unwrap().text.chars().count(), 3);
    }

    #[test]
    fn test_text_exactly_one_window() {
        let chunks = chunker(10, 3).chunk("doc", "0123456789");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_degenerate_config_is_clamped() {
        let config = ChunkerConfig {
            size: 0,
            overlap: 10,
        }
        .normalized();
        assert_eq!(config, ChunkerConfig { size: 1, overlap: 0 });
        assert_eq!(chunker(0, 10).chunk("doc", "abc").len(), 3);
    }

    #[test]
    fn test_metadata_comes_from_whole_document() {
        let mut text = String::from("Jane Doe\njane@example.com\n");
        text.push_str(&"Rust ".repeat(200));
        let chunks = chunker(100, 20).chunk("resume-7", &text);

        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert_eq!(chunk.document_id(), "resume-7");
            assert_eq!(chunk.metadata.best_effort_name, "Jane Doe");
            assert_eq!(
                chunk.metadata.best_effort_email.as_deref(),
                Some("jane@example.com")
            );
        }
    }

    #[test]
    fn test_chunking_is_deterministic_and_hashed() {
        let text = "Backend engineer with Python and PostgreSQL. ".repeat(30);
        let a = chunker(120, 30).chunk("doc", &text);
        let b = chunker(120, 30).chunk("doc", &text);
        assert_eq!(a, b);
        assert_eq!(a[0].hash, sha256_hex(&a[0].text));
        assert_eq!(a[0].hash.len(), 64);
    }
}
