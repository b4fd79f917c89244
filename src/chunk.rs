use crate::error::ChunkError;

pub const DEFAULT_MAX_CHARS: usize = 4000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Window size and overlap, both counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    max_chars: usize,
    overlap: usize,
}

impl ChunkSettings {
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, ChunkError> {
        if max_chars == 0 {
            return Err(ChunkError::ZeroWidth);
        }
        if overlap >= max_chars {
            return Err(ChunkError::OverlapTooLarge { max_chars, overlap });
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Splits `text` into overlapping windows. Each window after the first starts
/// `overlap` characters before the previous one ended; the last may be short.
pub fn chunk_text(text: &str, settings: ChunkSettings) -> Chunks<'_> {
    Chunks {
        text,
        settings,
        next_start: Some(0),
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    settings: ChunkSettings,
    // byte offset, always on a char boundary
    next_start: Option<usize>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        if start >= self.text.len() {
            self.next_start = None;
            return None;
        }
        let end = self.text[start..]
            .char_indices()
            .nth(self.settings.max_chars)
            .map_or(self.text.len(), |(offset, _)| start + offset);
        let chunk = &self.text[start..end];

        if end == self.text.len() {
            self.next_start = None;
        } else {
            let back = match self.settings.overlap {
                0 => end,
                overlap => self.text[..end]
                    .char_indices()
                    .rev()
                    .nth(overlap - 1)
                    .map_or(0, |(offset, _)| offset),
            };
            debug_assert!(back > start, "chunk window must advance");
            self.next_start = Some(back.max(start + 1));
        }
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}
