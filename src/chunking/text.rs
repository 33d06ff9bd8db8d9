//! Overlapping character-window splitter for free text.

use crate::error::{BusbotError, Result};

/// One window of text produced by [`TextChunker::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub text: String,
    /// Leading characters shared with the previous window.
    pub overlap: usize,
}

impl Window {
    /// The part of this window not already covered by the previous one.
    pub fn fresh_text(&self) -> String {
        self.text.chars().skip(self.overlap).collect()
    }
}

/// Splits text into windows of at most `chunk_size` characters where each window
/// after the first repeats the last `chunk_overlap` characters of its predecessor.
///
/// Window ends are pulled back to the nearest whitespace when possible so words
/// are not cut in half. Lengths are counted in `char`s, never bytes.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(BusbotError::Config("chunk size must be positive".to_string()));
        }
        if chunk_overlap == 0 || chunk_overlap >= chunk_size {
            return Err(BusbotError::Config(format!(
                "chunk overlap must be in 1..{} (got {})",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<Window> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut windows = Vec::new();

        let mut start = 0;
        let mut overlap = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                // Cut after the last whitespace, but keep the window longer than the
                // overlap so the next window still advances.
                (start + self.chunk_overlap..hard_end)
                    .rev()
                    .find(|&i| chars[i].is_whitespace())
                    .map(|i| i + 1)
                    .filter(|&cut| cut > start + self.chunk_overlap)
                    .unwrap_or(hard_end)
            } else {
                hard_end
            };

            windows.push(Window {
                text: chars[start..end].iter().collect(),
                overlap,
            });

            if end >= total {
                break;
            }
            start = end - self.chunk_overlap;
            overlap = self.chunk_overlap;
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reassemble(windows: &[Window]) -> String {
        windows.iter().map(Window::fresh_text).collect()
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(100, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 20).is_ok());
    }

    #[test]
    fn test_short_text_is_single_window() {
        let chunker = TextChunker::new(50, 10).unwrap();
        let windows = chunker.split("Hanif Bus: Dhaka to Rajshahi");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].overlap, 0);
    }

    #[test]
    fn test_empty_text() {
        let chunker = TextChunker::new(50, 10).unwrap();
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn test_windows_overlap_and_respect_size() {
        let chunker = TextChunker::new(40, 10).unwrap();
        let text = "Tickets can be cancelled up to 24 hours before departure. \
                    Refunds are processed within seven working days. \
                    Contact the counter at Gabtoli for details.";
        let windows = chunker.split(text);

        assert!(windows.len() > 2);
        for pair in windows.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let tail: String = prev[prev.len() - 10..].iter().collect();
            assert!(pair[1].text.starts_with(&tail));
            assert_eq!(pair[1].overlap, 10);
        }
        for window in &windows {
            assert!(window.text.chars().count() <= 40);
        }
        assert_eq!(reassemble(&windows), text);
    }

    #[test]
    fn test_prefers_whitespace_boundaries() {
        let chunker = TextChunker::new(12, 3).unwrap();
        let windows = chunker.split("alpha beta gamma delta");
        assert_eq!(windows[0].text, "alpha beta ");
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = TextChunker::new(8, 2).unwrap();
        let text = "ঢাকা থেকে রাজশাহী • 450 টাকা";
        let windows = chunker.split(text);
        assert_eq!(reassemble(&windows), text);
    }

    proptest! {
        #[test]
        fn prop_windows_reassemble_to_source(
            text in "[a-zA-Z0-9 .,\n]{0,400}",
            size in 2usize..80,
            overlap_frac in 0.05f64..0.95,
        ) {
            let overlap = ((size as f64 * overlap_frac) as usize).clamp(1, size - 1);
            let chunker = TextChunker::new(size, overlap).unwrap();
            let windows = chunker.split(&text);

            prop_assert_eq!(reassemble(&windows), text);
            for window in &windows {
                prop_assert!(window.text.chars().count() <= size);
            }
        }
    }
}
