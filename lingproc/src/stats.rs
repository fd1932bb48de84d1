use unicode_segmentation::UnicodeSegmentation;

/// Size figures for a source document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextStats {
    pub bytes: usize,
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
}

impl TextStats {
    /// Measure `text`.
    pub fn of(text: &str) -> Self {
        Self {
            bytes: text.len(),
            characters: text.chars().count(),
            words: text.unicode_words().count(),
            lines: text.lines().count(),
        }
    }

    /// Rough number of chunks the document splits into at `max_chars`.
    ///
    /// Chunks usually end a little before the limit, so the real count can be
    /// slightly higher.
    pub fn estimated_chunks(&self, max_chars: usize) -> usize {
        self.characters.div_ceil(max_chars.max(1)).max(1)
    }
}

/// Render a byte count using binary units, e.g. `1.50 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}
