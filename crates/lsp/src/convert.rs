// ==============================================================================
// LineIndex: byte offset <-> LSP Position conversion
// ==============================================================================
//
// Builds a line-start offset table from source text, then converts between
// byte offsets (used by rowan/rnix) and LSP line/character positions.
//
// Simplification: assumes ASCII (character offset == byte offset within a line).
// This is fine for Nix source code which is overwhelmingly ASCII.

use tower_lsp::lsp_types::Position;

/// Pre-computed line start byte offsets for fast offset <-> position conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line (line 0 starts at offset 0).
    line_starts: Vec<u32>,
    /// Length of the whole text in bytes.
    len: u32,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        LineIndex {
            line_starts,
            len: text.len() as u32,
        }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert a byte offset to an LSP Position (0-indexed line and character).
    pub fn position(&self, offset: u32) -> Position {
        let offset = offset.min(self.len);
        // Binary search for the line containing this offset.
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,      // Exact match: offset is at a line start.
            Err(next) => next - 1, // Between two line starts: use the preceding line.
        };
        let col = offset - self.line_starts[line];
        Position::new(line as u32, col)
    }

    /// Convert an LSP Position to a byte offset, clamping to the end of the
    /// text.
    pub fn offset(&self, pos: Position) -> u32 {
        self.checked_offset(pos).unwrap_or(self.len)
    }

    /// Like [`LineIndex::offset`], but `None` for a line past the end of the
    /// text. A column past the end of its line is clamped to the line end.
    pub fn checked_offset(&self, pos: Position) -> Option<u32> {
        let line = pos.line as usize;
        let start = *self.line_starts.get(line)?;
        // End of the line, before its newline.
        let end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.len,
        };
        Some((start + pos.character).min(end))
    }
}
