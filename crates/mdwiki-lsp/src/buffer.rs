//
// buffer.rs
//
// C2: stores document text, maps LSP positions <-> offsets, applies
// incremental edits (spec §3, §4.2).
//

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range};

use crate::error::{Result, ServerError};

/// Full document text plus the line-start table ropey maintains
/// internally. Positions are UTF-16 code units, per the LSP spec;
/// `ropey::Rope` tracks char <-> UTF-16 conversions directly, so we
/// never have to maintain that table by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBuffer {
    rope: Rope,
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// The (trailing-newline-stripped) text of one line, for the parser.
    pub fn line(&self, idx: usize) -> String {
        let line = self.rope.line(idx);
        let mut s = line.to_string();
        while matches!(s.chars().last(), Some('\n') | Some('\r')) {
            s.pop();
        }
        s
    }

    /// Converts an LSP `Position` to a char index. Out-of-range lines or
    /// characters clamp to EOF, per spec.
    fn position_to_char_idx(&self, pos: Position) -> usize {
        let total_chars = self.rope.len_chars();
        let line_count = self.rope.len_lines();

        let line = pos.line as usize;
        if line >= line_count {
            return total_chars;
        }

        let line_char_start = self.rope.line_to_char(line);
        let line_text = self.rope.line(line);
        let line_len_utf16: usize = line_text.chars().map(|c| c.len_utf16()).sum();

        if pos.character as usize > line_len_utf16 {
            return total_chars;
        }

        let line_utf16_start = self.rope.char_to_utf16_cu(line_char_start);
        let target_utf16 = line_utf16_start + pos.character as usize;
        self.rope.utf16_cu_to_char(target_utf16)
    }

    /// Byte offset for a position, clamped to EOF when out of range.
    pub fn position_to_offset(&self, pos: Position) -> usize {
        let char_idx = self.position_to_char_idx(pos);
        self.rope.char_to_byte(char_idx)
    }

    fn char_idx_to_position(&self, char_idx: usize) -> Position {
        let line = self.rope.char_to_line(char_idx);
        let line_char_start = self.rope.line_to_char(line);
        let line_utf16_start = self.rope.char_to_utf16_cu(line_char_start);
        let char_utf16 = self.rope.char_to_utf16_cu(char_idx);
        Position::new(line as u32, (char_utf16 - line_utf16_start) as u32)
    }

    /// The range spanning the entire buffer.
    pub fn full_range(&self) -> Range {
        let end = self.char_idx_to_position(self.rope.len_chars());
        Range::new(Position::new(0, 0), end)
    }

    /// The text within a range.
    pub fn substring(&self, range: Range) -> String {
        let start = self.position_to_char_idx(range.start);
        let end = self.position_to_char_idx(range.end);
        self.rope.slice(start.min(end)..start.max(end)).to_string()
    }

    /// Applies an ordered batch of `(range, replacement)` edits, producing
    /// a new buffer. Edits must be non-overlapping and sorted by start;
    /// the LSP layer guarantees this, and violating it is a programmer error
    /// and fails with `InvalidEdit`. Edits are applied right-to-left
    /// internally (each edit's offsets are computed against `self`, the
    /// pre-edit buffer) so that earlier, still-unapplied edits keep valid
    /// coordinates; the externally observable result is exactly the
    /// buffer produced by applying the edits in the given order.
    pub fn apply_edits(&self, edits: &[(Range, String)]) -> Result<TextBuffer> {
        for pair in edits.windows(2) {
            let (a, _) = &pair[0];
            let (b, _) = &pair[1];
            if position_cmp(a.end, b.start) == std::cmp::Ordering::Greater {
                return Err(ServerError::InvalidEdit(
                    "edits must be non-overlapping and sorted by start".to_string(),
                ));
            }
        }

        let mut rope = self.rope.clone();
        for (range, replacement) in edits.iter().rev() {
            let start = self.position_to_char_idx(range.start);
            let end = self.position_to_char_idx(range.end);
            let (start, end) = (start.min(end), start.max(end));
            rope.remove(start..end);
            rope.insert(start, replacement);
        }

        Ok(TextBuffer { rope })
    }
}

fn position_cmp(a: Position, b: Position) -> std::cmp::Ordering {
    (a.line, a.character).cmp(&(b.line, b.character))
}
