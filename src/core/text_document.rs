use lsp_types::TextDocumentContentChangeEvent;

/// Editor-facing document content at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub uri: String,
    /// Monotonic per URI as supplied by the editor; 0 for files read from disk.
    pub version: i32,
    pub text: String,
}

impl TextDocument {
    pub fn new(uri: impl Into<String>, version: i32, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version,
            text: text.into(),
        }
    }

    /// Apply `didChange` content changes in order, producing the next version.
    pub fn apply_changes(
        &self,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> TextDocument {
        let mut text = self.text.clone();
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = position_to_offset(&text, range.start);
                    let end = position_to_offset(&text, range.end).max(start);
                    text.replace_range(start..end, &change.text);
                }
                None => text = change.text.clone(),
            }
        }
        TextDocument::new(self.uri.clone(), version, text)
    }

    /// Text of line `line`, without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        self.text
            .split('\n')
            .nth(line as usize)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

/// Byte offset of an LSP position (UTF-16 columns). Positions past the end
/// of a line clamp to the line end; past the last line, to the text end.
pub fn position_to_offset(text: &str, position: lsp_types::Position) -> usize {
    let mut current_line = 0;
    let mut column = 0;

    for (idx, ch) in text.char_indices() {
        if current_line == position.line {
            if column >= position.character as usize || ch == '\n' || ch == '\r' {
                return idx;
            }
            column += ch.len_utf16();
        }

        if ch == '\n' {
            current_line += 1;
            column = 0;
        }
    }

    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, Range};

    fn change(range: Option<(u32, u32, u32, u32)>, text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: range.map(|(sl, sc, el, ec)| Range::new(Position::new(sl, sc), Position::new(el, ec))),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_position_to_offset_multiline() {
        let text = "a = 1\nbb = 2";
        assert_eq!(position_to_offset(text, Position::new(0, 0)), 0);
        assert_eq!(position_to_offset(text, Position::new(1, 0)), 6);
        assert_eq!(position_to_offset(text, Position::new(1, 2)), 8);
    }

    #[test]
    fn test_position_to_offset_past_line_end() {
        assert_eq!(position_to_offset("hi\nthere", Position::new(0, 100)), 2);
        assert_eq!(position_to_offset("hi", Position::new(5, 0)), 2);
    }

    #[test]
    fn test_position_to_offset_with_crlf() {
        assert_eq!(position_to_offset("ab\r\ncd", Position::new(0, 9)), 2);
        assert_eq!(position_to_offset("ab\r\ncd", Position::new(1, 1)), 5);
    }

    #[test]
    fn test_position_to_offset_counts_utf16_units() {
        // '😀' is two UTF-16 units and four bytes
        let text = "s = \"😀x\"";
        assert_eq!(position_to_offset(text, Position::new(0, 7)), 9);
    }

    #[test]
    fn test_apply_ranged_and_full_changes() {
        let doc = TextDocument::new("file:///a.ms", 1, "x = 1\ny = 2");
        let edited = doc.apply_changes(2, &[change(Some((1, 4, 1, 5)), "42")]);
        assert_eq!(edited.text, "x = 1\ny = 42");
        assert_eq!(edited.version, 2);

        let replaced = edited.apply_changes(3, &[change(None, "z = 3"), change(Some((0, 0, 0, 0)), "// c\n")]);
        assert_eq!(replaced.text, "// c\nz = 3");
        assert_eq!(doc.text, "x = 1\ny = 2");
    }

    #[test]
    fn test_line_strips_terminators() {
        let doc = TextDocument::new("file:///a.ms", 1, "one\r\ntwo");
        assert_eq!(doc.line(0), Some("one"));
        assert_eq!(doc.line(1), Some("two"));
        assert_eq!(doc.line(2), None);
    }
}
