// Source store: owns file text for the lifetime of a compilation so
// diagnostics can render snippets after the pipeline stages are done.

use crate::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    /// Byte offset of the start of each line, always beginning with 0.
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(name: String, text: String) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name,
            text,
            line_starts,
        }
    }

    /// 1-based (line, column) for a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// Text of a 1-based line, without the trailing newline.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|s| s.saturating_sub(1))
            .unwrap_or(self.text.len());
        self.text.get(start..end)
    }
}

#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        self.files.push(SourceFile::new(name.into(), text.into()));
        FileId(self.files.len() - 1)
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0)
    }

    pub fn file_by_name(&self, name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn text(&self, id: FileId) -> Option<&str> {
        self.file(id).map(|f| f.text.as_str())
    }

    /// Build a fully resolved span from a byte range in a registered file.
    pub fn span(&self, id: FileId, range: std::ops::Range<usize>) -> Span {
        match self.file(id) {
            Some(file) => {
                let (line, column) = file.line_col(range.start);
                let (end_line, end_column) = file.line_col(range.end);
                Span {
                    file: file.name.clone(),
                    line,
                    column,
                    end_line,
                    end_column,
                    offset: range.start,
                    end_offset: range.end,
                }
            }
            None => Span::unknown(),
        }
    }

    pub fn line_text(&self, file_name: &str, line: usize) -> Option<&str> {
        self.file_by_name(file_name)?.line_text(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_lookup() {
        let file = SourceFile::new("t.tml".into(), "ab\ncde\n\nf".into());
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(1), (1, 2));
        assert_eq!(file.line_col(3), (2, 1));
        assert_eq!(file.line_col(5), (2, 3));
        assert_eq!(file.line_col(7), (3, 1));
        assert_eq!(file.line_col(8), (4, 1));
    }

    #[test]
    fn line_text_lookup() {
        let file = SourceFile::new("t.tml".into(), "first\nsecond\nlast".into());
        assert_eq!(file.line_text(1), Some("first"));
        assert_eq!(file.line_text(2), Some("second"));
        assert_eq!(file.line_text(3), Some("last"));
        assert_eq!(file.line_text(4), None);
    }

    #[test]
    fn span_through_map() {
        let mut map = SourceMap::new();
        let id = map.add_file("t.tml", "let x = 1\nlet y = 2\n");
        let span = map.span(id, 14..15);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 5);
        assert_eq!(span.file, "t.tml");
    }
}
