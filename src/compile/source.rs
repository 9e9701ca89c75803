use std::fmt::Display;

use crate::compile::ast::SourcePos;

/// A source file together with the byte offsets every line starts at.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    text: String,
    line_starts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'a> {
    pub file: &'a str,
    pub line: usize,
    pub column: usize,
}

impl Display for Location<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();

        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based line and column of a byte offset.
    pub fn location(&self, offset: usize) -> Location<'_> {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.text[line_start..offset.min(self.text.len())]
            .chars()
            .count();

        Location {
            file: &self.name,
            line: line + 1,
            column: column + 1,
        }
    }

    pub fn span_location(&self, span: &SourcePos) -> Location<'_> {
        self.location(span.start)
    }
}

#[cfg(test)]
mod tests {
    use super::SourceFile;

    #[test]
    fn locations_are_one_based() {
        let file = SourceFile::new("a.tora", "fn main() {\n  var x = 1;\n}\n");
        let loc = file.location(14);

        assert_eq!((loc.line, loc.column), (2, 3));
        assert_eq!(loc.to_string(), "a.tora:2:3");
        assert_eq!(file.location(0).to_string(), "a.tora:1:1");
    }
}
