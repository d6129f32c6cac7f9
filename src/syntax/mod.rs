//! Surface syntax: source text bookkeeping, tokens, AST and parser.
pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::tokenize;
pub use token::{Token, TokenCategory, TokenKind};

use serde::Serialize;
use smol_str::SmolStr;

/// A byte range into the compiled source.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }

    /// Joins two spans into the smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A zero-based line/column position.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

/// A named source file with a precomputed line index.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: SmolStr,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<SmolStr>, text: impl Into<String>) -> SourceFile {
        let text = text.into();
        let line_starts: Vec<_> = codespan_reporting::files::line_starts(&text).collect();
        SourceFile {
            name: name.into(),
            text,
            line_starts,
        }
    }

    /// Converts a byte offset into a zero-based line/column pair.
    pub fn location(&self, offset: u32) -> Loc {
        let offset = offset as usize;
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next_line) => next_line - 1,
        };
        Loc {
            line: line as u32,
            column: (offset - self.line_starts[line]) as u32,
        }
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations() {
        let file = SourceFile::new("test.3d.ts", "ab\ncd\n\nef");
        assert_eq!(file.location(0), Loc { line: 0, column: 0 });
        assert_eq!(file.location(1), Loc { line: 0, column: 1 });
        assert_eq!(file.location(3), Loc { line: 1, column: 0 });
        assert_eq!(file.location(6), Loc { line: 2, column: 0 });
        assert_eq!(file.location(8), Loc { line: 3, column: 1 });
    }
}
