//! Position tracking over a source character buffer.
//!
//! Mirrors the `LexerPosition` design: a current pointer, an end pointer,
//! a token-start pointer, and line/column counters at both the current
//! pointer and the start of the token currently being produced.

use std::sync::Arc;

/// A 1-based line/column pair together with the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalLocation {
    pub file: Arc<str>,
    pub first_line: u32,
    pub first_column: u32,
    pub last_line: u32,
    pub last_column: u32,
}

impl PhysicalLocation {
    pub fn point(file: Arc<str>, line: u32, column: u32) -> Self {
        PhysicalLocation {
            file,
            first_line: line,
            first_column: column,
            last_line: line,
            last_column: column,
        }
    }
}

impl std::fmt::Display for PhysicalLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.first_line, self.first_column)
    }
}

/// A name/scope chain used to make error messages readable without
/// re-deriving them from the physical location alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalLocation {
    pub scopes: Vec<String>,
}

impl LogicalLocation {
    pub fn root() -> Self {
        LogicalLocation { scopes: Vec::new() }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(name.into());
        LogicalLocation { scopes }
    }
}

/// A location pair: the physical span plus the logical scope it occurred in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub physical: PhysicalLocation,
    pub logical: LogicalLocation,
}

/// An opaque snapshot of a [`Position`], used by bracket-group capture to
/// re-lex a previously captured range (mirrors `LexerPosition::begin`/a
/// saved restart point in the original C++ lexer).
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pos: usize,
    line: u32,
    column: u32,
}

/// Tracks the current read position within a source buffer, advancing
/// line/column counters as bytes are consumed.
pub struct Position<'a> {
    file: Arc<str>,
    buf: &'a [u8],
    pos: usize,
    end: usize,
    line: u32,
    column: u32,
    token_start: usize,
    token_start_line: u32,
    token_start_column: u32,
}

impl<'a> Position<'a> {
    pub fn new(file: Arc<str>, buf: &'a [u8]) -> Self {
        Position {
            file,
            buf,
            pos: 0,
            end: buf.len(),
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
        }
    }

    /// True once every byte of the buffer has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos == self.end
    }

    /// The byte at the current position, or `None` at end of input.
    pub fn current(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Peek `n` bytes ahead of the current position without consuming.
    pub fn lookahead(&self, n: usize) -> Option<u8> {
        self.buf.get(self.pos + n).copied()
    }

    /// Advance one byte, updating line/column per the `\n` rule.
    pub fn accept(&mut self) {
        if let Some(b) = self.current() {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    /// Mark the start of a new token at the current position.
    pub fn begin(&mut self) {
        self.token_start = self.pos;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.current() {
            if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' {
                self.accept();
            } else {
                break;
            }
        }
    }

    pub fn token_start(&self) -> usize {
        self.token_start
    }

    pub fn token_end(&self) -> usize {
        self.pos
    }

    pub fn token_length(&self) -> usize {
        self.pos - self.token_start
    }

    /// The raw bytes of the token currently being produced.
    pub fn token_bytes(&self) -> &'a [u8] {
        &self.buf[self.token_start..self.pos]
    }

    /// The token text, assuming the source is valid UTF-8 (enforced by the
    /// caller before constructing a `Position`).
    pub fn token_text(&self) -> &'a str {
        std::str::from_utf8(self.token_bytes()).expect("source buffer is not valid UTF-8")
    }

    /// The physical span of the token currently being produced, from
    /// `begin()` up to the current position.
    pub fn location(&self) -> PhysicalLocation {
        PhysicalLocation {
            file: self.file.clone(),
            first_line: self.token_start_line,
            first_column: self.token_start_column,
            last_line: self.line,
            last_column: self.column,
        }
    }

    /// A single-point location at the current read position, used for
    /// lexical errors that occur before a token can be identified.
    pub fn here(&self) -> PhysicalLocation {
        PhysicalLocation::point(self.file.clone(), self.line, self.column)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..self.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(src: &str) -> Position<'_> {
        Position::new(Arc::from("test.tvm"), src.as_bytes())
    }

    #[test]
    fn tracks_line_and_column_across_newlines() {
        let mut p = pos("ab\ncd");
        for _ in 0..3 {
            p.accept();
        }
        assert_eq!(p.here().first_line, 2);
        assert_eq!(p.here().first_column, 1);
        p.accept();
        assert_eq!(p.here().first_column, 2);
    }

    #[test]
    fn token_span_covers_begin_to_current() {
        let mut p = pos("hello world");
        p.begin();
        for _ in 0..5 {
            p.accept();
        }
        assert_eq!(p.token_text(), "hello");
        let loc = p.location();
        assert_eq!(loc.first_column, 1);
        assert_eq!(loc.last_column, 6);
    }

    #[test]
    fn checkpoint_restores_exact_state() {
        let mut p = pos("abc\ndef");
        p.accept();
        p.accept();
        let cp = p.checkpoint();
        p.accept();
        p.accept();
        p.accept();
        p.restore(cp);
        assert_eq!(p.current(), Some(b'c'));
        assert_eq!(p.here().first_line, 1);
    }
}
