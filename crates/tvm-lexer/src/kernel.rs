//! The backtracking ring-buffer lexer kernel (spec.md §4.1).
//!
//! Ported from the structure of the original `Lexer<backtrack, Id, Value,
//! Callback>` template: a small circular buffer of `backtrack + 1`
//! pre-lexed tokens with three indices (`begin`, `pos`, `end`).

use crate::error::LexError;
use crate::position::{PhysicalLocation, Position};

/// A lexed token: an id, its physical span, and a language-specific payload.
#[derive(Debug, Clone)]
pub struct LexToken<Id, Value> {
    pub id: Id,
    pub location: PhysicalLocation,
    pub value: Value,
}

impl<Id, Value> LexToken<Id, Value> {
    pub fn new(id: Id, location: PhysicalLocation, value: Value) -> Self {
        LexToken {
            id,
            location,
            value,
        }
    }
}

/// Language-specific hook supplying the next token and a diagnostic name
/// for a token id (spec.md §4.1 "Language-specific callback").
pub trait LexerCallback {
    type Id: Clone + PartialEq;
    type Value: Clone;

    fn lex(
        &mut self,
        position: &mut Position<'_>,
    ) -> Result<LexToken<Self::Id, Self::Value>, LexError>;

    fn error_name(&self, token: &LexToken<Self::Id, Self::Value>) -> String;
}

/// Fixed-depth backtracking token buffer over a [`LexerCallback`].
pub struct LexerKernel<'a, C: LexerCallback> {
    position: Position<'a>,
    callback: C,
    values: Vec<LexToken<C::Id, C::Value>>,
    pos: usize,
    begin: usize,
    end: usize,
    backtrack: usize,
}

impl<'a, C: LexerCallback> LexerKernel<'a, C> {
    /// `backtrack` is the number of tokens `value(n)` can look back past
    /// the current one; the ring buffer holds `backtrack + 1` slots.
    pub fn new(mut position: Position<'a>, mut callback: C, backtrack: usize) -> Result<Self, LexError> {
        let first = callback.lex(&mut position)?;
        let mut values = Vec::with_capacity(backtrack + 1);
        values.push(first);
        Ok(LexerKernel {
            position,
            callback,
            values,
            pos: 0,
            begin: 0,
            end: 1,
            backtrack,
        })
    }

    fn capacity(&self) -> usize {
        self.backtrack + 1
    }

    fn next_index(&self, idx: usize) -> usize {
        if idx + 1 < self.capacity() {
            idx + 1
        } else {
            0
        }
    }

    /// The token at the current read position, without consuming it.
    pub fn peek(&self) -> &LexToken<C::Id, C::Value> {
        &self.values[self.pos]
    }

    /// Consume the current token, lexing a fresh one if the ring buffer
    /// has run dry, and evicting the oldest live entry if `pos` would
    /// otherwise catch up to `begin`.
    pub fn accept(&mut self) -> Result<(), LexError> {
        self.pos = self.next_index(self.pos);

        if self.pos == self.end {
            let tok = self.callback.lex(&mut self.position)?;
            if self.values.len() < self.capacity() {
                self.values.push(tok);
            } else {
                self.values[self.pos] = tok;
            }

            if self.pos == self.begin {
                self.begin = self.next_index(self.begin);
            }
            self.end = self.next_index(self.end);
        }
        Ok(())
    }

    /// Roll the read position back one slot. Asserts there is a token to
    /// roll back to (i.e. `pos != begin`).
    pub fn back(&mut self) {
        assert!(
            self.pos != self.begin,
            "back() called with no buffered token to return to"
        );
        self.pos = if self.pos == 0 {
            self.capacity() - 1
        } else {
            self.pos - 1
        };
    }

    /// The token `n` positions before the current one (`value(0) == peek()`
    /// after at least one `accept()`; conventionally `n` counts back from
    /// the token just consumed).
    pub fn value(&self, n: usize) -> &LexToken<C::Id, C::Value> {
        assert!(n < self.backtrack + 1, "backtrack depth exceeded");
        let mut idx = self.pos;
        let shift = n + 1;
        if idx >= shift {
            idx -= shift;
        } else {
            idx += self.capacity() - shift;
        }
        &self.values[idx]
    }

    pub fn reject(&self, id: &C::Id) -> bool {
        &self.peek().id != id
    }

    /// Accept the next token if it matches `id`.
    pub fn accept_if(&mut self, id: &C::Id) -> Result<bool, LexError> {
        if &self.peek().id == id {
            self.accept()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Accept two tokens `a` then `b` as a pair, rolling back one slot if
    /// `b` does not follow.
    pub fn accept2(&mut self, a: &C::Id, b: &C::Id) -> Result<bool, LexError> {
        if self.accept_if(a)? {
            if self.accept_if(b)? {
                Ok(true)
            } else {
                self.back();
                Ok(false)
            }
        } else {
            Ok(false)
        }
    }

    pub fn position(&self) -> &Position<'a> {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut Position<'a> {
        &mut self.position
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    pub fn error_name(&self, token: &LexToken<C::Id, C::Value>) -> String {
        self.callback.error_name(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum CharId {
        Char(u8),
        Eof,
    }

    #[derive(Clone)]
    struct ByteCallback;

    impl LexerCallback for ByteCallback {
        type Id = CharId;
        type Value = ();

        fn lex(
            &mut self,
            position: &mut Position<'_>,
        ) -> Result<LexToken<Self::Id, Self::Value>, LexError> {
            position.begin();
            if position.at_end() {
                return Ok(LexToken::new(CharId::Eof, position.here(), ()));
            }
            let b = position.current().unwrap();
            position.accept();
            Ok(LexToken::new(CharId::Char(b), position.location(), ()))
        }

        fn error_name(&self, token: &LexToken<Self::Id, Self::Value>) -> String {
            format!("{:?}", token.id)
        }
    }

    fn kernel(src: &'static str) -> LexerKernel<'static, ByteCallback> {
        let position = Position::new(Arc::from("test"), src.as_bytes());
        LexerKernel::new(position, ByteCallback, 2).unwrap()
    }

    #[test]
    fn accept_advances_and_refills() {
        let mut k = kernel("abc");
        assert_eq!(k.peek().id, CharId::Char(b'a'));
        k.accept().unwrap();
        assert_eq!(k.peek().id, CharId::Char(b'b'));
        k.accept().unwrap();
        assert_eq!(k.peek().id, CharId::Char(b'c'));
        k.accept().unwrap();
        assert_eq!(k.peek().id, CharId::Eof);
    }

    #[test]
    fn back_undoes_one_accept() {
        let mut k = kernel("abc");
        k.accept().unwrap();
        k.back();
        assert_eq!(k.peek().id, CharId::Char(b'a'));
    }

    #[test]
    fn accept2_rolls_back_on_mismatch() {
        let mut k = kernel("ab");
        let matched = k.accept2(&CharId::Char(b'a'), &CharId::Char(b'z')).unwrap();
        assert!(!matched);
        assert_eq!(k.peek().id, CharId::Char(b'a'));
    }

    #[test]
    fn value_looks_back_through_ring_buffer() {
        let mut k = kernel("abc");
        k.accept().unwrap();
        k.accept().unwrap();
        assert_eq!(k.value(0).id, CharId::Char(b'b'));
        assert_eq!(k.value(1).id, CharId::Char(b'a'));
    }
}
