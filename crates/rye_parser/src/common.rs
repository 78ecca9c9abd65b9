//! Shared parser infrastructure: the token cursor and error type.

use crate::tokenizer::{Token, TokenKind};
use rye_ast::{Ident, Span};

/// A syntax error with the span it was detected at.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        ParseError {
            message: message.into(),
            span,
        }
    }
}

pub type PResult<T> = Result<T, ParseError>;

/// Cursor over the token stream. Tokens are fully materialized up front,
/// so speculative parsing is a matter of saving and restoring a position.
pub struct Cursor<'a> {
    toks: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(toks: &'a [Token]) -> Self {
        Cursor { toks, pos: 0 }
    }

    /// Kind of the current token.
    pub fn peek(&self) -> &TokenKind {
        &self.toks[self.pos.min(self.toks.len() - 1)].kind
    }

    /// Kind of the token after the current one.
    pub fn peek2(&self) -> &TokenKind {
        &self.toks[(self.pos + 1).min(self.toks.len() - 1)].kind
    }

    /// Span of the current token.
    pub fn span(&self) -> Span {
        self.toks[self.pos.min(self.toks.len() - 1)].span.clone()
    }

    /// Span of the previous token (useful for end-of-construct spans).
    pub fn prev_span(&self) -> Span {
        self.toks[self.pos.saturating_sub(1)].span.clone()
    }

    /// Advances past the current token and returns it.
    pub fn bump(&mut self) -> Token {
        let t = self.toks[self.pos.min(self.toks.len() - 1)].clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    /// Consumes the current token if it matches `kind`.
    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consumes a token of the given kind or reports what was expected.
    pub fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Span> {
        if self.peek() == &kind {
            Ok(self.bump().span)
        } else {
            Err(ParseError::new(format!("expected {}", what), self.span()))
        }
    }

    /// Consumes an identifier token.
    pub fn expect_ident(&mut self, what: &str) -> PResult<Ident> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.bump().span;
                Ok(Ident { name, span })
            }
            _ => Err(ParseError::new(format!("expected {}", what), self.span())),
        }
    }

    /// Current position, for speculative parsing.
    pub fn save(&self) -> usize {
        self.pos
    }

    /// Rewind to a saved position.
    pub fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// True at end of input.
    pub fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }
}
