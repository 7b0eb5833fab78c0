//! Tokenization entry point.
//!
//! This is where source strings become token streams. The logos lexer does
//! the character work; this module adds location reporting and the fail-fast
//! contract: any lexeme logos rejects aborts the whole compilation with a
//! syntax error carrying the offending position. The two interesting
//! rejections are unterminated strings and unterminated block comments,
//! which get their own messages.

use logos::Logos;

use crate::sass::error::{CompileError, Result};
use crate::sass::location::LineIndex;
use crate::sass::token::Token;

/// A token paired with its byte range in the source buffer.
pub type Spanned = (Token, std::ops::Range<usize>);

/// Lazy per-file token sequence. Restartable by constructing a new one over
/// the same buffer; no side effects beyond reading `source`.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = std::result::Result<Spanned, std::ops::Range<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;
        let span = self.inner.span();
        Some(match result {
            Ok(token) => Ok((token, span)),
            Err(()) => Err(span),
        })
    }
}

/// Tokenize a whole file, failing on the first bad lexeme.
///
/// `file` is only used for error messages; the buffer itself is the sole
/// input.
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Spanned>> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();

    for item in Lexer::new(source) {
        match item {
            Ok(pair) => tokens.push(pair),
            Err(span) => {
                let position = index.position(span.start);
                let offender = &source[span.clone()];
                let message = if offender.starts_with("/*") {
                    "unterminated comment".to_string()
                } else if offender.starts_with('"') || offender.starts_with('\'') {
                    "unterminated string".to_string()
                } else {
                    format!("unexpected character '{}'", offender)
                };
                return Err(CompileError::syntax(file, position, message));
            }
        }
    }

    Ok(tokens)
}
