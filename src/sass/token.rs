//! Token definitions for the stylesheet language.
//!
//! All tokens are produced by the logos derive below. The lexer stays
//! deliberately coarse: it does not know whether it is inside a selector, a
//! declaration value, or an at-rule prelude; the parser decides that from
//! context. This keeps the token set small and the grammar regular.
//!
//! Two lexemes need custom handling:
//!
//! - Block comments nest (`/* outer /* inner */ still outer */`), which a
//!   regular expression cannot express. A callback scans the remainder,
//!   tracking depth, and rejects the token when the comment never closes;
//!   the rejection surfaces as an unterminated-comment syntax error in
//!   [`lexing`](super::lexing).
//! - String literals carry their quotes and escapes verbatim. A string that
//!   hits a newline or end of input before its closing quote fails to match,
//!   and the stray quote character becomes the error position.
//!
//! Numbers attach a trailing unit (`10px`, `50%`, `1.5em`) in the same
//! token; the evaluator splits value and unit when it needs to compute.

use logos::Logos;

/// All possible tokens in stylesheet source.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    /// `#{` opens an interpolation. Must outrank [`Token::Hash`], which can
    /// never match the brace.
    #[token("#{")]
    InterpolationStart,

    /// `#` followed by ident characters: a hex color in values, an id
    /// selector in selectors. The parser and evaluator disambiguate.
    #[regex(r"#[a-zA-Z0-9_-]+", |lex| lex.slice().to_string())]
    Hash(String),

    /// At-rule keyword with the `@` stripped: `import`, `mixin`, `media`, …
    #[regex(r"@[a-zA-Z-]+", |lex| lex.slice()[1..].to_string())]
    AtKeyword(String),

    /// Variable reference or assignment target with the `$` stripped.
    #[regex(r"\$[a-zA-Z_-][a-zA-Z0-9_-]*", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    /// A number with an optional attached unit: `12`, `1.5em`, `50%`, `.5`.
    #[regex(r"([0-9]+(\.[0-9]+)?|\.[0-9]+)(%|[a-zA-Z]+)?", |lex| lex.slice().to_string())]
    Number(String),

    /// Identifier, including CSS custom-property style leading dashes.
    /// A leading `-` must not be followed by a digit so that `-5px` lexes
    /// as minus, number.
    #[regex(r"-?-?[a-zA-Z_][a-zA-Z0-9_-]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// Quoted string literal including its quotes; escapes are kept raw.
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| lex.slice().to_string())]
    QuotedString(String),

    /// Block comment, including delimiters; nests.
    #[token("/*", lex_block_comment)]
    Comment(String),

    /// Line comment; never reaches output.
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("&")]
    Ampersand,
    #[token("~")]
    Tilde,

    /// Runs of spaces, tabs, and newlines. Kept as a token because
    /// whitespace is significant in selectors (descendant combinator) and
    /// in space-separated value lists.
    #[regex(r"[ \t\r\n]+")]
    Whitespace,
}

/// Scans past a (possibly nested) block comment body. Called by logos after
/// `/*` has matched; bumps the lexer to just past the closing `*/` and
/// returns the full comment text. Errors when input ends first.
fn lex_block_comment(lex: &mut logos::Lexer<Token>) -> Result<String, ()> {
    let bytes = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return Ok(lex.slice().to_string());
            }
        } else {
            i += 1;
        }
    }
    Err(())
}

impl Token {
    /// Whitespace or comment: skipped everywhere except inside selector
    /// and value slices, which are captured as raw text.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Token::Whitespace | Token::LineComment | Token::Comment(_)
        )
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self, Token::Whitespace)
    }

    /// True for tokens that open a bracketed region the parser must balance
    /// when scanning ahead.
    pub fn opens_group(&self) -> bool {
        matches!(
            self,
            Token::BraceOpen | Token::ParenOpen | Token::BracketOpen | Token::InterpolationStart
        )
    }

    pub fn closes_group(&self) -> bool {
        matches!(
            self,
            Token::BraceClose | Token::ParenClose | Token::BracketClose
        )
    }

    /// A short human-readable description used in syntax error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Token::BraceOpen => "'{'",
            Token::BraceClose => "'}'",
            Token::ParenOpen => "'('",
            Token::ParenClose => "')'",
            Token::BracketOpen => "'['",
            Token::BracketClose => "']'",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::InterpolationStart => "'#{'",
            Token::Hash(_) => "hash",
            Token::AtKeyword(_) => "at-rule keyword",
            Token::Variable(_) => "variable",
            Token::Number(_) => "number",
            Token::Ident(_) => "identifier",
            Token::QuotedString(_) => "string",
            Token::Comment(_) => "comment",
            Token::LineComment => "comment",
            Token::EqEq => "'=='",
            Token::NotEq => "'!='",
            Token::Le => "'<='",
            Token::Ge => "'>='",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Eq => "'='",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Bang => "'!'",
            Token::Ampersand => "'&'",
            Token::Tilde => "'~'",
            Token::Whitespace => "whitespace",
        }
    }
}
