//! Parser: token stream to syntax tree, with `@import` splicing.
//!
//! The parser is hand-written recursive descent over the token stream. The
//! one structural ambiguity in the grammar (inside a rule body, does the
//! next construct start a declaration or a nested rule?) is resolved by
//! bounded lookahead: scan ahead at bracket depth 0 and see whether `{`,
//! `;`, or `}` comes first.
//!
//! `@import` is resolved during parsing. The referenced file is searched in
//! the importing file's own directory first, then each configured include
//! path, first existing match wins; the file is lexed and parsed recursively
//! and its items are spliced in place of the directive. The set of files
//! currently being parsed travels down the recursion in the
//! [`ParseSession`], so a cycle is detected the moment an import re-enters
//! an in-progress file: no unbounded recursion, and the error names the
//! whole chain.
//!
//! Parsing halts at the first error; there is no recovery or continuation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::sass::ast::{
    BinOp, Comment, CssImport, Declaration, Expr, ForDirective, IfDirective, Item, MediaRule,
    MixinCall, MixinDefinition, MixinParam, RawExpr, Rule, Stylesheet, VariableAssignment,
};
use crate::sass::error::{CompileError, Result};
use crate::sass::lexing::{tokenize, Spanned};
use crate::sass::location::{FileTable, LineIndex, SourceLocation};
use crate::sass::options::CompileOptions;
use crate::sass::token::Token;

/// Per-compilation parse state: the file table shared with later stages and
/// the stack of files currently being parsed (for cycle detection). Owned by
/// one compilation; never shared across invocations.
pub struct ParseSession<'o> {
    pub options: &'o CompileOptions,
    pub files: FileTable,
    /// (canonical path, display path) for every file on the parse stack.
    in_progress: Vec<(PathBuf, String)>,
}

impl<'o> ParseSession<'o> {
    pub fn new(options: &'o CompileOptions) -> Self {
        Self {
            options,
            files: FileTable::new(),
            in_progress: Vec::new(),
        }
    }
}

/// Parse an in-memory source string. `display_name` labels error messages
/// and source comments; imports resolve relative to `base_dir`.
pub fn parse_string(
    source: &str,
    display_name: &str,
    base_dir: &Path,
    session: &mut ParseSession<'_>,
) -> Result<Stylesheet> {
    let file = session.files.add(display_name);
    let tokens = tokenize(source, display_name)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        index: LineIndex::new(source),
        file,
        file_name: display_name.to_string(),
        dir: base_dir.to_path_buf(),
        session,
    };
    let items = parser.parse_items(BodyContext::TopLevel)?;
    if let Some((_, span)) = parser.current() {
        let loc = parser.position_of(span.start);
        return Err(CompileError::syntax(
            &parser.file_name,
            loc,
            "unexpected '}'",
        ));
    }
    Ok(Stylesheet::new(items))
}

/// Parse a stylesheet file, recursively entered for each `@import`.
pub fn parse_file(path: &Path, session: &mut ParseSession<'_>) -> Result<Stylesheet> {
    let display = path.display().to_string();
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    if let Some(idx) = session
        .in_progress
        .iter()
        .position(|(canon, _)| *canon == canonical)
    {
        let mut chain: Vec<String> = session.in_progress[idx..]
            .iter()
            .map(|(_, name)| name.clone())
            .collect();
        chain.push(display);
        return Err(CompileError::ImportCycle { chain });
    }

    let source = fs::read_to_string(path)?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    session.in_progress.push((canonical, display.clone()));
    let result = (|| {
        let file = session.files.add(&display);
        let tokens = tokenize(&source, &display)?;
        let mut parser = Parser {
            source: &source,
            tokens,
            pos: 0,
            index: LineIndex::new(&source),
            file,
            file_name: display.clone(),
            dir,
            session,
        };
        let items = parser.parse_items(BodyContext::TopLevel)?;
        if let Some((_, span)) = parser.current() {
            let loc = parser.position_of(span.start);
            return Err(CompileError::syntax(&parser.file_name, loc, "unexpected '}'"));
        }
        Ok(Stylesheet::new(items))
    })();
    session.in_progress.pop();
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyContext {
    TopLevel,
    RuleBody,
}

struct Parser<'s, 'sess, 'o> {
    source: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
    index: LineIndex,
    file: crate::sass::location::FileId,
    file_name: String,
    /// Directory imports resolve against first.
    dir: PathBuf,
    session: &'sess mut ParseSession<'o>,
}

impl<'s, 'sess, 'o> Parser<'s, 'sess, 'o> {
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn position_of(&self, byte: usize) -> crate::sass::location::Position {
        self.index.position(byte)
    }

    fn location_here(&self) -> SourceLocation {
        let byte = self
            .current()
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len());
        SourceLocation::new(self.file, self.position_of(byte))
    }

    fn err_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(&self.file_name, self.location_here().position, message)
    }

    /// Skip whitespace and silent comments. Loud comments are skipped too;
    /// callers that preserve them use [`Parser::skip_trivia_collecting`].
    fn skip_trivia(&mut self) {
        while let Some((tok, _)) = self.current() {
            if tok.is_trivia() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Skip trivia, turning loud `/* */` comments into items.
    fn skip_trivia_collecting(&mut self, items: &mut Vec<Item>) {
        while let Some((tok, span)) = self.current() {
            match tok {
                Token::Whitespace | Token::LineComment => self.pos += 1,
                Token::Comment(text) => {
                    let location = SourceLocation::new(self.file, self.position_of(span.start));
                    items.push(Item::Comment(Comment {
                        text: text.clone(),
                        location,
                    }));
                    self.pos += 1;
                }
                _ => break,
            }
        }
    }

    fn parse_items(&mut self, ctx: BodyContext) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia_collecting(&mut items);
            let Some((token, _span)) = self.current() else {
                return Ok(items);
            };
            match token.clone() {
                Token::BraceClose => return Ok(items),
                Token::AtKeyword(kw) => {
                    self.parse_at_rule(&kw, &mut items)?;
                }
                Token::Variable(name) => {
                    items.push(Item::VariableAssignment(
                        self.parse_variable_assignment(name)?,
                    ));
                }
                _ => {
                    if ctx == BodyContext::TopLevel || self.next_construct_is_rule() {
                        items.push(Item::Rule(self.parse_rule()?));
                    } else {
                        items.push(Item::Declaration(self.parse_declaration()?));
                    }
                }
            }
        }
    }

    /// Decide declaration vs nested rule by scanning ahead for the first of
    /// `{` / `;` / `}` at bracket depth 0.
    fn next_construct_is_rule(&self) -> bool {
        let mut depth = 0usize;
        for (token, _) in &self.tokens[self.pos..] {
            match token {
                Token::ParenOpen | Token::BracketOpen | Token::InterpolationStart => depth += 1,
                Token::ParenClose | Token::BracketClose => depth = depth.saturating_sub(1),
                Token::BraceOpen if depth == 0 => return true,
                Token::BraceOpen => depth += 1,
                Token::BraceClose if depth == 0 => return false,
                Token::BraceClose => depth -= 1,
                Token::Semicolon if depth == 0 => return false,
                _ => {}
            }
        }
        false
    }

    /// Capture raw source text from the current position until `stop`
    /// returns true for a token at bracket depth 0. The terminator is not
    /// consumed. Returns the trimmed text and the location of its first
    /// token.
    fn capture_until<F>(&mut self, stop: F) -> (String, SourceLocation)
    where
        F: Fn(&Token) -> bool,
    {
        let mut depth = 0usize;
        let mut start_byte = None;
        let mut end_byte = self
            .current()
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len());
        while let Some((token, span)) = self.current() {
            if depth == 0 && stop(token) {
                break;
            }
            match token {
                Token::ParenOpen
                | Token::BracketOpen
                | Token::BraceOpen
                | Token::InterpolationStart => depth += 1,
                Token::ParenClose | Token::BracketClose | Token::BraceClose => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            if start_byte.is_none() && !token.is_trivia() {
                start_byte = Some(span.start);
            }
            if !token.is_whitespace() {
                end_byte = span.end;
            }
            self.pos += 1;
        }
        let start = start_byte.unwrap_or(end_byte);
        let text = self.source[start..end_byte.max(start)].trim().to_string();
        let location = SourceLocation::new(self.file, self.position_of(start));
        (text, location)
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        match self.current() {
            Some((token, _)) if token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some((token, _)) => {
                let found = token.describe();
                Err(self.err_here(format!("expected {what}, found {found}")))
            }
            None => Err(self.err_here(format!("unexpected end of file, expected {what}"))),
        }
    }

    /// `{ items }`, consuming both braces.
    fn parse_block(&mut self) -> Result<Vec<Item>> {
        self.skip_trivia();
        self.expect(&Token::BraceOpen, "'{'")?;
        let items = self.parse_items(BodyContext::RuleBody)?;
        self.expect(&Token::BraceClose, "'}'")?;
        Ok(items)
    }

    fn parse_rule(&mut self) -> Result<Rule> {
        let location = self.location_here();
        let mut selectors = Vec::new();
        loop {
            let (text, _) = self.capture_until(|t| {
                matches!(t, Token::BraceOpen | Token::Comma | Token::Semicolon)
            });
            if text.is_empty() {
                return Err(self.err_here("expected a selector"));
            }
            selectors.push(text);
            match self.current() {
                Some((Token::Comma, _)) => {
                    self.pos += 1;
                }
                Some((Token::BraceOpen, _)) => break,
                Some((Token::Semicolon, _)) => {
                    return Err(self.err_here(
                        "expected '{' after selector; declarations must appear inside a rule",
                    ));
                }
                _ => return Err(self.err_here("unexpected end of file, expected '{'")),
            }
        }
        let body = self.parse_block()?;
        Ok(Rule {
            selectors,
            body,
            location,
        })
    }

    fn parse_declaration(&mut self) -> Result<Declaration> {
        let location = self.location_here();
        let (property, _) = self.capture_until(|t| {
            matches!(t, Token::Colon | Token::Semicolon | Token::BraceClose)
        });
        if property.is_empty() {
            return Err(self.err_here("expected a property name"));
        }
        self.expect(&Token::Colon, "':' after property name")?;
        let (value_text, value_loc) =
            self.capture_until(|t| matches!(t, Token::Semicolon | Token::BraceClose));
        if value_text.is_empty() {
            return Err(self.err_here(format!("expected a value for property '{property}'")));
        }
        if let Some((Token::Semicolon, _)) = self.current() {
            self.pos += 1;
        }
        let (value_text, important) = strip_important(&value_text);
        if value_text.is_empty() {
            return Err(self.err_here(format!("expected a value for property '{property}'")));
        }
        Ok(Declaration {
            property,
            value: RawExpr::new(value_text, value_loc),
            important,
            location,
        })
    }

    fn parse_variable_assignment(&mut self, name: String) -> Result<VariableAssignment> {
        let location = self.location_here();
        self.pos += 1; // the variable token
        self.skip_trivia();
        self.expect(&Token::Colon, "':' after variable name")?;
        let (value_text, value_loc) =
            self.capture_until(|t| matches!(t, Token::Semicolon | Token::BraceClose));
        if let Some((Token::Semicolon, _)) = self.current() {
            self.pos += 1;
        }
        let (value_text, default) = strip_default(&value_text);
        if value_text.is_empty() {
            return Err(self.err_here(format!("expected a value for ${name}")));
        }
        Ok(VariableAssignment {
            name,
            value: RawExpr::new(value_text, value_loc),
            default,
            location,
        })
    }

    fn parse_at_rule(&mut self, kw: &str, items: &mut Vec<Item>) -> Result<()> {
        match kw {
            "import" => self.parse_import(items),
            "mixin" => {
                let def = self.parse_mixin_definition()?;
                items.push(Item::MixinDefinition(def));
                Ok(())
            }
            "include" => {
                let call = self.parse_mixin_call()?;
                items.push(Item::MixinCall(call));
                Ok(())
            }
            "if" => {
                let directive = self.parse_if()?;
                items.push(Item::If(directive));
                Ok(())
            }
            "else" => Err(self.err_here("@else without a matching @if")),
            "for" => {
                let directive = self.parse_for()?;
                items.push(Item::For(directive));
                Ok(())
            }
            "media" => {
                let location = self.location_here();
                self.pos += 1;
                let (query, _) = self.capture_until(|t| matches!(t, Token::BraceOpen));
                if query.is_empty() {
                    return Err(self.err_here("expected a media query"));
                }
                let body = self.parse_block()?;
                items.push(Item::Media(MediaRule {
                    query,
                    body,
                    location,
                }));
                Ok(())
            }
            "charset" => {
                // Accepted and dropped: output encoding is always UTF-8.
                self.pos += 1;
                self.capture_until(|t| matches!(t, Token::Semicolon));
                if let Some((Token::Semicolon, _)) = self.current() {
                    self.pos += 1;
                }
                Ok(())
            }
            other => Err(self.err_here(format!("unknown at-rule '@{other}'"))),
        }
    }

    fn parse_import(&mut self, items: &mut Vec<Item>) -> Result<()> {
        let location = self.location_here();
        self.pos += 1; // @import
        loop {
            self.skip_trivia();
            match self.current().cloned() {
                Some((Token::QuotedString(raw), _)) => {
                    self.pos += 1;
                    let target = raw[1..raw.len() - 1].to_string();
                    if is_css_import(&target) {
                        items.push(Item::CssImport(CssImport {
                            target: raw,
                            location,
                        }));
                    } else {
                        let resolved = self.resolve_import(&target)?;
                        tracing::debug!(
                            target = %target,
                            resolved = %resolved.display(),
                            importer = %self.file_name,
                            "resolved import"
                        );
                        let sheet = parse_file(&resolved, self.session)?;
                        items.extend(sheet.items);
                    }
                }
                Some((Token::Ident(name), span)) if name == "url" => {
                    // url(...) imports always pass through to the browser.
                    self.pos += 1;
                    self.expect(&Token::ParenOpen, "'(' after url")?;
                    self.capture_until(|t| matches!(t, Token::ParenClose));
                    let close_end = match self.current() {
                        Some((Token::ParenClose, span)) => span.end,
                        _ => return Err(self.err_here("unterminated url()")),
                    };
                    self.pos += 1;
                    let target = self.source[span.start..close_end].to_string();
                    items.push(Item::CssImport(CssImport { target, location }));
                }
                _ => return Err(self.err_here("expected a quoted path after @import")),
            }
            self.skip_trivia();
            match self.current() {
                Some((Token::Comma, _)) => {
                    self.pos += 1;
                }
                Some((Token::Semicolon, _)) => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => return Err(self.err_here("expected ';' after @import")),
            }
        }
    }

    /// Search order: importing file's own directory, then each include
    /// path; within a directory: `name`, `name.scss`, `_name.scss` (the
    /// partial convention). First existing match wins.
    fn resolve_import(&self, target: &str) -> Result<PathBuf> {
        let mut searched = Vec::new();
        let dirs = std::iter::once(self.dir.clone())
            .chain(self.session.options.include_paths.iter().cloned());
        for dir in dirs {
            for candidate in candidate_names(target) {
                let path = dir.join(&candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
            searched.push(dir);
        }
        Err(CompileError::ImportNotFound {
            path: target.to_string(),
            searched,
        })
    }

    fn parse_mixin_definition(&mut self) -> Result<MixinDefinition> {
        let location = self.location_here();
        self.pos += 1; // @mixin
        self.skip_trivia();
        let name = match self.advance() {
            Some((Token::Ident(name), _)) => name,
            _ => return Err(self.err_here("expected a mixin name after @mixin")),
        };
        self.skip_trivia();
        let mut params = Vec::new();
        if let Some((Token::ParenOpen, _)) = self.current() {
            self.pos += 1;
            loop {
                self.skip_trivia();
                match self.current().cloned() {
                    Some((Token::ParenClose, _)) => {
                        self.pos += 1;
                        break;
                    }
                    Some((Token::Variable(param), _)) => {
                        self.pos += 1;
                        self.skip_trivia();
                        let default = if let Some((Token::Colon, _)) = self.current() {
                            self.pos += 1;
                            let (text, loc) = self.capture_until(|t| {
                                matches!(t, Token::Comma | Token::ParenClose)
                            });
                            Some(RawExpr::new(text, loc))
                        } else {
                            None
                        };
                        params.push(MixinParam {
                            name: param,
                            default,
                        });
                        self.skip_trivia();
                        if let Some((Token::Comma, _)) = self.current() {
                            self.pos += 1;
                        }
                    }
                    _ => return Err(self.err_here("expected a $parameter in mixin signature")),
                }
            }
        }
        let body = self.parse_block()?;
        Ok(MixinDefinition {
            name,
            params,
            body,
            location,
        })
    }

    fn parse_mixin_call(&mut self) -> Result<MixinCall> {
        let location = self.location_here();
        self.pos += 1; // @include
        self.skip_trivia();
        let name = match self.advance() {
            Some((Token::Ident(name), _)) => name,
            _ => return Err(self.err_here("expected a mixin name after @include")),
        };
        self.skip_trivia();
        let mut args = Vec::new();
        if let Some((Token::ParenOpen, _)) = self.current() {
            self.pos += 1;
            loop {
                self.skip_trivia();
                if let Some((Token::ParenClose, _)) = self.current() {
                    self.pos += 1;
                    break;
                }
                let (text, loc) =
                    self.capture_until(|t| matches!(t, Token::Comma | Token::ParenClose));
                if text.is_empty() {
                    return Err(self.err_here("expected a mixin argument"));
                }
                args.push(RawExpr::new(text, loc));
                if let Some((Token::Comma, _)) = self.current() {
                    self.pos += 1;
                }
            }
        }
        self.skip_trivia();
        match self.current() {
            Some((Token::Semicolon, _)) => {
                self.pos += 1;
            }
            Some((Token::BraceClose, _)) | None => {}
            _ => return Err(self.err_here("expected ';' after @include")),
        }
        Ok(MixinCall {
            name,
            args,
            location,
        })
    }

    fn parse_if(&mut self) -> Result<IfDirective> {
        let location = self.location_here();
        self.pos += 1; // @if
        let (condition, cond_loc) = self.capture_until(|t| matches!(t, Token::BraceOpen));
        if condition.is_empty() {
            return Err(self.err_here("expected a condition after @if"));
        }
        let then_body = self.parse_block()?;

        // An @else may follow, possibly chaining into another @if.
        let checkpoint = self.pos;
        self.skip_trivia();
        let else_body = match self.current().cloned() {
            Some((Token::AtKeyword(kw), _)) if kw == "else" => {
                self.pos += 1;
                self.skip_trivia();
                match self.current().cloned() {
                    Some((Token::Ident(word), _)) if word == "if" => {
                        self.pos += 1;
                        let chained = self.parse_if()?;
                        Some(vec![Item::If(chained)])
                    }
                    _ => Some(self.parse_block()?),
                }
            }
            _ => {
                self.pos = checkpoint;
                None
            }
        };

        Ok(IfDirective {
            condition: RawExpr::new(condition, cond_loc),
            then_body,
            else_body,
            location,
        })
    }

    fn parse_for(&mut self) -> Result<ForDirective> {
        let location = self.location_here();
        self.pos += 1; // @for
        self.skip_trivia();
        let variable = match self.advance() {
            Some((Token::Variable(name), _)) => name,
            _ => return Err(self.err_here("expected a $variable after @for")),
        };
        self.skip_trivia();
        match self.advance() {
            Some((Token::Ident(word), _)) if word == "from" => {}
            _ => return Err(self.err_here("expected 'from' in @for")),
        }
        let (from_text, from_loc) = self.capture_until(|t| {
            matches!(t, Token::Ident(word) if word == "through" || word == "to")
        });
        if from_text.is_empty() {
            return Err(self.err_here("expected a lower bound in @for"));
        }
        let inclusive = match self.advance() {
            Some((Token::Ident(word), _)) if word == "through" => true,
            Some((Token::Ident(word), _)) if word == "to" => false,
            _ => return Err(self.err_here("expected 'through' or 'to' in @for")),
        };
        let (to_text, to_loc) = self.capture_until(|t| matches!(t, Token::BraceOpen));
        if to_text.is_empty() {
            return Err(self.err_here("expected an upper bound in @for"));
        }
        let body = self.parse_block()?;
        Ok(ForDirective {
            variable,
            from: RawExpr::new(from_text, from_loc),
            to: RawExpr::new(to_text, to_loc),
            inclusive,
            body,
            location,
        })
    }
}

/// Strip a trailing `!important` from captured value text.
fn strip_important(text: &str) -> (String, bool) {
    let trimmed = text.trim_end();
    if trimmed.to_ascii_lowercase().ends_with("!important") {
        let cut = trimmed.len() - "!important".len();
        (trimmed[..cut].trim_end().to_string(), true)
    } else {
        (trimmed.to_string(), false)
    }
}

/// Strip a trailing `!default` from captured assignment text.
fn strip_default(text: &str) -> (String, bool) {
    let trimmed = text.trim_end();
    if trimmed.to_ascii_lowercase().ends_with("!default") {
        let cut = trimmed.len() - "!default".len();
        (trimmed[..cut].trim_end().to_string(), true)
    } else {
        (trimmed.to_string(), false)
    }
}

/// CSS-native import targets are not resolved by the compiler.
fn is_css_import(target: &str) -> bool {
    target.ends_with(".css")
        || target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("//")
}

/// Candidate file names for an import target, in probe order.
fn candidate_names(target: &str) -> Vec<PathBuf> {
    let path = Path::new(target);
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.to_string());

    let names = if name.ends_with(".scss") {
        vec![name.clone(), format!("_{name}")]
    } else {
        vec![
            format!("{name}.scss"),
            format!("_{name}.scss"),
            name.clone(),
        ]
    };

    names
        .into_iter()
        .map(|n| match parent {
            Some(parent) => parent.join(n),
            None => PathBuf::from(n),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Expression parsing
//
// Declaration values, assignment values, conditions, and bounds are stored
// as raw text and parsed here once interpolation has been substituted. The
// grammar, loosest binding first: comma list, space list, or/and/not,
// comparison, sum, product, unary, primary.
// ---------------------------------------------------------------------------

/// Functions whose argument text passes through the compiler untouched.
const PASSTHROUGH_FUNCTIONS: &[&str] = &[
    "url", "calc", "var", "env", "attr", "counter", "counters", "format", "local", "rect",
];

/// Parse expression text captured from `location`. Errors are reported at
/// the capture's location: positions inside a value are not tracked.
pub fn parse_expression(
    text: &str,
    file_name: &str,
    location: SourceLocation,
) -> Result<Expr> {
    let tokens = match tokenize(text, file_name) {
        Ok(tokens) => tokens,
        Err(CompileError::Syntax { message, .. }) => {
            return Err(CompileError::syntax(file_name, location.position, message));
        }
        Err(other) => return Err(other),
    };
    let mut parser = ExprParser {
        text,
        tokens,
        pos: 0,
        file_name,
        location,
    };
    let expr = parser.parse_comma_list()?;
    parser.skip_ws();
    if let Some((token, _)) = parser.current() {
        let found = token.describe();
        return Err(parser.err(format!("unexpected {found} in expression")));
    }
    Ok(expr)
}

struct ExprParser<'s> {
    text: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
    file_name: &'s str,
    location: SourceLocation,
}

impl<'s> ExprParser<'s> {
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.file_name, self.location.position, message)
    }

    fn skip_ws(&mut self) {
        while let Some((token, _)) = self.current() {
            if token.is_trivia() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Index and token of the next non-trivia token, without consuming the
    /// trivia. The sum parser needs to know whether whitespace preceded an
    /// operator.
    fn peek_non_ws(&self) -> Option<(usize, &Spanned)> {
        let mut idx = self.pos;
        while let Some(pair) = self.tokens.get(idx) {
            if pair.0.is_trivia() {
                idx += 1;
            } else {
                return Some((idx, pair));
            }
        }
        None
    }

    fn parse_comma_list(&mut self) -> Result<Expr> {
        let mut items = vec![self.parse_space_list()?];
        loop {
            self.skip_ws();
            match self.current() {
                Some((Token::Comma, _)) => {
                    self.pos += 1;
                    items.push(self.parse_space_list()?);
                }
                _ => break,
            }
        }
        if items.len() == 1 {
            Ok(items.pop().unwrap())
        } else {
            Ok(Expr::List { items, comma: true })
        }
    }

    fn parse_space_list(&mut self) -> Result<Expr> {
        let mut items = vec![self.parse_or()?];
        loop {
            self.skip_ws();
            match self.current() {
                None
                | Some((Token::Comma, _))
                | Some((Token::ParenClose, _))
                | Some((Token::EqEq, _))
                | Some((Token::NotEq, _))
                | Some((Token::Le, _))
                | Some((Token::Ge, _))
                | Some((Token::Lt, _))
                | Some((Token::Gt, _)) => break,
                _ => items.push(self.parse_or()?),
            }
        }
        if items.len() == 1 {
            Ok(items.pop().unwrap())
        } else {
            Ok(Expr::List {
                items,
                comma: false,
            })
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            match self.current() {
                Some((Token::Ident(word), _)) if word == "or" => {
                    self.pos += 1;
                    let rhs = self.parse_and()?;
                    lhs = Expr::FunctionCall {
                        name: "or".to_string(),
                        args: vec![lhs, rhs],
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        loop {
            self.skip_ws();
            match self.current() {
                Some((Token::Ident(word), _)) if word == "and" => {
                    self.pos += 1;
                    let rhs = self.parse_not()?;
                    lhs = Expr::FunctionCall {
                        name: "and".to_string(),
                        args: vec![lhs, rhs],
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.current() {
            Some((Token::Ident(word), _)) if word == "not" => {
                self.pos += 1;
                let inner = self.parse_not()?;
                Ok(Expr::FunctionCall {
                    name: "not".to_string(),
                    args: vec![inner],
                })
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_sum()?;
        self.skip_ws();
        let op = match self.current() {
            Some((Token::EqEq, _)) => Some(BinOp::Eq),
            Some((Token::NotEq, _)) => Some(BinOp::Ne),
            Some((Token::Le, _)) => Some(BinOp::Le),
            Some((Token::Ge, _)) => Some(BinOp::Ge),
            Some((Token::Lt, _)) => Some(BinOp::Lt),
            Some((Token::Gt, _)) => Some(BinOp::Gt),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.parse_sum()?;
                Ok(Expr::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            None => Ok(lhs),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_product()?;
        loop {
            let Some((idx, (token, _))) = self.peek_non_ws() else {
                return Ok(lhs);
            };
            let op = match token {
                Token::Plus => BinOp::Add,
                Token::Minus => {
                    // `10px -5px` is a space list, `10px - 5px` and
                    // `10px-5px` subtract: minus starts a new list item
                    // only when whitespace precedes but does not follow it.
                    let ws_before = idx > self.pos;
                    let ws_after =
                        matches!(self.tokens.get(idx + 1), Some((Token::Whitespace, _)));
                    if ws_before && !ws_after {
                        return Ok(lhs);
                    }
                    BinOp::Sub
                }
                _ => return Ok(lhs),
            };
            self.pos = idx + 1;
            let rhs = self.parse_product()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((idx, (token, _))) = self.peek_non_ws() else {
                return Ok(lhs);
            };
            let op = match token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos = idx + 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.current() {
            Some((Token::Minus, _)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some((Token::Plus, _)) => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_ws();
        let Some((token, span)) = self.current().cloned() else {
            return Err(self.err("expected a value"));
        };
        match token {
            Token::Number(text) => {
                self.pos += 1;
                let (value, unit) = split_number(&text)
                    .ok_or_else(|| self.err(format!("malformed number '{text}'")))?;
                Ok(Expr::Number { value, unit })
            }
            Token::QuotedString(raw) => {
                self.pos += 1;
                Ok(Expr::Str {
                    text: raw[1..raw.len() - 1].to_string(),
                    quoted: true,
                })
            }
            Token::Hash(text) => {
                self.pos += 1;
                match parse_hex_color(&text) {
                    Some((r, g, b, a)) => Ok(Expr::Color { r, g, b, a }),
                    None => Ok(Expr::Ident(text)),
                }
            }
            Token::Variable(name) => {
                self.pos += 1;
                Ok(Expr::Variable { name })
            }
            Token::ParenOpen => {
                self.pos += 1;
                let inner = self.parse_comma_list()?;
                self.skip_ws();
                match self.current() {
                    Some((Token::ParenClose, _)) => {
                        self.pos += 1;
                        Ok(Expr::Paren(Box::new(inner)))
                    }
                    _ => Err(self.err("expected ')'")),
                }
            }
            Token::Ident(name) => {
                self.pos += 1;
                // A call only when '(' is adjacent: `url(x)` yes, `a (b)` no.
                let adjacent_paren = matches!(
                    self.current(),
                    Some((Token::ParenOpen, paren_span)) if paren_span.start == span.end
                );
                if adjacent_paren {
                    if PASSTHROUGH_FUNCTIONS.contains(&name.as_str()) {
                        self.capture_call_raw(&name, span.start)
                    } else {
                        self.parse_call_args(name)
                    }
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(self.err(format!("expected a value, found {}", other.describe()))),
        }
    }

    /// Consume a balanced `(...)` and return the whole call as raw text.
    fn capture_call_raw(&mut self, _name: &str, start_byte: usize) -> Result<Expr> {
        debug_assert!(matches!(self.current(), Some((Token::ParenOpen, _))));
        self.pos += 1;
        let mut depth = 1usize;
        loop {
            let Some((token, span)) = self.current() else {
                return Err(self.err("unterminated '(' in value"));
            };
            match token {
                Token::ParenOpen | Token::InterpolationStart => depth += 1,
                Token::BraceOpen | Token::BracketOpen => depth += 1,
                Token::ParenClose | Token::BraceClose | Token::BracketClose => {
                    depth -= 1;
                    if depth == 0 {
                        let end = span.end;
                        self.pos += 1;
                        return Ok(Expr::Raw(self.text[start_byte..end].to_string()));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn parse_call_args(&mut self, name: String) -> Result<Expr> {
        debug_assert!(matches!(self.current(), Some((Token::ParenOpen, _))));
        self.pos += 1;
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            match self.current() {
                Some((Token::ParenClose, _)) => {
                    self.pos += 1;
                    return Ok(Expr::FunctionCall { name, args });
                }
                None => return Err(self.err(format!("unterminated call to {name}()"))),
                _ => {
                    args.push(self.parse_space_list()?);
                    self.skip_ws();
                    if let Some((Token::Comma, _)) = self.current() {
                        self.pos += 1;
                    }
                }
            }
        }
    }
}

/// Split a number token into value and unit: `"1.5em"` becomes `(1.5, "em")`.
fn split_number(text: &str) -> Option<(f64, String)> {
    let split = text
        .find(|c: char| c != '.' && !c.is_ascii_digit())
        .unwrap_or(text.len());
    let value: f64 = text[..split].parse().ok()?;
    Some((value, text[split..].to_string()))
}

/// `#rgb`, `#rgba`, `#rrggbb`, and `#rrggbbaa` forms. Anything else is not
/// a color.
fn parse_hex_color(text: &str) -> Option<(u8, u8, u8, f64)> {
    let hex = text.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expand = |c: char| {
        let d = c.to_digit(16).unwrap() as u8;
        d * 16 + d
    };
    let pair = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut chars = hex.chars();
            Some((
                expand(chars.next()?),
                expand(chars.next()?),
                expand(chars.next()?),
                1.0,
            ))
        }
        4 => {
            let mut chars = hex.chars();
            let (r, g, b) = (
                expand(chars.next()?),
                expand(chars.next()?),
                expand(chars.next()?),
            );
            let a = expand(chars.next()?) as f64 / 255.0;
            Some((r, g, b, a))
        }
        6 => Some((pair(&hex[0..2])?, pair(&hex[2..4])?, pair(&hex[4..6])?, 1.0)),
        8 => Some((
            pair(&hex[0..2])?,
            pair(&hex[2..4])?,
            pair(&hex[4..6])?,
            pair(&hex[6..8])? as f64 / 255.0,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sass::location::{FileId, Position};

    fn parse(source: &str) -> Stylesheet {
        let options = CompileOptions::default();
        let mut session = ParseSession::new(&options);
        parse_string(source, "test.scss", Path::new("."), &mut session).expect("parse failed")
    }

    fn parse_err(source: &str) -> CompileError {
        let options = CompileOptions::default();
        let mut session = ParseSession::new(&options);
        parse_string(source, "test.scss", Path::new("."), &mut session)
            .expect_err("expected parse failure")
    }

    #[test]
    fn test_simple_rule() {
        let sheet = parse("a { color: red; }");
        assert_eq!(sheet.items.len(), 1);
        let Item::Rule(rule) = &sheet.items[0] else {
            panic!("expected rule");
        };
        assert_eq!(rule.selectors, vec!["a".to_string()]);
        assert_eq!(rule.body.len(), 1);
        let Item::Declaration(decl) = &rule.body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.property, "color");
        assert_eq!(decl.value.text, "red");
        assert!(!decl.important);
    }

    #[test]
    fn test_nested_rule() {
        let sheet = parse("a { b { color: blue; } }");
        let Item::Rule(outer) = &sheet.items[0] else {
            panic!("expected rule");
        };
        let Item::Rule(inner) = &outer.body[0] else {
            panic!("expected nested rule");
        };
        assert_eq!(inner.selectors, vec!["b".to_string()]);
    }

    #[test]
    fn test_selector_alternatives_split_on_commas() {
        let sheet = parse("a, .b > c { color: red; }");
        let Item::Rule(rule) = &sheet.items[0] else {
            panic!("expected rule");
        };
        assert_eq!(rule.selectors, vec!["a".to_string(), ".b > c".to_string()]);
    }

    #[test]
    fn test_declaration_without_trailing_semicolon() {
        let sheet = parse("a { color: red }");
        let Item::Rule(rule) = &sheet.items[0] else {
            panic!("expected rule");
        };
        assert_eq!(rule.body.len(), 1);
    }

    #[test]
    fn test_important_flag() {
        let sheet = parse("a { color: red !important; }");
        let Item::Rule(rule) = &sheet.items[0] else {
            panic!("expected rule");
        };
        let Item::Declaration(decl) = &rule.body[0] else {
            panic!("expected declaration");
        };
        assert!(decl.important);
        assert_eq!(decl.value.text, "red");
    }

    #[test]
    fn test_variable_assignment_with_default() {
        let sheet = parse("$width: 10px !default;\n$color: red;");
        let Item::VariableAssignment(first) = &sheet.items[0] else {
            panic!("expected assignment");
        };
        assert!(first.default);
        assert_eq!(first.value.text, "10px");
        let Item::VariableAssignment(second) = &sheet.items[1] else {
            panic!("expected assignment");
        };
        assert!(!second.default);
    }

    #[test]
    fn test_pseudo_selector_is_not_mistaken_for_declaration() {
        let sheet = parse("a { &:hover { color: red; } }");
        let Item::Rule(outer) = &sheet.items[0] else {
            panic!("expected rule");
        };
        let Item::Rule(inner) = &outer.body[0] else {
            panic!("expected nested rule for &:hover");
        };
        assert_eq!(inner.selectors, vec!["&:hover".to_string()]);
    }

    #[test]
    fn test_mixin_definition_and_call() {
        let sheet = parse(
            "@mixin pad($x, $y: 2px) { padding: $x $y; }\na { @include pad(1px); }",
        );
        let Item::MixinDefinition(def) = &sheet.items[0] else {
            panic!("expected mixin definition");
        };
        assert_eq!(def.name, "pad");
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].name, "x");
        assert!(def.params[0].default.is_none());
        assert_eq!(def.params[1].default.as_ref().unwrap().text, "2px");

        let Item::Rule(rule) = &sheet.items[1] else {
            panic!("expected rule");
        };
        let Item::MixinCall(call) = &rule.body[0] else {
            panic!("expected mixin call");
        };
        assert_eq!(call.name, "pad");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.args[0].text, "1px");
    }

    #[test]
    fn test_if_else_chain() {
        let sheet = parse(
            "@if $a == 1 { a { c: d; } } @else if $a == 2 { b { c: d; } } @else { i { c: d; } }",
        );
        let Item::If(directive) = &sheet.items[0] else {
            panic!("expected @if");
        };
        assert_eq!(directive.condition.text, "$a == 1");
        let else_body = directive.else_body.as_ref().unwrap();
        let Item::If(chained) = &else_body[0] else {
            panic!("expected chained @else if");
        };
        assert_eq!(chained.condition.text, "$a == 2");
        assert!(chained.else_body.is_some());
    }

    #[test]
    fn test_for_directive() {
        let sheet = parse("@for $i from 1 through 3 { x { w: $i; } }");
        let Item::For(directive) = &sheet.items[0] else {
            panic!("expected @for");
        };
        assert_eq!(directive.variable, "i");
        assert_eq!(directive.from.text, "1");
        assert_eq!(directive.to.text, "3");
        assert!(directive.inclusive);
    }

    #[test]
    fn test_media_rule() {
        let sheet = parse("@media (min-width: 600px) { a { color: red; } }");
        let Item::Media(media) = &sheet.items[0] else {
            panic!("expected @media");
        };
        assert_eq!(media.query, "(min-width: 600px)");
        assert_eq!(media.body.len(), 1);
    }

    #[test]
    fn test_css_import_passes_through() {
        let sheet = parse("@import \"theme.css\";\n@import url(print.css);");
        assert!(matches!(sheet.items[0], Item::CssImport(_)));
        let Item::CssImport(second) = &sheet.items[1] else {
            panic!("expected css import");
        };
        assert_eq!(second.target, "url(print.css)");
    }

    #[test]
    fn test_loud_comment_is_kept() {
        let sheet = parse("/* banner */\na { color: red; }");
        let Item::Comment(comment) = &sheet.items[0] else {
            panic!("expected comment");
        };
        assert_eq!(comment.text, "/* banner */");
    }

    #[test]
    fn test_unbalanced_brace_is_syntax_error() {
        let err = parse_err("a { color: red;");
        assert!(matches!(err, CompileError::Syntax { .. }), "{err:?}");
    }

    #[test]
    fn test_stray_close_brace_is_syntax_error() {
        let err = parse_err("a { } }");
        let CompileError::Syntax { message, .. } = &err else {
            panic!("expected syntax error");
        };
        assert!(message.contains("'}'"), "{message}");
    }

    #[test]
    fn test_unknown_at_rule_is_syntax_error() {
        let err = parse_err("@sprocket { }");
        let CompileError::Syntax { message, position, .. } = &err else {
            panic!("expected syntax error");
        };
        assert!(message.contains("@sprocket"));
        assert_eq!(*position, Position::new(0, 0));
    }

    #[test]
    fn test_error_location_line_and_column() {
        let err = parse_err("a {\n  color red;\n}");
        let CompileError::Syntax { position, .. } = &err else {
            panic!("expected syntax error");
        };
        // "color red" has no colon: error points into line 2
        assert_eq!(position.line, 1);
    }

    #[test]
    fn test_import_not_found_lists_directories() {
        let err = parse_err("@import \"does-not-exist\";");
        let CompileError::ImportNotFound { path, searched } = &err else {
            panic!("expected import-not-found, got {err:?}");
        };
        assert_eq!(path, "does-not-exist");
        assert!(!searched.is_empty());
    }

    #[test]
    fn test_candidate_names_plain() {
        let names = candidate_names("helpers");
        assert_eq!(
            names,
            vec![
                PathBuf::from("helpers.scss"),
                PathBuf::from("_helpers.scss"),
                PathBuf::from("helpers"),
            ]
        );
    }

    #[test]
    fn test_candidate_names_with_directory_and_extension() {
        let names = candidate_names("sub/theme.scss");
        assert_eq!(
            names,
            vec![
                PathBuf::from("sub/theme.scss"),
                PathBuf::from("sub/_theme.scss"),
            ]
        );
    }

    mod expressions {
        use super::*;

        fn expr(text: &str) -> Expr {
            let location = SourceLocation::new(FileId(0), Position::new(0, 0));
            parse_expression(text, "test.scss", location).expect("expression parse failed")
        }

        #[test]
        fn test_number_with_unit() {
            assert_eq!(
                expr("10px"),
                Expr::Number {
                    value: 10.0,
                    unit: "px".to_string()
                }
            );
        }

        #[test]
        fn test_space_list() {
            let Expr::List { items, comma } = expr("1px solid red") else {
                panic!("expected list");
            };
            assert!(!comma);
            assert_eq!(items.len(), 3);
        }

        #[test]
        fn test_comma_list() {
            let Expr::List { items, comma } = expr("Arial, sans-serif") else {
                panic!("expected list");
            };
            assert!(comma);
            assert_eq!(items.len(), 2);
        }

        #[test]
        fn test_precedence_product_over_sum() {
            let Expr::BinOp { op, rhs, .. } = expr("1 + 2 * 3") else {
                panic!("expected binop");
            };
            assert_eq!(op, BinOp::Add);
            assert!(matches!(*rhs, Expr::BinOp { op: BinOp::Mul, .. }));
        }

        #[test]
        fn test_minus_with_trailing_operand_is_list() {
            let Expr::List { items, comma } = expr("10px -5px") else {
                panic!("expected space list");
            };
            assert!(!comma);
            assert_eq!(items.len(), 2);
            assert!(matches!(items[1], Expr::Neg(_)));
        }

        #[test]
        fn test_spaced_minus_is_subtraction() {
            assert!(matches!(
                expr("10px - 5px"),
                Expr::BinOp { op: BinOp::Sub, .. }
            ));
        }

        #[test]
        fn test_division_expr_shape() {
            assert!(matches!(
                expr("10px/8px"),
                Expr::BinOp { op: BinOp::Div, .. }
            ));
        }

        #[test]
        fn test_hex_colors() {
            assert_eq!(
                expr("#fff"),
                Expr::Color {
                    r: 255,
                    g: 255,
                    b: 255,
                    a: 1.0
                }
            );
            assert_eq!(
                expr("#102030"),
                Expr::Color {
                    r: 0x10,
                    g: 0x20,
                    b: 0x30,
                    a: 1.0
                }
            );
        }

        #[test]
        fn test_url_is_raw_passthrough() {
            assert_eq!(
                expr("url(image/logo.png)"),
                Expr::Raw("url(image/logo.png)".to_string())
            );
        }

        #[test]
        fn test_calc_is_raw_passthrough() {
            assert_eq!(
                expr("calc(100% - 10px)"),
                Expr::Raw("calc(100% - 10px)".to_string())
            );
        }

        #[test]
        fn test_function_call_args() {
            let Expr::FunctionCall { name, args } = expr("rgba(255, 0, 0, 0.5)") else {
                panic!("expected call");
            };
            assert_eq!(name, "rgba");
            assert_eq!(args.len(), 4);
        }

        #[test]
        fn test_comparison() {
            assert!(matches!(
                expr("$a == 1"),
                Expr::BinOp { op: BinOp::Eq, .. }
            ));
        }

        #[test]
        fn test_quoted_string() {
            assert_eq!(
                expr("\"hello\""),
                Expr::Str {
                    text: "hello".to_string(),
                    quoted: true
                }
            );
        }

        #[test]
        fn test_empty_value_is_error() {
            let location = SourceLocation::new(FileId(0), Position::new(0, 0));
            assert!(parse_expression("", "test.scss", location).is_err());
        }
    }
}
