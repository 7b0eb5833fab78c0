//! Tokenization tests over representative stylesheet fragments.
//!
//! These exercise the lexer through the public `tokenize` entry: token
//! kinds, spans, and the fail-fast behavior for unterminated strings and
//! comments.

use sassafras::sass::lexing::tokenize;
use sassafras::sass::token::Token;
use sassafras::CompileError;

fn kinds(source: &str) -> Vec<Token> {
    tokenize(source, "sample.scss")
        .expect("tokenize failed")
        .into_iter()
        .map(|(token, _)| token)
        .collect()
}

#[test]
fn test_rule_with_variable_and_units() {
    let tokens = kinds("$w: 10px;\na { width: $w; }");
    insta::assert_snapshot!(
        format!("{tokens:?}"),
        @r#"[Variable("w"), Colon, Whitespace, Number("10px"), Semicolon, Whitespace, Ident("a"), Whitespace, BraceOpen, Whitespace, Ident("width"), Colon, Whitespace, Variable("w"), Semicolon, Whitespace, BraceClose]"#
    );
}

#[test]
fn test_at_rules_and_interpolation() {
    let tokens = kinds("@mixin m { margin-#{$side}: 0; }");
    assert_eq!(tokens[0], Token::AtKeyword("mixin".to_string()));
    assert!(tokens.contains(&Token::InterpolationStart));
    assert!(tokens.contains(&Token::Variable("side".to_string())));
}

#[test]
fn test_selector_punctuation() {
    let tokens = kinds(".item > a:hover, #main ~ b");
    assert!(tokens.contains(&Token::Dot));
    assert!(tokens.contains(&Token::Gt));
    assert!(tokens.contains(&Token::Comma));
    assert!(tokens.contains(&Token::Hash("#main".to_string())));
    assert!(tokens.contains(&Token::Tilde));
}

#[test]
fn test_nested_comment_round_trips_as_single_token() {
    let tokens = kinds("/* outer /* inner */ done */");
    assert_eq!(
        tokens,
        vec![Token::Comment("/* outer /* inner */ done */".to_string())]
    );
}

#[test]
fn test_unterminated_string_fails_with_location() {
    let err = tokenize("a { content: \"broken", "frag.scss").unwrap_err();
    let CompileError::Syntax { file, message, position } = err else {
        panic!("expected syntax error");
    };
    assert_eq!(file, "frag.scss");
    assert_eq!(message, "unterminated string");
    assert_eq!((position.line, position.column), (0, 13));
}

#[test]
fn test_unterminated_comment_fails() {
    let err = tokenize("/* never", "frag.scss").unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"syntax error: unterminated comment at frag.scss:1:1"
    );
}

#[test]
fn test_spans_tile_the_buffer() {
    let source = "a, b { color: #fff; margin: 1px 2px; }";
    let tokens = tokenize(source, "sample.scss").unwrap();
    let mut end = 0;
    for (_, span) in &tokens {
        assert_eq!(span.start, end, "gap before {span:?}");
        end = span.end;
    }
    assert_eq!(end, source.len());
}
