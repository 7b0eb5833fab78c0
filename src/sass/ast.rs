//! Syntax tree for parsed stylesheets.
//!
//! The tree is a strict ownership hierarchy: a [`Stylesheet`] owns its
//! items, rules own their bodies, and nothing is shared or cyclic. Every
//! node carries the [`SourceLocation`] where it started; locations refer to
//! files registered in the compilation's file table and are never mutated
//! after parsing.
//!
//! Selector, value, and condition text is stored as raw source slices
//! ([`RawExpr`]) rather than pre-parsed trees. Values are only turned into
//! [`Expr`] trees when the evaluator reaches them, after `#{...}`
//! interpolation has been substituted. This late binding is what lets
//! interpolation splice arbitrary text into selectors and properties
//! alike.

use crate::sass::location::SourceLocation;

/// A parsed stylesheet: the root of the ownership hierarchy.
///
/// `@import`ed files do not appear as nodes; their items are spliced in
/// place of the directive during parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub items: Vec<Item>,
}

impl Stylesheet {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}

/// One node in a stylesheet or rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Rule(Rule),
    Declaration(Declaration),
    VariableAssignment(VariableAssignment),
    /// A CSS-native `@import` left for the browser to resolve.
    CssImport(CssImport),
    MixinDefinition(MixinDefinition),
    MixinCall(MixinCall),
    If(IfDirective),
    For(ForDirective),
    Media(MediaRule),
    /// A loud `/* */` comment preserved into the output.
    Comment(Comment),
}

/// A raw expression slice: the text as written, plus where it started.
/// Evaluated lazily by the expression evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExpr {
    pub text: String,
    pub location: SourceLocation,
}

impl RawExpr {
    pub fn new(text: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            text: text.into(),
            location,
        }
    }
}

/// A nested rule: comma-separated selector alternatives and an ordered body.
/// Rules nest arbitrarily deep; resolving that nesting is the evaluator's
/// job, not the parser's.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// One entry per comma-separated alternative, raw text as written
    /// (may contain `&` and `#{...}`).
    pub selectors: Vec<String>,
    pub body: Vec<Item>,
    pub location: SourceLocation,
}

/// `property: value` inside a rule body.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Property name as written; may contain interpolation.
    pub property: String,
    pub value: RawExpr,
    pub important: bool,
    pub location: SourceLocation,
}

/// `$name: value;`, optionally guarded with `!default`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAssignment {
    pub name: String,
    pub value: RawExpr,
    pub default: bool,
    pub location: SourceLocation,
}

/// An `@import` the compiler does not resolve: quoted `.css` targets,
/// `url(...)` forms, and protocol-prefixed paths.
#[derive(Debug, Clone, PartialEq)]
pub struct CssImport {
    /// The argument text exactly as written, e.g. `url("theme.css")`.
    pub target: String,
    pub location: SourceLocation,
}

/// `@mixin name($param, $other: default) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct MixinDefinition {
    pub name: String,
    pub params: Vec<MixinParam>,
    pub body: Vec<Item>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixinParam {
    pub name: String,
    pub default: Option<RawExpr>,
}

/// `@include name(args...);`
#[derive(Debug, Clone, PartialEq)]
pub struct MixinCall {
    pub name: String,
    pub args: Vec<RawExpr>,
    pub location: SourceLocation,
}

/// `@if condition { ... } @else { ... }`. An `@else if` chain is
/// represented as an `else_body` holding a single nested `If`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfDirective {
    pub condition: RawExpr,
    pub then_body: Vec<Item>,
    pub else_body: Option<Vec<Item>>,
    pub location: SourceLocation,
}

/// `@for $i from A through B { ... }` (`to` makes the upper bound
/// exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct ForDirective {
    pub variable: String,
    pub from: RawExpr,
    pub to: RawExpr,
    pub inclusive: bool,
    pub body: Vec<Item>,
    pub location: SourceLocation,
}

/// `@media query { ... }`. Evaluated rules bubble to the top level.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRule {
    pub query: String,
    pub body: Vec<Item>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Full text including `/*` and `*/`.
    pub text: String,
    pub location: SourceLocation,
}

/// An expression tree, built from a [`RawExpr`]'s interpolated text at
/// evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number {
        value: f64,
        unit: String,
    },
    /// Hex color literal, already split into channels.
    Color {
        r: u8,
        g: u8,
        b: u8,
        a: f64,
    },
    Str {
        text: String,
        quoted: bool,
    },
    Ident(String),
    Variable {
        name: String,
    },
    /// Space- or comma-separated list of two or more expressions.
    List {
        items: Vec<Expr>,
        comma: bool,
    },
    Neg(Box<Expr>),
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Paren(Box<Expr>),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    /// Opaque text passed through untouched: `url(...)` and `calc(...)`
    /// bodies.
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// Whether this expression is "computed" rather than written literally.
    /// Decides the `/` contract: `10px/8px` stays literal CSS shorthand,
    /// while `$x/2` or `(10px/2)` divides.
    pub fn is_computed(&self) -> bool {
        matches!(
            self,
            Expr::Variable { .. }
                | Expr::FunctionCall { .. }
                | Expr::Paren(_)
                | Expr::BinOp { .. }
                | Expr::Neg(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sass::location::{FileId, Position, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), Position::new(0, 0))
    }

    #[test]
    fn test_computed_classification() {
        assert!(Expr::Variable {
            name: "x".to_string()
        }
        .is_computed());
        assert!(Expr::Paren(Box::new(Expr::Number {
            value: 1.0,
            unit: String::new()
        }))
        .is_computed());
        assert!(!Expr::Number {
            value: 10.0,
            unit: "px".to_string()
        }
        .is_computed());
        assert!(!Expr::Ident("solid".to_string()).is_computed());
    }

    #[test]
    fn test_tree_ownership_shape() {
        // A rule owning a nested rule owning a declaration: the defining
        // nesting feature, expressible with plain ownership.
        let inner = Rule {
            selectors: vec!["b".to_string()],
            body: vec![Item::Declaration(Declaration {
                property: "color".to_string(),
                value: RawExpr::new("blue", loc()),
                important: false,
                location: loc(),
            })],
            location: loc(),
        };
        let outer = Rule {
            selectors: vec!["a".to_string()],
            body: vec![Item::Rule(inner)],
            location: loc(),
        };
        let sheet = Stylesheet::new(vec![Item::Rule(outer)]);
        assert_eq!(sheet.items.len(), 1);
    }
}
