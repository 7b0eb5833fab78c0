//! The resolved CSS document model.
//!
//! This is what the evaluator produces and what the formatter and the
//! source-map builder consume, walking it in lockstep: every node still
//! carries the [`SourceLocation`] of the construct it came from, which is
//! all the provenance either consumer needs. The tree is inert: no
//! variables, no nesting, no interpolation, just plain CSS with locations.

use crate::sass::location::SourceLocation;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CssDocument {
    pub items: Vec<CssItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CssItem {
    /// A preserved loud comment.
    Comment {
        text: String,
        location: SourceLocation,
    },
    /// A CSS-native `@import` passed through unresolved.
    Import {
        target: String,
        location: SourceLocation,
    },
    Rule(CssRule),
    Media(CssMedia),
}

/// A flat rule: selectors fully combined, declarations fully evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CssRule {
    pub selectors: Vec<String>,
    /// How many ancestor rules the source construct was nested under;
    /// drives indentation in the nested output style.
    pub depth: usize,
    pub decls: Vec<CssDecl>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssDecl {
    pub property: String,
    pub value: String,
    pub important: bool,
    pub location: SourceLocation,
}

impl CssDecl {
    /// `value` plus the `!important` marker when set.
    pub fn rendered_value(&self) -> String {
        if self.important {
            format!("{} !important", self.value)
        } else {
            self.value.clone()
        }
    }
}

/// A media block bubbled to the top level, with its resolved inner rules.
#[derive(Debug, Clone, PartialEq)]
pub struct CssMedia {
    pub query: String,
    pub items: Vec<CssItem>,
    pub location: SourceLocation,
}
