//! The stylesheet compiler pipeline.
//!
//! Modules are laid out in pipeline order:
//!
//! - [`token`] / [`lexing`]: raw text to `(Token, Span)` pairs.
//! - [`location`]: file ids and byte-offset to line/column conversion.
//! - [`ast`] / [`parsing`]: token stream to a nested syntax tree, with
//!   `@import` resolution spliced in during the parse.
//! - [`value`] / [`eval`]: syntax tree to a flat, inert CSS tree; all
//!   variables, mixins, control directives, and selector nesting are
//!   resolved here.
//! - [`css`]: the resolved CSS tree shared by the formatter and the
//!   source-map builder.
//! - [`format`] / [`srcmap`]: CSS text in one of four styles, plus the
//!   optional source-map document.
//! - [`options`] / [`error`] / [`compiler`]: the public surface: typed
//!   options, the error taxonomy, and the three-mode driver.

pub mod ast;
pub mod compiler;
pub mod css;
pub mod error;
pub mod eval;
pub mod format;
pub mod lexing;
pub mod location;
pub mod options;
pub mod parsing;
pub mod srcmap;
pub mod token;
pub mod value;
