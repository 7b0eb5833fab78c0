//! # sassafras
//!
//! A compiler for SCSS-style stylesheets.
//!
//! Source text goes through a fixed pipeline: the lexer produces a token
//! stream, the parser builds a nested rule tree (splicing `@import`ed files
//! in place), the evaluator resolves variables, mixins, and selector nesting
//! into a flat CSS tree, and the formatter serializes that tree in one of
//! four output styles, optionally emitting a source map alongside.
//!
//! The three entry points mirror the three compilation modes:
//!
//! ```rust,ignore
//! use sassafras::{compile_string, CompileOptions};
//!
//! let css = compile_string("a { b { color: blue; } }", &CompileOptions::default())?;
//! assert_eq!(css, "a b {\n  color: blue; }\n");
//! ```
//!
//! See [`compile_file`] for single-file compilation with source maps, and
//! [`compile_directory`] for mirroring a whole stylesheet tree.

pub mod sass;

pub use sass::compiler::{compile_directory, compile_file, compile_string};
pub use sass::error::CompileError;
pub use sass::options::{CompileOptions, OutputStyle};
