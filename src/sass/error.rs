//! The compiler's error taxonomy.
//!
//! One public enum covers every way a compilation can fail. All variants are
//! fatal to the compilation unit that raised them: the pipeline never
//! recovers, retries, or produces partial results. The driver maps nothing;
//! internal code constructs these variants directly and they propagate with
//! `?` to the public boundary.
//!
//! `Io` is kept distinct from the stylesheet-level variants so callers can
//! tell "bad input file" apart from "bad stylesheet".

use std::path::PathBuf;

use thiserror::Error;

use crate::sass::location::Position;

/// Everything `compile_string`, `compile_file`, and `compile_directory` can
/// fail with.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Bad options, caught before any compilation work starts.
    #[error("invalid options: {message}")]
    Validation { message: String },

    /// Lexing or parsing failure, with the offending location.
    #[error("syntax error: {message} at {file}:{position}")]
    Syntax {
        file: String,
        position: Position,
        message: String,
    },

    /// `@import` target not found on any search path.
    #[error("cannot find '{path}' to import; searched {}", format_search_list(.searched))]
    ImportNotFound { path: String, searched: Vec<PathBuf> },

    /// `@import` chain loops back into a file still being parsed.
    #[error("import cycle detected: {}", .chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },

    /// A `$variable` reference that no scope binds.
    #[error("undefined variable ${name} at {file}:{position}")]
    UndefinedVariable {
        name: String,
        file: String,
        position: Position,
    },

    /// An `@include` of a mixin that was never defined.
    #[error("undefined mixin '{name}' at {file}:{position}")]
    UndefinedMixin {
        name: String,
        file: String,
        position: Position,
    },

    /// Value-level evaluation failure: incompatible units, bad function
    /// arguments, non-numeric loop bounds.
    #[error("{message} at {file}:{position}")]
    Eval {
        message: String,
        file: String,
        position: Position,
    },

    /// Missing or unreadable input, or unwritable output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory mode: the batch stopped because one file failed.
    #[error("failed to compile '{}': {source}", .file.display())]
    DirectoryEntry {
        file: PathBuf,
        #[source]
        source: Box<CompileError>,
    },
}

fn format_search_list(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "no directories".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CompileError {
    pub fn validation(message: impl Into<String>) -> Self {
        CompileError::Validation {
            message: message.into(),
        }
    }

    pub fn syntax(file: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            file: file.into(),
            position,
            message: message.into(),
        }
    }

    pub fn eval(file: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
        CompileError::Eval {
            message: message.into(),
            file: file.into(),
            position,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CompileError>;
