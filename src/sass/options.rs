//! Typed compilation options.
//!
//! The option surface is a plain struct with named fields: unknown option
//! names and wrong types are unrepresentable by construction, so the only
//! validation left to do at runtime is cross-field and per-mode consistency.
//! Validation runs before any parsing work starts; a bad combination never
//! reaches the lexer.

use std::fmt;
use std::path::PathBuf;

use crate::sass::error::{CompileError, Result};

/// Formatting preset controlling whitespace and layout of emitted CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    /// Indented to mirror source nesting; closing brace hugs the last
    /// declaration.
    #[default]
    Nested,
    /// One declaration per line, closing brace on its own line.
    Expanded,
    /// One line per rule.
    Compact,
    /// No whitespace at all.
    Compressed,
}

impl OutputStyle {
    pub const ALL: [OutputStyle; 4] = [
        OutputStyle::Nested,
        OutputStyle::Expanded,
        OutputStyle::Compact,
        OutputStyle::Compressed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputStyle::Nested => "nested",
            OutputStyle::Expanded => "expanded",
            OutputStyle::Compact => "compact",
            OutputStyle::Compressed => "compressed",
        }
    }

    /// Parse a style name, listing the valid choices on failure.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.name() == name)
            .ok_or_else(|| {
                let valid = Self::ALL.map(|s| s.name()).join(", ");
                CompileError::validation(format!(
                    "'{name}' is an unsupported output style; choose one of {valid}"
                ))
            })
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which entry mode a compilation request uses. Only used for validation
/// messages; mode exclusivity itself is guaranteed by the driver's request
/// enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    String,
    File,
    Directory,
}

impl EntryMode {
    pub fn name(self) -> &'static str {
        match self {
            EntryMode::String => "string",
            EntryMode::File => "file",
            EntryMode::Directory => "directory",
        }
    }
}

/// Options accepted by every compilation entry point.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output formatting preset. Default: nested.
    pub output_style: OutputStyle,
    /// Emit a `/* line N, FILE */` comment before each rule. Default: off.
    /// Forced on when a source map is requested.
    pub source_comments: bool,
    /// Where to write the source map. Only legal in file mode.
    pub source_map_path: Option<PathBuf>,
    /// Directories searched for `@import`s after the importing file's own
    /// directory. Order matters: first match wins.
    pub include_paths: Vec<PathBuf>,
    /// Base path joined by the `image-url()` function. Default: `.`.
    pub image_path: PathBuf,
    /// Decimal digits kept when numbers are stringified. Default: 5.
    pub precision: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output_style: OutputStyle::Nested,
            source_comments: false,
            source_map_path: None,
            include_paths: Vec::new(),
            image_path: PathBuf::from("."),
            precision: 5,
        }
    }
}

impl CompileOptions {
    /// Check per-mode consistency. Fails fast: called by the driver before
    /// any file is opened or any token produced.
    pub fn validate(&self, mode: EntryMode) -> Result<()> {
        if self.source_map_path.is_some() && mode != EntryMode::File {
            return Err(CompileError::validation(format!(
                "source_map_path is only available in file mode since the map must \
                 reference its input file; it cannot be used in {} mode",
                mode.name()
            )));
        }
        Ok(())
    }

    /// Whether provenance comments should be emitted. A requested source
    /// map forces them on: comments and maps share the same provenance
    /// tracking.
    pub fn effective_source_comments(&self) -> bool {
        self.source_comments || self.source_map_path.is_some()
    }
}
