//! Compilation driver: the three entry modes and the phase machine.
//!
//! A compilation moves through `Idle -> Validating -> Parsing ->
//! Evaluating -> Formatting -> Done`, with `Failed` reachable from any
//! working phase. The entry modes are a tagged [`CompileRequest`]: string,
//! file, or directory, exactly one per invocation, exclusive by
//! construction rather than by runtime flag.
//!
//! Every invocation owns all of its state (file table, environment, partial
//! trees); nothing is shared across invocations, so concurrent callers are
//! safe as long as each brings its own request. Compilation is synchronous
//! and blocking throughout.
//!
//! Directory mode walks the source tree in sorted order and compiles
//! sequentially, so the first failure in traversal order is the one
//! reported, deterministically. Already-written outputs stay on disk; files
//! after the failing one are never started.

use std::fs;
use std::path::{Path, PathBuf};

use crate::sass::error::{CompileError, Result};
use crate::sass::eval::evaluate;
use crate::sass::format::format_document;
use crate::sass::options::{CompileOptions, EntryMode};
use crate::sass::parsing::{parse_file, parse_string, ParseSession};
use crate::sass::srcmap::SourceMapBuilder;

/// Display name used for string-mode inputs in errors, source comments, and
/// source maps.
const STRING_INPUT_NAME: &str = "source string";

/// Exactly one compilation mode per request.
#[derive(Debug)]
pub enum CompileRequest<'a> {
    String {
        source: &'a str,
    },
    File {
        path: &'a Path,
    },
    Directory {
        source_dir: &'a Path,
        output_dir: &'a Path,
    },
}

impl CompileRequest<'_> {
    fn mode(&self) -> EntryMode {
        match self {
            CompileRequest::String { .. } => EntryMode::String,
            CompileRequest::File { .. } => EntryMode::File,
            CompileRequest::Directory { .. } => EntryMode::Directory,
        }
    }
}

/// Result of a string- or file-mode compilation. Produced exactly once per
/// successful request, never for a failed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    pub css: String,
    pub source_map: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Validating,
    Parsing,
    Evaluating,
    Formatting,
    Done,
    Failed,
}

struct Compilation<'o> {
    options: &'o CompileOptions,
    phase: Phase,
}

impl<'o> Compilation<'o> {
    fn new(options: &'o CompileOptions) -> Self {
        Self {
            options,
            phase: Phase::Idle,
        }
    }

    fn step(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "compilation phase");
        self.phase = next;
    }

    fn run(mut self, request: CompileRequest<'_>) -> Result<Option<CompiledOutput>> {
        let result = self.execute(request);
        if result.is_err() {
            self.step(Phase::Failed);
        }
        result
    }

    fn execute(&mut self, request: CompileRequest<'_>) -> Result<Option<CompiledOutput>> {
        self.step(Phase::Validating);
        self.options.validate(request.mode())?;

        match request {
            CompileRequest::String { source } => {
                let output = self.compile_unit(UnitInput::Source(source))?;
                Ok(Some(output))
            }
            CompileRequest::File { path } => {
                let output = self.compile_unit(UnitInput::Path(path))?;
                Ok(Some(output))
            }
            CompileRequest::Directory {
                source_dir,
                output_dir,
            } => {
                self.compile_tree(source_dir, output_dir)?;
                Ok(None)
            }
        }
    }

    /// One parse, evaluate, format pass over a single input.
    fn compile_unit(&mut self, input: UnitInput<'_>) -> Result<CompiledOutput> {
        self.step(Phase::Parsing);
        let mut session = ParseSession::new(self.options);
        let sheet = match input {
            UnitInput::Source(source) => parse_string(
                source,
                STRING_INPUT_NAME,
                Path::new("."),
                &mut session,
            )?,
            UnitInput::Path(path) => parse_file(path, &mut session)?,
        };

        self.step(Phase::Evaluating);
        let document = evaluate(&sheet, &session.files, self.options)?;

        self.step(Phase::Formatting);
        let source_map = match (&input, &self.options.source_map_path) {
            (UnitInput::Path(path), Some(map_path)) => {
                let mut builder = SourceMapBuilder::new();
                let css = format_document(&document, self.options, &session.files, Some(&mut builder));
                let output_name = css_file_name(path);
                let map = builder.serialize(&output_name, &session.files);
                let css = append_map_reference(css, map_path);
                self.step(Phase::Done);
                return Ok(CompiledOutput {
                    css,
                    source_map: Some(map),
                });
            }
            _ => None,
        };

        let css = format_document(&document, self.options, &session.files, None);
        self.step(Phase::Done);
        Ok(CompiledOutput { css, source_map })
    }

    /// Directory mode: mirror the source tree into the output tree. Returns
    /// no text; success is the side effect having completed.
    fn compile_tree(&mut self, source_dir: &Path, output_dir: &Path) -> Result<()> {
        // Surface a missing source directory as an IO condition before any
        // compilation starts.
        let metadata = fs::metadata(source_dir)?;
        if !metadata.is_dir() {
            return Err(CompileError::Io(std::io::Error::other(format!(
                "'{}' is not a directory",
                source_dir.display()
            ))));
        }

        for entry in walkdir::WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(walk_error)?;
            if !entry.file_type().is_file() || !is_compilable(entry.path()) {
                continue;
            }
            let input = entry.path();
            let relative = input
                .strip_prefix(source_dir)
                .expect("walked entries live under the source dir");
            let output = output_dir.join(relative).with_extension("css");
            tracing::debug!(input = %input.display(), output = %output.display(), "compiling tree entry");

            let compiled = Compilation::new(self.options)
                .run(CompileRequest::File { path: input })
                .map_err(|source| CompileError::DirectoryEntry {
                    file: input.to_path_buf(),
                    source: Box::new(source),
                })?;
            let compiled = compiled.expect("file mode always yields output");

            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output, compiled.css)?;
        }
        self.step(Phase::Done);
        Ok(())
    }
}

enum UnitInput<'a> {
    Source(&'a str),
    Path(&'a Path),
}

/// Stylesheet files are compiled; `_partials` exist only to be imported.
fn is_compilable(path: &Path) -> bool {
    let is_scss = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("scss"));
    let is_partial = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'));
    is_scss && !is_partial
}

/// The CSS file name a map describes: the input with a `.css` extension.
fn css_file_name(input: &Path) -> String {
    input.with_extension("css").display().to_string()
}

/// The trailer pointing the browser at the map document.
fn append_map_reference(mut css: String, map_path: &Path) -> String {
    let reference = map_path.display().to_string().replace('\\', "/");
    if !css.ends_with('\n') {
        css.push('\n');
    }
    css.push_str(&format!("/*# sourceMappingURL={reference} */\n"));
    css
}

fn walk_error(error: walkdir::Error) -> CompileError {
    let message = error.to_string();
    CompileError::Io(
        error
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other(message)),
    )
}

/// Compile stylesheet source held in memory.
///
/// ```rust,ignore
/// let css = compile_string("a { b { color: blue; } }", &CompileOptions::default())?;
/// assert_eq!(css, "a b {\n  color: blue; }\n");
/// ```
pub fn compile_string(source: &str, options: &CompileOptions) -> Result<String> {
    let output = Compilation::new(options).run(CompileRequest::String { source })?;
    Ok(output.expect("string mode always yields output").css)
}

/// Compile a stylesheet file. Returns the CSS text and, when
/// `options.source_map_path` is set, the serialized source map.
pub fn compile_file(
    path: impl AsRef<Path>,
    options: &CompileOptions,
) -> Result<(String, Option<String>)> {
    let output = Compilation::new(options).run(CompileRequest::File {
        path: path.as_ref(),
    })?;
    let output = output.expect("file mode always yields output");
    Ok((output.css, output.source_map))
}

/// Compile every stylesheet under `source_dir`, mirroring the relative
/// structure into `output_dir`. Returns nothing on success; the first
/// failing file aborts the whole batch and is named in the error.
pub fn compile_directory(
    source_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &CompileOptions,
) -> Result<()> {
    let output = Compilation::new(options).run(CompileRequest::Directory {
        source_dir: source_dir.as_ref(),
        output_dir: output_dir.as_ref(),
    })?;
    debug_assert!(output.is_none());
    Ok(())
}
