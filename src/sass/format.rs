//! Formatter: resolved CSS tree to output text.
//!
//! A pure function of (tree, style). The four styles only differ in
//! whitespace and layout, never in content or ordering. The formatter
//! writes through a cursor that tracks the generated line and column, and
//! reports a mapping to the source-map builder at every rule selector and
//! declaration it emits; that is the "lockstep" the map relies on.
//!
//! Source comments (`/* line N, FILE */`) precede each rule in every style
//! except compressed: compressed's own contract is "no whitespace, minimal
//! bytes", so a requested comment is suppressed there rather than
//! violating the style.

use crate::sass::css::{CssDocument, CssItem, CssMedia, CssRule};
use crate::sass::location::{FileTable, SourceLocation};
use crate::sass::options::{CompileOptions, OutputStyle};
use crate::sass::srcmap::SourceMapBuilder;

/// Render `doc` in the configured style. When `map` is given, every
/// selector and declaration emission records a mapping.
pub fn format_document(
    doc: &CssDocument,
    options: &CompileOptions,
    files: &FileTable,
    map: Option<&mut SourceMapBuilder>,
) -> String {
    let style = options.output_style;
    let mut formatter = Formatter {
        style,
        // Compressed suppresses comments even when requested.
        source_comments: options.effective_source_comments() && style != OutputStyle::Compressed,
        files,
        out: String::new(),
        line: 0,
        column: 0,
        map,
    };
    formatter.items(&doc.items, 0);
    formatter.finish()
}

struct Formatter<'a> {
    style: OutputStyle,
    source_comments: bool,
    files: &'a FileTable,
    out: String,
    line: usize,
    column: usize,
    map: Option<&'a mut SourceMapBuilder>,
}

impl<'a> Formatter<'a> {
    fn write(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(text);
    }

    fn mark(&mut self, location: SourceLocation) {
        if let Some(map) = self.map.as_deref_mut() {
            map.record(self.line, self.column, location);
        }
    }

    fn finish(mut self) -> String {
        if self.style == OutputStyle::Compressed && !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out
    }

    fn items(&mut self, items: &[CssItem], base: usize) {
        for (i, item) in items.iter().enumerate() {
            if self.style == OutputStyle::Expanded && i > 0 {
                self.write("\n");
            }
            self.item(item, base);
        }
    }

    fn item(&mut self, item: &CssItem, base: usize) {
        match item {
            CssItem::Comment { text, .. } => self.comment(text, base),
            CssItem::Import { target, .. } => self.import(target),
            CssItem::Rule(rule) => self.rule(rule, base, true),
            CssItem::Media(media) => self.media(media, base),
        }
    }

    fn comment(&mut self, text: &str, base: usize) {
        if self.style == OutputStyle::Compressed {
            return;
        }
        let indent = "  ".repeat(base);
        self.write(&indent);
        self.write(text);
        self.write("\n");
    }

    fn import(&mut self, target: &str) {
        match self.style {
            OutputStyle::Compressed => self.write(&format!("@import {target};")),
            _ => self.write(&format!("@import {target};\n")),
        }
    }

    fn source_comment(&mut self, location: SourceLocation, indent: &str) {
        if !self.source_comments {
            return;
        }
        let file = self.files.path(location.file).to_string();
        self.write(indent);
        self.write(&format!("/* line {}, {} */\n", location.line() + 1, file));
    }

    /// `trailing_newline` is only false when a compact rule is inlined
    /// inside a media block.
    fn rule(&mut self, rule: &CssRule, base: usize, trailing_newline: bool) {
        match self.style {
            OutputStyle::Nested => {
                let indent = "  ".repeat(base + rule.depth);
                self.source_comment(rule.location, &indent);
                self.write(&indent);
                self.mark(rule.location);
                self.write(&rule.selectors.join(", "));
                self.write(" {");
                for decl in &rule.decls {
                    self.write("\n");
                    self.write(&indent);
                    self.write("  ");
                    self.mark(decl.location);
                    self.write(&format!("{}: {};", decl.property, decl.rendered_value()));
                }
                self.write(" }\n");
            }
            OutputStyle::Expanded => {
                let indent = "  ".repeat(base);
                self.source_comment(rule.location, &indent);
                self.write(&indent);
                self.mark(rule.location);
                self.write(&rule.selectors.join(", "));
                self.write(" {\n");
                for decl in &rule.decls {
                    self.write(&indent);
                    self.write("  ");
                    self.mark(decl.location);
                    self.write(&format!("{}: {};\n", decl.property, decl.rendered_value()));
                }
                self.write(&indent);
                self.write("}\n");
            }
            OutputStyle::Compact => {
                self.source_comment(rule.location, "");
                self.mark(rule.location);
                self.write(&rule.selectors.join(", "));
                self.write(" { ");
                for decl in &rule.decls {
                    self.mark(decl.location);
                    self.write(&format!("{}: {}; ", decl.property, decl.rendered_value()));
                }
                self.write("}");
                if trailing_newline {
                    self.write("\n");
                }
            }
            OutputStyle::Compressed => {
                self.mark(rule.location);
                self.write(&rule.selectors.join(","));
                self.write("{");
                let decls = rule
                    .decls
                    .iter()
                    .map(|decl| {
                        let value = if decl.important {
                            format!("{} !important", decl.value)
                        } else {
                            decl.value.clone()
                        };
                        format!("{}:{}", decl.property, value)
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                self.write(&decls);
                self.write("}");
            }
        }
    }

    fn media(&mut self, media: &CssMedia, base: usize) {
        match self.style {
            OutputStyle::Nested => {
                let indent = "  ".repeat(base);
                self.write(&indent);
                self.mark(media.location);
                self.write(&format!("@media {} {{\n", media.query));
                self.items(&media.items, base + 1);
                // The closing brace hugs the last inner line.
                if self.out.ends_with('\n') {
                    self.out.pop();
                    let start = self.out.rfind('\n').map_or(0, |i| i + 1);
                    self.column = self.out[start..].chars().count();
                    self.line -= 1;
                }
                self.write(" }\n");
            }
            OutputStyle::Expanded => {
                let indent = "  ".repeat(base);
                self.write(&indent);
                self.mark(media.location);
                self.write(&format!("@media {} {{\n", media.query));
                self.items(&media.items, base + 1);
                self.write(&indent);
                self.write("}\n");
            }
            OutputStyle::Compact => {
                self.mark(media.location);
                self.write(&format!("@media {} {{ ", media.query));
                for item in &media.items {
                    match item {
                        CssItem::Rule(rule) => {
                            self.rule(rule, 0, false);
                            self.write(" ");
                        }
                        other => self.item(other, 0),
                    }
                }
                self.write("}\n");
            }
            OutputStyle::Compressed => {
                self.mark(media.location);
                self.write(&format!("@media {}{{", media.query));
                self.items(&media.items, 0);
                self.write("}");
            }
        }
    }
}
