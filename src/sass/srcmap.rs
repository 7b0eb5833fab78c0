//! Source map recording and serialization.
//!
//! The formatter reports a mapping entry for every output fragment that
//! corresponds to an input location (rule selectors and declarations), in
//! emission order. This module accumulates those entries and serializes the
//! standard Source Map v3 JSON document: delta-encoded base64 VLQ segments,
//! one group per generated line.
//!
//! Source paths are written with forward slashes regardless of what the
//! host uses: the document's consumers parse them as URLs, so this
//! normalization is part of the format, not a cosmetic choice. Everywhere
//! else in the compiler paths stay host-native.

use serde::Serialize;

use crate::sass::location::{FileTable, SourceLocation};

/// One recorded mapping: generated position to original position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: usize,
    pub generated_column: usize,
    pub location: SourceLocation,
}

/// Accumulates mappings while the formatter emits, then serializes.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, generated_line: usize, generated_column: usize, location: SourceLocation) {
        self.mappings.push(Mapping {
            generated_line,
            generated_column,
            location,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Serialize the v3 document. `output_file` is the CSS file the map
    /// describes, as it should appear in the `file` field.
    pub fn serialize(&self, output_file: &str, files: &FileTable) -> String {
        let document = SourceMapDocument {
            version: 3,
            file: normalize_slashes(output_file),
            sources: files.paths().iter().map(|p| normalize_slashes(p)).collect(),
            names: Vec::new(),
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&document).expect("source map document serializes")
    }

    fn encode_mappings(&self) -> String {
        let mut encoded = String::new();
        let mut current_line = 0usize;
        let mut prev_generated_column = 0i64;
        let mut prev_source = 0i64;
        let mut prev_original_line = 0i64;
        let mut prev_original_column = 0i64;
        let mut first_in_line = true;

        for mapping in &self.mappings {
            while current_line < mapping.generated_line {
                encoded.push(';');
                current_line += 1;
                prev_generated_column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                encoded.push(',');
            }
            first_in_line = false;

            let generated_column = mapping.generated_column as i64;
            let source = mapping.location.file.index() as i64;
            let original_line = mapping.location.line() as i64;
            let original_column = mapping.location.column() as i64;

            encode_vlq(generated_column - prev_generated_column, &mut encoded);
            encode_vlq(source - prev_source, &mut encoded);
            encode_vlq(original_line - prev_original_line, &mut encoded);
            encode_vlq(original_column - prev_original_column, &mut encoded);

            prev_generated_column = generated_column;
            prev_source = source;
            prev_original_line = original_line;
            prev_original_column = original_column;
        }
        encoded
    }
}

#[derive(Serialize)]
struct SourceMapDocument {
    version: u32,
    file: String,
    sources: Vec<String>,
    names: Vec<String>,
    mappings: String,
}

fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Base64 VLQ: sign bit in the lowest position, 5 data bits per character,
/// bit 6 marks continuation.
fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}
