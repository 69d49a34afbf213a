//! Header and row-shape scan over decoded text.
//!
//! The query engine is lenient about ragged rows, so shape errors are caught
//! here before a strategy runs.

use std::collections::BTreeSet;

use crate::error::{IngestError, Result};

/// Normalized header and data row count of a delimited text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub headers: Vec<String>,
    pub row_count: u64,
}

/// Trim a header cell and collapse inner whitespace.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    let mut parts = trimmed.split_whitespace();
    let mut normalized = String::new();
    if let Some(first) = parts.next() {
        normalized.push_str(first);
        for part in parts {
            normalized.push(' ');
            normalized.push_str(part);
        }
    }
    normalized
}

/// Scan `text` once, checking the header and every row's field count.
///
/// Blank lines are rejected. The tokenizer skips them while the query engine
/// reads them as all-null rows, so the two would disagree on the row count.
pub fn scan_shape(text: &str, delimiter: u8) -> Result<Shape> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let mut lines = LineCounter::new(&reader);
    let mut record = csv::StringRecord::new();

    if !read_record(&mut reader, &mut record, 0)? {
        return Err(IngestError::MissingHeader);
    }
    if lines.skipped_blank(&reader, &record) {
        return Err(IngestError::BlankLine { row: 0 });
    }
    let headers: Vec<String> = record.iter().map(normalize_header).collect();
    if headers.iter().all(String::is_empty) {
        return Err(IngestError::MissingHeader);
    }
    let mut seen = BTreeSet::new();
    for (position, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(IngestError::BlankHeader { position });
        }
        if !seen.insert(name.as_str()) {
            return Err(IngestError::DuplicateHeader {
                column: name.clone(),
            });
        }
    }

    let mut row_count = 0u64;
    loop {
        let row = row_count + 1;
        if !read_record(&mut reader, &mut record, row)? {
            break;
        }
        if lines.skipped_blank(&reader, &record) {
            return Err(IngestError::BlankLine { row });
        }
        if record.len() != headers.len() {
            return Err(IngestError::ColumnCountMismatch {
                row,
                expected: headers.len(),
                found: record.len(),
            });
        }
        row_count = row;
    }
    if has_trailing_blank_line(text) {
        return Err(IngestError::BlankLine { row: row_count + 1 });
    }

    Ok(Shape { headers, row_count })
}

fn read_record(
    reader: &mut csv::Reader<&[u8]>,
    record: &mut csv::StringRecord,
    row: u64,
) -> Result<bool> {
    reader.read_record(record).map_err(|e| IngestError::Csv {
        row,
        message: e.to_string(),
    })
}

/// Tracks the reader's line number between records.
///
/// A record consumes the newlines inside its quoted fields plus at most one
/// terminator. Anything beyond that was an empty line the tokenizer skipped.
struct LineCounter {
    line: u64,
}

impl LineCounter {
    fn new(reader: &csv::Reader<&[u8]>) -> Self {
        Self {
            line: reader.position().line(),
        }
    }

    fn skipped_blank(&mut self, reader: &csv::Reader<&[u8]>, record: &csv::StringRecord) -> bool {
        let line = reader.position().line();
        let consumed = line.saturating_sub(self.line);
        self.line = line;
        let quoted: u64 = record
            .iter()
            .map(|field| field.matches('\n').count() as u64)
            .sum();
        consumed > quoted + 1
    }
}

/// Empty lines after the last record. Only one terminator may end the text.
fn has_trailing_blank_line(text: &str) -> bool {
    let rest = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(text);
    rest.ends_with(['\n', '\r'])
}
