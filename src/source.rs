//! Row source: turns a CSV/TSV export of the household sheet into raw rows.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::core::{Cell, RawRow};
use crate::error::SourceError;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";
const DELIMITER_CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_SAMPLE_LINES: usize = 20;

/// Reads an export, sniffing the delimiter unless one is given.
pub fn read_rows(path: &Path, delimiter: Option<u8>) -> Result<Vec<RawRow>, SourceError> {
    let content = decode_export(fs::read(path)?);
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    debug!(path = %path.display(), delimiter = %(delimiter as char), "reading sheet export");
    rows_from_reader(content.as_bytes(), delimiter)
}

/// UTF-8 first; older spreadsheet exports of Traditional Chinese sheets are Big5.
fn decode_export(bytes: Vec<u8>) -> String {
    let bytes = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let bytes = err.into_bytes();
            let (text, _, had_errors) = encoding_rs::BIG5.decode(&bytes);
            debug!(had_errors, "export is not UTF-8, decoded as Big5");
            text.into_owned()
        }
    }
}

pub fn rows_from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Vec<RawRow>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::text).collect::<RawRow>());
    }
    Ok(rows)
}

/// Picks the candidate delimiter that splits the most sample lines into more
/// than one field. Single-cell lines such as sheet titles count for nobody.
/// Ties go to the earlier candidate; no split at all means comma.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_SAMPLE_LINES)
        .collect();

    let mut best = (b',', 0);
    for delim in DELIMITER_CANDIDATES {
        let split_lines = sample
            .iter()
            .filter(|line| field_count(line, delim) > 1)
            .count();
        if split_lines > best.1 {
            best = (delim, split_lines);
        }
    }
    best.0
}

fn field_count(line: &str, delimiter: u8) -> usize {
    let mut record = csv::ByteRecord::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.read_byte_record(&mut record) {
        Ok(true) => record.len(),
        _ => 1,
    }
}
