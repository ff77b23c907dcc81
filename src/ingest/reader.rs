//! CSV decoding: bytes to a `DataFrame`.
//!
//! Handles quoted fields, escaped quotes, embedded separators and newlines,
//! and CRLF line endings. Non-UTF-8 input falls back to a Latin-1 read, as
//! the original upload path did.

use crate::error::{AppError, Result};
use crate::ingest::frame::DataFrame;

/// Check if a filename carries an accepted extension
pub fn allowed_file(filename: &str, allowed: &[&str]) -> bool {
    file_extension(filename)
        .map(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Lowercased extension of a filename, if any
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Decode bytes as UTF-8, falling back to Latin-1
pub fn decode_text(content: &[u8]) -> String {
    match std::str::from_utf8(content) {
        Ok(s) => s.to_string(),
        Err(_) => content.iter().map(|&b| b as char).collect(),
    }
}

/// Parse CSV text into a frame. The first record is the header; data rows are
/// padded or truncated to the header width. Empty cells become NULL.
pub fn parse_csv(text: &str) -> Result<DataFrame> {
    let mut records = split_records(text);
    if records.is_empty() {
        return Err(AppError::InvalidInput(
            "File is empty. No data to upload.".to_string(),
        ));
    }

    let header = records.remove(0);
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::InvalidInput(
            "File has no header row.".to_string(),
        ));
    }

    let width = header.len();
    let rows = records
        .into_iter()
        .filter(|fields| !(fields.len() == 1 && fields[0].is_empty()))
        .map(|mut fields| {
            fields.resize(width, String::new());
            fields.truncate(width);
            fields
                .into_iter()
                .map(|f| {
                    let trimmed = f.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect()
        })
        .collect();

    Ok(DataFrame::new(header, rows))
}

/// Split CSV text into records of raw fields, honoring quoting
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => record.push(std::mem::take(&mut field)),
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("data.csv", &["csv"]));
        assert!(allowed_file("DATA.CSV", &["csv"]));
        assert!(!allowed_file("data.xlsx", &["csv"]));
        assert!(!allowed_file("noextension", &["csv"]));
    }

    #[test]
    fn test_parse_simple_csv() {
        let frame = parse_csv("name,age\nalice,30\nbob,25\n").unwrap();
        assert_eq!(frame.columns, vec!["name", "age"]);
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.rows[0][0].as_deref(), Some("alice"));
        assert_eq!(frame.rows[1][1].as_deref(), Some("25"));
    }

    #[test]
    fn test_parse_quoted_fields() {
        let frame =
            parse_csv("name,notes\n\"Smith, John\",\"said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(frame.rows[0][0].as_deref(), Some("Smith, John"));
        assert_eq!(frame.rows[0][1].as_deref(), Some("said \"hi\""));
    }

    #[test]
    fn test_parse_embedded_newline_in_quotes() {
        let frame = parse_csv("a,b\n\"line1\nline2\",x\n").unwrap();
        assert_eq!(frame.n_rows(), 1);
        assert_eq!(frame.rows[0][0].as_deref(), Some("line1\nline2"));
    }

    #[test]
    fn test_parse_crlf_and_empty_cells() {
        let frame = parse_csv("a,b\r\n1,\r\n,2\r\n").unwrap();
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.rows[0][1], None);
        assert_eq!(frame.rows[1][0], None);
    }

    #[test]
    fn test_parse_ragged_rows_pad_and_truncate() {
        let frame = parse_csv("a,b,c\n1,2\n1,2,3,4\n").unwrap();
        assert_eq!(frame.rows[0], vec![Some("1".into()), Some("2".into()), None]);
        assert_eq!(frame.rows[1].len(), 3);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(parse_csv("").is_err());
    }

    #[test]
    fn test_header_only_yields_zero_rows() {
        let frame = parse_csv("a,b\n").unwrap();
        assert_eq!(frame.n_rows(), 0);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let bytes = vec![b'c', b'a', b'f', 0xe9]; // "café" in Latin-1
        assert_eq!(decode_text(&bytes), "café");
    }
}
