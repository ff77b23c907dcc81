//! Column-oriented view of an uploaded file.
//!
//! Cells are kept as raw strings until insertion; types are inferred per
//! column by scanning the non-null values.

use chrono::{NaiveDate, NaiveDateTime};

/// Postgres column type inferred from source data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Date,
    Timestamp,
    Text,
}

impl ColumnType {
    /// SQL type used in the generated CREATE TABLE
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Parsed tabular data: header names plus rows of nullable cells
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    /// Iterate the non-null values of one column
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(idx).and_then(|c| c.as_deref()))
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Infer the narrowest type that fits every non-null value of a column.
///
/// Columns with no values at all fall back to TEXT.
fn infer_column_type(frame: &DataFrame, idx: usize) -> ColumnType {
    let mut saw_any = false;
    let mut all_int = true;
    let mut all_real = true;
    let mut all_bool = true;
    let mut all_date = true;
    let mut all_timestamp = true;

    for value in frame.column_values(idx) {
        saw_any = true;
        let v = value.trim();
        all_int = all_int && v.parse::<i64>().is_ok();
        all_real = all_real && v.parse::<f64>().is_ok();
        all_bool = all_bool && parse_bool(v).is_some();
        all_date = all_date && NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok();
        all_timestamp = all_timestamp && parse_timestamp(v).is_some();

        if !(all_int || all_real || all_bool || all_date || all_timestamp) {
            return ColumnType::Text;
        }
    }

    if !saw_any {
        return ColumnType::Text;
    }
    if all_bool {
        ColumnType::Boolean
    } else if all_int {
        ColumnType::Integer
    } else if all_real {
        ColumnType::Real
    } else if all_date {
        ColumnType::Date
    } else if all_timestamp {
        ColumnType::Timestamp
    } else {
        ColumnType::Text
    }
}

/// Infer a type for every column in the frame
pub fn infer_column_types(frame: &DataFrame) -> Vec<ColumnType> {
    (0..frame.n_cols())
        .map(|idx| infer_column_type(frame, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_infer_integer_and_real() {
        let frame = DataFrame::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![cell("1"), cell("1.5")],
                vec![cell("-3"), cell("2")],
                vec![None, cell("0.25")],
            ],
        );
        let types = infer_column_types(&frame);
        assert_eq!(types, vec![ColumnType::Integer, ColumnType::Real]);
    }

    #[test]
    fn test_infer_boolean_date_timestamp_text() {
        let frame = DataFrame::new(
            vec!["flag".into(), "day".into(), "at".into(), "note".into()],
            vec![
                vec![
                    cell("true"),
                    cell("2024-01-31"),
                    cell("2024-01-31 10:30:00"),
                    cell("hello"),
                ],
                vec![
                    cell("FALSE"),
                    cell("2023-12-01"),
                    cell("2023-12-01T08:00:00"),
                    cell("42 things"),
                ],
            ],
        );
        let types = infer_column_types(&frame);
        assert_eq!(
            types,
            vec![
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::Timestamp,
                ColumnType::Text,
            ]
        );
    }

    #[test]
    fn test_mixed_numeric_column_widens_to_real() {
        let frame = DataFrame::new(
            vec!["x".into()],
            vec![vec![cell("1")], vec![cell("2.5")]],
        );
        assert_eq!(infer_column_types(&frame), vec![ColumnType::Real]);
    }

    #[test]
    fn test_all_null_column_is_text() {
        let frame = DataFrame::new(vec!["x".into()], vec![vec![None], vec![None]]);
        assert_eq!(infer_column_types(&frame), vec![ColumnType::Text]);
    }
}
