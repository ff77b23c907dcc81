//! Optional cleaning passes applied between parsing and storage.
//!
//! Mirrors the upload form's cleaning flags: each enabled pass transforms the
//! frame and appends a line to the report returned to the caller.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::db::sanitize_column_name;
use crate::ingest::frame::DataFrame;

/// Cleaning passes requested with an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningOptions {
    pub remove_duplicates: bool,
    pub fill_missing_values: bool,
    pub remove_empty_rows: bool,
    pub remove_empty_columns: bool,
    pub clean_text: bool,
    pub standardize_column_names: bool,
    pub remove_outliers: bool,
    pub iqr_multiplier: f64,
    pub normalize_numeric: bool,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            fill_missing_values: true,
            remove_empty_rows: true,
            remove_empty_columns: true,
            clean_text: true,
            standardize_column_names: true,
            remove_outliers: false,
            iqr_multiplier: 1.5,
            normalize_numeric: false,
        }
    }
}

/// What the cleaning pass did, returned alongside the upload response
#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub original_shape: (usize, usize),
    pub final_shape: (usize, usize),
    pub operations: Vec<String>,
}

/// Run the enabled cleaning passes over a frame
pub fn clean_frame(mut frame: DataFrame, options: &CleaningOptions) -> (DataFrame, CleaningReport) {
    let original_shape = frame.shape();
    let mut operations = Vec::new();

    if options.remove_empty_rows {
        let before = frame.n_rows();
        frame.rows.retain(|row| row.iter().any(|c| c.is_some()));
        let dropped = before - frame.n_rows();
        if dropped > 0 {
            operations.push(format!("Removed {dropped} completely empty rows"));
        }
    }

    if options.remove_empty_columns {
        let keep: Vec<bool> = (0..frame.n_cols())
            .map(|idx| frame.column_values(idx).next().is_some())
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            frame = retain_columns(frame, &keep);
            operations.push(format!("Removed {dropped} completely empty columns"));
        }
    }

    if options.remove_duplicates {
        let before = frame.n_rows();
        let mut seen = HashSet::new();
        frame.rows.retain(|row| seen.insert(row.clone()));
        let dropped = before - frame.n_rows();
        if dropped > 0 {
            operations.push(format!("Removed {dropped} duplicate rows"));
        }
    }

    if options.standardize_column_names {
        frame.columns = frame
            .columns
            .iter()
            .map(|c| sanitize_column_name(c))
            .collect();
        operations.push("Standardized column names".to_string());
    }

    if options.fill_missing_values {
        let filled = fill_missing(&mut frame);
        if filled > 0 {
            operations.push(format!(
                "Handled {filled} missing values (numeric: median, text: mode/Unknown)"
            ));
        }
    }

    if options.clean_text {
        let cleaned = clean_text_columns(&mut frame);
        if cleaned > 0 {
            operations.push(format!(
                "Cleaned {cleaned} text columns (trimmed whitespace, collapsed spaces)"
            ));
        }
    }

    if options.remove_outliers {
        let before = frame.n_rows();
        remove_outliers(&mut frame, options.iqr_multiplier);
        let dropped = before - frame.n_rows();
        if dropped > 0 {
            operations.push(format!(
                "Removed {dropped} outlier rows using IQR method (multiplier: {})",
                options.iqr_multiplier
            ));
        }
    }

    if options.normalize_numeric {
        let normalized = normalize_numeric(&mut frame);
        if normalized > 0 {
            operations.push(format!(
                "Normalized {normalized} numeric columns to 0-1 range"
            ));
        }
    }

    let report = CleaningReport {
        original_shape,
        final_shape: frame.shape(),
        operations,
    };
    (frame, report)
}

fn retain_columns(frame: DataFrame, keep: &[bool]) -> DataFrame {
    let columns = frame
        .columns
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(c, _)| c)
        .collect();
    let rows = frame
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(c, _)| c)
                .collect()
        })
        .collect();
    DataFrame::new(columns, rows)
}

/// True when every non-null value of a column parses as a number
fn is_numeric_column(frame: &DataFrame, idx: usize) -> bool {
    let mut saw_any = false;
    for v in frame.column_values(idx) {
        saw_any = true;
        if v.trim().parse::<f64>().is_err() {
            return false;
        }
    }
    saw_any
}

fn numeric_values(frame: &DataFrame, idx: usize) -> Vec<f64> {
    frame
        .column_values(idx)
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn clean_text_columns(frame: &mut DataFrame) -> usize {
    let mut cleaned = 0;
    for idx in 0..frame.n_cols() {
        if is_numeric_column(frame, idx) {
            continue;
        }
        cleaned += 1;
        for row in frame.rows.iter_mut() {
            if let Some(cell) = row.get_mut(idx) {
                if let Some(value) = cell.take() {
                    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
                    match collapsed.as_str() {
                        "" | "nan" | "None" | "NULL" => {}
                        _ => *cell = Some(collapsed),
                    }
                }
            }
        }
    }
    cleaned
}

fn fill_missing(frame: &mut DataFrame) -> usize {
    let mut filled = 0;
    for idx in 0..frame.n_cols() {
        let missing = frame
            .rows
            .iter()
            .filter(|row| row.get(idx).map(|c| c.is_none()).unwrap_or(false))
            .count();
        if missing == 0 {
            continue;
        }

        let fill_value = if is_numeric_column(frame, idx) {
            let mut values = numeric_values(frame, idx);
            values.sort_by(|a, b| a.total_cmp(b));
            median(&values).map(|m| format!("{m}"))
        } else {
            // mode of the column, Unknown when the column has no values
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in frame.column_values(idx) {
                *counts.entry(v).or_default() += 1;
            }
            Some(
                counts
                    .into_iter()
                    .max_by_key(|(_, n)| *n)
                    .map(|(v, _)| v.to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
            )
        };

        let Some(fill_value) = fill_value else {
            continue;
        };
        for row in frame.rows.iter_mut() {
            if let Some(cell) = row.get_mut(idx) {
                if cell.is_none() {
                    *cell = Some(fill_value.clone());
                    filled += 1;
                }
            }
        }
    }
    filled
}

fn remove_outliers(frame: &mut DataFrame, multiplier: f64) {
    let numeric_cols: Vec<usize> =
        (0..frame.n_cols()).filter(|&i| is_numeric_column(frame, i)).collect();

    let mut bounds = Vec::new();
    for &idx in &numeric_cols {
        let mut values = numeric_values(frame, idx);
        if values.len() < 4 {
            continue;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let q1 = values[values.len() / 4];
        let q3 = values[(values.len() * 3) / 4];
        let iqr = q3 - q1;
        bounds.push((idx, q1 - multiplier * iqr, q3 + multiplier * iqr));
    }

    frame.rows.retain(|row| {
        bounds.iter().all(|&(idx, lo, hi)| {
            match row.get(idx).and_then(|c| c.as_deref()) {
                Some(v) => match v.trim().parse::<f64>() {
                    Ok(n) => n >= lo && n <= hi,
                    Err(_) => true,
                },
                None => true,
            }
        })
    });
}

fn normalize_numeric(frame: &mut DataFrame) -> usize {
    let mut normalized = 0;
    for idx in 0..frame.n_cols() {
        if !is_numeric_column(frame, idx) {
            continue;
        }
        let values = numeric_values(frame, idx);
        let (Some(min), Some(max)) = (
            values.iter().copied().min_by(|a, b| a.total_cmp(b)),
            values.iter().copied().max_by(|a, b| a.total_cmp(b)),
        ) else {
            continue;
        };
        if (max - min).abs() < f64::EPSILON {
            continue;
        }
        normalized += 1;
        for row in frame.rows.iter_mut() {
            if let Some(cell) = row.get_mut(idx) {
                if let Some(v) = cell.as_deref().and_then(|v| v.trim().parse::<f64>().ok()) {
                    *cell = Some(format!("{}", (v - min) / (max - min)));
                }
            }
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_remove_empty_rows_and_columns() {
        let frame = DataFrame::new(
            vec!["a".into(), "b".into(), "empty".into()],
            vec![
                vec![cell("1"), cell("x"), None],
                vec![None, None, None],
                vec![cell("2"), cell("y"), None],
            ],
        );
        let options = CleaningOptions {
            remove_duplicates: false,
            fill_missing_values: false,
            clean_text: false,
            standardize_column_names: false,
            ..CleaningOptions::default()
        };
        let (cleaned, report) = clean_frame(frame, &options);
        assert_eq!(cleaned.shape(), (2, 2));
        assert_eq!(cleaned.columns, vec!["a", "b"]);
        assert_eq!(report.original_shape, (3, 3));
        assert_eq!(report.operations.len(), 2);
    }

    #[test]
    fn test_remove_duplicates() {
        let frame = DataFrame::new(
            vec!["a".into()],
            vec![vec![cell("1")], vec![cell("1")], vec![cell("2")]],
        );
        let options = CleaningOptions {
            fill_missing_values: false,
            clean_text: false,
            standardize_column_names: false,
            ..CleaningOptions::default()
        };
        let (cleaned, _) = clean_frame(frame, &options);
        assert_eq!(cleaned.n_rows(), 2);
    }

    #[test]
    fn test_standardize_column_names() {
        let frame = DataFrame::new(
            vec!["First Name".into(), "2024 Sales".into()],
            vec![vec![cell("a"), cell("1")]],
        );
        let (cleaned, _) = clean_frame(frame, &CleaningOptions::default());
        assert_eq!(cleaned.columns, vec!["first_name", "col_2024_sales"]);
    }

    #[test]
    fn test_fill_missing_numeric_with_median() {
        // The all-null row must survive to the fill pass, so the empty-row
        // pass stays off here
        let frame = DataFrame::new(
            vec!["x".into()],
            vec![vec![cell("1")], vec![cell("3")], vec![None], vec![cell("5")]],
        );
        let options = CleaningOptions {
            remove_duplicates: false,
            remove_empty_rows: false,
            clean_text: false,
            standardize_column_names: false,
            ..CleaningOptions::default()
        };
        let (cleaned, _) = clean_frame(frame, &options);
        assert_eq!(cleaned.n_rows(), 4);
        assert_eq!(cleaned.rows[2][0].as_deref(), Some("3"));
    }

    #[test]
    fn test_fill_missing_text_with_mode() {
        let frame = DataFrame::new(
            vec!["city".into()],
            vec![
                vec![cell("Oslo")],
                vec![cell("Oslo")],
                vec![cell("Bergen")],
                vec![None],
            ],
        );
        let options = CleaningOptions {
            remove_duplicates: false,
            remove_empty_rows: false,
            clean_text: false,
            standardize_column_names: false,
            ..CleaningOptions::default()
        };
        let (cleaned, _) = clean_frame(frame, &options);
        assert_eq!(cleaned.n_rows(), 4);
        assert_eq!(cleaned.rows[3][0].as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_fill_runs_before_text_cleaning() {
        // Missing cells are filled from the raw values, then the sentinel is
        // nullified; the fill never picks up a post-cleaning artifact
        let frame = DataFrame::new(
            vec!["city".into()],
            vec![
                vec![cell("Oslo")],
                vec![cell("Oslo")],
                vec![cell("NULL")],
                vec![None],
            ],
        );
        let options = CleaningOptions {
            remove_duplicates: false,
            remove_empty_rows: false,
            standardize_column_names: false,
            ..CleaningOptions::default()
        };
        let (cleaned, _) = clean_frame(frame, &options);
        assert_eq!(cleaned.rows[2][0], None);
        assert_eq!(cleaned.rows[3][0].as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_clean_text_nullifies_sentinels() {
        let frame = DataFrame::new(
            vec!["note".into()],
            vec![vec![cell("  hello   world ")], vec![cell("NULL")]],
        );
        let options = CleaningOptions {
            remove_duplicates: false,
            fill_missing_values: false,
            standardize_column_names: false,
            remove_empty_rows: false,
            ..CleaningOptions::default()
        };
        let (cleaned, _) = clean_frame(frame, &options);
        assert_eq!(cleaned.rows[0][0].as_deref(), Some("hello world"));
        assert_eq!(cleaned.rows[1][0], None);
    }

    #[test]
    fn test_outlier_removal() {
        let mut rows: Vec<Vec<Option<String>>> =
            (1..=10).map(|i| vec![cell(&i.to_string())]).collect();
        rows.push(vec![cell("1000")]);
        let frame = DataFrame::new(vec!["x".into()], rows);
        let options = CleaningOptions {
            remove_duplicates: false,
            fill_missing_values: false,
            clean_text: false,
            standardize_column_names: false,
            remove_outliers: true,
            ..CleaningOptions::default()
        };
        let (cleaned, report) = clean_frame(frame, &options);
        assert_eq!(cleaned.n_rows(), 10);
        assert!(report
            .operations
            .iter()
            .any(|op| op.contains("outlier")));
    }

    #[test]
    fn test_cleaning_everything_away_leaves_empty_frame() {
        let frame = DataFrame::new(
            vec!["a".into()],
            vec![vec![None], vec![None]],
        );
        let (cleaned, _) = clean_frame(frame, &CleaningOptions::default());
        assert!(cleaned.is_empty());
    }
}
