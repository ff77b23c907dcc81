//! Storage of parsed frames: runtime DDL plus chunked, typed bulk inserts.

use chrono::NaiveDate;
use sqlx::{postgres::PgArguments, query::Query, PgPool, Postgres};

use crate::constants::{INSERT_CHUNK_ROWS, PG_MAX_BIND_PARAMS};
use crate::db::{quote_ident, sanitize_column_name};
use crate::error::{AppError, Result};
use crate::ingest::frame::{parse_bool, parse_timestamp, ColumnType, DataFrame};

/// Check whether a table exists in the public schema
pub async fn table_exists(pool: &PgPool, table_name: &str) -> Result<bool> {
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_name = $1)",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;
    Ok(exists.0)
}

/// Create the upload table for a frame, dropping any previous incarnation.
///
/// Column names are sanitized identifiers; metadata columns `uploaded_at`
/// and `row_id` are appended.
pub async fn create_table_from_frame(
    pool: &PgPool,
    table_name: &str,
    frame: &DataFrame,
    types: &[ColumnType],
) -> Result<Vec<String>> {
    let drop_query = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table_name));
    sqlx::query(&drop_query).execute(pool).await?;

    let columns: Vec<String> = frame
        .columns
        .iter()
        .map(|c| sanitize_column_name(c))
        .collect();

    let mut column_defs: Vec<String> = columns
        .iter()
        .zip(types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.pg_type()))
        .collect();
    column_defs.push("uploaded_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP".to_string());
    column_defs.push("row_id SERIAL PRIMARY KEY".to_string());

    let create_query = format!(
        "CREATE TABLE {} ({})",
        quote_ident(table_name),
        column_defs.join(", ")
    );
    sqlx::query(&create_query).execute(pool).await?;

    tracing::info!("Created table: {}", table_name);
    Ok(columns)
}

/// Bind one cell with the column's inferred type; unparseable cells go in as
/// NULL rather than failing the whole upload
fn bind_cell<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cell: Option<&str>,
    ty: ColumnType,
) -> Query<'q, Postgres, PgArguments> {
    match ty {
        ColumnType::Integer => query.bind(cell.and_then(|v| v.trim().parse::<i64>().ok())),
        ColumnType::Real => query.bind(cell.and_then(|v| v.trim().parse::<f64>().ok())),
        ColumnType::Boolean => query.bind(cell.and_then(|v| parse_bool(v.trim()))),
        ColumnType::Date => query.bind(
            cell.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok()),
        ),
        ColumnType::Timestamp => query.bind(cell.and_then(|v| parse_timestamp(v.trim()))),
        ColumnType::Text => query.bind(cell.map(str::to_string)),
    }
}

/// Rows per chunk such that `rows * n_cols` stays under the bind-parameter
/// limit, even for very wide tables
fn chunk_rows(n_cols: usize) -> usize {
    (PG_MAX_BIND_PARAMS / n_cols.max(1)).clamp(1, INSERT_CHUNK_ROWS)
}

/// Insert a frame in chunks. Returns the number of rows inserted.
pub async fn insert_frame(
    pool: &PgPool,
    table_name: &str,
    frame: &DataFrame,
    types: &[ColumnType],
) -> Result<u64> {
    if frame.is_empty() {
        return Err(AppError::InvalidInput(
            "No rows to insert".to_string(),
        ));
    }

    let columns: Vec<String> = frame
        .columns
        .iter()
        .map(|c| sanitize_column_name(c))
        .collect();
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let n_cols = columns.len();

    let mut inserted = 0u64;
    for chunk in frame.rows.chunks(chunk_rows(n_cols)) {
        let mut placeholders = Vec::with_capacity(chunk.len());
        for row_idx in 0..chunk.len() {
            let params: Vec<String> = (0..n_cols)
                .map(|col_idx| format!("${}", row_idx * n_cols + col_idx + 1))
                .collect();
            placeholders.push(format!("({})", params.join(", ")));
        }
        let insert_query = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table_name),
            column_list,
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&insert_query);
        for row in chunk {
            for (col_idx, ty) in types.iter().enumerate() {
                let cell = row.get(col_idx).and_then(|c| c.as_deref());
                query = bind_cell(query, cell, *ty);
            }
        }
        let result = query.execute(pool).await?;
        inserted += result.rows_affected();
    }

    tracing::info!("Inserted {} rows into {}", inserted, table_name);
    Ok(inserted)
}

/// Columns of a table from the information schema, in ordinal order
pub async fn table_columns(
    pool: &PgPool,
    table_name: &str,
) -> Result<Vec<(String, String)>> {
    let columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position",
    )
    .bind(table_name)
    .fetch_all(pool)
    .await?;
    Ok(columns)
}

/// Row count, column names, and a few sample rows for the table-data endpoint
pub async fn table_info(
    pool: &PgPool,
    table_name: &str,
    sample_limit: i64,
) -> Result<(i64, Vec<String>, Vec<serde_json::Value>)> {
    let count_query = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
    let (row_count,): (i64,) = sqlx::query_as(&count_query).fetch_one(pool).await?;

    let columns = table_columns(pool, table_name)
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let sample_query = format!(
        "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM \
         (SELECT * FROM {} ORDER BY row_id LIMIT {}) t",
        quote_ident(table_name),
        sample_limit
    );
    let (sample,): (serde_json::Value,) = sqlx::query_as(&sample_query).fetch_one(pool).await?;
    let sample_rows = match sample {
        serde_json::Value::Array(rows) => rows,
        _ => Vec::new(),
    };

    Ok((row_count, columns, sample_rows))
}

/// Drop an upload table
pub async fn delete_table(pool: &PgPool, table_name: &str) -> Result<()> {
    let query = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table_name));
    sqlx::query(&query).execute(pool).await?;
    tracing::info!("Deleted table: {}", table_name);
    Ok(())
}

/// List upload tables: tables in the public schema carrying both metadata
/// columns, which distinguishes them from session log tables and fixed tables
pub async fn list_upload_tables(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<(String, i64)> = sqlx::query_as(
        "SELECT c.table_name::text, COUNT(*)::bigint AS column_count \
         FROM information_schema.columns c \
         WHERE c.table_schema = 'public' \
           AND c.table_name IN ( \
               SELECT table_name FROM information_schema.columns \
               WHERE table_schema = 'public' AND column_name = 'row_id' \
               INTERSECT \
               SELECT table_name FROM information_schema.columns \
               WHERE table_schema = 'public' AND column_name = 'uploaded_at') \
         GROUP BY c.table_name ORDER BY c.table_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_rows_respects_bind_limit() {
        // Narrow frames use the full chunk size
        assert_eq!(chunk_rows(5), INSERT_CHUNK_ROWS);
        // Wide frames shrink so rows * cols never exceeds the parameter cap
        let wide = chunk_rows(1000);
        assert!(wide * 1000 <= PG_MAX_BIND_PARAMS);
        assert!(wide >= 1);
        // Even absurd widths still make progress one row at a time
        assert_eq!(chunk_rows(100_000), 1);
    }
}
