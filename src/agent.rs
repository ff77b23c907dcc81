//! Natural-language-to-SQL agent over a user's upload table.
//!
//! The model drafts a query from the schema and a small data context; the
//! draft is cleaned up, validated as read-only, and executed with a
//! `json_agg` wrapper so arbitrary result shapes come back as JSON.

use serde::Serialize;
use sqlx::PgPool;

use crate::constants::{FORBIDDEN_SQL_KEYWORDS, SQL_MAX_TOKENS};
use crate::db::{quote_ident, sanitize_table_name};
use crate::error::{AppError, Result};
use crate::ingest::store::{table_columns, table_exists};
use crate::llm::LlmClient;
use crate::prompt::{render_sql_prompt, SQL_SYSTEM_PROMPT};

/// Result of one agent run
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub status: String,
    pub question: String,
    pub sql_query: String,
    pub table_name: String,
    pub row_count: usize,
    pub results: Vec<serde_json::Value>,
}

/// Schema description returned by the schema endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub table_name: String,
    pub total_rows: i64,
    pub columns: Vec<SchemaColumn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
}

/// Resolve a user's upload table, erroring when nothing was uploaded yet
pub async fn resolve_user_table(pool: &PgPool, user_id: &str) -> Result<String> {
    let table_name = sanitize_table_name(user_id);
    if table_name.is_empty() {
        return Err(AppError::InvalidInput(
            "User ID produced an empty table name".to_string(),
        ));
    }
    if !table_exists(pool, &table_name).await? {
        return Err(AppError::NotFound(
            "No data found for this user. Please upload a file first.".to_string(),
        ));
    }
    Ok(table_name)
}

/// Strip markdown fences, labels, and trailing semicolons from model output
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if let Some(rest) = sql.strip_prefix("```sql") {
        sql = rest;
    } else if let Some(rest) = sql.strip_prefix("```") {
        sql = rest;
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }
    sql = sql.trim();

    // Some models echo the "SQL Query:" label back
    if let Some(rest) = sql.strip_prefix("SQL Query:") {
        sql = rest.trim();
    }

    sql.trim_end_matches(';').trim().to_string()
}

/// Quote the table name wherever the model left it bare after a FROM or
/// JOIN, whatever the keyword's case
pub fn ensure_quoted_table(sql: &str, table_name: &str) -> String {
    let quoted = quote_ident(table_name);
    if sql.contains(&quoted) {
        return sql.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    let mut after_keyword = false;
    for token in sql.split_whitespace() {
        if after_keyword {
            // The bare name may carry trailing punctuation, e.g. "t)" or "t,"
            match token.strip_prefix(table_name) {
                Some(rest)
                    if rest
                        .chars()
                        .next()
                        .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_') =>
                {
                    out.push(format!("{quoted}{rest}"));
                    after_keyword = false;
                    continue;
                }
                _ => {}
            }
        }
        after_keyword = matches!(token.to_ascii_uppercase().as_str(), "FROM" | "JOIN");
        out.push(token.to_string());
    }
    out.join(" ")
}

/// Accept only a single read-only SELECT
pub fn validate_sql(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(
            "Generated SQL query was empty".to_string(),
        ));
    }

    let upper = trimmed.to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(AppError::InvalidInput(format!(
            "Only SELECT queries are allowed, got: {}",
            trimmed.chars().take(50).collect::<String>()
        )));
    }

    // Word-boundary match so column names like "created" don't trip CREATE
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    for keyword in FORBIDDEN_SQL_KEYWORDS {
        if words.contains(keyword) {
            return Err(AppError::InvalidInput(format!(
                "Query contains forbidden keyword: {keyword}"
            )));
        }
    }

    if trimmed.contains(';') {
        return Err(AppError::InvalidInput(
            "Multiple SQL statements are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Execute a validated query and return its rows as JSON objects
pub async fn execute_readonly(pool: &PgPool, sql: &str) -> Result<Vec<serde_json::Value>> {
    let wrapped = format!(
        "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM ({sql}) t"
    );
    let (rows,): (serde_json::Value,) = sqlx::query_as(&wrapped).fetch_one(pool).await?;
    match rows {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(AppError::Internal(format!(
            "unexpected query result shape: {other}"
        ))),
    }
}

/// Columns formatted for the generation prompt, metadata columns excluded
fn format_columns_info(columns: &[(String, String)]) -> String {
    columns
        .iter()
        .filter(|(name, _)| name != "row_id" && name != "uploaded_at")
        .map(|(name, data_type)| format!("  - {name} ({data_type})"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble row count plus a few sample rows into prompt context
async fn build_data_context(pool: &PgPool, table_name: &str) -> Result<String> {
    let count_query = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
    let (total_rows,): (i64,) = sqlx::query_as(&count_query).fetch_one(pool).await?;

    let sample_query = format!(
        "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM \
         (SELECT * FROM {} LIMIT 3) t",
        quote_ident(table_name)
    );
    let (sample,): (serde_json::Value,) = sqlx::query_as(&sample_query).fetch_one(pool).await?;

    let mut context = format!("The table has {total_rows} rows.");
    if let serde_json::Value::Array(rows) = sample {
        if !rows.is_empty() {
            context.push_str("\nSample rows:");
            for row in rows {
                context.push_str(&format!("\n  {row}"));
            }
        }
    }
    Ok(context)
}

/// Most recent stored data summary from the session's log table, if one was
/// written in the last day. Any failure is treated as "no summary".
async fn recent_session_summary(pool: &PgPool, session_table: &str) -> Option<String> {
    if session_table.is_empty()
        || !session_table.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    let query = format!(
        "SELECT additional_info->>'data_summary' FROM {} \
         WHERE endpoint = '/api/data/upload-file' \
           AND additional_info->>'data_summary' IS NOT NULL \
           AND action_timestamp >= NOW() - INTERVAL '24 hours' \
         ORDER BY action_timestamp DESC LIMIT 1",
        quote_ident(session_table)
    );
    match sqlx::query_as::<_, (Option<String>,)>(&query)
        .fetch_optional(pool)
        .await
    {
        Ok(row) => row.and_then(|(summary,)| summary),
        Err(e) => {
            tracing::debug!("No session summary available: {:?}", e);
            None
        }
    }
}

/// Run the full agent pipeline for one question. With `execute` off the
/// generated SQL is validated and returned without touching the data.
pub async fn answer_question(
    pool: &PgPool,
    llm: &LlmClient,
    user_id: &str,
    question: &str,
    session_table: Option<&str>,
    execute: bool,
) -> Result<AgentResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidInput("Query cannot be empty".to_string()));
    }

    let table_name = resolve_user_table(pool, user_id).await?;
    let columns = table_columns(pool, &table_name).await?;
    let columns_info = format_columns_info(&columns);

    let mut data_context = build_data_context(pool, &table_name).await?;
    if let Some(session_table) = session_table {
        if let Some(summary) = recent_session_summary(pool, session_table).await {
            data_context.push_str("\nPrevious analysis of this data:\n");
            data_context.push_str(&summary);
        }
    }

    let prompt = render_sql_prompt(&table_name, &columns_info, Some(&data_context), question);
    let raw = llm
        .chat(SQL_SYSTEM_PROMPT, &prompt, 0.1, SQL_MAX_TOKENS)
        .await?;

    let sql = ensure_quoted_table(&clean_sql(&raw), &table_name);
    validate_sql(&sql)?;

    let (status, results) = if execute {
        tracing::info!("Agent executing for {}: {}", table_name, sql);
        // A query that fails to run is the model's fault, not the server's
        let results = execute_readonly(pool, &sql).await.map_err(|e| {
            AppError::InvalidInput(format!("Generated query failed to execute: {e}"))
        })?;
        ("success".to_string(), results)
    } else {
        ("generated".to_string(), Vec::new())
    };

    Ok(AgentResponse {
        status,
        question: question.to_string(),
        sql_query: sql,
        table_name,
        row_count: results.len(),
        results,
    })
}

/// Describe the user's upload table for the schema endpoint
pub async fn describe_schema(pool: &PgPool, user_id: &str) -> Result<SchemaResponse> {
    let table_name = resolve_user_table(pool, user_id).await?;

    let count_query = format!("SELECT COUNT(*) FROM {}", quote_ident(&table_name));
    let (total_rows,): (i64,) = sqlx::query_as(&count_query).fetch_one(pool).await?;

    let columns = table_columns(pool, &table_name)
        .await?
        .into_iter()
        .map(|(name, data_type)| SchemaColumn { name, data_type })
        .collect();

    Ok(SchemaResponse {
        table_name,
        total_rows,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_sql_strips_fences_and_semicolons() {
        assert_eq!(
            clean_sql("```sql\nSELECT * FROM \"t\";\n```"),
            "SELECT * FROM \"t\""
        );
        assert_eq!(clean_sql("SELECT 1;"), "SELECT 1");
        assert_eq!(clean_sql("  SQL Query: SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_ensure_quoted_table() {
        let fixed = ensure_quoted_table("SELECT x FROM 9abc WHERE x > 1", "9abc");
        assert_eq!(fixed, "SELECT x FROM \"9abc\" WHERE x > 1");

        // Already quoted stays untouched
        let kept = ensure_quoted_table("SELECT x FROM \"9abc\"", "9abc");
        assert_eq!(kept, "SELECT x FROM \"9abc\"");
    }

    #[test]
    fn test_ensure_quoted_table_is_case_insensitive_on_keywords() {
        assert_eq!(
            ensure_quoted_table("Select x From 9abc", "9abc"),
            "Select x From \"9abc\""
        );
        assert_eq!(
            ensure_quoted_table("select a.x from 9abc a join 9abc b on a.x = b.x", "9abc"),
            "select a.x from \"9abc\" a join \"9abc\" b on a.x = b.x"
        );
        // Trailing punctuation after the bare name is preserved
        assert_eq!(
            ensure_quoted_table("SELECT count(*) FROM (SELECT x FROM 9abc) t", "9abc"),
            "SELECT count(*) FROM (SELECT x FROM \"9abc\") t"
        );
    }

    #[test]
    fn test_validate_sql_accepts_select() {
        assert!(validate_sql("SELECT * FROM \"t\"").is_ok());
        assert!(validate_sql("select count(*) from \"t\"").is_ok());
    }

    #[test]
    fn test_validate_sql_rejects_non_select_prefixes() {
        assert!(validate_sql("WITH c AS (SELECT 1) SELECT * FROM c").is_err());
        assert!(validate_sql("EXPLAIN SELECT * FROM \"t\"").is_err());
    }

    #[test]
    fn test_validate_sql_rejects_writes() {
        assert!(validate_sql("DROP TABLE \"t\"").is_err());
        assert!(validate_sql("SELECT 1; DROP TABLE \"t\"").is_err());
        assert!(validate_sql("SELECT * FROM \"t\" WHERE x = 'a'; DELETE FROM \"t\"").is_err());
        assert!(validate_sql("").is_err());
    }

    #[test]
    fn test_validate_sql_keyword_needs_word_boundary() {
        // "created" contains CREATE but is a column name
        assert!(validate_sql("SELECT created FROM \"t\"").is_ok());
        assert!(validate_sql("SELECT * FROM \"t\" WHERE updated_at > NOW()").is_ok());
    }

    #[test]
    fn test_format_columns_info_skips_metadata() {
        let cols = vec![
            ("name".to_string(), "text".to_string()),
            ("row_id".to_string(), "integer".to_string()),
            ("uploaded_at".to_string(), "timestamp with time zone".to_string()),
        ];
        let info = format_columns_info(&cols);
        assert!(info.contains("name (text)"));
        assert!(!info.contains("row_id"));
        assert!(!info.contains("uploaded_at"));
    }
}
