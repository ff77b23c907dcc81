//! Statistical profiling of upload tables plus the LLM-written narrative.
//!
//! The statistics come straight from Postgres aggregates; the narrative is a
//! single chat exchange. LLM failures degrade to a placeholder so the upload
//! flow never blocks on the inference server.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;

use crate::constants::SUMMARY_MAX_TOKENS;
use crate::db::quote_ident;
use crate::error::Result;
use crate::ingest::store::{table_columns, table_exists};
use crate::llm::LlmClient;
use crate::models::ActivityRecord;
use crate::prompt::{format_columns_for_prompt, render_summary_prompt, SUMMARY_SYSTEM_PROMPT};
use crate::session::SessionManager;

const NUMERIC_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "bigint",
    "numeric",
    "double precision",
    "real",
];
const TEXT_TYPES: &[&str] = &["text", "character varying", "varchar", "character"];

/// One value/frequency pair from a categorical column
#[derive(Debug, Clone, Serialize)]
pub struct TopValue {
    pub value: String,
    pub frequency: i64,
}

/// Per-column statistics; which fields are populated depends on the column's
/// Postgres type
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column_name: String,
    pub data_type: String,
    pub total_rows: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_values: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_values: Option<Vec<TopValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_count: Option<i64>,
}

/// Statistics for a whole table
#[derive(Debug, Clone, Serialize)]
pub struct TableStatistics {
    pub table_name: String,
    pub total_rows: i64,
    pub total_columns: usize,
    pub columns: Vec<ColumnSummary>,
}

/// Full summarization result returned by the endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub status: String,
    pub table_name: String,
    pub statistics: TableStatistics,
    pub ai_insights: String,
    pub prompt_length: usize,
    pub generation_time_seconds: f64,
    pub generated_at: String,
}

fn empty_summary(name: &str, data_type: &str, total_rows: i64) -> ColumnSummary {
    ColumnSummary {
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        total_rows,
        min: None,
        max: None,
        avg: None,
        median: None,
        unique_values: None,
        null_count: None,
        top_values: None,
        true_count: None,
        false_count: None,
    }
}

async fn summarize_numeric_column(
    pool: &PgPool,
    table_name: &str,
    column: &str,
    data_type: &str,
    total_rows: i64,
) -> Result<ColumnSummary> {
    let col = quote_ident(column);
    let query = format!(
        "SELECT MIN({col})::float8, MAX({col})::float8, AVG({col})::float8, \
         (PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY {col}))::float8, \
         COUNT(DISTINCT {col})::bigint, (COUNT(*) - COUNT({col}))::bigint \
         FROM {table}",
        table = quote_ident(table_name)
    );
    let (min, max, avg, median, unique, nulls): (
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        i64,
        i64,
    ) = sqlx::query_as(&query).fetch_one(pool).await?;

    let mut summary = empty_summary(column, data_type, total_rows);
    summary.min = min;
    summary.max = max;
    summary.avg = avg;
    summary.median = median;
    summary.unique_values = Some(unique);
    summary.null_count = Some(nulls);
    Ok(summary)
}

async fn summarize_text_column(
    pool: &PgPool,
    table_name: &str,
    column: &str,
    data_type: &str,
    total_rows: i64,
) -> Result<ColumnSummary> {
    let col = quote_ident(column);
    let table = quote_ident(table_name);

    let counts_query = format!(
        "SELECT COUNT(DISTINCT {col})::bigint, (COUNT(*) - COUNT({col}))::bigint FROM {table}"
    );
    let (unique, nulls): (i64, i64) = sqlx::query_as(&counts_query).fetch_one(pool).await?;

    let top_query = format!(
        "SELECT {col}::text, COUNT(*)::bigint AS frequency FROM {table} \
         WHERE {col} IS NOT NULL GROUP BY {col} ORDER BY frequency DESC LIMIT 5"
    );
    let top: Vec<(String, i64)> = sqlx::query_as(&top_query).fetch_all(pool).await?;

    let mut summary = empty_summary(column, data_type, total_rows);
    summary.unique_values = Some(unique);
    summary.null_count = Some(nulls);
    summary.top_values = Some(
        top.into_iter()
            .map(|(value, frequency)| TopValue { value, frequency })
            .collect(),
    );
    Ok(summary)
}

async fn summarize_boolean_column(
    pool: &PgPool,
    table_name: &str,
    column: &str,
    data_type: &str,
    total_rows: i64,
) -> Result<ColumnSummary> {
    let col = quote_ident(column);
    let query = format!(
        "SELECT COUNT(*) FILTER (WHERE {col} IS TRUE), \
         COUNT(*) FILTER (WHERE {col} IS FALSE), \
         COUNT(*) - COUNT({col}) \
         FROM {table}",
        table = quote_ident(table_name)
    );
    let (true_count, false_count, nulls): (i64, i64, i64) =
        sqlx::query_as(&query).fetch_one(pool).await?;

    let mut summary = empty_summary(column, data_type, total_rows);
    summary.true_count = Some(true_count);
    summary.false_count = Some(false_count);
    summary.null_count = Some(nulls);
    Ok(summary)
}

/// Profile every user column of a table. The metadata columns `row_id` and
/// `uploaded_at` are skipped.
pub async fn table_statistics(pool: &PgPool, table_name: &str) -> Result<TableStatistics> {
    let count_query = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
    let (total_rows,): (i64,) = sqlx::query_as(&count_query).fetch_one(pool).await?;

    let columns = table_columns(pool, table_name).await?;
    let mut summaries = Vec::new();

    for (name, data_type) in &columns {
        if name == "row_id" || name == "uploaded_at" {
            continue;
        }

        let summary = if NUMERIC_TYPES.contains(&data_type.as_str()) {
            summarize_numeric_column(pool, table_name, name, data_type, total_rows).await?
        } else if data_type == "boolean" {
            summarize_boolean_column(pool, table_name, name, data_type, total_rows).await?
        } else if TEXT_TYPES.contains(&data_type.as_str()) {
            summarize_text_column(pool, table_name, name, data_type, total_rows).await?
        } else {
            // Dates, timestamps: cast to text for cardinality only
            summarize_text_column(pool, table_name, name, data_type, total_rows).await?
        };
        summaries.push(summary);
    }

    let total_columns = summaries.len();
    Ok(TableStatistics {
        table_name: table_name.to_string(),
        total_rows,
        total_columns,
        columns: summaries,
    })
}

/// Profile a table and have the model write the narrative.
///
/// An unreachable inference server is not an error; the statistics are still
/// returned with a placeholder narrative.
pub async fn summarize_table(
    pool: &PgPool,
    llm: &LlmClient,
    table_name: &str,
) -> Result<SummaryResponse> {
    let started = Instant::now();

    let statistics = table_statistics(pool, table_name).await?;
    let columns_text = format_columns_for_prompt(&statistics.columns);
    let prompt = render_summary_prompt(
        table_name,
        statistics.total_rows,
        statistics.total_columns,
        &columns_text,
    );
    let prompt_length = prompt.len();

    let (status, ai_insights) = match llm
        .chat(SUMMARY_SYSTEM_PROMPT, &prompt, 0.7, SUMMARY_MAX_TOKENS)
        .await
    {
        Ok(text) => ("success".to_string(), text),
        Err(e) => {
            tracing::warn!("Summary generation failed for {}: {:?}", table_name, e);
            (
                "partial".to_string(),
                format!(
                    "AI insights unavailable: could not reach the inference server ({e}). \
                     Statistical summary was generated successfully."
                ),
            )
        }
    };

    Ok(SummaryResponse {
        status,
        table_name: table_name.to_string(),
        statistics,
        ai_insights,
        prompt_length,
        generation_time_seconds: started.elapsed().as_secs_f64(),
        generated_at: Utc::now().to_rfc3339(),
    })
}

/// Background task run after an upload: generate the summary and stash it in
/// the session's log table so the SQL agent can pick it up later. Failures
/// are logged and dropped.
pub async fn summarize_in_background(
    pool: PgPool,
    llm: LlmClient,
    sessions: SessionManager,
    session_id: String,
    table_name: String,
) {
    match table_exists(&pool, &table_name).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Background summary skipped, table gone: {}", table_name);
            return;
        }
        Err(e) => {
            tracing::warn!("Background summary skipped for {}: {:?}", table_name, e);
            return;
        }
    }

    match summarize_table(&pool, &llm, &table_name).await {
        Ok(summary) => {
            let record = ActivityRecord {
                endpoint: "/api/data/upload-file".to_string(),
                method: "POST".to_string(),
                additional_info: Some(serde_json::json!({
                    "action": "background_summary",
                    "table_name": table_name,
                    "status": summary.status,
                    "data_summary": summary.ai_insights,
                    "generated_at": summary.generated_at,
                })),
                ..Default::default()
            };
            sessions.log_activity(&session_id, record).await;
            tracing::info!("Background summary stored for {}", table_name);
        }
        Err(e) => {
            tracing::warn!("Background summary failed for {}: {:?}", table_name, e);
        }
    }
}
