//! File upload and table-data endpoints.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::constants::{ALLOWED_EXTENSIONS, ERR_FOREIGN_RESOURCE, SAMPLE_ROW_LIMIT};
use crate::db::sanitize_table_name;
use crate::error::{AppError, Result};
use crate::ingest::{
    allowed_file, clean_frame, decode_text, infer_column_types, parse_csv,
    store::{create_table_from_frame, delete_table, insert_frame, list_upload_tables, table_exists, table_info},
    CleaningOptions,
};
use crate::models::ActivityRecord;
use crate::session::SessionContext;
use crate::summarize::{summarize_in_background, summarize_table};
use crate::AppState;

/// Path `user_id` must match the session's user
fn ensure_owner(ctx: &SessionContext, user_id: &str) -> Result<()> {
    if ctx.session.user_id != user_id {
        tracing::warn!(
            "Ownership check failed: session user {} requested data of {}",
            ctx.session.user_id,
            user_id
        );
        return Err(AppError::Forbidden(ERR_FOREIGN_RESOURCE.to_string()));
    }
    Ok(())
}

/// Resolve a user's upload table, 404 when nothing was uploaded
async fn require_table(state: &AppState, user_id: &str) -> Result<String> {
    let table_name = sanitize_table_name(user_id);
    if table_name.is_empty() || !table_exists(&state.pool, &table_name).await? {
        return Err(AppError::NotFound(
            "No data found for this user. Please upload a file first.".to_string(),
        ));
    }
    Ok(table_name)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

struct UploadForm {
    user_id: Option<String>,
    filename: Option<String>,
    content: Option<Vec<u8>>,
    options: CleaningOptions,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        user_id: None,
        filename: None,
        content: None,
        options: CleaningOptions::default(),
    };

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "file" => {
                form.filename = field.file_name().map(str::to_string);
                form.content = Some(field.bytes().await?.to_vec());
            }
            "user_id" => form.user_id = Some(field.text().await?.trim().to_string()),
            "remove_duplicates" => form.options.remove_duplicates = parse_flag(&field.text().await?),
            "fill_missing_values" => {
                form.options.fill_missing_values = parse_flag(&field.text().await?)
            }
            "remove_empty_rows" => form.options.remove_empty_rows = parse_flag(&field.text().await?),
            "remove_empty_columns" => {
                form.options.remove_empty_columns = parse_flag(&field.text().await?)
            }
            "clean_text" => form.options.clean_text = parse_flag(&field.text().await?),
            "standardize_column_names" => {
                form.options.standardize_column_names = parse_flag(&field.text().await?)
            }
            "remove_outliers" => form.options.remove_outliers = parse_flag(&field.text().await?),
            "normalize_numeric" => {
                form.options.normalize_numeric = parse_flag(&field.text().await?)
            }
            "iqr_multiplier" => {
                if let Ok(v) = field.text().await?.trim().parse::<f64>() {
                    form.options.iqr_multiplier = v;
                }
            }
            other => {
                tracing::debug!("Ignoring unknown upload field: {}", other);
            }
        }
    }

    Ok(form)
}

/// Upload a CSV into the caller's table
///
/// Parses, optionally cleans, then replaces the user's upload table in one
/// pass. Empty input (before or after cleaning) is rejected before any
/// database write. A background task generates the AI summary afterwards.
pub async fn upload_file(
    State(state): State<AppState>,
    ctx: SessionContext,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let form = read_upload_form(multipart).await?;

    let user_id = form
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("user_id field is required".to_string()))?;
    ensure_owner(&ctx, &user_id)?;

    let filename = form
        .filename
        .ok_or_else(|| AppError::InvalidInput("file field is required".to_string()))?;
    if !allowed_file(&filename, ALLOWED_EXTENSIONS) {
        return Err(AppError::InvalidInput(format!(
            "Unsupported file type: {filename}. Only CSV files are accepted."
        )));
    }
    let content = form
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Uploaded file is empty".to_string()))?;

    let frame = parse_csv(&decode_text(&content))?;
    if frame.is_empty() {
        return Err(AppError::InvalidInput(
            "File contains no data rows".to_string(),
        ));
    }

    let (frame, report) = clean_frame(frame, &form.options);
    if frame.is_empty() {
        return Err(AppError::InvalidInput(
            "All rows were removed during cleaning. Nothing to upload.".to_string(),
        ));
    }

    let types = infer_column_types(&frame);
    let table_name = sanitize_table_name(&user_id);
    if table_name.is_empty() {
        return Err(AppError::InvalidInput(
            "User ID produced an empty table name".to_string(),
        ));
    }

    let columns = create_table_from_frame(&state.pool, &table_name, &frame, &types).await?;
    let rows_inserted = insert_frame(&state.pool, &table_name, &frame, &types).await?;

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/data/upload-file".to_string(),
                method: "POST".to_string(),
                request_path: "/api/data/upload-file".to_string(),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                additional_info: Some(json!({
                    "action": "file_upload",
                    "filename": filename,
                    "table_name": table_name,
                    "rows_inserted": rows_inserted,
                    "cleaning": report,
                })),
                ..Default::default()
            },
        )
        .await;

    tokio::spawn(summarize_in_background(
        state.pool.clone(),
        state.llm.clone(),
        state.sessions.clone(),
        ctx.session_id.clone(),
        table_name.clone(),
    ));

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "table_name": table_name,
        "rows_inserted": rows_inserted,
        "columns": columns,
        "cleaning_report": report,
    })))
}

/// Row count, columns, and sample rows of the caller's table
pub async fn get_table_data(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    ensure_owner(&ctx, &user_id)?;
    let table_name = require_table(&state, &user_id).await?;

    let (total_rows, columns, sample_rows) =
        table_info(&state.pool, &table_name, SAMPLE_ROW_LIMIT).await?;

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/data/table-data".to_string(),
                method: "GET".to_string(),
                request_path: format!("/api/data/table-data/{user_id}"),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(json!({
        "table_name": table_name,
        "total_rows": total_rows,
        "columns": columns,
        "sample_rows": sample_rows,
    })))
}

/// Drop the caller's upload table
pub async fn delete_table_data(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    ensure_owner(&ctx, &user_id)?;
    let table_name = require_table(&state, &user_id).await?;

    delete_table(&state.pool, &table_name).await?;

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/data/table-data".to_string(),
                method: "DELETE".to_string(),
                request_path: format!("/api/data/table-data/{user_id}"),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                additional_info: Some(json!({"action": "table_deleted", "table_name": table_name})),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(json!({
        "message": "Table deleted successfully",
        "table_name": table_name,
    })))
}

/// List every upload table in the database with its column count
pub async fn list_user_tables(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Value>> {
    let tables: Vec<Value> = list_upload_tables(&state.pool)
        .await?
        .into_iter()
        .map(|(table_name, column_count)| {
            json!({"table_name": table_name, "column_count": column_count})
        })
        .collect();

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/data/list-user-tables".to_string(),
                method: "GET".to_string(),
                request_path: "/api/data/list-user-tables".to_string(),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(json!({
        "count": tables.len(),
        "tables": tables,
    })))
}

/// Profile the caller's table and return statistics plus the model narrative
pub async fn summarize_data(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    ensure_owner(&ctx, &user_id)?;
    let table_name = require_table(&state, &user_id).await?;

    let summary = summarize_table(&state.pool, &state.llm, &table_name).await?;

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/data/summarize".to_string(),
                method: "GET".to_string(),
                request_path: format!("/api/data/summarize/{user_id}"),
                response_status: Some(StatusCode::OK.as_u16() as i32),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                additional_info: Some(json!({
                    "action": "summarize",
                    "table_name": table_name,
                    "status": summary.status,
                    "data_summary": summary.ai_insights,
                })),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(serde_json::to_value(summary).map_err(|e| {
        AppError::Internal(format!("failed to serialize summary: {e}"))
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionRecord;
    use chrono::Utc;

    fn session_ctx(user_id: &str) -> SessionContext {
        let token = "a".repeat(32);
        SessionContext {
            session_id: token.clone(),
            session: SessionRecord {
                session_id: token.clone(),
                user_id: user_id.to_string(),
                email: "owner@example.com".to_string(),
                session_type: "login".to_string(),
                created_at: Utc::now(),
                last_activity: Utc::now(),
                is_active: true,
                ip_address: None,
                user_agent: None,
                session_table_name: token,
            },
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_ensure_owner_rejects_foreign_user() {
        let ctx = session_ctx("user-a");
        match ensure_owner(&ctx, "user-b") {
            Err(AppError::Forbidden(msg)) => assert_eq!(msg, ERR_FOREIGN_RESOURCE),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_ensure_owner_accepts_matching_user() {
        let ctx = session_ctx("user-a");
        assert!(ensure_owner(&ctx, "user-a").is_ok());
    }

    #[test]
    fn test_parse_flag_variants() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("on"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("maybe"));
    }
}
