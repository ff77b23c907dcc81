//! Natural-language query endpoints backed by the SQL agent.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;

use crate::agent::{answer_question, describe_schema, AgentResponse, SchemaResponse};
use crate::models::ActivityRecord;
use crate::session::SessionContext;
use crate::AppState;

fn default_execute() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AgentQueryRequest {
    pub user_query: String,
    #[serde(default = "default_execute")]
    pub execute: bool,
}

/// Answer a natural-language question about the caller's data
///
/// Every outcome, including failures, lands in the session log with an
/// `action` tag so the history shows what the agent did.
pub async fn agent_query(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(payload): Json<AgentQueryRequest>,
) -> crate::error::Result<Json<AgentResponse>> {
    let result = answer_question(
        &state.pool,
        &state.llm,
        &ctx.session.user_id,
        &payload.user_query,
        Some(&ctx.session.session_table_name),
        payload.execute,
    )
    .await;

    let (status_code, info) = match &result {
        Ok(resp) => (
            200,
            json!({
                "action": "sql_agent_query",
                "question": resp.question,
                "sql_query": resp.sql_query,
                "row_count": resp.row_count,
                "executed": payload.execute,
            }),
        ),
        Err(e) => (
            e.status_code().as_u16() as i32,
            json!({
                "action": "sql_agent_query_failed",
                "question": payload.user_query,
                "error": e.to_string(),
            }),
        ),
    };

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/sql-agent/query".to_string(),
                method: "POST".to_string(),
                request_path: "/api/sql-agent/query".to_string(),
                request_body: Some(payload.user_query.clone()),
                response_status: Some(status_code),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                additional_info: Some(info),
                ..Default::default()
            },
        )
        .await;

    result.map(Json)
}

/// Schema of the caller's upload table
pub async fn agent_schema(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> crate::error::Result<Json<SchemaResponse>> {
    let schema = describe_schema(&state.pool, &ctx.session.user_id).await?;

    state
        .sessions
        .log_activity(
            &ctx.session_id,
            ActivityRecord {
                endpoint: "/api/sql-agent/schema".to_string(),
                method: "GET".to_string(),
                request_path: "/api/sql-agent/schema".to_string(),
                response_status: Some(200),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                ..Default::default()
            },
        )
        .await;

    Ok(Json(schema))
}
