//! Datalens Server Library
//!
//! Exports the core types and functions for testing and reuse.

pub mod agent;
pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod mailer;
pub mod models;
pub mod prompt;
pub mod routes;
pub mod security;
pub mod session;
pub mod summarize;

pub use config::Config;
pub use error::{AppError, Result};

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use cache::PendingCache;
use llm::LlmClient;
use mailer::OtpMailer;
use session::SessionManager;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Config,
    pub sessions: SessionManager,
    pub cache: Arc<PendingCache>,
    pub llm: LlmClient,
    pub mailer: Arc<dyn OtpMailer>,
}

impl AppState {
    /// Assemble the shared state from its parts
    pub fn new(
        pool: sqlx::PgPool,
        config: Config,
        llm: LlmClient,
        mailer: Arc<dyn OtpMailer>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(pool.clone()),
            cache: Arc::new(PendingCache::new()),
            pool,
            config,
            llm,
            mailer,
        }
    }
}

/// Build the application router. Layers (CORS, trace) are added by the caller.
pub fn build_router(state: AppState) -> Router {
    use routes::*;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register/initiate", post(register_initiate))
        .route("/api/auth/register/verify", post(register_verify))
        .route("/api/auth/register/status/:email", get(register_status))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/verify-session", get(verify_session))
        .route("/api/auth/session-history", get(session_history))
        .route("/api/auth/delete-user/:user_id", delete(delete_user))
        .route(
            "/api/auth/delete-user-by-email/:email",
            delete(delete_user_by_email),
        )
        .route("/api/data/upload-file", post(upload_file))
        .route(
            "/api/data/table-data/:user_id",
            get(get_table_data).delete(delete_table_data),
        )
        .route("/api/data/list-user-tables", get(list_user_tables))
        .route("/api/data/summarize/:user_id", get(summarize_data))
        .route("/api/sql-agent/query", post(agent_query))
        .route("/api/sql-agent/schema", get(agent_schema))
        .with_state(state)
}
