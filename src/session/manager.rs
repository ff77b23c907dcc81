//! Session lifecycle and per-session audit logging.
//!
//! Every session owns a dedicated, dynamically created log table named after
//! its token; the `session_master` table indexes them all. A session moves
//! `created -> active -> invalidated` and never comes back; only the explicit
//! `is_active` flag ends it.

use sqlx::PgPool;

use crate::constants::SESSION_ID_LENGTH;
use crate::db::quote_ident;
use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, SessionRecord, SessionType};
use crate::security::generate_session_id;

/// Handle to the session store
#[derive(Debug, Clone)]
pub struct SessionManager {
    pool: PgPool,
}

/// Outcome of creating a session
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: String,
    pub table_name: String,
}

impl SessionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a session: random token, dedicated log table, master row.
    ///
    /// The token doubles as the log table name; it is alphanumeric by
    /// construction and always quoted in DDL, so two sessions can never share
    /// a table.
    pub async fn create(
        &self,
        user_id: &str,
        email: &str,
        session_type: SessionType,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CreatedSession> {
        let session_id = generate_session_id(SESSION_ID_LENGTH);
        let table_name = session_id.clone();

        self.create_log_table(&table_name).await?;

        sqlx::query(
            "INSERT INTO session_master \
             (session_id, user_id, email, session_type, ip_address, user_agent, session_table_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(email)
        .bind(session_type.as_str())
        .bind(ip_address)
        .bind(user_agent)
        .bind(&table_name)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Session created for {} ({}): {}",
            email,
            session_type.as_str(),
            session_id
        );

        Ok(CreatedSession {
            session_id,
            table_name,
        })
    }

    /// Look up a session; `Some` only when the row exists and is still active
    pub async fn verify(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT session_id, user_id, email, session_type, created_at, last_activity, \
             is_active, ip_address, user_agent, session_table_name \
             FROM session_master WHERE session_id = $1 AND is_active = TRUE",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Mark a session inactive. Idempotent and terminal.
    pub async fn invalidate(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE session_master SET is_active = FALSE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Session invalidated: {}", session_id);
        Ok(())
    }

    /// Append an activity row to the session's log table.
    ///
    /// Logging never breaks the request path: an unknown session is a warned
    /// no-op and database failures are swallowed after logging.
    pub async fn log_activity(&self, session_id: &str, record: ActivityRecord) {
        if let Err(e) = self.try_log_activity(session_id, record).await {
            tracing::warn!("Error logging session activity: {:?}", e);
        }
    }

    /// All log rows for a session, newest first. Unknown session yields an
    /// empty list.
    pub async fn history(&self, session_id: &str) -> Result<Vec<serde_json::Value>> {
        let Some(table_name) = self.resolve_log_table(session_id).await? else {
            return Ok(Vec::new());
        };

        let query = format!(
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM \
             (SELECT * FROM {} ORDER BY action_timestamp DESC) t",
            quote_ident(&table_name)
        );
        let rows: (serde_json::Value,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;

        match rows.0 {
            serde_json::Value::Array(entries) => Ok(entries),
            other => Err(AppError::Internal(format!(
                "unexpected history shape: {other}"
            ))),
        }
    }

    async fn try_log_activity(&self, session_id: &str, record: ActivityRecord) -> Result<()> {
        let Some(table_name) = self.resolve_log_table(session_id).await? else {
            tracing::warn!("Session not found, activity dropped: {}", session_id);
            return Ok(());
        };

        let query = format!(
            "INSERT INTO {} \
             (endpoint, method, request_path, request_body, response_status, \
              response_body, ip_address, user_agent, additional_info) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            quote_ident(&table_name)
        );
        sqlx::query(&query)
            .bind(&record.endpoint)
            .bind(&record.method)
            .bind(&record.request_path)
            .bind(&record.request_body)
            .bind(record.response_status)
            .bind(&record.response_body)
            .bind(&record.ip_address)
            .bind(&record.user_agent)
            .bind(&record.additional_info)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "UPDATE session_master SET last_activity = CURRENT_TIMESTAMP WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resolve a session's log table from the master row, active or not
    async fn resolve_log_table(&self, session_id: &str) -> Result<Option<String>> {
        let name: Option<(String,)> = sqlx::query_as(
            "SELECT session_table_name FROM session_master WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(name.map(|(n,)| n))
    }

    async fn create_log_table(&self, table_name: &str) -> Result<()> {
        // Tokens are alphanumeric by construction; refuse anything else
        // before it reaches DDL text.
        if table_name.is_empty() || !table_name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::Internal(format!(
                "invalid session table name: {table_name}"
            )));
        }

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id SERIAL PRIMARY KEY, \
             action_timestamp TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             endpoint VARCHAR(500), \
             method VARCHAR(10), \
             request_path VARCHAR(500), \
             request_body TEXT, \
             response_status INTEGER, \
             response_body TEXT, \
             ip_address VARCHAR(45), \
             user_agent TEXT, \
             additional_info JSONB)",
            quote_ident(table_name)
        );
        sqlx::query(&query).execute(&self.pool).await?;

        tracing::debug!("Created session log table: {}", table_name);
        Ok(())
    }
}
