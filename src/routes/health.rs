use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// Health check endpoint
///
/// Returns service identity, version, and the feature map. Deliberately does
/// not touch the database so monitoring stays meaningful when Postgres is the
/// thing that is down.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "datalens-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "features": {
            "authentication": true,
            "file_upload": true,
            "data_cleaning": true,
            "ai_summary": true,
            "sql_agent": true,
            "session_tracking": true,
        },
    }))
}
