//! Authorization gate: every protected endpoint resolves the `X-Session-Id`
//! header to a live session before any business logic runs.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};

use crate::constants::{ERR_SESSION_INVALID, ERR_SESSION_REQUIRED};
use crate::error::AppError;
use crate::models::SessionRecord;
use crate::AppState;

/// Header carrying the session token
pub const SESSION_HEADER: &str = "x-session-id";

/// Verified session attached to a request
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub session: SessionRecord,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized(ERR_SESSION_REQUIRED.to_string()))?;

        let session = state
            .sessions
            .verify(&session_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Rejected request with invalid session: {}", session_id);
                AppError::Unauthorized(ERR_SESSION_INVALID.to_string())
            })?;

        let (ip_address, user_agent) = client_meta(&parts.headers);

        Ok(SessionContext {
            session_id,
            session,
            ip_address,
            user_agent,
        })
    }
}

/// Extract client IP (proxy headers first) and user agent from headers
pub fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_meta_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.1.2.3, 192.168.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.9"));
        headers.insert("user-agent", HeaderValue::from_static("test-agent/1.0"));

        let (ip, ua) = client_meta(&headers);
        assert_eq!(ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(ua.as_deref(), Some("test-agent/1.0"));
    }

    #[test]
    fn test_client_meta_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.9"));

        let (ip, ua) = client_meta(&headers);
        assert_eq!(ip.as_deref(), Some("172.16.0.9"));
        assert!(ua.is_none());
    }
}
