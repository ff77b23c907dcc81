use chrono::{DateTime, Utc};
use serde::Serialize;

/// Row in the `session_master` index table
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub session_type: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_table_name: String,
}

/// Session kind recorded at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Login,
    Registration,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Login => "login",
            SessionType::Registration => "registration",
        }
    }
}

/// One request/response pair appended to a session's log table
#[derive(Debug, Clone, Default)]
pub struct ActivityRecord {
    pub endpoint: String,
    pub method: String,
    pub request_path: String,
    pub request_body: Option<String>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub additional_info: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_type_labels() {
        assert_eq!(SessionType::Login.as_str(), "login");
        assert_eq!(SessionType::Registration.as_str(), "registration");
    }
}
