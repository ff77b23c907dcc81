/// Length of the random session token (also names the per-session log table)
pub const SESSION_ID_LENGTH: usize = 32;

/// Maximum OTP verification attempts before the pending registration is dropped
pub const MAX_OTP_ATTEMPTS: u32 = 3;

/// Interval between background sweeps of the pending-registration cache
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// File extensions accepted by the upload endpoint
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv"];

/// Rows per INSERT statement during bulk ingestion (shrinks for wide tables)
pub const INSERT_CHUNK_ROWS: usize = 100;

/// Postgres's hard limit on bind parameters per statement
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// Sample rows returned by the table-data endpoint
pub const SAMPLE_ROW_LIMIT: i64 = 5;

/// Token budget for the summarization exchange
pub const SUMMARY_MAX_TOKENS: u32 = 2000;

/// Token budget for SQL generation
pub const SQL_MAX_TOKENS: u32 = 500;

/// Keywords that disqualify a generated SQL query
pub const FORBIDDEN_SQL_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE", "EXEC",
];

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a missing session header
pub const ERR_SESSION_REQUIRED: &str = "Session ID required. Please login or register first.";

/// Error message for a stale or unknown session token
pub const ERR_SESSION_INVALID: &str = "Invalid or expired session. Please login again.";

/// Error message for an ownership-check failure
pub const ERR_FOREIGN_RESOURCE: &str = "Session user does not own the requested resource";

/// Error message for a malformed user id
pub const ERR_INVALID_USER_ID: &str = "Invalid user ID format. Must be a valid UUID.";
