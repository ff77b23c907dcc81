//! Identifier hygiene for runtime DDL.
//!
//! Upload tables and session log tables are created dynamically, so every
//! table and column name that reaches SQL text must pass through here first.

/// Derive the upload table name for a user id.
///
/// Strips everything outside `[a-zA-Z0-9_]` (hyphens become underscores) and
/// lowercases, so a UUID maps to a stable Postgres identifier. The result may
/// start with a digit; callers always quote it.
pub fn sanitize_table_name(user_id: &str) -> String {
    user_id
        .replace('-', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// Sanitize a source-file column name into a valid Postgres identifier
pub fn sanitize_column_name(col_name: &str) -> String {
    let clean: String = col_name
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let clean = clean.to_lowercase();

    if clean.is_empty() {
        "unnamed_column".to_string()
    } else if clean.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("col_{clean}")
    } else {
        clean
    }
}

/// Double-quote an already-sanitized identifier for use in SQL text
pub fn quote_ident(ident: &str) -> String {
    format!("\"{ident}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_table_name_from_uuid() {
        let name = sanitize_table_name("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(name, "550e8400_e29b_41d4_a716_446655440000");
    }

    #[test]
    fn test_sanitize_table_name_is_deterministic() {
        let a = sanitize_table_name("9ABC-def");
        let b = sanitize_table_name("9ABC-def");
        assert_eq!(a, b);
        assert_eq!(a, "9abc_def");
    }

    #[test]
    fn test_sanitize_table_name_strips_injection() {
        assert_eq!(
            sanitize_table_name("users; DROP TABLE users"),
            "usersdroptableusers"
        );
    }

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("  First Name "), "first_name");
        assert_eq!(sanitize_column_name("Price ($)"), "price_");
        assert_eq!(sanitize_column_name("2024 sales"), "col_2024_sales");
        assert_eq!(sanitize_column_name("!!!"), "unnamed_column");
        assert_eq!(sanitize_column_name(""), "unnamed_column");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("my_table"), "\"my_table\"");
    }
}
