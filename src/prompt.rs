//! Prompt templates for the summarizer and the SQL agent.

use crate::summarize::ColumnSummary;

/// System role for the summarization exchange
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert data analyst specializing in \
statistical analysis and business intelligence. Your role is to analyze database statistics \
and provide clear, actionable insights that help users understand their data quickly.";

/// System role for SQL generation
pub const SQL_SYSTEM_PROMPT: &str = "You are a SQL query generator. Always wrap table names \
in double quotes. Return only valid SQL queries without any explanation or markdown formatting.";

/// Render the user prompt for table summarization
pub fn render_summary_prompt(
    table_name: &str,
    total_rows: i64,
    total_columns: usize,
    columns_text: &str,
) -> String {
    format!(
        "Analyze this database summary and provide comprehensive insights:\n\n\
**Table Information:**\n\
- Table Name: {table_name}\n\
- Total Rows: {total_rows}\n\
- Total Columns: {total_columns}\n\n\
**Column Details:**\n\
{columns_text}\n\n\
**Your Task:**\n\
Provide a detailed analysis in the following format:\n\n\
## Dataset Overview\n\
Brief description of what this data represents based on column names and types.\n\n\
## Key Statistics\n\
- Highlight the most important numerical insights\n\
- Note any interesting ranges, averages, or distributions\n\n\
## Data Quality Assessment\n\
- Report on missing values and their impact\n\
- Flag potential data quality issues\n\n\
## Notable Patterns\n\
- Identify interesting distributions or trends\n\
- Highlight any categorical patterns (top values)\n\n\
## Recommendations\n\
- Suggest 3-5 specific analyses or visualizations\n\
- Propose business questions this data could answer\n\n\
Keep your response structured, concise, and focused on actionable insights. \
Use bullet points where appropriate."
    )
}

/// Render the user prompt for natural-language-to-SQL generation
pub fn render_sql_prompt(
    table_name: &str,
    columns_info: &str,
    data_context: Option<&str>,
    user_query: &str,
) -> String {
    let context_section = data_context
        .map(|c| format!("\n\nData Context:\n{c}"))
        .unwrap_or_default();

    format!(
        "You are a SQL expert. Generate a valid PostgreSQL query based on the user's \
natural language question.\n\n\
Database Context:\n\
Table Name: {table_name}\n\
IMPORTANT: The table name MUST be wrapped in double quotes like this: \"{table_name}\"\n\n\
Columns (use these exact names):\n\
{columns_info}{context_section}\n\n\
User Question: {user_query}\n\n\
Instructions:\n\
1. Generate ONLY a valid SELECT SQL query\n\
2. ALWAYS wrap the table name in double quotes: \"{table_name}\"\n\
3. Use only the column names listed above\n\
4. Include appropriate WHERE, GROUP BY, ORDER BY, LIMIT clauses as needed\n\
5. Return ONLY the SQL query, no explanations\n\
6. Do not use markdown or code blocks\n\
7. Ensure the query is safe and read-only (SELECT only)\n\
8. Do not include semicolon at the end\n\n\
Example format: SELECT column_name FROM \"{table_name}\" WHERE condition\n\n\
SQL Query:"
    )
}

/// Flatten per-column statistics into readable prompt text
pub fn format_columns_for_prompt(columns: &[ColumnSummary]) -> String {
    let mut formatted = Vec::new();

    for col in columns {
        let mut text = format!("\n### {} ({})", col.column_name, col.data_type);

        if let (Some(min), Some(max)) = (col.min, col.max) {
            text.push_str(&format!("\n- Range: {min:.2} to {max:.2}"));
            if let Some(avg) = col.avg {
                text.push_str(&format!("\n- Average: {avg:.2}"));
            }
            if let Some(median) = col.median {
                text.push_str(&format!("\n- Median: {median:.2}"));
            }
            if let Some(unique) = col.unique_values {
                text.push_str(&format!("\n- Unique values: {unique}"));
            }
        } else if let Some(top_values) = col.top_values.as_ref().filter(|v| !v.is_empty()) {
            if let Some(unique) = col.unique_values {
                text.push_str(&format!("\n- Unique values: {unique}"));
            }
            text.push_str("\n- Top values:");
            for v in top_values.iter().take(3) {
                text.push_str(&format!("\n  * {}: {} occurrences", v.value, v.frequency));
            }
        } else if let (Some(true_count), Some(false_count)) = (col.true_count, col.false_count) {
            text.push_str(&format!("\n- True: {true_count}"));
            text.push_str(&format!("\n- False: {false_count}"));
        }

        if let Some(null_count) = col.null_count.filter(|n| *n > 0) {
            let pct = if col.total_rows > 0 {
                (null_count as f64 / col.total_rows as f64) * 100.0
            } else {
                0.0
            };
            text.push_str(&format!("\n- Missing values: {null_count} ({pct:.1}%)"));
        }

        formatted.push(text);
    }

    formatted.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::TopValue;

    #[test]
    fn test_format_numeric_column() {
        let cols = vec![ColumnSummary {
            column_name: "price".into(),
            data_type: "numeric".into(),
            total_rows: 10,
            min: Some(1.0),
            max: Some(9.5),
            avg: Some(4.2),
            median: Some(4.0),
            unique_values: Some(8),
            null_count: Some(2),
            top_values: None,
            true_count: None,
            false_count: None,
        }];
        let text = format_columns_for_prompt(&cols);
        assert!(text.contains("### price (numeric)"));
        assert!(text.contains("Range: 1.00 to 9.50"));
        assert!(text.contains("Median: 4.00"));
        assert!(text.contains("Missing values: 2 (20.0%)"));
    }

    #[test]
    fn test_format_text_column_top_values() {
        let cols = vec![ColumnSummary {
            column_name: "city".into(),
            data_type: "text".into(),
            total_rows: 5,
            min: None,
            max: None,
            avg: None,
            median: None,
            unique_values: Some(2),
            null_count: Some(0),
            top_values: Some(vec![
                TopValue {
                    value: "Oslo".into(),
                    frequency: 3,
                },
                TopValue {
                    value: "Bergen".into(),
                    frequency: 2,
                },
            ]),
            true_count: None,
            false_count: None,
        }];
        let text = format_columns_for_prompt(&cols);
        assert!(text.contains("Oslo: 3 occurrences"));
        assert!(!text.contains("Missing values"));
    }

    #[test]
    fn test_sql_prompt_quotes_table_name() {
        let prompt = render_sql_prompt("9abc_def", "  - x (bigint)", None, "max of x?");
        assert!(prompt.contains("\"9abc_def\""));
        assert!(prompt.contains("max of x?"));
        assert!(!prompt.contains("Data Context"));

        let with_ctx = render_sql_prompt("t", "cols", Some("Table has 3 rows."), "q");
        assert!(with_ctx.contains("Data Context:\nTable has 3 rows."));
    }
}
