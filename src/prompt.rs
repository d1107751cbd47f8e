//! Prompt templates for SQL generation.
//!
//! The base template is filled with the question and the visible tables.
//! Follow-up questions that point back at earlier answers ("these POs",
//! "the above orders") get the session's context window appended.

/// Words that mark a question as referring to a previous answer.
pub const REFERENTIAL_WORDS: &[&str] = &["these", "those", "them", "above", "mentioned"];

pub const CONTEXT_HEADER: &str = "Context Info (Previous Answer Summary):";

const SQL_PROMPT_TEMPLATE: &str = r#"
You are an expert SQL assistant. Translate the following natural language question into a SQL query for a SQLite database.
Ensure the query:
- Only uses tables from the '{schema}' schema, specifically: {tables}.
- Always explicitly references the table name for each column (e.g., use {schema}.purchase_order_main.column_name instead of just column_name) to avoid ambiguity, especially for columns that exist in multiple tables.
- Is safe, optimized, and follows SQLite best practices.
IMPORTANT!!!-Only return the query, no prefix or suffix like ``` or the word 'sql' or the 'SQLQuery:' label.
IMPORTANT!!!-Only return a sql query which can be run directly to get back the response.

Consider these edge cases for better accuracy
Edge Case:
1. If complete information is asked try looking into a single table only rather than joining different tables
2. Avoid joins unless it is clear the data is spread over two different tables
3. Assume all date fields are stored as strings unless explicitly stated otherwise. Always convert them with date(column_name) (rewriting 'DD-MM-YYYY' values with substr into 'YYYY-MM-DD' first) before comparing them to date('now') or other date values
4. Cast timestamp columns to TEXT before using substr or similar string operations.
5. When comparing string-based date columns with actual date values, always convert the column first to avoid type mismatches and date format inconsistencies.
6. Cast numeric values to REAL or NUMERIC instead of INTEGER.
7. If the question asks which orders may be delayed or are at risk, look for the POs whose delivery address is not null; otherwise ignore this point.
8. Avoid using item tables unless specifically asked

Special Cases:
1. Use the table purchase_order_item for delivery related queries, and its column purchase_order_id rather than po_id
2. Whenever using the item_description column, concatenate the values with group_concat as it has a one to many relationship and duplicates values

Important- Never include a prefix or suffix like ``` or the word sql or the word SQLQuery, only the raw sql query
Very Important!- Always include additional supporting columns along with the main column to provide meaningful context and basic information (e.g., if returning PO IDs, also include PO amount, creation date, buyer name, etc.), depending on what the main column represents.
Question: {question}
"#;

/// Fill the base template. Pure string formatting; never fails.
pub fn build_prompt(question: &str, schema: &str, tables: &[String]) -> String {
    let tables = if tables.is_empty() {
        "all tables in the schema".to_string()
    } else {
        tables.join(", ")
    };
    SQL_PROMPT_TEMPLATE
        .replace("{schema}", schema)
        .replace("{tables}", &tables)
        .replace("{question}", question.trim())
}

/// True when the question contains a referential trigger word.
pub fn is_referential(question: &str) -> bool {
    let q = question.to_lowercase();
    REFERENTIAL_WORDS.iter().any(|w| q.contains(w))
}

/// Append the context window to `prompt` when the question needs it.
///
/// `context` is oldest-first; entries are joined by a blank line.
pub fn with_context(prompt: &str, question: &str, context: &[String]) -> String {
    if context.is_empty() || !is_referential(question) {
        return prompt.to_string();
    }
    format!("{}\n{}\n{}", prompt, CONTEXT_HEADER, context.join("\n\n"))
}

/// Instructions appended for the generator: visible DDL and the row cap.
pub fn sql_generation_prompt(prompt: &str, table_info: &str, top_k: usize) -> String {
    format!(
        "{prompt}\n\
         Only use the following tables:\n{table_info}\n\n\
         Unless the question asks for a specific number of rows, limit the result to at most {top_k} rows with a LIMIT clause.",
    )
}
