//! Markdown narrative of a query result, written by the model.
//!
//! The model sees a preview of the rows plus the true row count. Nothing
//! checks that the reply actually follows the formatting rules; treat the
//! narrative as best-effort.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::llm::LanguageModel;
use crate::result_set::ResultSet;

const SUMMARY_TEMPLATE: &str = r#"
You are a procurement data analyst.
Given the following procurement table data and question, provide a concise summary in markdown format.
Start with a one-line summary (10-15 words) of the data insight, using count = {count}.

- Use count = {count} for total records.
- Organize by Purchase Order ID if po_id or purchase_order_id is present, else by row.
- Use format: **For Purchase Order ID: <id>** or **Row <n>**, with * <Column Name>: <Value> for each column.
- Capitalize column names, replace underscores with spaces (e.g., po_price_total -> PO Price Total).
- Format dates as YYYY-MM-DD.
- Use Indian number system for numbers (e.g., 1,00,000).
- Exclude previous context from the output; use it only for query context.
- Omit SQL query, warnings, or errors.
- Show delivery risk analysis only if "orders at risk" or "delay" is in the question.
- Use {date} for date-related questions.
- Include all columns dynamically.
- Summarize briefly if count > 10, avoiding row-by-row details.

Important - Always give in points never a paragraph and make sure to keep everything in markdown format

Data:
{table}

Question:
{question}
"#;

/// Fill the summary template. `date` is today's date as `DD-MM-YYYY`.
pub fn build_summary_prompt(question: &str, table: &str, count: usize, date: &str) -> String {
    SUMMARY_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{date}", date)
        .replace("{table}", table)
        .replace("{question}", question)
}

/// Ask the model for a narrative of `rs`.
///
/// `question` must be the user's original question, without any context
/// section, so earlier turns do not leak into the answer.
pub async fn summarize(
    model: &dyn LanguageModel,
    rs: &ResultSet,
    question: &str,
    preview_rows: usize,
    today: NaiveDate,
) -> Result<String> {
    let preview = rs.to_markdown(preview_rows);
    let prompt = build_summary_prompt(
        question,
        &preview,
        rs.len(),
        &today.format("%d-%m-%Y").to_string(),
    );
    debug!(rows = rs.len(), preview_rows, "Requesting result summary");

    let narrative = model
        .complete(&prompt)
        .await
        .map_err(|e| QueryError::Summarization(e.to_string()))?;
    Ok(narrative.trim().to_string())
}
