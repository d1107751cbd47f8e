//! One question, start to finish: prompt → SQL → sanitize → execute → summarize.
//!
//! The pipeline holds no session state. Context from earlier turns is passed
//! in and the digest for the next turn is handed back; the service decides
//! where both live.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::context_summary::generate_context_summary;
use crate::database::Database;
use crate::error::{QueryError, Result};
use crate::llm::{extract_sql, LanguageModel};
use crate::prompt;
use crate::result_set::ResultSet;
use crate::sanitizer::clean_sql_query;
use crate::summarizer;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub schema:          String,
    pub included_tables: Vec<String>,
    pub top_k:           usize,
    pub preview_rows:    usize,
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            schema:          cfg.database.schema.clone(),
            included_tables: cfg.database.included_tables.clone(),
            top_k:           cfg.pipeline.top_k,
            preview_rows:    cfg.pipeline.preview_rows,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub sql:             String,
    pub result_set:      ResultSet,
    /// `None` for empty results, or when the summary call failed.
    pub narrative:       Option<String>,
    /// Digest for the next turn; `None` for empty results.
    pub context_summary: Option<String>,
}

pub struct QueryPipeline {
    model:      Arc<dyn LanguageModel>,
    db:         Database,
    settings:   PipelineSettings,
    table_info: OnceCell<String>,
}

impl QueryPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, db: Database, settings: PipelineSettings) -> Self {
        Self { model, db, settings, table_info: OnceCell::new() }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The question filled into the base template, without context.
    pub fn base_prompt(&self, question: &str) -> String {
        prompt::build_prompt(question, &self.settings.schema, &self.settings.included_tables)
    }

    /// DDL of the visible tables; read once, then cached.
    pub async fn table_info(&self) -> Result<&str> {
        let info = self
            .table_info
            .get_or_try_init(|| self.db.describe(self.settings.included_tables.clone()))
            .await?;
        Ok(info.as_str())
    }

    pub async fn run(
        &self,
        question: &str,
        base_prompt: &str,
        context: &[String],
        today: NaiveDate,
    ) -> Result<PipelineOutput> {
        let full_prompt = prompt::with_context(base_prompt, question, context);
        if full_prompt.len() != base_prompt.len() {
            debug!(entries = context.len(), "Context window attached to prompt");
        }

        let table_info = self.table_info().await?;
        let request = prompt::sql_generation_prompt(&full_prompt, table_info, self.settings.top_k);

        let reply = self
            .model
            .complete(&request)
            .await
            .map_err(|e| QueryError::Model(e.to_string()))?;
        debug!(model = %self.model.label(), reply = %reply, "SQL generation reply");

        let raw_sql = extract_sql(&reply).ok_or(QueryError::NoQueryGenerated)?;
        let sql = clean_sql_query(&raw_sql)?;
        info!(sql = %sql, "Executing generated SQL");

        let result_set = self.db.execute(sql.clone()).await?;
        info!(rows = result_set.len(), "Query returned");

        if result_set.is_empty() {
            return Ok(PipelineOutput { sql, result_set, narrative: None, context_summary: None });
        }

        let narrative = match summarizer::summarize(
            self.model.as_ref(),
            &result_set,
            question,
            self.settings.preview_rows,
            today,
        )
        .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("{}; returning data without narrative", e);
                None
            }
        };
        let context_summary = Some(generate_context_summary(&result_set));

        Ok(PipelineOutput { sql, result_set, narrative, context_summary })
    }
}
