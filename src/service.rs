//! Session-aware front door: the two operations callers use.
//!
//! `handle_query` always returns a [`QueryResponse`]; failures land in its
//! `error` field as the error's display text. That text is shown verbatim
//! (driver messages included), so front it with something that trims it if
//! the audience should not see database internals.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::context_summary::fallback_summary;
use crate::database::Database;
use crate::error::QueryError;
use crate::llm::{LanguageModel, LlmClient};
use crate::pipeline::{PipelineOutput, PipelineSettings, QueryPipeline};
use crate::result_set::ResultSet;
use crate::session::{InMemorySessionStore, SessionId, SessionStore};

/// Transport shape of one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub prompt: String,
    pub result: Option<String>,
    pub data:   Vec<Map<String, JsonValue>>,
    pub error:  Option<String>,
    /// Sanitized SQL that ran; kept out of the wire format.
    #[serde(skip)]
    pub sql:    Option<String>,
    #[serde(skip)]
    pub rows:   ResultSet,
}

impl QueryResponse {
    fn failed(prompt: String, err: &QueryError) -> Self {
        Self { prompt, result: None, data: Vec::new(), error: Some(err.to_string()), sql: None, rows: ResultSet::default() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

pub struct QueryService {
    pipeline: Arc<QueryPipeline>,
    sessions: Arc<dyn SessionStore>,
    workers:  Arc<Semaphore>,
    timeout:  Duration,
}

impl QueryService {
    pub fn new(
        pipeline: QueryPipeline,
        sessions: Arc<dyn SessionStore>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sessions,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let db = Database::open(&cfg.database)?;
        let model: Arc<dyn LanguageModel> = Arc::new(LlmClient::from_config(&cfg.llm)?);
        let pipeline = QueryPipeline::new(model, db, PipelineSettings::from_config(cfg));
        Ok(Self::new(
            pipeline,
            Arc::new(InMemorySessionStore::new()),
            cfg.pipeline.workers,
            Duration::from_secs(cfg.pipeline.request_timeout_secs),
        ))
    }

    pub fn pipeline(&self) -> &QueryPipeline {
        &self.pipeline
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Answer one question within `session`, then record this turn's digest.
    pub async fn handle_query(&self, session: &SessionId, question: &str) -> QueryResponse {
        if question.trim().is_empty() {
            warn!(session = %session, "Rejected empty question");
            return QueryResponse::failed(String::new(), &QueryError::EmptyInput);
        }

        let prompt = self.pipeline.base_prompt(question);
        let context = self.sessions.context(session);
        info!(session = %session, context_entries = context.len(), "Handling query");

        let outcome = self.run_bounded(question, &prompt, &context).await;

        let summary = match &outcome {
            Ok(PipelineOutput { context_summary: Some(digest), .. }) if !digest.is_empty() => digest.clone(),
            Ok(out) => fallback_summary(question, Some(&out.result_set), out.narrative.as_deref()),
            Err(_) => fallback_summary(question, None, None),
        };
        self.sessions.push_context(session, summary);

        match outcome {
            Ok(out) => QueryResponse {
                prompt,
                result: out.narrative,
                data:   out.result_set.to_records(),
                error:  None,
                sql:    Some(out.sql),
                rows:   out.result_set,
            },
            Err(err) => {
                error!(session = %session, "Query failed: {}", err);
                QueryResponse::failed(prompt, &err)
            }
        }
    }

    /// Empty the session's context window.
    pub fn clear_history(&self, session: &SessionId) -> ClearResponse {
        self.sessions.clear(session);
        info!(session = %session, "Context cleared");
        ClearResponse { message: "Context history cleared".to_string() }
    }

    /// Wait for a worker slot, then run the pipeline under the deadline.
    async fn run_bounded(
        &self,
        question: &str,
        prompt: &str,
        context: &[String],
    ) -> Result<PipelineOutput, QueryError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| QueryError::Execution(crate::error::DatabaseError::Worker(e.to_string())))?;

        let today = Local::now().date_naive();
        match tokio::time::timeout(self.timeout, self.pipeline.run(question, prompt, context, today)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(self.timeout)),
        }
    }
}
