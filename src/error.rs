//! Error types for the query pipeline.
//!
//! Every failure the pipeline can hit maps onto one `QueryError` variant.
//! The service layer turns them into the `error` field of a response; they
//! never escape as panics.

use std::time::Duration;

use thiserror::Error;

/// Failures raised while talking to the procurement database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database worker failed: {0}")]
    Worker(String),

    #[error("query interrupted before it started")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Prompt cannot be empty")]
    EmptyInput,

    #[error("No SQL query was generated by the model")]
    NoQueryGenerated,

    #[error("LLM request failed: {0}")]
    Model(String),

    #[error("Query contains a disallowed keyword: {keyword}")]
    DisallowedKeyword { keyword: String },

    #[error(transparent)]
    Execution(#[from] DatabaseError),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Summary generation failed: {0}")]
    Summarization(String),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Execution(DatabaseError::Sqlite(err))
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;
