//! Natural-language procurement questions answered with SQL.
//!
//! A question is turned into a prompt, the model writes one SQL statement,
//! the statement is cleaned and checked against a read-only deny-list, run
//! against the procurement database, and the rows come back with a markdown
//! narrative. Each session remembers digests of its last few answers so
//! follow-ups like "what about these POs?" have something to refer to.

pub mod config;
pub mod context_summary;
pub mod database;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod result_set;
pub mod sanitizer;
pub mod service;
pub mod session;
pub mod summarizer;

pub use error::{DatabaseError, QueryError};
pub use service::{ClearResponse, QueryResponse, QueryService};
pub use session::{InMemorySessionStore, SessionId, SessionStore};
