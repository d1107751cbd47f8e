//! LLM client supporting OpenRouter (primary) with local-model fallback.
//!
//! OpenRouter is OpenAI-API-compatible: same /v1/chat/completions endpoint,
//! different base URL and auth header format. The fallback is any local
//! OpenAI-compatible server (Ollama, llama.cpp, LM Studio).
//!
//! The pipeline only sees the [`LanguageModel`] trait, so tests can script
//! replies without a network.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::sanitizer::DISALLOWED_KEYWORDS;

/// A text-completion backend: prompt in, free text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Human-readable provider label for logs.
    fn label(&self) -> String {
        "model".to_string()
    }
}

// ─── Provider config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenRouter (https://openrouter.ai)
    OpenRouter {
        api_key: String,
        model:   String,
    },
    /// Any local OpenAI-compatible server
    Local {
        base_url: String,
        model:    String,
    },
}

impl LlmProvider {
    pub fn label(&self) -> String {
        match self {
            LlmProvider::OpenRouter { model, .. } => format!("OpenRouter/{}", model),
            LlmProvider::Local { model, .. }      => format!("Local/{}", model),
        }
    }

    fn endpoint(&self) -> (String, String, String) {
        match self {
            LlmProvider::OpenRouter { api_key, model } => (
                "https://openrouter.ai/api/v1/chat/completions".to_string(),
                model.clone(),
                format!("Bearer {}", api_key),
            ),
            LlmProvider::Local { base_url, model } => (
                format!("{}/chat/completions", base_url.trim_end_matches('/')),
                model.clone(),
                "Bearer local".to_string(), // Ollama ignores auth
            ),
        }
    }
}

// ─── Request types (OpenAI-compatible) ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model:       String,
    messages:    Vec<Message<'a>>,
    max_tokens:  u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role:    &'static str,
    content: &'a str,
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct LlmClient {
    http:        Client,
    primary:     Option<LlmProvider>,
    fallback:    Option<LlmProvider>,
    max_tokens:  u32,
    temperature: f32,
}

impl LlmClient {
    /// Primary = OpenRouter (if key set). Fallback = local server (if configured).
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let primary = cfg.openrouter_api_key.as_ref()
            .filter(|k| !k.is_empty())
            .map(|key| LlmProvider::OpenRouter {
                api_key: key.clone(),
                model:   cfg.model.clone(),
            });

        let fallback = cfg.local_base_url.as_ref()
            .filter(|u| !u.is_empty())
            .map(|url| LlmProvider::Local {
                base_url: url.clone(),
                model:    cfg.local_model.clone(),
            });

        if primary.is_none() && fallback.is_none() {
            warn!("No LLM provider configured; every query will fail until OPENROUTER_API_KEY or llm.local_base_url is set");
        } else {
            info!("LLM primary:  {}", primary.as_ref().map(|p| p.label()).unwrap_or("none".into()));
            info!("LLM fallback: {}", fallback.as_ref().map(|p| p.label()).unwrap_or("none".into()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            primary,
            fallback,
            max_tokens:  cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    /// Try primary provider, fall back to local on error.
    async fn call_with_fallback(&self, prompt: &str) -> Result<String> {
        if let Some(ref primary) = self.primary {
            match self.call_provider(primary, prompt).await {
                Ok(r) => return Ok(r),
                Err(e) => warn!("Primary LLM failed: {}; trying fallback", e),
            }
        }

        if let Some(ref fallback) = self.fallback {
            return self.call_provider(fallback, prompt).await;
        }

        Err(anyhow!("No LLM provider available"))
    }

    async fn call_provider(&self, provider: &LlmProvider, prompt: &str) -> Result<String> {
        let (url, model, auth) = provider.endpoint();

        let body = ChatRequest {
            model,
            messages: vec![Message { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("LLM call → {}", url);

        let resp = self.http
            .post(&url)
            .header("Authorization", auth)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://procurement-assistant.local")
            .header("X-Title", "procurement-assistant")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(300).collect();
            anyhow::bail!("LLM HTTP {}: {}", status, truncated);
        }

        let json: Value = resp.json().await?;
        message_content(&json).ok_or_else(|| anyhow!("Unexpected LLM response: {}", json))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call_with_fallback(prompt).await
    }

    fn label(&self) -> String {
        self.primary.as_ref()
            .or(self.fallback.as_ref())
            .map(|p| p.label())
            .unwrap_or("none".into())
    }
}

/// `choices[0].message.content` of an OpenAI-compatible response.
fn message_content(json: &Value) -> Option<String> {
    json["choices"][0]["message"]["content"].as_str().map(|s| s.to_string())
}

// ─── SQL extraction ──────────────────────────────────────────────────────────

const SQL_MARKER: &str = "SQLQuery:";
const END_MARKERS: &[&str] = &["SQLResult:", "Answer:", SQL_MARKER];

lazy_static::lazy_static! {
    /// A line that opens a statement, optionally behind a code fence. The
    /// deny-listed verbs are accepted here so the sanitizer can name them.
    static ref STATEMENT_START: Regex = Regex::new(&format!(
        r"(?im)^[\s`]*(?:sql\b\s*)?(SELECT\b|WITH\s+(?:RECURSIVE\s+)?\w+(?:\s*\([^)]*\))?\s+AS\s*\(|(?:{})\b)",
        DISALLOWED_KEYWORDS.join("|")
    ))
    .expect("static regex");
}

/// Pull the first SQL statement out of a model reply.
///
/// Text after the first `SQLQuery:` marker is preferred; otherwise the whole
/// reply is the candidate. The candidate ends at the next `SQLResult:`,
/// `Answer:` or `SQLQuery:`, so when several queries come back the earliest
/// one wins, and starts at the first line that opens a statement. Prose with
/// no such line yields `None`. Chained statements inside one candidate are
/// kept intact for the sanitizer to judge.
pub fn extract_sql(reply: &str) -> Option<String> {
    let candidate = match reply.find(SQL_MARKER) {
        Some(pos) => &reply[pos + SQL_MARKER.len()..],
        None => reply,
    };

    let end = END_MARKERS
        .iter()
        .filter_map(|m| candidate.find(m))
        .min()
        .unwrap_or(candidate.len());
    let candidate = &candidate[..end];

    let start = STATEMENT_START.captures(candidate)?.get(1)?.start();
    let statement = candidate[start..].trim().trim_end_matches('`').trim();
    Some(statement.to_string())
}
