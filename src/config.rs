//! Startup configuration.
//!
//! Layered as: `.env` (via dotenvy, loaded by the binary) → optional
//! `procurement.toml` → `PROCURE__SECTION__KEY` environment variables.
//! A few unprefixed variables are honoured for convenience.

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm:      LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the procurement tables
    pub path:            String,
    /// Alias the file is attached under; generated SQL qualifies columns with it
    pub schema:          String,
    /// Tables the model is allowed to see
    pub included_tables: Vec<String>,
    pub pool_size:       u32,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path:            "procurement.db".into(),
            schema:          "upeg".into(),
            included_tables: default_tables(),
            pool_size:       10,
        }
    }
}

fn default_tables() -> Vec<String> {
    [
        "purchase_order_main",
        "purchase_order_item",
        "purchase_order_item_header",
        "purchase_order_price_template_structure",
        "purchase_order_item_stages",
        "purchase_order_item_bom_dts",
        "purchase_order_item_distribution",
        "purchase_order_item_shipment_details",
        "purchase_order_item_tolerance",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    // ── OpenRouter (primary) ─────────────────────────────────────────────
    /// Prefer env OPENROUTER_API_KEY
    pub openrouter_api_key: Option<String>,
    pub model:              String,

    // ── Local fallback (Ollama / llama.cpp / LM Studio) ──────────────────
    pub local_base_url: Option<String>,
    pub local_model:    String,

    pub temperature:  f32,
    pub max_tokens:   u32,
    pub timeout_secs: u64,
}
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            model:              "google/gemini-2.5-flash".into(),
            local_base_url:     None,
            local_model:        "llama3.1:8b".into(),
            temperature:        0.0,
            max_tokens:         2048,
            timeout_secs:       60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Row cap the generator is told to put in its LIMIT clause
    pub top_k:                usize,
    /// Rows of the result shown to the summarizer
    pub preview_rows:         usize,
    /// Pipelines allowed to run at once
    pub workers:              usize,
    pub request_timeout_secs: u64,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self { top_k: 50, preview_rows: 50, workers: 10, request_timeout_secs: 120 }
    }
}

pub fn load_config() -> Result<AppConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name("procurement").required(false))
        .add_source(
            config::Environment::with_prefix("PROCURE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("database.included_tables")
                .try_parsing(true),
        )
        .build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;
    apply_env_overrides(&mut app);
    Ok(app)
}

/// Unprefixed variables used by existing deployments.
fn apply_env_overrides(app: &mut AppConfig) {
    if app.llm.openrouter_api_key.is_none() {
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            app.llm.openrouter_api_key = Some(key);
        }
    }
    if let Ok(model) = std::env::var("LLM_MODEL") {
        if !model.trim().is_empty() {
            app.llm.model = model;
        }
    }
    if let Ok(tables) = std::env::var("INCLUDED_TABLES") {
        let parsed = parse_table_list(&tables);
        if !parsed.is_empty() {
            app.database.included_tables = parsed;
        }
    }
}

pub fn parse_table_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_config() -> AppConfig {
    AppConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = default_config();
        assert_eq!(cfg.database.schema, "upeg");
        assert_eq!(cfg.database.included_tables.len(), 9);
        assert_eq!(cfg.llm.temperature, 0.0);
        assert_eq!(cfg.pipeline.top_k, 50);
        assert_eq!(cfg.pipeline.workers, 10);
    }

    #[test]
    fn table_list_skips_blanks() {
        assert_eq!(
            parse_table_list(" purchase_order_main, ,purchase_order_item,"),
            vec!["purchase_order_main".to_string(), "purchase_order_item".to_string()]
        );
        assert!(parse_table_list("").is_empty());
    }
}
