//! TOML configuration parsing and validation.
//!
//! Secrets (API keys) are never read from the file; each section names the
//! environment variable that carries them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_provider")]
    pub provider: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            model: default_oracle_model(),
            base_url: default_oracle_base_url(),
            api_key_env: default_oracle_key_env(),
            timeout_secs: default_oracle_timeout(),
            temperature: 0.0,
        }
    }
}

fn default_oracle_provider() -> String {
    "openai".to_string()
}
fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_oracle_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_oracle_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_oracle_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Providers tried in order until one answers: `serper`, `brave`.
    #[serde(default = "default_search_providers")]
    pub providers: Vec<String>,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Suffix appended to every price query, e.g. a market name.
    #[serde(default = "default_price_keywords")]
    pub price_keywords: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: default_search_providers(),
            results_per_query: default_results_per_query(),
            timeout_secs: default_fetch_timeout(),
            price_keywords: default_price_keywords(),
        }
    }
}

fn default_search_providers() -> Vec<String> {
    vec!["serper".to_string(), "brave".to_string()]
}
fn default_results_per_query() -> usize {
    10
}
fn default_fetch_timeout() -> u64 {
    12
}
fn default_price_keywords() -> String {
    "price India".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaderConfig {
    /// Primary reader: `jina` or `direct`. The direct fetcher is always the
    /// secondary path.
    #[serde(default = "default_reader_provider")]
    pub provider: String,
    #[serde(default = "default_reader_base_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            provider: default_reader_provider(),
            base_url: default_reader_base_url(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_reader_provider() -> String {
    "jina".to_string()
}
fn default_reader_base_url() -> String {
    "https://r.jina.ai".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_per_host_cap")]
    pub per_host_cap: usize,
    #[serde(default = "default_deep_results")]
    pub deep_results: usize,
    #[serde(default = "default_deep_body_chars")]
    pub deep_body_chars: usize,
    #[serde(default = "default_escalation_chars")]
    pub escalation_chars: usize,
    #[serde(default = "default_escalation_concurrency")]
    pub escalation_concurrency: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            per_host_cap: default_per_host_cap(),
            deep_results: default_deep_results(),
            deep_body_chars: default_deep_body_chars(),
            escalation_chars: default_escalation_chars(),
            escalation_concurrency: default_escalation_concurrency(),
            history_limit: default_history_limit(),
            max_distance: default_max_distance(),
        }
    }
}

fn default_max_results() -> usize {
    16
}
fn default_per_host_cap() -> usize {
    2
}
fn default_deep_results() -> usize {
    8
}
fn default_deep_body_chars() -> usize {
    800
}
fn default_escalation_chars() -> usize {
    3000
}
fn default_escalation_concurrency() -> usize {
    4
}
fn default_history_limit() -> usize {
    10
}
fn default_max_distance() -> f32 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// A config with every optional section at its default, pointed at `db_path`.
    pub fn with_db(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            oracle: OracleConfig::default(),
            search: SearchConfig::default(),
            reader: ReaderConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate pipeline limits
    let p = &config.pipeline;
    if p.max_results == 0 {
        anyhow::bail!("pipeline.max_results must be >= 1");
    }
    if p.per_host_cap == 0 {
        anyhow::bail!("pipeline.per_host_cap must be >= 1");
    }
    if p.escalation_concurrency == 0 {
        anyhow::bail!("pipeline.escalation_concurrency must be >= 1");
    }
    if !(0.0..=2.0).contains(&p.max_distance) {
        anyhow::bail!("pipeline.max_distance must be in [0.0, 2.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    match config.oracle.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    for provider in &config.search.providers {
        match provider.as_str() {
            "serper" | "brave" => {}
            other => anyhow::bail!(
                "Unknown search provider: '{}'. Must be serper or brave.",
                other
            ),
        }
    }

    match config.reader.provider.as_str() {
        "jina" | "direct" => {}
        other => anyhow::bail!(
            "Unknown reader provider: '{}'. Must be jina or direct.",
            other
        ),
    }

    if !(10..=15).contains(&config.reader.timeout_secs)
        || !(10..=15).contains(&config.search.timeout_secs)
    {
        anyhow::bail!("reader.timeout_secs and search.timeout_secs must be between 10 and 15");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[db]\npath = \"/tmp/fp.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.pipeline.max_results, 16);
        assert_eq!(config.pipeline.per_host_cap, 2);
        assert_eq!(config.pipeline.deep_results, 8);
        assert_eq!(config.pipeline.deep_body_chars, 800);
        assert!((config.pipeline.max_distance - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.reader.timeout_secs, 12);
    }

    #[test]
    fn test_openai_embedding_requires_model() {
        let err = parse("[embedding]\nprovider = \"openai\"\ndims = 1536\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_search_provider_rejected() {
        let err = parse("[search]\nproviders = [\"altavista\"]\n").unwrap_err();
        assert!(err.to_string().contains("altavista"));
    }

    #[test]
    fn test_timeout_range_enforced() {
        assert!(parse("[reader]\ntimeout_secs = 60\n").is_err());
        assert!(parse("[reader]\ntimeout_secs = 15\n").is_ok());
    }
}
