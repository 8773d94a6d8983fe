//! Reasoning oracle: a chat-completion endpoint asked for JSON answers.
//!
//! The [`Oracle`] trait is deliberately narrow (system prompt + user prompt
//! in, raw text out). Callers decode the text with [`parse_oracle_json`],
//! which walks a fixed chain of [`ParseAttempt`]s because models do not
//! always honour "reply with JSON only".
//!
//! Failures are typed ([`OracleError`]) so that callers can tell a missing
//! oracle from a broken one; every caller in the pipeline has a fallback.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OracleConfig;

#[derive(Debug, Error)]
pub enum OracleError {
    /// No oracle is configured (e.g. missing API key).
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// Transport failure or non-success HTTP status.
    #[error("oracle request failed: {0}")]
    Request(String),
    /// The reply could not be decoded into the expected shape.
    #[error("malformed oracle reply: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Request(e.to_string())
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

// ============ OpenAI-compatible ============

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Any endpoint speaking the OpenAI `chat/completions` protocol.
pub struct OpenAiOracle {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig, api_key: String) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            client,
        })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = %self.model, "oracle chat request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Request(format!("HTTP {}: {}", status, text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OracleError::Malformed("empty completion".to_string()))
    }
}

// ============ Disabled ============

pub struct DisabledOracle {
    reason: String,
}

impl DisabledOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Oracle for DisabledOracle {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        Err(OracleError::Unavailable(self.reason.clone()))
    }
}

/// Build the oracle configured in `[oracle]`.
///
/// A missing API key is not a startup error: the pipeline runs with a
/// [`DisabledOracle`] and every oracle-backed step takes its fallback.
pub fn create_oracle(config: &OracleConfig) -> anyhow::Result<Arc<dyn Oracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledOracle::new("oracle disabled in config"))),
        "openai" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Arc::new(OpenAiOracle::new(config, key.trim().to_string())?))
            }
            _ => {
                warn!(
                    env = %config.api_key_env,
                    "oracle API key not set; AI extraction and verdicts will use fallbacks"
                );
                Ok(Arc::new(DisabledOracle::new(format!(
                    "{} not set",
                    config.api_key_env
                ))))
            }
        },
        other => anyhow::bail!("Unknown oracle provider: {}", other),
    }
}

// ============ JSON decoding ============

/// One strategy for pulling a JSON value out of an oracle reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAttempt {
    /// The whole reply is JSON.
    DirectParse,
    /// JSON inside a ```` ``` ```` / ```` ```json ```` fence.
    FencedBlock,
    /// The outermost `{ ... }` span in the reply.
    BraceScan,
}

impl ParseAttempt {
    pub const CHAIN: [ParseAttempt; 3] = [
        ParseAttempt::DirectParse,
        ParseAttempt::FencedBlock,
        ParseAttempt::BraceScan,
    ];

    pub fn apply<T: DeserializeOwned>(self, raw: &str) -> Option<T> {
        match self {
            ParseAttempt::DirectParse => serde_json::from_str(raw.trim()).ok(),
            ParseAttempt::FencedBlock => {
                let start = raw.find("```")?;
                let after = &raw[start + 3..];
                let after = after.strip_prefix("json").unwrap_or(after);
                let end = after.find("```")?;
                serde_json::from_str(after[..end].trim()).ok()
            }
            ParseAttempt::BraceScan => {
                let start = raw.find('{')?;
                let end = raw.rfind('}')?;
                if end <= start {
                    return None;
                }
                serde_json::from_str(&raw[start..=end]).ok()
            }
        }
    }
}

/// Decode an oracle reply, trying each [`ParseAttempt`] in order.
pub fn parse_oracle_json<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    ParseAttempt::CHAIN
        .iter()
        .find_map(|attempt| attempt.apply(raw))
        .ok_or_else(|| {
            let preview: String = raw.chars().take(120).collect();
            OracleError::Malformed(format!("no JSON object found in reply: {}", preview))
        })
}

/// Ask the oracle and decode its reply as `T`.
pub async fn ask_json<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    system: &str,
    user: &str,
) -> Result<T, OracleError> {
    let raw = oracle.complete(system, user).await?;
    parse_oracle_json(&raw)
}
