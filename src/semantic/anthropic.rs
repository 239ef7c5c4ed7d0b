//! Anthropic-backed semantic analyzer.

use crate::error::Result;
use crate::graph::types::{Behavior, BehaviorKind, WhenPredicate};
use crate::learn::types::ContextSnapshot;
use crate::semantic::{semantic_error, CandidateHints, SemanticAnalyzer};
use crate::tags::extract_tags;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for the Anthropic analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Model to use
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AnalyzerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: "claude-3-5-haiku-latest".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Semantic analyzer backed by the Anthropic messages API.
pub struct AnthropicAnalyzer {
    config: AnalyzerConfig,
    http: Client,
}

impl AnthropicAnalyzer {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| semantic_error(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }

    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens,
            system: Some(system.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| semantic_error(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(semantic_error(format!("API error {}: {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| semantic_error(format!("unreadable response: {}", e)))?;

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionHints {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    when: WhenPredicate,
}

const COMPARE_SYSTEM: &str = "You judge whether two coding-agent guidance rules mean the same \
thing. Answer with a single decimal number between 0.0 and 1.0 and nothing else.";

const EXTRACT_SYSTEM: &str = "You turn an observed agent correction into structured hints. \
Answer with a single JSON object with optional keys: name (kebab-case string), kind (one of \
directive, constraint, procedure, preference), tags (array of strings), when (object mapping \
condition keys to values). No prose.";

#[async_trait]
impl SemanticAnalyzer for AnthropicAnalyzer {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn compare_behaviors(&self, a: &Behavior, b: &Behavior) -> Result<f64> {
        let prompt = format!(
            "Rule A: {}\nRule B: {}\n\nHow semantically equivalent are these two rules?",
            a.content.canonical, b.content.canonical
        );
        let text = self.complete(COMPARE_SYSTEM, &prompt, 16).await?;

        text.trim()
            .parse::<f64>()
            .map(|score| score.clamp(0.0, 1.0))
            .map_err(|_| semantic_error(format!("expected a number, got '{}'", text.trim())))
    }

    async fn extract_correction(
        &self,
        agent_action: &str,
        corrected_action: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<CandidateHints> {
        let prompt = format!(
            "The agent did: {}\nIt should have done: {}\nContext: language={}, task={}",
            agent_action,
            corrected_action,
            snapshot.file_language.as_deref().unwrap_or("unknown"),
            snapshot.task.as_deref().unwrap_or("unknown"),
        );
        let text = self.complete(EXTRACT_SYSTEM, &prompt, 512).await?;

        let raw: ExtractionHints = serde_json::from_str(text.trim())
            .map_err(|e| semantic_error(format!("unreadable extraction hints: {}", e)))?;

        let mut tags: BTreeSet<String> = raw.tags.into_iter().collect();
        // The model's tags supplement the dictionary, never replace it
        tags.extend(extract_tags(corrected_action));

        Ok(CandidateHints {
            name: raw.name,
            kind: raw.kind.as_deref().and_then(BehaviorKind::parse),
            tags,
            when: raw.when,
        })
    }
}
