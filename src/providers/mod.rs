//! Provider adapters — one per supported AI vendor.
//!
//! Adapters receive the decrypted secret per call and must never store or
//! log it. Upstream failure text is rewritten into stable human-readable
//! messages before it leaves this module; raw provider errors never reach
//! the caller.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod claude;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Gemini,
    Claude,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Openai => "OpenAI",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Claude => "Claude",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user turn plus its optional settings
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub message: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub text: String,
    pub tokens_used: u64,
}

/// Adapter failure with an already-rewritten, non-leaking message
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderCallError {
    pub message: String,
}

impl ProviderCallError {
    pub fn unreachable(provider: ProviderKind) -> Self {
        Self {
            message: format!("Could not reach {}.", provider.display_name()),
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Invoke the provider with a decrypted secret. Returns the response
    /// text and the provider-reported token count.
    async fn send_chat(
        &self,
        secret: &str,
        model: &str,
        turn: &ChatTurn,
    ) -> Result<ChatOutput, ProviderCallError>;
}

pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Box<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(OpenAiAdapter::new(client.clone())));
        registry.register(Box::new(GeminiAdapter::new(client.clone())));
        registry.register(Box::new(ClaudeAdapter::new(client)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: ProviderKind) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(&provider).map(|a| a.as_ref())
    }
}

/// Rewrite upstream failure text into a stable message. Matched against the
/// substrings providers commonly emit for bad keys, exhausted quota, missing
/// models, throttling, safety refusals, and oversized prompts.
pub(crate) fn rewrite_upstream_error(provider: ProviderKind, status: u16, body: &str) -> String {
    let haystack = body.to_ascii_lowercase();
    let name = provider.display_name();
    let matches_any = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

    if status == 401
        || status == 403
        || matches_any(&[
            "invalid api key",
            "incorrect api key",
            "api key not valid",
            "invalid x-api-key",
            "authentication",
            "unauthorized",
        ])
    {
        return format!("{name} rejected the API key. Check that it is valid and not revoked.");
    }
    if matches_any(&["insufficient_quota", "quota", "billing", "credit balance"]) {
        return format!("The {name} account has reached its quota or billing limit.");
    }
    if matches_any(&["model_not_found", "not found", "does not exist"]) && haystack.contains("model")
    {
        return format!("The requested model is not available on this {name} account.");
    }
    if status == 429 || matches_any(&["rate limit", "rate_limit", "too many requests", "overloaded"])
    {
        return format!("{name} is rate limiting this key. Try again shortly.");
    }
    if matches_any(&["content_filter", "content policy", "safety", "blocked"]) {
        return format!("{name} declined the request for content-safety reasons.");
    }
    if matches_any(&[
        "context_length",
        "context length",
        "maximum context",
        "prompt is too long",
        "token limit",
    ]) {
        return format!("The message is too long for the selected {name} model.");
    }

    format!("{name} did not return a successful response.")
}
