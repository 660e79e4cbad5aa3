//! Anthropic Claude messages adapter.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ChatOutput, ChatTurn, ProviderAdapter, ProviderCallError, ProviderKind};
use crate::constants::{ANTHROPIC_MESSAGES_URL, ANTHROPIC_VERSION, DEFAULT_MAX_OUTPUT_TOKENS};

pub struct ClaudeAdapter {
    client: reqwest::Client,
}

impl ClaudeAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn send_chat(
        &self,
        secret: &str,
        model: &str,
        turn: &ChatTurn,
    ) -> Result<ChatOutput, ProviderCallError> {
        let mut body = json!({
            "model": model,
            "max_tokens": DEFAULT_MAX_OUTPUT_TOKENS,
            "messages": [
                { "role": "user", "content": turn.message }
            ],
        });
        if let Some(system) = &turn.system_prompt {
            body["system"] = json!(system);
        }
        if let Some(temperature) = turn.temperature {
            body["temperature"] = json!(temperature);
        }

        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", secret)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|_| ProviderCallError::unreachable(self.provider()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderCallError {
                message: super::rewrite_upstream_error(self.provider(), status, &text),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|_| ProviderCallError::unreachable(self.provider()))?;

        let tokens = body["usage"]["input_tokens"].as_u64().unwrap_or(0)
            + body["usage"]["output_tokens"].as_u64().unwrap_or(0);

        Ok(ChatOutput {
            text: body["content"][0]["text"].as_str().unwrap_or_default().to_string(),
            tokens_used: tokens,
        })
    }
}
