//! OpenAI chat completions adapter.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ChatOutput, ChatTurn, ProviderAdapter, ProviderCallError, ProviderKind};
use crate::constants::{DEFAULT_SYSTEM_PROMPT, OPENAI_CHAT_URL};

pub struct OpenAiAdapter {
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    async fn send_chat(
        &self,
        secret: &str,
        model: &str,
        turn: &ChatTurn,
    ) -> Result<ChatOutput, ProviderCallError> {
        let system = turn
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": turn.message },
            ],
            "temperature": turn.temperature.unwrap_or(0.7),
        });

        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(secret)
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

        Ok(ChatOutput {
            text: body["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            tokens_used: body["usage"]["total_tokens"].as_u64().unwrap_or(0),
        })
    }
}
