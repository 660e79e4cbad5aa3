//! Google Gemini adapter, speaking the generativelanguage REST API.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ChatOutput, ChatTurn, ProviderAdapter, ProviderCallError, ProviderKind};
use crate::constants::GEMINI_API_BASE;

pub struct GeminiAdapter {
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn send_chat(
        &self,
        secret: &str,
        model: &str,
        turn: &ChatTurn,
    ) -> Result<ChatOutput, ProviderCallError> {
        // The generativelanguage API authenticates via a key query parameter
        let url = format!("{GEMINI_API_BASE}/{model}:generateContent?key={secret}");

        let mut body = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": turn.message }] }
            ],
        });
        if let Some(system) = &turn.system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if let Some(temperature) = turn.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }

        let resp = self
            .client
            .post(&url)
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
            text: body["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            tokens_used: body["usageMetadata"]["totalTokenCount"].as_u64().unwrap_or(0),
        })
    }
}
